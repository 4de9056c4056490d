//! In-memory browser and image fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use tpx_lib::browser::{BrowserInstance, BrowserLauncher, ImageWaitReport, RenderSession};
use tpx_lib::image_loader::{FetchedImage, ImageFetcher, ImageLoadError};
use tpx_lib::{Config, DocumentRecord, PageLayout, Result};

/// Counters observed by the tests.
#[derive(Debug, Default)]
pub struct BrowserState {
    pub launches: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub printing: AtomicUsize,
    pub peak_printing: AtomicUsize,
    pub prints: AtomicUsize,
    print_delay: Mutex<Duration>,
}

impl BrowserState {
    pub fn set_print_delay(&self, delay: Duration) {
        *self.print_delay.lock().unwrap() = delay;
    }

    fn print_delay(&self) -> Duration {
        *self.print_delay.lock().unwrap()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn prints(&self) -> usize {
        self.prints.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst) - self.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn peak_printing(&self) -> usize {
        self.peak_printing.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub state: Arc<BrowserState>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_print_delay(delay: Duration) -> Self {
        let launcher = Self::default();
        launcher.state.set_print_delay(delay);
        launcher
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserInstance>> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        let (tx, _) = watch::channel(false);
        Ok(Arc::new(FakeInstance {
            state: Arc::clone(&self.state),
            disconnected: tx,
        }))
    }
}

struct FakeInstance {
    state: Arc<BrowserState>,
    disconnected: watch::Sender<bool>,
}

#[async_trait]
impl BrowserInstance for FakeInstance {
    fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnected.subscribe()
    }

    async fn new_session(&self) -> Result<Box<dyn RenderSession>> {
        let n = self.state.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(FakeSession {
            id: format!("session-{n}"),
            state: Arc::clone(&self.state),
            markup: Mutex::new(String::new()),
            closed: Mutex::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.disconnected.send_replace(true);
        Ok(())
    }
}

struct FakeSession {
    id: String,
    state: Arc<BrowserState>,
    markup: Mutex<String>,
    closed: Mutex<bool>,
}

/// Decrements the printing gauge even when the print future is dropped.
struct Printing<'a>(&'a BrowserState);

impl Drop for Printing<'_> {
    fn drop(&mut self) {
        self.0.printing.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderSession for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    async fn load_markup(&self, html: &str) -> Result<()> {
        *self.markup.lock().unwrap() = html.to_string();
        Ok(())
    }

    async fn dom_ready(&self) -> Result<bool> {
        Ok(true)
    }

    async fn wait_for_images(&self, _per_image: Duration) -> Result<ImageWaitReport> {
        Ok(ImageWaitReport::default())
    }

    async fn print_pdf(&self, layout: &PageLayout) -> Result<Vec<u8>> {
        let running = self.state.printing.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_printing.fetch_max(running, Ordering::SeqCst);
        let _gauge = Printing(&self.state);

        tokio::time::sleep(self.state.print_delay()).await;
        self.state.prints.fetch_add(1, Ordering::SeqCst);

        let pages = pages_requested(&self.markup.lock().unwrap());
        let (width, height) = layout.size.points(layout.orientation);
        Ok(pdf_bytes(pages, width, height))
    }

    async fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.state.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Markup may ask for several pages with `data-pages="N"`.
fn pages_requested(markup: &str) -> usize {
    markup
        .split("data-pages=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}

/// Minimal PDF with `pages` empty pages of the given size in points.
pub fn pdf_bytes(pages: usize, width: f64, height: f64) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    for _ in 0..pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(width as f32), Object::Real(height as f32)],
            "Resources" => dictionary! {},
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Image fetcher that never touches the network.
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: AtomicUsize,
    /// Served for every URL; `None` fails every fetch.
    pub image: Option<Vec<u8>>,
}

impl FakeFetcher {
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn serving_png() -> Self {
        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([200, 30, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageOutputFormat::Png,
            )
            .unwrap();
        Self {
            calls: AtomicUsize::new(0),
            image: Some(bytes),
        }
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchedImage, ImageLoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.image {
            Some(bytes) => Ok(FetchedImage {
                bytes: bytes.clone(),
                content_type: Some("image/png".to_string()),
            }),
            None => Err(ImageLoadError::Fetch(format!("unreachable: {url}"))),
        }
    }
}

/// Config pointing at `dir`, with an in-memory cache and short timeouts.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.export.artifact_dir = dir.to_path_buf();
    config.export.persistent_cache = false;
    config.export.generation_timeout = Duration::from_secs(10);
    config.render.content_load_timeout = Duration::from_secs(5);
    config.render.pdf_timeout = Duration::from_secs(5);
    config.images.load_timeout = Duration::from_secs(1);
    config
}

pub fn record(id: &str) -> DocumentRecord {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "code": format!("TP-{id}"),
        "version": 3,
        "modifiedAt": "2026-03-01T10:00:00Z",
        "product": { "name": "Field Jacket", "season": "FW26" },
        "materials": [
            { "name": "Shell", "category": "Fabric", "supplier": "Mill A", "quantity": 1.8, "unit": "m", "unitPrice": 7.5, "approved": true },
            { "name": "Zip", "category": "Trim", "supplier": "YKK", "quantity": 1, "unitPrice": 0.9 }
        ],
        "measurements": {
            "baseSize": "M",
            "sizes": ["S", "M", "L"],
            "points": [
                { "code": "A", "name": "Chest width", "tolerance": 1.0, "values": { "S": 52, "M": 54, "L": 56 } }
            ]
        },
        "care": { "washing": ["Machine wash 30°C"] }
    }))
    .unwrap()
}

/// Waits until `check` holds, for at most two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
