//! Concatenates per-section PDFs into one document.
//!
//! Pages are deep-copied with their dependencies into a fresh page tree, in
//! section order. Attributes a page inherits from its source tree (media box,
//! rotation, resources) are pinned on the page first so each page keeps its
//! own orientation after the move.

use lopdf::{dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::AssemblyPolicy;
use crate::error::{ExportError, Result};
use crate::page::Orientation;

const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// PDF output of one rendered section.
#[derive(Debug, Clone)]
pub struct SectionPdf {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Sections left out because their PDF could not be merged.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    policy: AssemblyPolicy,
    scratch_root: PathBuf,
}

struct ObjectCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self {
            source,
            target,
            id_map: HashMap::new(),
        }
    }

    fn copy_object(&mut self, source_id: ObjectId) -> std::result::Result<ObjectId, lopdf::Error> {
        if let Some(id) = self.id_map.get(&source_id) {
            return Ok(*id);
        }
        // Reserve the id before recursing so reference cycles terminate.
        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);

        let obj = self.source.get_object(source_id)?.clone();
        let obj = self.remap(obj)?;
        self.target.objects.insert(new_id, obj);
        Ok(new_id)
    }

    fn remap(&mut self, obj: Object) -> std::result::Result<Object, lopdf::Error> {
        match obj {
            Object::Reference(id) => Ok(Object::Reference(self.copy_object(id)?)),
            Object::Array(items) => Ok(Object::Array(
                items
                    .into_iter()
                    .map(|o| self.remap(o))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            )),
            Object::Dictionary(mut dict) => {
                for (_, value) in dict.iter_mut() {
                    *value = self.remap(value.clone())?;
                }
                Ok(Object::Dictionary(dict))
            }
            Object::Stream(mut stream) => {
                for (_, value) in stream.dict.iter_mut() {
                    *value = self.remap(value.clone())?;
                }
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }
}

/// Looks `key` up on the page and then along its `Parent` chain.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Copies every page of `source` into `target`, returning the new page ids
/// in page order.
fn copy_pages(
    target: &mut Document,
    source: &Document,
    pages_id: ObjectId,
) -> std::result::Result<Vec<ObjectId>, lopdf::Error> {
    let mut copier = ObjectCopier::new(source, target);
    let mut copied = Vec::new();

    for (_, page_id) in source.get_pages() {
        let mut page = source.get_dictionary(page_id)?.clone();
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited(source, page_id, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        page.remove(b"Parent");

        let Object::Dictionary(mut page) = copier.remap(Object::Dictionary(page))? else {
            return Err(lopdf::Error::ObjectNotFound(page_id));
        };
        page.set("Parent", Object::Reference(pages_id));
        copied.push(copier.target.add_object(page));
    }

    Ok(copied)
}

/// Drops every object added after `checkpoint`. The copier only ever adds
/// objects, so this undoes a partially copied section.
fn rollback(target: &mut Document, checkpoint: u32) {
    target.objects.retain(|&(number, _), _| number <= checkpoint);
    target.max_id = checkpoint;
}

fn merge_files(
    policy: AssemblyPolicy,
    sections: &[(String, PathBuf)],
) -> Result<AssembledDocument> {
    let mut target = Document::with_version("1.7");
    let pages_id = target.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    let mut skipped = Vec::new();

    for (name, path) in sections {
        let checkpoint = target.max_id;
        let merged = Document::load(path)
            .map_err(|e| e.to_string())
            .and_then(|source| {
                if source.get_pages().is_empty() {
                    return Err("section has no pages".to_string());
                }
                copy_pages(&mut target, &source, pages_id).map_err(|e| e.to_string())
            });

        match merged {
            Ok(page_ids) => {
                debug!(section = %name, pages = page_ids.len(), "section merged");
                kids.extend(page_ids.into_iter().map(Object::Reference));
            }
            Err(err) => match policy {
                AssemblyPolicy::FailFast => {
                    return Err(ExportError::assembly(format!(
                        "section '{name}' could not be merged: {err}"
                    )))
                }
                AssemblyPolicy::SkipFailed => {
                    rollback(&mut target, checkpoint);
                    warn!(section = %name, error = %err, "skipping section that failed to merge");
                    skipped.push(name.clone());
                }
            },
        }
    }

    if kids.is_empty() {
        return Err(ExportError::assembly("no section could be merged"));
    }

    let page_count = kids.len();
    target.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = target.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    target.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    target.save_to(&mut bytes)?;
    Ok(AssembledDocument {
        bytes,
        page_count,
        skipped,
    })
}

impl DocumentAssembler {
    /// Section files are staged in a fresh directory under `scratch_root`.
    pub fn new(policy: AssemblyPolicy, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn policy(&self) -> AssemblyPolicy {
        self.policy
    }

    /// Merges `sections` in order. The staging directory is removed whatever
    /// the outcome.
    pub async fn merge(&self, sections: Vec<SectionPdf>) -> Result<AssembledDocument> {
        if sections.is_empty() {
            return Err(ExportError::assembly("nothing to assemble"));
        }
        tokio::fs::create_dir_all(&self.scratch_root).await?;
        let staging = tempfile::Builder::new()
            .prefix("tpx-merge-")
            .tempdir_in(&self.scratch_root)?;

        let mut staged = Vec::with_capacity(sections.len());
        for (index, section) in sections.into_iter().enumerate() {
            let path = staging.path().join(format!("{index:02}-{}.pdf", section.name));
            tokio::fs::write(&path, &section.bytes).await?;
            staged.push((section.name, path));
        }

        let policy = self.policy;
        tokio::task::spawn_blocking(move || {
            let result = merge_files(policy, &staged);
            drop(staging);
            result
        })
        .await
        .map_err(|e| ExportError::Internal(format!("assembly task failed: {e}")))?
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Orientation of every page of a PDF, from its effective media box and
/// rotation.
pub fn page_orientations(bytes: &[u8]) -> Result<Vec<Orientation>> {
    let doc = Document::load_mem(bytes)?;
    let mut out = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let media_box = inherited(&doc, page_id, b"MediaBox")
            .ok_or_else(|| ExportError::assembly("page without a media box"))?;
        let values: Vec<f64> = media_box
            .as_array()
            .map_err(ExportError::from)?
            .iter()
            .filter_map(number)
            .collect();
        let [x0, y0, x1, y1] = values[..] else {
            return Err(ExportError::assembly("malformed media box"));
        };
        let rotate = inherited(&doc, page_id, b"Rotate")
            .as_ref()
            .and_then(number)
            .unwrap_or(0.0) as i64;
        let wide = (x1 - x0).abs() > (y1 - y0).abs();
        let quarter_turn = rotate.rem_euclid(180) == 90;
        out.push(if wide != quarter_turn {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        });
    }
    Ok(out)
}

/// Number of pages in a PDF held in memory.
pub fn page_count(bytes: &[u8]) -> Result<usize> {
    Ok(Document::load_mem(bytes)?.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, StringFormat};
    use std::path::Path;
    use tempfile::TempDir;

    /// PDF whose pages live under a Pages node carrying the media box, so
    /// the box is only reachable through inheritance.
    fn pdf(pages: usize, label: &str, width: i64, height: i64) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids: Vec<Object> = Vec::new();
        for i in 1..=pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            format!("{label} {i}").into_bytes(),
                            StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
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

    fn is_staging_dir(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("tpx-merge-"))
    }

    fn section(name: &str, bytes: Vec<u8>) -> SectionPdf {
        SectionPdf {
            name: name.into(),
            bytes,
        }
    }

    fn page_text(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
            .collect()
    }

    #[tokio::test]
    async fn pages_keep_section_order_and_orientation() {
        let scratch = TempDir::new().unwrap();
        let assembler = DocumentAssembler::new(AssemblyPolicy::SkipFailed, scratch.path());

        let doc = assembler
            .merge(vec![
                section("a", pdf(1, "A", 595, 842)),
                section("b", pdf(2, "B", 842, 595)),
                section("c", pdf(1, "C", 595, 842)),
            ])
            .await
            .unwrap();

        assert_eq!(doc.page_count, 4);
        assert!(doc.skipped.is_empty());
        assert_eq!(page_count(&doc.bytes).unwrap(), 4);
        assert_eq!(
            page_orientations(&doc.bytes).unwrap(),
            vec![
                Orientation::Portrait,
                Orientation::Landscape,
                Orientation::Landscape,
                Orientation::Portrait,
            ]
        );
        let text = page_text(&doc.bytes);
        assert!(text[0].contains("A 1"));
        assert!(text[2].contains("B 2"));
        assert!(text[3].contains("C 1"));
    }

    #[tokio::test]
    async fn corrupt_section_is_skipped_by_default() {
        let scratch = TempDir::new().unwrap();
        let assembler = DocumentAssembler::new(AssemblyPolicy::SkipFailed, scratch.path());

        let doc = assembler
            .merge(vec![
                section("cover", pdf(1, "Cover", 595, 842)),
                section("bom", b"%PDF-1.7 garbage".to_vec()),
            ])
            .await
            .unwrap();

        assert_eq!(doc.page_count, 1);
        assert_eq!(doc.skipped, vec!["bom".to_string()]);
    }

    /// Two-page PDF whose second page points at contents that do not exist,
    /// so copying fails after the first page.
    fn pdf_with_dangling_second_page() -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
        let first = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        let second = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => Object::Reference((900, 0)),
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![first.into(), second.into()],
                "Count" => 2,
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

    #[tokio::test]
    async fn partially_copied_section_leaves_no_objects_behind() {
        let scratch = TempDir::new().unwrap();
        let assembler = DocumentAssembler::new(AssemblyPolicy::SkipFailed, scratch.path());

        let clean = assembler
            .merge(vec![section("cover", pdf(1, "Cover", 595, 842))])
            .await
            .unwrap();
        let with_broken = assembler
            .merge(vec![
                section("cover", pdf(1, "Cover", 595, 842)),
                section("bom", pdf_with_dangling_second_page()),
            ])
            .await
            .unwrap();

        assert_eq!(with_broken.skipped, vec!["bom".to_string()]);
        assert_eq!(with_broken.page_count, 1);
        let objects = |bytes: &[u8]| Document::load_mem(bytes).unwrap().objects.len();
        assert_eq!(objects(&with_broken.bytes), objects(&clean.bytes));
        assert_eq!(with_broken.bytes.len(), clean.bytes.len());
    }

    #[tokio::test]
    async fn fail_fast_policy_aborts_on_corrupt_section() {
        let scratch = TempDir::new().unwrap();
        let assembler = DocumentAssembler::new(AssemblyPolicy::FailFast, scratch.path());

        let err = assembler
            .merge(vec![
                section("cover", pdf(1, "Cover", 595, 842)),
                section("bom", b"not a pdf".to_vec()),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Assembly(ref m) if m.contains("bom")));
    }

    #[tokio::test]
    async fn all_sections_failing_is_an_error_even_when_skipping() {
        let scratch = TempDir::new().unwrap();
        let assembler = DocumentAssembler::new(AssemblyPolicy::SkipFailed, scratch.path());

        let err = assembler
            .merge(vec![section("cover", b"junk".to_vec())])
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Assembly(_)));
    }

    #[tokio::test]
    async fn staging_files_are_removed_on_success_and_failure() {
        let scratch = TempDir::new().unwrap();
        let assembler = DocumentAssembler::new(AssemblyPolicy::FailFast, scratch.path());

        assembler
            .merge(vec![section("a", pdf(1, "A", 595, 842))])
            .await
            .unwrap();
        let _ = assembler
            .merge(vec![section("a", b"junk".to_vec())])
            .await;

        let leftovers: Vec<_> = std::fs::read_dir(scratch.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_staging_dir(&e.path()))
            .collect();
        assert!(leftovers.is_empty());
    }
}
