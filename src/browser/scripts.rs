//! In-page JavaScript evaluated by the render session.

use std::time::Duration;

/// Evaluates to the current `document.readyState`.
pub(crate) const READY_STATE_SCRIPT: &str = "document.readyState";

/// Interval between two `readyState` probes.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Waits for all images concurrently, each raced against its own timer.
/// `__PER_IMAGE_MS__` is substituted before evaluation.
const IMAGE_WAIT_TEMPLATE: &str = r#"
(async () => {
  const perImageMs = __PER_IMAGE_MS__;
  const images = Array.from(document.images);
  const report = { total: images.length, loaded: 0, failed: 0, timedOut: 0 };

  const settle = (img) => new Promise((resolve) => {
    if (img.complete) {
      resolve(img.naturalWidth > 0 ? 'loaded' : 'failed');
      return;
    }
    const timer = setTimeout(() => resolve('timedOut'), perImageMs);
    const done = (state) => () => { clearTimeout(timer); resolve(state); };
    img.addEventListener('load', done('loaded'), { once: true });
    img.addEventListener('error', done('failed'), { once: true });
  });

  const states = await Promise.all(images.map(settle));
  for (const state of states) {
    report[state] += 1;
  }
  return report;
})()
"#;

pub(crate) fn image_wait_script(per_image: Duration) -> String {
    IMAGE_WAIT_TEMPLATE.replace("__PER_IMAGE_MS__", &per_image.as_millis().to_string())
}

/// Whether a protocol error message means the target is gone.
pub(crate) fn is_target_gone(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    [
        "target closed",
        "no target with given id",
        "session closed",
        "session with given id not found",
        "cannot find context",
        "channel closed",
        "already closed",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}
