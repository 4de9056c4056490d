use std::fmt;
use std::sync::Arc;

/// Lifecycle of one export job, reported through [`ProgressCallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Locked,
    Building,
    Rendering { index: usize, total: usize, section: String },
    Assembling,
    Cached,
    Failed(String),
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => f.write_str("queued"),
            JobState::Locked => f.write_str("locked"),
            JobState::Building => f.write_str("building render model"),
            JobState::Rendering {
                index,
                total,
                section,
            } => write!(f, "rendering section {section} ({index}/{total})"),
            JobState::Assembling => f.write_str("assembling document"),
            JobState::Cached => f.write_str("cached"),
            JobState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(&str, &JobState) + Send + Sync>;

/// Reports a state to an optional callback, tagged with the job id.
pub(crate) fn report(progress: Option<&ProgressCallback>, job_id: &str, state: JobState) {
    tracing::debug!(job_id, state = %state, "export job state");
    if let Some(cb) = progress {
        cb(job_id, &state);
    }
}
