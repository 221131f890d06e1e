mod queue;
mod scheduler;

pub use queue::{Requeue, WorkQueue};
pub use scheduler::{DownloadSummary, Scheduler};
