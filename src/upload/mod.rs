//! Chunked block upload engine

pub mod coordinator;
pub mod limiter;
pub mod planner;
pub mod progress;
pub mod retry;
pub mod source;
pub mod speed;

pub use coordinator::{blob_name_for, UploadCoordinator, UploadSummary};
pub use limiter::{run_all, ConcurrencyLimiter};
pub use planner::{block_id, Block, BlockPlanner, BlockStatus};
pub use progress::{ProgressEvent, SessionState, UploadStatus};
pub use retry::RetryPolicy;
pub use source::{FileSource, MemorySource, ObjectSource, UploadObject};
pub use speed::{Eta, SpeedTracker};
