pub mod error;
pub mod estimator;
pub mod frame_queue;
pub mod hook;
pub mod pacer;
pub mod rate;
pub mod transaction;

pub use error::{Error, Result};
pub use estimator::{CapacityEstimator, EstimatorConfig, WindowReport};
pub use frame_queue::{FrameQueue, FrameQueueOptions};
pub use hook::{apply_report, EcnHook, NoopHook};
pub use rate::{RateMode, RateState, FEEDBACK_TIMEOUT_US, MIN_BITRATE_KBITS};
pub use transaction::{MediaHeaders, PacketEntry, Transaction};
