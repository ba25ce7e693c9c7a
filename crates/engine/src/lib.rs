pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod guard;
pub mod policy;
pub mod store;
pub mod sweeper;
pub mod worker;

pub use error::ProcessingError;
pub use policy::AckDecision;
pub use sweeper::RetentionSweeper;
pub use worker::{PushReport, PushWorker, WorkerSettings};
