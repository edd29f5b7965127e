mod builder;
mod cancel;
mod channel;
mod config;
mod engine;
pub mod framer;
mod worker;

pub use builder::IngestionBuilder;
pub use cancel::StopToken;
pub use channel::RecordChannel;
pub use config::IngestionConfig;
pub use engine::{EngineState, IngestionEngine};
pub use framer::{FeedOutcome, Framer, DELIMITER};
pub use worker::{ExitReason, WorkerReport, WorkerState};
