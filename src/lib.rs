// Module naming follows project convention (capitalised module groups)
#[allow(non_snake_case)]
pub mod Core {
    pub mod affinity;
    pub mod epoll;
    pub mod futex;
    pub mod pool;
    pub mod queue;
    pub use pool::{PooledRecord, RecordPool};
    pub use queue::MpscQueue;
}
#[allow(non_snake_case)]
pub mod Structs {
    pub mod Record_Structs;
    pub use Record_Structs::Record; // re-export for stable path
}
#[allow(non_snake_case)]
pub mod Ingestion;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}
pub mod error;

pub use error::{IngestError, Result};
pub use Ingestion::{
    ExitReason, IngestionBuilder, IngestionConfig, IngestionEngine, WorkerReport, WorkerState,
};
