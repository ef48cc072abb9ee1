//! Telemetry stream ingestion
//!
//! - [`reassembler`]: chunk-tolerant line reassembly and record parsing
//! - [`source`]: shared producer/consumer handle around the reassembler

pub mod reassembler;
pub mod source;

pub use reassembler::{LineOutcome, LineRejection, ReassemblerConfig, ReassemblerStats, StreamReassembler};
pub use source::RecordSource;
