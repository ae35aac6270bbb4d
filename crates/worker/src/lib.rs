//! Path worker: the request protocol, a worker thread host, and a stdio transport.
//!
//! # Invariants
//! - The first message configures the volume; every later message is a job.
//! - Every job gets exactly one response, in the order jobs arrived.
//! - A failing job is reported in its own response and never stops the worker.

mod config;
mod host;
mod protocol;
mod stats;
mod transport;

pub use config::{ConfigError, WorkerConfig};
pub use host::{HostError, WorkerHandle};
pub use protocol::{
    CollisionBytes, ErrorKind, JobError, JobRequest, JobResponse, Message, PathWorker, Payload,
    WorkerState,
};
pub use stats::{JobOutcome, LatencyWindow, WorkerStats};
pub use transport::{MAX_FRAME_BYTES, TransportError, WireFormat, read_frame, serve, write_frame};

pub fn crate_info() -> &'static str {
    "voxpath-worker v0.1.0"
}
