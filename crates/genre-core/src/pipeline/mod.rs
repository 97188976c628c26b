//! Classification pipeline
//!
//! - **Protocol** (`protocol.rs`): owned request/response crossing the worker boundary
//! - **Worker** (`worker.rs`): extraction thread, optionally isolating each request
//!   in a child process
//! - **Orchestrator** (`orchestrator.rs`): state machine driving one attempt at a time

mod orchestrator;
mod protocol;
mod worker;

pub use orchestrator::{ClassificationOutcome, Orchestrator, PipelineState};
pub use protocol::{ExtractionRequest, ExtractionResponse};
pub use worker::{ExtractionCommand, ExtractionHandle, ExtractionService};
