//! # toolflow Engine
//!
//! The ReAct execution engine: per-request loop controller, two-stage
//! tool-call parser, prompt builder, and guarded tool dispatcher, all driven
//! through an injected [`OrchestratorContext`]. There is one loop
//! implementation; streaming is the same loop run against an event sink.

pub mod context;
pub mod dispatcher;
pub mod event;
pub mod parser;
pub mod prompt;
pub mod runner;

pub use context::OrchestratorContext;
pub use dispatcher::Dispatch;
pub use event::EngineEvent;
pub use parser::{ModelReply, parse_reply};
pub use runner::{ChatOutcome, ChatRequest, run, run_stream};
