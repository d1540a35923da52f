//! Per-conversation state for toolflow.
//!
//! Three concerns live here, all scoped per session and held only for the
//! process lifetime (a fresh session id per client load guarantees isolation):
//!
//! - **Session state** — sticky identifiers harvested from tool calls and
//!   outputs, surfaced back to the model through the prompt.
//! - **Transcripts** — a short rolling history of completed exchanges per
//!   (session, agent) pair, used to seed the next request's first turn.
//! - **Repetition ledger** — per-request guard against executing the same
//!   (tool, arguments) signature twice.
//!
//! A small long-term memory log rounds this out: tool executions and
//! completed exchanges are recorded best-effort and searchable by keyword.

pub mod ledger;
pub mod memory;
pub mod state;
pub mod transcript;

pub use ledger::RepetitionLedger;
pub use memory::{MemoryLog, MemoryRecord};
pub use state::{ClearScope, ReportContext, SessionSnapshot, SessionStore};
pub use transcript::{Exchange, TranscriptStore};
