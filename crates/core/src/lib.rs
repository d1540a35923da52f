//! # toolflow Core
//!
//! Domain types, traits, and error definitions for the toolflow
//! tool-orchestration engine. This crate has **zero framework dependencies** —
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the LLM seam
//! (`Provider`), the tool backend seam (`ToolSession`). Implementations live
//! in their respective crates, which keeps the dependency graph pointing
//! inward and makes every seam mockable in tests.

pub mod agent;
pub mod error;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentProfile, AgentType, AllowList};
pub use error::{Error, ProviderError, Result, SessionError, ToolError};
pub use provider::{Message, Provider, ProviderRequest, ProviderResponse, Role, Usage};
pub use tool::{ToolCall, ToolDescriptor, ToolOutput, ToolSession, WebhookToolDef};
