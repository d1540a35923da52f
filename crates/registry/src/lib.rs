//! Tool registry — merges descriptors from every backend into one catalog.
//!
//! Three backend kinds feed the catalog: subprocess sessions (stdio RPC),
//! in-process virtual tools, and stored webhook definitions. The catalog is
//! rebuilt once per turn — backends may change at runtime (custom tools can
//! be added between requests), so nothing is cached across turns.

pub mod catalog;
pub mod stdio;
pub mod virtual_tools;

pub use catalog::{Catalog, Route, aggregate};
pub use stdio::StdioSession;
pub use virtual_tools::{ALWAYS_ALLOWED, INTERNAL_TOOLS, virtual_descriptors};
