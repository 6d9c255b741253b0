//! Tools the tutor can call while reasoning
//!
//! - `run_python`: isolated, time- and memory-bounded code execution
//! - `web_search`: rate-limited lookups against a search backend
//!
//! All calls go through `ToolExecutor`, which screens every input with the
//! `SafetyValidator` first.

pub mod confinement;
pub mod executor;
pub mod rate_limit;
pub mod sandbox;
pub mod search;
pub mod types;

pub use confinement::Confinement;
pub use executor::ToolExecutor;
pub use rate_limit::RateLimiter;
pub use sandbox::{
    truncate_output, CodeSandbox, ProcessSandbox, SandboxError, SandboxLimits, SandboxOutput,
    SandboxRequest,
};
pub use search::{
    BraveSearch, SearchBackend, SearchConfig, SearchError, SearchHit, SearchResults, StubSearch,
};
pub use types::{ToolKind, ToolResult, ToolStatus};
