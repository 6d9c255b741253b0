//! Learner profiles and their persistence
//!
//! - `types` - `LearnerProfile`, `SkillLevel`, `InteractionSummary`
//! - `store` - `ProfileStore` (get-or-create, per-id leases) over a
//!   pluggable `ProfileBackend` (in-memory or JSON files)

pub mod store;
pub mod types;

pub use store::{
    validate_id, JsonFileBackend, MemoryBackend, ProfileBackend, ProfileDefaults, ProfileLease,
    ProfileStore, StoreError,
};
pub use types::{InteractionSummary, LearnerProfile, SkillLevel, DEFAULT_HISTORY_LIMIT};
