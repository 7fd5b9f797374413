//! State module for lazily loaded entities
//!
//! Every entity keeps at most one snapshot of the page it was loaded from and
//! a set of memo slots for the attributes derived from it.
//!
//! # Components
//!
//! - `Snapshot`: An immutable, versioned copy of a fetched page body
//! - `Memo`: A single derived value tagged with the snapshot version it came from

mod memo;
mod snapshot;

// Re-export main types
pub use memo::Memo;
pub use snapshot::Snapshot;
