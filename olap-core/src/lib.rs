//! Overlap store core library
//!
//! An overlap store is a sharded, append-only binary database of pairwise
//! fragment overlaps, indexed by fragment id and streamed in id order.
//! This crate holds the on-disk codecs, the read-only [`Store`] handle and
//! its [`OverlapStream`] cursor, the [`Grower`] write path and the in-place
//! `corr_erate` patcher on [`ExclusiveStore`].

pub mod error;
pub mod grow;
pub mod index;
pub mod io;
pub mod patch;
pub mod quality;
pub mod record;
pub mod shard;
pub mod store;
pub mod stream;
pub mod types;

// Re-export commonly used types and functions
pub use error::{StoreError, StoreResult};
pub use grow::{GrowConfig, GrowMode, GrowPhase, GrowSummary, Grower, DEFAULT_RECORDS_PER_SHARD};
pub use index::{OffsetIndex, OffsetSlice};
pub use patch::{ExclusiveStore, PatchConfig};
pub use store::Store;
pub use stream::OverlapStream;
pub use types::{FragId, Orientation, OverlapClass, OverlapRecord, PhysicalOverlap};

/// Version information for the overlap store core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
