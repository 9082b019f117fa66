//! ChangeWatch remote delta feed support crate
//!
//! Wire types, the feed error taxonomy and an HTTP client for a
//! cursor-based drive delta API. Every call returns the entries changed
//! since an opaque cursor together with the cursor for the next call.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DeltaFeed, GraphDeltaClient};
pub use error::{FeedError, FeedErrorKind};
pub use types::{DeletedFacet, DeltaEntry, DeltaPage, FeedChangeType, SyncCursor};
