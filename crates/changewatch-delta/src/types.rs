//! Delta feed wire types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque resume point issued by the delta feed.
///
/// Only valid for the folder it was issued for. Callers never inspect it;
/// for the Graph API it happens to be the full `@odata.deltaLink` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(String);

impl SyncCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Change type as reported by the feed, when it reports one at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedChangeType {
    Created,
    Updated,
    Deleted,
    /// Any value the feed sends that we do not recognise; treated as absent.
    #[serde(other)]
    Unrecognized,
}

/// Deletion marker attached to removed items
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeletedFacet {
    /// Feed-specific deletion state (`deleted`, `softDeleted`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

fn unknown_id() -> String {
    "unknown".to_string()
}

/// One raw item change from a delta page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaEntry {
    #[serde(default = "unknown_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<FeedChangeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DeletedFacet>,
}

impl DeltaEntry {
    /// Entry reporting a plain change with an explicit type.
    pub fn new(id: impl Into<String>, name: impl Into<String>, change_type: FeedChangeType) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            change_type: Some(change_type),
            deleted: None,
        }
    }

    /// Entry with no reported change type; classification falls back to
    /// whether the id has been seen before.
    pub fn untyped(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            change_type: None,
            deleted: None,
        }
    }

    /// Attach a deletion marker with the given state.
    pub fn with_deleted_state(mut self, state: impl Into<String>) -> Self {
        self.deleted = Some(DeletedFacet {
            state: Some(state.into()),
        });
        self
    }

    /// True when the entry carries an explicit deletion marker.
    pub fn is_marked_deleted(&self) -> bool {
        self.deleted.is_some()
    }
}

/// A complete delta response: every entry across all pages of one fetch,
/// plus the cursor to resume from next time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPage {
    pub entries: Vec<DeltaEntry>,
    pub next_cursor: SyncCursor,
}

/// Raw JSON body of a single Graph delta response page.
#[derive(Debug, Deserialize)]
pub(crate) struct DeltaResponseBody {
    #[serde(default)]
    pub value: Vec<DeltaEntry>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink", default)]
    pub delta_link: Option<String>,
}
