//! Wire types for the `/rest/items` API.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// One named item and its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub state: String,
}

impl Item {
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
        }
    }
}

/// Body of a group long-poll response.
///
/// The wrapper's own `type`, `name`, `state` and `link` fields are ignored,
/// as are any extra per-member fields.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupResponse {
    pub members: Vec<Item>,
}

/// Parse a group response body into its direct members.
pub fn parse_group(body: &str) -> Result<Vec<Item>> {
    serde_json::from_str::<GroupResponse>(body)
        .map(|g| g.members)
        .map_err(|e| BridgeError::Json {
            field: "members".into(),
            detail: e.to_string(),
        })
}
