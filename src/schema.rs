use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ------------------------------------------------------------
// Listed item
// ------------------------------------------------------------
//
// One entry of an upstream listing page. Only the identifier and
// the occupancy matter to the harvester; every other field of the
// upstream object is ignored on deserialization.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Item {
    /// Opaque identifier (string or number upstream)
    ///
    /// A JSON null or missing id deserializes to None and the item
    /// is never forwarded.
    #[serde(default)]
    pub id: Option<Value>,

    /// Current occupancy ("playing" upstream)
    ///
    /// Integers, floats (truncated) and numeric strings are accepted,
    /// anything else reads as absent.
    #[serde(default, rename = "playing", deserialize_with = "lenient_count")]
    pub occupancy: Option<i64>,
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

impl Item {
    pub fn new(id: impl Into<Value>, occupancy: i64) -> Self {
        Self {
            id: Some(id.into()),
            occupancy: Some(occupancy),
        }
    }

    /// Occupancy used by the filter, 0 when absent.
    pub fn occupancy(&self) -> i64 {
        self.occupancy.unwrap_or(0)
    }
}

// ------------------------------------------------------------
// Page
// ------------------------------------------------------------
//
// Result of one successful fetch: items in upstream order plus
// the continuation token, if the listing goes on.
//
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn new(items: Vec<Item>, next_cursor: Option<&str>) -> Self {
        Self {
            items,
            next_cursor: next_cursor.map(str::to_string),
        }
    }
}

/// Wire shape of a listing response.
///
/// `{ "data": [ ... ], "nextPageCursor": "..." | null }`
#[derive(Debug, Deserialize)]
pub struct RawPage {
    /// Entries are kept raw so one malformed entry cannot fail the page
    #[serde(default, alias = "items")]
    pub data: Vec<Value>,

    #[serde(default, rename = "nextPageCursor")]
    pub next_page_cursor: Option<String>,
}

impl From<RawPage> for Page {
    fn from(raw: RawPage) -> Self {
        let total = raw.data.len();
        let items: Vec<Item> = raw
            .data
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        if items.len() < total {
            debug!("[FETCH] dropped {} malformed entries", total - items.len());
        }

        Self {
            items,
            // An empty token would restart the listing, treat it as the end
            next_cursor: raw.next_page_cursor.filter(|c| !c.is_empty()),
        }
    }
}

// ------------------------------------------------------------
// Downstream payloads
// ------------------------------------------------------------

/// Body of the forward POST: `{ "servers": [ids...] }`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForwardPayload {
    pub servers: Vec<Value>,
}

/// Optional acknowledgement returned by the aggregation API.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ForwardAck {
    #[serde(default)]
    pub added: Option<u64>,
}
