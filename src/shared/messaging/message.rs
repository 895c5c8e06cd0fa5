//! Chat Message Data Structure
//!
//! Represents a message in a room, as stored in the `messages` table and as delivered
//! by the realtime feed.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::room::RoomId;

/// Server-assigned message identifier
pub type MessageId = i64;

/// A message posted in a room. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned id
    pub id: MessageId,
    /// Message text
    pub content: String,
    /// Id of the author in the auth service
    pub user_id: String,
    /// Author email at the time of posting
    pub email: String,
    /// Server insertion time
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Room this message belongs to
    pub room_id: RoomId,
}

/// Insert payload for the `messages` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub content: String,
    pub user_id: String,
    pub email: String,
    pub room_id: RoomId,
}

/// Accepts RFC 3339 timestamps and offset-less ISO timestamps (read as UTC).
///
/// The data API renders `timestamptz` columns with an offset, while realtime
/// payloads for `timestamp` columns come without one.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Postgres text output uses a space separator and a short offset like "+00"
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
