//! Room Data Structure
//!
//! Represents a chat room as stored in the `rooms` table.

use serde::{Deserialize, Serialize};

/// Server-assigned room identifier
pub type RoomId = i64;

/// Id of the hardcoded welcome room
pub const WELCOME_ROOM_ID: RoomId = 1;

/// Name of the hardcoded welcome room
pub const WELCOME_ROOM_NAME: &str = "Bienvenue sur Talk";

/// A named channel partitioning messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Room {
    /// Server-assigned id
    pub id: RoomId,
    /// Display name
    pub name: String,
}

impl Room {
    /// Create a room value
    pub fn new(id: RoomId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// The room shown before the user picks one
    pub fn welcome() -> Self {
        Self::new(WELCOME_ROOM_ID, WELCOME_ROOM_NAME)
    }
}

/// Insert payload for the `rooms` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewRoom {
    pub name: String,
}
