//! Messaging Module
//!
//! This module contains the data structures for rooms and their messages:
//!
//! - `Room` - A named channel partitioning messages
//! - `Message` - A message posted in a room
//! - `NewRoom` / `NewMessage` - Insert payloads sent to the data API
//!
//! # Usage
//!
//! ```rust
//! use talk::shared::messaging::{Message, Room};
//! ```

pub mod message;
pub mod room;

// Re-export all types
pub use message::{Message, MessageId, NewMessage};
pub use room::{NewRoom, Room, RoomId};
