//! Shared Module
//!
//! This module contains the types shared by the remote backend implementation and
//! the client core: rows exchanged with the data API, auth sessions, UI events,
//! configuration and the crate error type.
//!
//! # Overview
//!
//! All types here are plain data. None of them perform I/O.

/// Room and message rows
pub mod messaging;

/// Identity, session and auth-state change types
pub mod auth;

/// UI events (toasts, navigation)
pub mod event;

/// Crate error type
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use auth::{AuthChangeEvent, AuthStateChange, AuthUser, Identity, Session};
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::{Result, TalkError};
pub use event::{AppView, ToastLevel, UiEvent};
pub use messaging::{Message, MessageId, NewMessage, NewRoom, Room, RoomId};
