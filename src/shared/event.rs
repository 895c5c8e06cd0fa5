/**
 * UI Event System
 *
 * Events the client core emits for whatever front-end is attached: transient
 * notifications (toasts) and navigation requests.
 */
use serde::{Deserialize, Serialize};

/// Screens a front-end can show
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppView {
    /// Sign-in / sign-up / forgotten password
    Auth,
    /// The current room's conversation
    ChatRoom,
    /// All rooms
    RoomList,
    /// Room creation form
    CreateRoom,
    /// New password form reached from a recovery link
    ResetPassword,
}

/// Severity of a toast
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Success,
    Error,
}

/// Event pushed to the front-end
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Transient notification
    Toast { level: ToastLevel, message: String },
    /// Request to show another screen
    Navigate { view: AppView },
}

impl UiEvent {
    /// Create a success toast
    pub fn success(message: impl Into<String>) -> Self {
        Self::Toast {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    /// Create an error toast
    pub fn error(message: impl Into<String>) -> Self {
        Self::Toast {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }

    /// Create a navigation request
    pub fn navigate(view: AppView) -> Self {
        Self::Navigate { view }
    }
}
