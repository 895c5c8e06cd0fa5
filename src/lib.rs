//! Talk - Main Library
//!
//! Talk is a small real-time chat client. Authentication, room and message storage
//! and real-time delivery are provided by a hosted Supabase project; this library
//! holds the client-side state and keeps the selected room's messages in sync.
//!
//! # Module Structure
//!
//! The library is organized into three modules:
//!
//! - **`shared`** - Plain data shared by everything else
//!   - Room and message rows, auth sessions, UI events
//!   - Configuration
//!   - Error types
//!
//! - **`remote`** - The hosted backend
//!   - `AuthApi`, `DataApi` and `RealtimeApi` contracts
//!   - `SupabaseClient`: GoTrue, PostgREST and the Phoenix realtime socket
//!
//! - **`client`** - The client core
//!   - `SessionStore` (identity and current room)
//!   - `AuthGateway`, `RoomDirectory`, `MessageComposer`
//!   - `MessageSynchronizer`, the per-room message cache state machine
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use talk::client::ChatContext;
//! use talk::remote::supabase::SupabaseClient;
//! use talk::shared::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! let context = ChatContext::new(&config, Arc::new(SupabaseClient::new(config.clone())));
//!
//! let listener = context.auth().listen().await;
//! let sync = context.spawn_synchronizer();
//!
//! let mut view = sync.view();
//! view.changed().await?;
//! println!("{} messages", view.borrow().messages.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Synchronization
//!
//! The synchronizer fetches a room's history once, then appends the inserts pushed
//! by the realtime feed. The feed is not filtered by room on the server, so every
//! event is checked against the room that is current when it is applied. Switching
//! rooms closes the previous feed before the next one opens.
//!
//! # Thread Safety
//!
//! - The backend is shared as `Arc<dyn Backend>`
//! - `SessionStore` and the synchronizer view are `watch` channels
//! - Toasts, navigation and auth changes fan out over `broadcast` channels
//!
//! # Error Handling
//!
//! Every fallible operation returns `shared::Result<T>` with a `TalkError`. Remote
//! messages are kept verbatim so they can be shown to the user.

/// Shared types and data structures
pub mod shared;

/// Remote backend contracts and the Supabase client
pub mod remote;

/// Client core services
pub mod client;
