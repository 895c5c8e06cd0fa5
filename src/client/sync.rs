//! Message Synchronizer
//!
//! Keeps a local, ordered copy of the selected room's messages: one bulk fetch,
//! then inserts pushed by the realtime feed.
//!
//! ```text
//!            select(room)                fetch + subscribe ok
//!   Idle ------------------> Loading --------------------------> Live
//!    ^                          |                                 |  \
//!    |        deselect          | fetch/subscribe failed          |   \ feed event
//!    +--------------------------+-------------> Error <-----------+    \ (own room only)
//!    |                                             |   feed lost        +--> Live
//!    +---------------------------------------------+
//!                         select(other room) closes the feed first
//! ```
//!
//! Rules the cache keeps:
//!
//! - It only ever holds messages whose `room_id` is the active room. Feed events
//!   are checked against the room active when they are applied, so a late event
//!   for an abandoned room is dropped.
//! - Message ids are unique. Both the fetch result and feed inserts are
//!   deduplicated by id, which absorbs repeated feed delivery and rows that show
//!   up in the fetch and again on the feed.
//! - Feed inserts are appended; arrival order within a room is trusted.
//!
//! The feed is opened after the fetch completes. Rows inserted between the two
//! are not seen until the next load of the room.
//!
//! At most one feed is open per synchronizer: the old one is closed before a new
//! load starts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::notify::Notifier;
use super::session::{SessionSnapshot, SessionStore};
use crate::remote::{Backend, FeedEvent, FeedSubscription};
use crate::shared::{Message, MessageId, Result, RoomId, TalkError};

/// Where the synchronizer is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// No room selected
    Idle,
    /// Initial fetch in flight
    Loading { room_id: RoomId },
    /// Cache populated, feed open
    Live { room_id: RoomId },
    /// Load failed or the feed was lost
    Error { room_id: RoomId, message: String },
}

impl SyncState {
    /// Room this state is about
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            SyncState::Idle => None,
            SyncState::Loading { room_id }
            | SyncState::Live { room_id }
            | SyncState::Error { room_id, .. } => Some(*room_id),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SyncState::Live { .. })
    }
}

/// Ordered, id-unique messages of one room
#[derive(Debug, Clone, Default)]
pub struct MessageCache {
    room_id: Option<RoomId>,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageCache {
    pub fn room_id(&self) -> Option<RoomId> {
        self.room_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replace the contents with a fetch result for `room_id`.
    ///
    /// Rows of other rooms and repeated ids are dropped; the rest keep their order.
    pub fn replace(&mut self, room_id: RoomId, messages: Vec<Message>) {
        self.clear();
        self.room_id = Some(room_id);
        for message in messages {
            self.insert(message);
        }
    }

    /// Append a message if it belongs to this cache's room and is new.
    /// Returns whether it was added.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.room_id != Some(message.room_id) {
            return false;
        }
        if !self.ids.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Drop everything, including the room scope
    pub fn clear(&mut self) {
        self.room_id = None;
        self.messages.clear();
        self.ids.clear();
    }
}

/// What front-ends render: the state plus the cached messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncView {
    pub state: SyncState,
    pub room_id: Option<RoomId>,
    pub messages: Vec<Message>,
}

impl Default for SyncView {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            room_id: None,
            messages: Vec::new(),
        }
    }
}

/// The synchronizer itself.
///
/// Drive it by hand with [`select_room`](Self::select_room) and
/// [`apply_event`](Self::apply_event), or hand it to [`spawn`](Self::spawn) to
/// follow a [`SessionStore`].
pub struct MessageSynchronizer {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    fetch_timeout: Duration,
    state: SyncState,
    cache: MessageCache,
    feed: Option<FeedSubscription>,
    view: watch::Sender<SyncView>,
}

impl MessageSynchronizer {
    pub fn new(backend: Arc<dyn Backend>, notifier: Notifier, fetch_timeout: Duration) -> Self {
        Self {
            backend,
            notifier,
            fetch_timeout,
            state: SyncState::Idle,
            cache: MessageCache::default(),
            feed: None,
            view: watch::Sender::new(SyncView::default()),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.cache.messages()
    }

    /// Watch the state and messages
    pub fn view(&self) -> watch::Receiver<SyncView> {
        self.view.subscribe()
    }

    /// Switch to `room` (or to no room) and wait for the load to finish.
    ///
    /// Selecting the room that is already loading or live does nothing; selecting
    /// it again after an error retries.
    pub async fn select_room(&mut self, room: Option<RoomId>) {
        if let Some(room_id) = self.prepare(room).await {
            let result = load_room(Arc::clone(&self.backend), room_id, self.fetch_timeout).await;
            self.finish_load(room_id, result);
        }
    }

    /// Apply one feed event
    pub fn apply_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Insert(message) => match self.state {
                SyncState::Live { room_id } if message.room_id == room_id => {
                    let id = message.id;
                    if self.cache.insert(message) {
                        tracing::debug!("Message {} added to room {}", id, room_id);
                        self.publish();
                    } else {
                        tracing::debug!("Duplicate message {} ignored", id);
                    }
                }
                SyncState::Live { room_id } => {
                    tracing::trace!(
                        "Discarding message {} for room {} (active room {})",
                        message.id,
                        message.room_id,
                        room_id
                    );
                }
                _ => {
                    tracing::warn!(
                        "Discarding message {} received while {:?}",
                        message.id,
                        self.state
                    );
                }
            },
            FeedEvent::Closed { reason } => {
                if let SyncState::Live { room_id } = self.state {
                    tracing::warn!("Feed for room {} lost: {}", room_id, reason);
                    // The reader task is already gone
                    self.feed = None;
                    self.set_state(SyncState::Error {
                        room_id,
                        message: reason,
                    });
                }
            }
        }
    }

    /// Wait for the next feed event and apply it. Returns `false` when no feed
    /// is open.
    pub async fn process_next_event(&mut self) -> bool {
        if self.feed.is_none() {
            return false;
        }
        let event = next_feed_event(&mut self.feed).await;
        self.apply_event(event);
        true
    }

    /// Release the feed and drop the cache. Must be called on teardown.
    pub async fn close(&mut self) {
        self.release().await;
        if self.state != SyncState::Idle {
            self.set_state(SyncState::Idle);
        }
    }

    /// Run in the background, following the session's current room
    pub fn spawn(self, session: &SessionStore) -> SyncHandle {
        let view = self.view();
        let rooms = session.subscribe();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(rooms, shutdown_rx));
        SyncHandle {
            view,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(
        mut self,
        mut rooms: watch::Receiver<SessionSnapshot>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut selection = Some(selected_room(&rooms.borrow_and_update()));

        loop {
            if let Some(room) = selection.take() {
                if let Some(room_id) = self.prepare(room).await {
                    match self.drive_load(room_id, &mut rooms, &mut shutdown).await {
                        LoadOutcome::Done(result) => self.finish_load(room_id, result),
                        LoadOutcome::Superseded(next) => {
                            tracing::info!("Room changed while loading room {}, fetch abandoned", room_id);
                            selection = Some(next);
                            continue;
                        }
                        LoadOutcome::Stop => break,
                    }
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                changed = rooms.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    selection = Some(selected_room(&rooms.borrow_and_update()));
                }
                event = next_feed_event(&mut self.feed) => self.apply_event(event),
            }
        }

        self.close().await;
        tracing::debug!("Synchronizer stopped");
    }

    /// Await a load while watching for a room change or shutdown
    async fn drive_load(
        &self,
        room_id: RoomId,
        rooms: &mut watch::Receiver<SessionSnapshot>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> LoadOutcome {
        let load = load_room(Arc::clone(&self.backend), room_id, self.fetch_timeout);
        tokio::pin!(load);

        loop {
            tokio::select! {
                result = &mut load => return LoadOutcome::Done(result),
                _ = &mut *shutdown => return LoadOutcome::Stop,
                changed = rooms.changed() => {
                    if changed.is_err() {
                        return LoadOutcome::Stop;
                    }
                    let next = selected_room(&rooms.borrow_and_update());
                    if next != Some(room_id) {
                        return LoadOutcome::Superseded(next);
                    }
                }
            }
        }
    }

    /// Leave the current room if `room` differs from it. Returns the room whose
    /// load must start, if any.
    async fn prepare(&mut self, room: Option<RoomId>) -> Option<RoomId> {
        match (room, &self.state) {
            (None, SyncState::Idle) => return None,
            (Some(id), SyncState::Loading { room_id } | SyncState::Live { room_id })
                if *room_id == id =>
            {
                return None;
            }
            _ => {}
        }

        self.release().await;
        match room {
            None => {
                self.set_state(SyncState::Idle);
                None
            }
            Some(room_id) => {
                self.set_state(SyncState::Loading { room_id });
                Some(room_id)
            }
        }
    }

    fn finish_load(&mut self, room_id: RoomId, result: Result<(Vec<Message>, FeedSubscription)>) {
        match result {
            Ok((messages, feed)) => {
                self.cache.replace(room_id, messages);
                self.feed = Some(feed);
                self.set_state(SyncState::Live { room_id });
            }
            Err(e) => {
                tracing::error!("Failed to load room {}: {}", room_id, e);
                self.notifier
                    .error(format!("Erreur de chargement des messages: {}", e));
                self.set_state(SyncState::Error {
                    room_id,
                    message: e.to_string(),
                });
            }
        }
    }

    /// Close the open feed, if any, and empty the cache
    async fn release(&mut self) {
        if let Some(feed) = self.feed.take() {
            tracing::debug!("Closing feed for room {:?}", self.state.room_id());
            feed.close().await;
        }
        self.cache.clear();
    }

    fn set_state(&mut self, state: SyncState) {
        tracing::info!("Synchronizer: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(SyncView {
            state: self.state.clone(),
            room_id: self.cache.room_id(),
            messages: self.cache.messages().to_vec(),
        });
    }
}

impl std::fmt::Debug for MessageSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSynchronizer")
            .field("state", &self.state)
            .field("cached", &self.cache.len())
            .field("feed_open", &self.feed.is_some())
            .finish_non_exhaustive()
    }
}

enum LoadOutcome {
    Done(Result<(Vec<Message>, FeedSubscription)>),
    Superseded(Option<RoomId>),
    Stop,
}

/// Fetch a room's messages within `timeout`, then open the feed
async fn load_room(
    backend: Arc<dyn Backend>,
    room_id: RoomId,
    timeout: Duration,
) -> Result<(Vec<Message>, FeedSubscription)> {
    let messages = tokio::time::timeout(timeout, backend.list_messages(room_id))
        .await
        .map_err(|_| TalkError::timeout("message fetch", timeout))??;
    tracing::debug!("Fetched {} messages for room {}", messages.len(), room_id);

    let feed = backend.subscribe_message_inserts().await?;
    Ok((messages, feed))
}

/// Next event of the open feed; never resolves without one. A feed that ends
/// without saying why reads as closed.
async fn next_feed_event(feed: &mut Option<FeedSubscription>) -> FeedEvent {
    match feed {
        Some(feed) => feed.recv().await.unwrap_or_else(|| FeedEvent::Closed {
            reason: "feed ended".to_string(),
        }),
        None => std::future::pending().await,
    }
}

fn selected_room(snapshot: &SessionSnapshot) -> Option<RoomId> {
    snapshot.current_room.as_ref().map(|room| room.id)
}

/// Handle on a spawned synchronizer
#[derive(Debug)]
pub struct SyncHandle {
    view: watch::Receiver<SyncView>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Watch the state and messages
    pub fn view(&self) -> watch::Receiver<SyncView> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> SyncView {
        self.view.borrow().clone()
    }

    /// Stop the synchronizer, closing its feed, and wait for it
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("Synchronizer task failed: {}", e);
        }
    }
}
