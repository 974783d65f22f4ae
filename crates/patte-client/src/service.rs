//! The login-scoped client facade.
//!
//! One `ChatService` per authenticated user owns the broker session, the
//! REST client, and all messaging state. Views read it through snapshot
//! methods and observe it through a broadcast event stream; a bridge task
//! routes inbound session events into the stores and out to the views.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use patte_net::{spawn_session, ApiClient, ApiError, Multiplexer, SessionEvent, SessionHandle};
use patte_shared::constants::{CHAT_MESSAGE_DESTINATION, CLIENT_EVENT_CAPACITY};
use patte_shared::protocol::{encode_body, ChatMessagePayload, OutgoingChatMessage, ReadEvent};
use patte_shared::types::{
    ConnectionState, Identity, Message, Notification, RoomId, RoomSummary, TopicKind, UserId,
};

use crate::config::ClientConfig;
use crate::conversation::ConversationStore;
use crate::directory::{DirectoryOutcome, RoomDirectory};
use crate::error::{ClientError, Result};
use crate::events::{emit_event, ClientEvent, UnreadCounts};
use crate::notifications::NotificationFeed;
use crate::receipts::{should_apply_receipt, should_publish_receipt};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A room currently open in a view. `subscribed` flips once `open_room`
/// has taken the room's topic leases, so `close_room` releases only leases
/// the open actually took.
struct OpenRoom {
    store: ConversationStore,
    subscribed: bool,
}

/// Mutable state behind the service lock. The lock is never held across an
/// `.await`.
struct ClientState {
    /// One entry per room currently open in a view. Presence in this map is
    /// what "open" means; `close_room` removes the entry and any in-flight
    /// history result for it is discarded on arrival.
    open_rooms: HashMap<RoomId, OpenRoom>,
    directory: RoomDirectory,
    feed: NotificationFeed,
    /// Message topics held for the directory's lifetime so previews and
    /// unread counters keep moving for rooms nobody has open.
    directory_topics: HashSet<String>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            open_rooms: HashMap::new(),
            directory: RoomDirectory::new(),
            feed: NotificationFeed::new(),
            directory_topics: HashSet::new(),
        }
    }

    fn unread_counts(&self) -> UnreadCounts {
        UnreadCounts {
            rooms: self.directory.total_unread(),
            notifications: self.feed.unread_count() as u32,
        }
    }
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// Shared messaging facade, `Arc`-cloned into every view and task.
pub struct ChatService {
    identity: Identity,
    api: ApiClient,
    session: SessionHandle,
    multiplexer: Multiplexer,
    state: Mutex<ClientState>,
    events_tx: broadcast::Sender<ClientEvent>,
}

impl ChatService {
    /// Build the service for an authenticated user and bring it online.
    ///
    /// Acquires the login-lifetime session lease (the notification feed and
    /// room directory listen for the whole session), subscribes the user's
    /// notification topic, loads the unread feed and the room directory from
    /// REST, and spawns the bridge task. REST failures here are logged and
    /// tolerated; the live stream still runs and `refresh_rooms` can be
    /// retried later.
    pub async fn start(
        config: &ClientConfig,
        identity: Identity,
    ) -> Result<(Arc<ChatService>, broadcast::Receiver<ClientEvent>)> {
        let api = ApiClient::new(&config.api_url, &identity.token)?;
        let (session, session_events) = spawn_session(config.session_config(&identity.token));
        let multiplexer = Multiplexer::new(session.clone());
        let (events_tx, events_rx) = broadcast::channel(CLIENT_EVENT_CAPACITY);

        let service = Arc::new(ChatService {
            identity,
            api,
            session,
            multiplexer,
            state: Mutex::new(ClientState::new()),
            events_tx,
        });

        service.session.acquire().await?;
        service
            .multiplexer
            .ensure_subscribed(&service.identity.user_id.notification_topic())
            .await?;

        // Feed first, then the bridge: frames that arrive while we fetch sit
        // in the session event channel and are deduplicated against the
        // fetched ids once the bridge drains them.
        match service.api.unread_notifications().await {
            Ok(notifications) => {
                let counts = {
                    let mut guard = service.state()?;
                    guard.feed.replace_unread(notifications);
                    guard.unread_counts()
                };
                service.emit(ClientEvent::UnreadChanged { counts });
            }
            Err(e) => warn!(error = %e, "Failed to fetch unread notifications"),
        }

        if let Err(e) = service.refresh_rooms().await {
            warn!(error = %e, "Initial room refresh failed");
        }

        tokio::spawn(bridge_task(service.clone(), session_events));

        Ok((service, events_rx))
    }

    /// Open a room: lease the session, fetch history over REST, install it,
    /// then join the room's live and read streams.
    ///
    /// A `403` maps to [`ClientError::RoomForbidden`] and is never retried.
    /// If the room was closed while the fetch was in flight the result is
    /// discarded and an empty snapshot returned.
    pub async fn open_room(&self, room_id: &RoomId) -> Result<Vec<Message>> {
        // Provisional lease, settled below: the open that creates the store
        // keeps it as the room's session lease, every other outcome gives
        // it back.
        self.session.acquire().await?;

        // The store's presence is what "open" means; inserting before the
        // fetch lets close_room cancel it. Opening an already-open room
        // only refreshes its history.
        let newly_opened = {
            let mut guard = self.state()?;
            if guard.open_rooms.contains_key(room_id) {
                false
            } else {
                guard.open_rooms.insert(
                    room_id.clone(),
                    OpenRoom {
                        store: ConversationStore::new(room_id.clone()),
                        subscribed: false,
                    },
                );
                true
            }
        };

        let history = match self.api.room_messages(room_id).await {
            Ok(history) => history,
            Err(e) => {
                // Undo the provisional open. If a racing close already
                // removed the store, that close also released the lease.
                let released_by_close = if newly_opened {
                    let mut guard = self.state()?;
                    guard.open_rooms.remove(room_id).is_none()
                } else {
                    false
                };
                if !released_by_close {
                    self.session.release().await?;
                }
                return Err(match e {
                    ApiError::Forbidden => ClientError::RoomForbidden {
                        room_id: room_id.clone(),
                    },
                    other => ClientError::Api(other),
                });
            }
        };

        let snapshot = {
            let mut guard = self.state()?;
            match guard.open_rooms.get_mut(room_id) {
                Some(room) => {
                    room.store.replace_history(history);
                    Some(room.store.messages().to_vec())
                }
                None => None,
            }
        };
        let Some(snapshot) = snapshot else {
            debug!(room = %room_id, "Room closed during history fetch, discarding result");
            if !newly_opened {
                self.session.release().await?;
            }
            return Ok(Vec::new());
        };

        if newly_opened {
            // History is installed before the live stream starts; any frame
            // racing this point deduplicates against the fetched ids.
            self.multiplexer
                .ensure_subscribed(&room_id.message_topic())
                .await?;
            self.multiplexer
                .ensure_subscribed(&room_id.read_topic())
                .await?;

            // A close that raced these subscribes skipped the topic
            // releases (the flag was still off), so undo them here.
            let still_open = {
                let mut guard = self.state()?;
                match guard.open_rooms.get_mut(room_id) {
                    Some(room) => {
                        room.subscribed = true;
                        true
                    }
                    None => false,
                }
            };
            if !still_open {
                debug!(room = %room_id, "Room closed during subscribe, rolling back");
                self.multiplexer.release(&room_id.message_topic()).await?;
                self.multiplexer.release(&room_id.read_topic()).await?;
                return Ok(Vec::new());
            }
        } else {
            self.session.release().await?;
        }

        let (cleared, counts) = {
            let mut guard = self.state()?;
            let cleared = guard.directory.clear_unread(room_id);
            (cleared, guard.unread_counts())
        };
        if cleared {
            self.emit(ClientEvent::UnreadChanged { counts });
        }

        Ok(snapshot)
    }

    /// Close a room: drop its store and give back the leases taken by
    /// [`ChatService::open_room`]. Closing a room that is not open is a
    /// logged no-op.
    pub async fn close_room(&self, room_id: &RoomId) -> Result<()> {
        let open = {
            let mut guard = self.state()?;
            guard.open_rooms.remove(room_id)
        };
        let Some(room) = open else {
            warn!(room = %room_id, "close_room for a room that is not open");
            return Ok(());
        };

        // An open still mid-flight has not taken the topic leases yet; it
        // rolls back its own subscribes when it finds the entry gone.
        if room.subscribed {
            self.multiplexer.release(&room_id.message_topic()).await?;
            self.multiplexer.release(&room_id.read_topic()).await?;
        }
        self.session.release().await?;
        Ok(())
    }

    /// Publish a chat message. The broker assigns the id and timestamp and
    /// echoes the message back on the room topic, which is where the local
    /// store picks it up. Best-effort while disconnected.
    pub async fn send_message(&self, room_id: &RoomId, content: &str) -> Result<()> {
        let outgoing = OutgoingChatMessage {
            room_id: room_id.clone(),
            content: content.to_string(),
            sender_id: self.identity.user_id.clone(),
            sender_name: self.identity.nickname.clone(),
        };
        let body = encode_body(&outgoing)?;
        self.session.publish(CHAT_MESSAGE_DESTINATION, body).await?;
        Ok(())
    }

    /// Reload the room directory from REST and join the message stream of
    /// any newly listed room. Returns the directory's ordering, newest
    /// activity first, not the wire order.
    pub async fn refresh_rooms(&self) -> Result<Vec<RoomSummary>> {
        let listing = self.api.chat_rooms().await?;

        let (rooms, counts, new_topics) = {
            let mut guard = self.state()?;
            guard.directory.replace(listing.clone());
            let mut new_topics = Vec::new();
            for room in &listing {
                let topic = room.room_id.message_topic();
                if guard.directory_topics.insert(topic.clone()) {
                    new_topics.push(topic);
                }
            }
            (guard.directory.rooms().to_vec(), guard.unread_counts(), new_topics)
        };

        for topic in &new_topics {
            self.multiplexer.ensure_subscribed(topic).await?;
        }

        self.emit(ClientEvent::RoomListUpdated {
            rooms: rooms.clone(),
        });
        self.emit(ClientEvent::UnreadChanged { counts });
        Ok(rooms)
    }

    /// Flip one notification to read locally, then persist over REST.
    /// The local flip is kept even when the REST call fails.
    pub async fn mark_notification_read(&self, noty_id: &str) -> Result<()> {
        let counts = {
            let mut guard = self.state()?;
            if !guard.feed.mark_read(noty_id) {
                return Ok(());
            }
            guard.unread_counts()
        };
        self.emit(ClientEvent::UnreadChanged { counts });

        if let Err(e) = self.api.mark_notification_read(noty_id).await {
            warn!(noty = %noty_id, error = %e, "Failed to persist notification read state");
        }
        Ok(())
    }

    /// Flip every notification to read locally, then persist over REST.
    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        let counts = {
            let mut guard = self.state()?;
            if guard.feed.mark_all_read() == 0 {
                return Ok(());
            }
            guard.unread_counts()
        };
        self.emit(ClientEvent::UnreadChanged { counts });

        if let Err(e) = self.api.mark_all_notifications_read().await {
            warn!(error = %e, "Failed to persist notification read state");
        }
        Ok(())
    }

    /// Tear the session down: release every lease this service holds and
    /// stop the session task. The service is unusable afterwards.
    pub async fn logout(&self) -> Result<()> {
        let (open, directory_topics) = {
            let mut guard = self.state()?;
            let open: Vec<(RoomId, bool)> = guard
                .open_rooms
                .drain()
                .map(|(id, room)| (id, room.subscribed))
                .collect();
            let topics: Vec<String> = guard.directory_topics.drain().collect();
            guard.directory.replace(Vec::new());
            guard.feed.clear();
            (open, topics)
        };

        for (room_id, subscribed) in &open {
            if *subscribed {
                self.multiplexer.release(&room_id.message_topic()).await?;
                self.multiplexer.release(&room_id.read_topic()).await?;
            }
            self.session.release().await?;
        }
        for topic in &directory_topics {
            self.multiplexer.release(topic).await?;
        }
        self.multiplexer
            .release(&self.identity.user_id.notification_topic())
            .await?;
        self.session.release().await?;

        self.session.shutdown().await?;
        Ok(())
    }

    /// Room directory snapshot, sorted by last activity, newest first.
    pub fn room_list(&self) -> Result<Vec<RoomSummary>> {
        Ok(self.state()?.directory.rooms().to_vec())
    }

    /// Notification feed snapshot, newest first.
    pub fn notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.state()?.feed.notifications().to_vec())
    }

    /// Current unread badge counters.
    pub fn unread_counts(&self) -> Result<UnreadCounts> {
        Ok(self.state()?.unread_counts())
    }

    /// Current broker connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    /// A fresh receiver on the client event stream. Every view gets every
    /// event and filters by room id itself.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events_tx.subscribe()
    }

    fn state(&self) -> Result<MutexGuard<'_, ClientState>> {
        self.state.lock().map_err(|_| ClientError::StatePoisoned)
    }

    fn emit(&self, event: ClientEvent) {
        emit_event(&self.events_tx, event);
    }
}

// ---------------------------------------------------------------------------
// Bridge task
// ---------------------------------------------------------------------------

/// Drain session events into the stores and out to the views.
async fn bridge_task(service: Arc<ChatService>, mut events: mpsc::Receiver<SessionEvent>) {
    info!("Session bridge started");

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::StateChanged(state) => {
                service.emit(ClientEvent::ConnectionChanged { state });
            }
            SessionEvent::Frame { topic, body } => {
                handle_frame(&service, &topic, body).await;
            }
        }
    }

    info!("Session bridge stopped");
}

async fn handle_frame(service: &ChatService, topic: &str, body: Value) {
    match TopicKind::parse(topic) {
        Some(TopicKind::RoomMessages(room_id)) => {
            handle_room_message(service, &room_id, body).await;
        }
        Some(TopicKind::RoomRead(room_id)) => handle_read_event(service, &room_id, body),
        Some(TopicKind::Notifications(user_id)) => handle_notification(service, &user_id, body),
        None => {
            debug!(topic = %topic, "Ignoring frame on unrecognized topic");
        }
    }
}

/// Apply a live chat message: append it to the open store (if any), bump
/// the directory, and acknowledge peer messages on open rooms with a read
/// receipt.
async fn handle_room_message(service: &ChatService, room_id: &RoomId, body: Value) {
    let payload: ChatMessagePayload = match serde_json::from_value(body) {
        Ok(p) => p,
        Err(e) => {
            warn!(room = %room_id, error = %e, "Undecodable chat message frame");
            return;
        }
    };
    if payload.room_id != *room_id {
        warn!(
            topic_room = %room_id,
            payload_room = %payload.room_id,
            "Chat frame room id does not match its topic"
        );
        return;
    }

    let message = payload.into_message();
    let sender = message.sender_id.clone();

    let (room_open, appended, outcome, counts_changed, counts) = {
        let mut guard = match service.state() {
            Ok(g) => g,
            Err(_) => return,
        };
        let before = guard.unread_counts();
        let (room_open, appended) = match guard.open_rooms.get_mut(room_id) {
            Some(room) => (true, room.store.append_live(message.clone())),
            None => (false, false),
        };
        let outcome = guard
            .directory
            .on_incoming_message(&service.identity.user_id, room_id, &message);
        let after = guard.unread_counts();
        (room_open, appended, outcome, after != before, after)
    };

    if appended && should_publish_receipt(&service.identity.user_id, &sender, room_open) {
        publish_read_receipt(service, room_id).await;
    }

    if appended {
        service.emit(ClientEvent::MessageReceived {
            room_id: room_id.clone(),
            message,
        });
    }

    match outcome {
        DirectoryOutcome::Bumped => {
            let rooms = match service.state() {
                Ok(guard) => guard.directory.rooms().to_vec(),
                Err(_) => return,
            };
            service.emit(ClientEvent::RoomListUpdated { rooms });
            if counts_changed {
                service.emit(ClientEvent::UnreadChanged { counts });
            }
        }
        DirectoryOutcome::UnknownRoom => {
            info!(room = %room_id, "Message for an unlisted room, refreshing the directory");
            if let Err(e) = service.refresh_rooms().await {
                warn!(error = %e, "Directory refresh after unlisted-room message failed");
            }
        }
    }
}

/// Tell the peer their messages in an open room were seen.
async fn publish_read_receipt(service: &ChatService, room_id: &RoomId) {
    let receipt = ReadEvent {
        room_id: room_id.clone(),
        user_id: service.identity.user_id.clone(),
    };
    let body = match encode_body(&receipt) {
        Ok(body) => body,
        Err(e) => {
            warn!(room = %room_id, error = %e, "Failed to encode read receipt");
            return;
        }
    };
    if let Err(e) = service
        .session
        .publish(&room_id.read_destination(), body)
        .await
    {
        warn!(room = %room_id, error = %e, "Failed to publish read receipt");
    }
}

/// Apply a peer's read receipt to the room's own sent messages.
fn handle_read_event(service: &ChatService, room_id: &RoomId, body: Value) {
    let receipt: ReadEvent = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            warn!(room = %room_id, error = %e, "Undecodable read receipt frame");
            return;
        }
    };
    if receipt.room_id != *room_id {
        warn!(
            topic_room = %room_id,
            payload_room = %receipt.room_id,
            "Read receipt room id does not match its topic"
        );
        return;
    }
    if !should_apply_receipt(&service.identity.user_id, &receipt.user_id) {
        debug!(room = %room_id, "Ignoring the echo of our own read receipt");
        return;
    }

    let flipped = {
        let mut guard = match service.state() {
            Ok(g) => g,
            Err(_) => return,
        };
        match guard.open_rooms.get_mut(room_id) {
            Some(room) => room.store.mark_sent_as_read(&service.identity.user_id),
            None => 0,
        }
    };
    if flipped > 0 {
        service.emit(ClientEvent::MessagesRead {
            room_id: room_id.clone(),
        });
    }
}

/// Apply a live notification push. Replay duplicates are dropped so the
/// toast fires at most once per notification.
fn handle_notification(service: &ChatService, user_id: &UserId, body: Value) {
    if *user_id != service.identity.user_id {
        warn!(topic_user = %user_id, "Notification frame addressed to another user");
        return;
    }
    let notification: Notification = match serde_json::from_value(body) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Undecodable notification frame");
            return;
        }
    };

    let (fresh, counts) = {
        let mut guard = match service.state() {
            Ok(g) => g,
            Err(_) => return,
        };
        let fresh = guard.feed.push_live(notification.clone());
        (fresh, guard.unread_counts())
    };
    if fresh {
        service.emit(ClientEvent::NotificationArrived { notification });
        service.emit(ClientEvent::UnreadChanged { counts });
    } else {
        debug!(noty = %notification.noty_id, "Duplicate notification dropped");
    }
}
