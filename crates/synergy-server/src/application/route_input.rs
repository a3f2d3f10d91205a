//! RouteInputUseCase: the active-screen state machine.
//!
//! The [`Router`] is the heart of the server.  It owns the screen graph, the
//! registry of connected secondaries, the active screen and the clipboard
//! owners, and it decides where every piece of primary input goes.
//!
//! # Architecture
//!
//! The router runs as a single task fed by one channel of [`RouterEvent`]s:
//! primary input, client records, connects and disconnects, admin requests.
//! Because only that task touches the state, transitions are serialised
//! without a lock, and sessions never wait on each other: they only enqueue.
//!
//! The router depends only on two traits, [`PrimaryScreen`] and
//! [`ScreenTransmitter`], injected at construction time, so it is fully
//! unit-testable.
//!
//! # Switching screens
//!
//! [`Router::switch_screen`] performs, in order:
//!
//! 1. `leave` on the old screen.  For a secondary this is a *flushed* send:
//!    the router waits (at most [`LEAVE_FLUSH_TIMEOUT`]) until the session
//!    has written `COUT` to its socket.
//! 2. A `DKDN` for every modifier physically held on the primary, so the new
//!    screen's shadow state matches the keyboard.
//! 3. `CINN` with a fresh sequence number and the primary modifier mask.
//! 4. The new active screen and cursor position are recorded.
//!
//! Returning to the primary shows and warps the real cursor instead, then
//! pulls any clipboard a secondary owns.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use synergy_core::keymap::keysym::{key_id_to_keysym, modifier_for_keysym};
use synergy_core::keymap::{ButtonId, KeyAction, KeyButton};
use synergy_core::protocol::{Message, ScreenInfo, SequenceCounter};
use synergy_core::{Clipboard, ClipboardId, Edge, GraphError, KeyId, ModifierMask, ScreenGraph, ScreenShape};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::application::manage_clients::{ConnectionState, RegistryError, ScreenRegistry};
use crate::application::status::{ClipboardStatus, CursorStatus, ScreenStatus, StatusSnapshot};
use crate::application::update_layout::{apply_edit, LayoutEdit, ScreenOptions};
use crate::infrastructure::primary_screen::{KeyEvent, PrimaryEvent, PrimaryScreen};

/// Upper bound on waiting for `COUT` to reach the old screen's socket.
pub const LEAVE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Error type for the route-input use case.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("failed to send to {screen}: {reason}")]
    Transmit { screen: String, reason: String },
}

/// Trait for sending records to connected secondaries.
///
/// The infrastructure implementation queues onto each session's writer
/// task; test implementations record calls.
#[async_trait]
pub trait ScreenTransmitter: Send + Sync {
    /// Queues `message` for `screen`.
    async fn send(&self, screen: &str, message: Message) -> Result<(), String>;

    /// Queues `message` and waits until it has been written to the socket,
    /// or until `timeout` elapses.
    async fn send_flushed(
        &self,
        screen: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<(), String>;
}

/// Everything that can happen to the router.
#[derive(Debug)]
pub enum RouterEvent {
    Primary(PrimaryEvent),
    /// A client finished the greeting and claims `name`.
    Connected {
        name: String,
        connection_id: Uuid,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    /// A record arrived from a registered client.
    Message {
        name: String,
        connection_id: Uuid,
        message: Message,
    },
    Disconnected {
        name: String,
        connection_id: Uuid,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    EditLayout {
        edit: LayoutEdit,
        reply: oneshot::Sender<Result<(), GraphError>>,
    },
}

/// Static router settings taken from the configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterSettings {
    /// Pixels from a primary edge that count as "at the edge".
    pub switch_zone: i32,
    /// Options sent to each screen after its handshake.
    pub options: HashMap<String, ScreenOptions>,
}

/// Who owns one clipboard and what is known about its contents.
#[derive(Debug, Clone)]
struct ClipboardSlot {
    owner: String,
    seq: u32,
    /// Marshalled contents fetched from a secondary owner.
    data: Option<Vec<u8>>,
    /// The contents should be installed on the primary when they arrive.
    pull_home: bool,
}

/// The Route Input use case.
pub struct Router {
    graph: ScreenGraph,
    registry: ScreenRegistry,
    settings: RouterSettings,
    primary: Arc<dyn PrimaryScreen>,
    transmitter: Arc<dyn ScreenTransmitter>,
    primary_shape: ScreenShape,
    active: String,
    cursor: (i32, i32),
    sequence: SequenceCounter,
    /// Sequence number of the last `CINN` sent.
    enter_seq: u32,
    mask: ModifierMask,
    /// Keys physically held on the primary, by native keycode.
    held_keys: BTreeMap<KeyButton, KeyId>,
    buttons_down: BTreeSet<ButtonId>,
    clipboards: Vec<ClipboardSlot>,
    /// Secondaries waiting for `DCLP` after a `QCLP`.
    pending_requests: Vec<(String, ClipboardId)>,
    screensaver: bool,
}

impl Router {
    /// Creates a router with the cursor at the centre of the primary.
    pub fn new(
        graph: ScreenGraph,
        settings: RouterSettings,
        primary: Arc<dyn PrimaryScreen>,
        transmitter: Arc<dyn ScreenTransmitter>,
    ) -> Self {
        let primary_shape = primary.shape();
        let mask = primary.toggle_mask();
        let primary_name = graph.primary().to_string();
        let clipboards = ClipboardId::all()
            .iter()
            .map(|_| ClipboardSlot {
                owner: primary_name.clone(),
                seq: 0,
                data: None,
                pull_home: false,
            })
            .collect();
        Self {
            graph,
            registry: ScreenRegistry::new(),
            settings,
            primary,
            transmitter,
            primary_shape,
            cursor: primary_shape.center(),
            active: primary_name,
            sequence: SequenceCounter::new(),
            enter_seq: 0,
            mask,
            held_keys: BTreeMap::new(),
            buttons_down: BTreeSet::new(),
            clipboards,
            pending_requests: Vec::new(),
            screensaver: false,
        }
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    pub fn graph(&self) -> &ScreenGraph {
        &self.graph
    }

    pub fn registry(&self) -> &ScreenRegistry {
        &self.registry
    }

    /// Current owner of clipboard `id`.
    pub fn clipboard_owner(&self, id: ClipboardId) -> Option<&str> {
        self.clipboards.get(id.index()).map(|s| s.owner.as_str())
    }

    fn on_primary(&self) -> bool {
        self.active == self.graph.primary()
    }

    /// Processes events until the channel closes or `shutdown` flips to
    /// `true`, then brings the cursor home.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<RouterEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self.handle_event(event).await {
                        warn!("{e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.return_home().await;
        info!("router stopped");
    }

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Transmit`] if a record could not be queued for
    /// the screen it was meant for.  The router state is consistent either
    /// way; the failing session is dropped by its own disconnect.
    pub async fn handle_event(&mut self, event: RouterEvent) -> Result<(), RouteError> {
        match event {
            RouterEvent::Primary(event) => self.handle_primary(event).await,
            RouterEvent::Connected {
                name,
                connection_id,
                reply,
            } => {
                let result = self.registry.register(&self.graph, &name, connection_id);
                match &result {
                    Ok(()) => info!("screen {name} connecting ({connection_id})"),
                    Err(e) => info!("rejecting client {name}: {e}"),
                }
                let _ = reply.send(result);
                Ok(())
            }
            RouterEvent::Message {
                name,
                connection_id,
                message,
            } => {
                if !self.registry.is_current(&name, connection_id) {
                    trace!("dropping record from stale connection {connection_id}");
                    return Ok(());
                }
                self.registry.touch(&name);
                self.handle_client(&name, message).await
            }
            RouterEvent::Disconnected {
                name,
                connection_id,
            } => {
                self.handle_disconnect(&name, connection_id).await;
                Ok(())
            }
            RouterEvent::Status { reply } => {
                let _ = reply.send(self.status());
                Ok(())
            }
            RouterEvent::EditLayout { edit, reply } => {
                let result = apply_edit(&mut self.graph, &edit).map(|_| ());
                match &result {
                    Ok(()) => info!("layout edited: {edit:?}"),
                    Err(e) => debug!("layout edit rejected: {e}"),
                }
                let _ = reply.send(result);
                Ok(())
            }
        }
    }

    // ── Primary input ─────────────────────────────────────────────────────────

    /// Handles input reported by the primary screen driver.
    pub async fn handle_primary(&mut self, event: PrimaryEvent) -> Result<(), RouteError> {
        match event {
            PrimaryEvent::PointerMove { x, y } => self.handle_pointer_move(x, y).await,
            PrimaryEvent::PointerDelta { dx, dy } => self.handle_pointer_delta(dx, dy).await,
            PrimaryEvent::Button { button, down } => {
                if down {
                    self.buttons_down.insert(button);
                } else {
                    self.buttons_down.remove(&button);
                }
                let message = if down {
                    Message::MouseDown { button }
                } else {
                    Message::MouseUp { button }
                };
                self.send_to_active(message).await
            }
            PrimaryEvent::Wheel { delta } => {
                self.send_to_active(Message::MouseWheel { delta }).await
            }
            PrimaryEvent::Key(key) => self.handle_key(key).await,
            PrimaryEvent::Screensaver { active } => self.handle_screensaver(active).await,
            PrimaryEvent::ClipboardGrab { id } => self.handle_primary_grab(id).await,
        }
    }

    async fn handle_pointer_move(&mut self, x: i32, y: i32) -> Result<(), RouteError> {
        if !self.on_primary() {
            trace!("absolute motion while away ignored");
            return Ok(());
        }
        self.cursor = (x, y);
        if self.locked_to_screen() {
            return Ok(());
        }
        match self.primary_shape.edge_at(x, y, self.settings.switch_zone) {
            Some(edge) => self.cross(edge, x, y).await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn handle_pointer_delta(&mut self, dx: i32, dy: i32) -> Result<(), RouteError> {
        if self.on_primary() {
            trace!("relative motion at home ignored");
            return Ok(());
        }
        let Some(shape) = self.shape_of(&self.active) else {
            return Ok(());
        };
        let (x, y) = (self.cursor.0 + dx, self.cursor.1 + dy);

        if let Some(edge) = shape.crossed_edge(x, y) {
            if !self.locked_to_screen() && self.cross(edge, x, y).await? {
                return Ok(());
            }
        }

        let (x, y) = shape.clamp(x, y);
        if (x, y) == self.cursor {
            return Ok(());
        }
        self.cursor = (x, y);
        self.send_to_active(Message::MouseMove {
            x: saturate(x),
            y: saturate(y),
        })
        .await
    }

    async fn handle_key(&mut self, key: KeyEvent) -> Result<(), RouteError> {
        self.mask = key.mask;
        let message = match key.action {
            KeyAction::Press => {
                self.held_keys.insert(key.button, key.id);
                Message::KeyDown {
                    id: key.id,
                    mask: key.mask,
                    button: key.button,
                }
            }
            KeyAction::Release => {
                self.held_keys.remove(&key.button);
                Message::KeyUp {
                    id: key.id,
                    mask: key.mask,
                    button: key.button,
                }
            }
            KeyAction::Repeat => Message::KeyRepeat {
                id: key.id,
                mask: key.mask,
                count: key.count.max(1),
                button: key.button,
            },
        };
        self.send_to_active(message).await
    }

    async fn handle_screensaver(&mut self, active: bool) -> Result<(), RouteError> {
        info!("screensaver {}", if active { "activated" } else { "deactivated" });
        if active && !self.on_primary() {
            self.return_home().await;
        }
        self.screensaver = active;
        self.broadcast(Message::Screensaver { on: active }, None).await;
        Ok(())
    }

    async fn handle_primary_grab(&mut self, id: ClipboardId) -> Result<(), RouteError> {
        let primary = self.graph.primary().to_string();
        let seq = self.enter_seq;
        let Some(slot) = self.clipboards.get_mut(id.index()) else {
            return Ok(());
        };
        *slot = ClipboardSlot {
            owner: primary,
            seq,
            data: None,
            pull_home: false,
        };
        debug!("primary grabbed {id}");
        self.broadcast(Message::GrabClipboard { id, seq }, None).await;
        Ok(())
    }

    /// Scroll Lock or a held mouse button keeps the cursor on its screen.
    fn locked_to_screen(&self) -> bool {
        !self.buttons_down.is_empty() || self.mask.contains(ModifierMask::SCROLL_LOCK)
    }

    // ── Client records ────────────────────────────────────────────────────────

    async fn handle_client(&mut self, name: &str, message: Message) -> Result<(), RouteError> {
        match message {
            Message::Info(info) => self.handle_info(name, info).await,
            Message::GrabClipboard { id, seq } => self.handle_client_grab(name, id, seq).await,
            Message::ClipboardData { id, seq, data } => {
                self.handle_clipboard_data(name, id, seq, data).await
            }
            Message::QueryClipboard { id, .. } => self.handle_clipboard_query(name, id).await,
            Message::SetOptions(options) => {
                debug!("{name} reports options {options:?}");
                self.registry.set_options(name, options);
                Ok(())
            }
            Message::KeepAlive => Ok(()),
            Message::Screensaver { on } => {
                debug!("{name} reports screensaver {on}");
                Ok(())
            }
            other => {
                debug!("ignoring {} from {name}", other.tag());
                Ok(())
            }
        }
    }

    async fn handle_info(&mut self, name: &str, info: ScreenInfo) -> Result<(), RouteError> {
        let shape = ScreenShape::new(
            i32::from(info.x),
            i32::from(info.y),
            i32::from(info.width),
            i32::from(info.height),
        );
        let first = self.registry.set_shape(name, shape);
        if self.active == name {
            self.cursor = shape.clamp(i32::from(info.cursor_x), i32::from(info.cursor_y));
        }
        debug!("{name} shape {shape:?}");

        self.send(name, Message::InfoAck).await?;
        if first {
            info!("screen {name} connected");
            self.send(name, Message::ResetOptions).await?;
            let options = self.settings.options.get(name).cloned().unwrap_or_default();
            if !options.is_empty() {
                self.send(name, Message::SetOptions(options)).await?;
            }
            if self.screensaver {
                self.send(name, Message::Screensaver { on: true }).await?;
            }
        }
        Ok(())
    }

    async fn handle_client_grab(
        &mut self,
        name: &str,
        id: ClipboardId,
        seq: u32,
    ) -> Result<(), RouteError> {
        if !id.is_valid() {
            debug!("{name} grabbed unknown clipboard {id}");
            return Ok(());
        }
        if self.active != name && seq < self.enter_seq {
            debug!("ignoring stale grab of {id} from {name} (seq {seq} < {})", self.enter_seq);
            return Ok(());
        }
        self.clipboards[id.index()] = ClipboardSlot {
            owner: name.to_string(),
            seq,
            data: None,
            pull_home: false,
        };
        debug!("{name} grabbed {id}");
        self.primary.grab_clipboard(id);
        self.broadcast(Message::GrabClipboard { id, seq }, Some(name))
            .await;
        Ok(())
    }

    async fn handle_clipboard_data(
        &mut self,
        name: &str,
        id: ClipboardId,
        seq: u32,
        data: Vec<u8>,
    ) -> Result<(), RouteError> {
        let Some(slot) = self.clipboards.get_mut(id.index()) else {
            return Ok(());
        };
        if slot.owner != name {
            debug!("ignoring {id} data from {name}, owner is {}", slot.owner);
            return Ok(());
        }
        slot.data = Some(data.clone());
        if std::mem::take(&mut slot.pull_home) {
            match Clipboard::unmarshall(&data) {
                Ok(clipboard) => self.primary.set_clipboard(id, &clipboard),
                Err(e) => warn!("bad {id} data from {name}: {e}"),
            }
        }

        let waiting: Vec<String> = self
            .pending_requests
            .iter()
            .filter(|(_, wanted)| *wanted == id)
            .map(|(requester, _)| requester.clone())
            .collect();
        self.pending_requests.retain(|(_, wanted)| *wanted != id);
        for requester in waiting {
            let message = Message::ClipboardData {
                id,
                seq,
                data: data.clone(),
            };
            if let Err(e) = self.send(&requester, message).await {
                warn!("{e}");
            }
        }
        Ok(())
    }

    async fn handle_clipboard_query(&mut self, name: &str, id: ClipboardId) -> Result<(), RouteError> {
        let Some(slot) = self.clipboards.get(id.index()).cloned() else {
            return Ok(());
        };
        if slot.owner == name {
            return Ok(());
        }
        if slot.owner == self.graph.primary() {
            let data = self
                .primary
                .clipboard(id)
                .map(|c| c.marshall())
                .unwrap_or_else(|| Clipboard::new().marshall());
            return self
                .send(
                    name,
                    Message::ClipboardData {
                        id,
                        seq: slot.seq,
                        data,
                    },
                )
                .await;
        }
        if let Some(data) = slot.data {
            return self
                .send(
                    name,
                    Message::ClipboardData {
                        id,
                        seq: slot.seq,
                        data,
                    },
                )
                .await;
        }
        self.pending_requests.push((name.to_string(), id));
        self.send(&slot.owner, Message::QueryClipboard { id, seq: slot.seq })
            .await
    }

    async fn handle_disconnect(&mut self, name: &str, connection_id: Uuid) {
        if !self.registry.remove(name, connection_id) {
            return;
        }
        info!("screen {name} disconnected");

        let primary = self.graph.primary().to_string();
        for slot in &mut self.clipboards {
            if slot.owner == name {
                *slot = ClipboardSlot {
                    owner: primary.clone(),
                    seq: self.enter_seq,
                    data: None,
                    pull_home: false,
                };
            }
        }
        self.pending_requests.retain(|(requester, _)| requester != name);

        if self.active == name {
            let (x, y) = self.primary_shape.center();
            info!("active screen {name} went away, returning to {primary}");
            self.active = primary;
            self.cursor = (x, y);
            self.primary.enter(x, y);
        }
    }

    // ── Switching ─────────────────────────────────────────────────────────────

    /// Tries to move the cursor across `edge` of the active screen.
    ///
    /// `(x, y)` is the position that reached or ran past the edge, in the
    /// active screen's coordinates.  Returns `false` when there is no
    /// connected neighbour beyond the edge.
    async fn cross(&mut self, edge: Edge, x: i32, y: i32) -> Result<bool, RouteError> {
        let Some(target) = self.graph.neighbour(&self.active, edge).map(str::to_string) else {
            return Ok(false);
        };
        let (Some(from), Some(to)) = (self.shape_of(&self.active), self.shape_of(&target)) else {
            trace!("{target} beyond {edge} is not connected");
            return Ok(false);
        };
        let (x, y) = from.clamp(x, y);
        let along = match edge {
            Edge::Left | Edge::Right => y - from.y + to.y,
            Edge::Top | Edge::Bottom => x - from.x + to.x,
        };
        let (nx, ny) = if target == self.graph.primary() {
            landing_point(&to, edge.opposite(), along, self.settings.switch_zone)
        } else {
            to.entry_point(edge.opposite(), along)
        };
        self.switch_screen(&target, nx, ny).await?;
        Ok(true)
    }

    /// Makes `target` the active screen with the cursor at `(x, y)`.
    pub async fn switch_screen(&mut self, target: &str, x: i32, y: i32) -> Result<(), RouteError> {
        if target == self.active {
            return Ok(());
        }
        info!("switch from {} to {target} at {x},{y}", self.active);

        if self.on_primary() {
            self.primary.leave();
        } else if let Err(reason) = self
            .transmitter
            .send_flushed(&self.active, Message::Leave, LEAVE_FLUSH_TIMEOUT)
            .await
        {
            warn!("leave for {} failed: {reason}", self.active);
        }

        self.active = target.to_string();
        self.cursor = (x, y);

        if self.on_primary() {
            self.primary.enter(x, y);
            self.pull_clipboards_home().await;
            return Ok(());
        }

        for (button, id) in self.held_modifiers() {
            let message = Message::KeyDown {
                id,
                mask: self.mask,
                button,
            };
            self.send(target, message).await?;
        }
        let seq = self.sequence.next();
        self.enter_seq = seq;
        self.send(
            target,
            Message::Enter {
                x: saturate(x),
                y: saturate(y),
                seq,
                mask: self.mask,
            },
        )
        .await
    }

    /// Brings the cursor to the centre of the primary.
    async fn return_home(&mut self) {
        if self.on_primary() {
            return;
        }
        let primary = self.graph.primary().to_string();
        let (x, y) = self.primary_shape.center();
        if let Err(e) = self.switch_screen(&primary, x, y).await {
            warn!("{e}");
        }
    }

    /// Requests every clipboard a secondary owns so the primary has it too.
    async fn pull_clipboards_home(&mut self) {
        for id in ClipboardId::all() {
            let slot = &mut self.clipboards[id.index()];
            if slot.owner == self.graph.primary() {
                continue;
            }
            if let Some(data) = &slot.data {
                match Clipboard::unmarshall(data) {
                    Ok(clipboard) => self.primary.set_clipboard(id, &clipboard),
                    Err(e) => warn!("bad cached {id} data: {e}"),
                }
                continue;
            }
            slot.pull_home = true;
            let (owner, seq) = (slot.owner.clone(), slot.seq);
            if let Err(e) = self.send(&owner, Message::QueryClipboard { id, seq }).await {
                warn!("{e}");
            }
        }
    }

    /// Modifier keys (not locks) currently held on the primary.
    fn held_modifiers(&self) -> Vec<(KeyButton, KeyId)> {
        self.held_keys
            .iter()
            .filter(|(_, id)| {
                key_id_to_keysym(**id)
                    .and_then(modifier_for_keysym)
                    .is_some_and(|m| !m.is_toggle())
            })
            .map(|(button, id)| (*button, *id))
            .collect()
    }

    fn shape_of(&self, name: &str) -> Option<ScreenShape> {
        if name == self.graph.primary() {
            Some(self.primary_shape)
        } else {
            self.registry.shape(name)
        }
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    async fn send(&self, screen: &str, message: Message) -> Result<(), RouteError> {
        self.transmitter
            .send(screen, message)
            .await
            .map_err(|reason| RouteError::Transmit {
                screen: screen.to_string(),
                reason,
            })
    }

    async fn send_to_active(&self, message: Message) -> Result<(), RouteError> {
        if self.on_primary() {
            return Ok(());
        }
        self.send(&self.active, message).await
    }

    /// Sends to every connected secondary except `except`.  Failures are
    /// logged; one dead session must not starve the others.
    async fn broadcast(&self, message: Message, except: Option<&str>) {
        for name in self.registry.connected_names() {
            if Some(name.as_str()) == except {
                continue;
            }
            if let Err(e) = self.send(&name, message.clone()).await {
                warn!("{e}");
            }
        }
    }

    // ── Status ────────────────────────────────────────────────────────────────

    /// Builds the admin status document.
    pub fn status(&self) -> StatusSnapshot {
        let primary = self.graph.primary();
        let screens = self
            .graph
            .screens()
            .map(|name| {
                let neighbours = self
                    .graph
                    .neighbours(name)
                    .into_iter()
                    .map(|(edge, n)| (edge.to_string(), n.to_string()))
                    .collect();
                if name == primary {
                    return ScreenStatus {
                        name: name.to_string(),
                        state: "primary".to_string(),
                        connection_id: None,
                        shape: Some(self.primary_shape),
                        neighbours,
                        options: BTreeMap::new(),
                        idle_ms: None,
                    };
                }
                match self.registry.get(name) {
                    Some(entry) => ScreenStatus {
                        name: name.to_string(),
                        state: match entry.state {
                            ConnectionState::Handshaking => "handshaking",
                            ConnectionState::Connected => "connected",
                        }
                        .to_string(),
                        connection_id: Some(entry.connection_id.to_string()),
                        shape: entry.shape,
                        neighbours,
                        options: entry
                            .options
                            .iter()
                            .map(|(id, value)| (id.to_string(), *value))
                            .collect(),
                        idle_ms: Some(entry.last_seen.elapsed().as_millis() as u64),
                    },
                    None => ScreenStatus {
                        name: name.to_string(),
                        state: "disconnected".to_string(),
                        connection_id: None,
                        shape: None,
                        neighbours,
                        options: BTreeMap::new(),
                        idle_ms: None,
                    },
                }
            })
            .collect();

        let clipboards = ClipboardId::all()
            .iter()
            .zip(&self.clipboards)
            .map(|(id, slot)| ClipboardStatus {
                id: id.to_string(),
                owner: slot.owner.clone(),
                seq: slot.seq,
            })
            .collect();

        StatusSnapshot {
            primary: primary.to_string(),
            active: self.active.clone(),
            cursor: CursorStatus {
                x: self.cursor.0,
                y: self.cursor.1,
            },
            modifiers: self.mask.to_string(),
            screensaver: self.screensaver,
            screens,
            clipboards,
        }
    }
}

/// Landing point on the primary: the switch zone plus one pixel inside the
/// entering edge, so arriving does not immediately trigger a switch back.
fn landing_point(shape: &ScreenShape, edge: Edge, along: i32, zone: i32) -> (i32, i32) {
    let (x, y) = shape.entry_point(edge, along);
    let extra = (zone - 1).max(0);
    let (x, y) = match edge {
        Edge::Left => (x + extra, y),
        Edge::Right => (x - extra, y),
        Edge::Top => (x, y + extra),
        Edge::Bottom => (x, y - extra),
    };
    shape.clamp(x, y)
}

/// Narrows a coordinate to the 16-bit wire width.
fn saturate(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::update_layout::{build_screen_graph, ScreenLink};
    use crate::infrastructure::primary_screen::MockPrimaryScreen;
    use std::sync::Mutex;
    use synergy_core::keymap::keys;
    use synergy_core::protocol::OptionId;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingTransmitter {
        /// `(screen, message, flushed)` in send order.
        sent: Mutex<Vec<(String, Message, bool)>>,
        fail_for: Option<String>,
    }

    impl RecordingTransmitter {
        fn sent(&self) -> Vec<(String, Message, bool)> {
            self.sent.lock().unwrap().clone()
        }

        fn messages_to(&self, screen: &str) -> Vec<Message> {
            self.sent()
                .into_iter()
                .filter(|(s, _, _)| s == screen)
                .map(|(_, m, _)| m)
                .collect()
        }

        fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl ScreenTransmitter for RecordingTransmitter {
        async fn send(&self, screen: &str, message: Message) -> Result<(), String> {
            if self.fail_for.as_deref() == Some(screen) {
                return Err("injected failure".to_string());
            }
            self.sent
                .lock()
                .unwrap()
                .push((screen.to_string(), message, false));
            Ok(())
        }

        async fn send_flushed(
            &self,
            screen: &str,
            message: Message,
            _timeout: Duration,
        ) -> Result<(), String> {
            self.sent
                .lock()
                .unwrap()
                .push((screen.to_string(), message, true));
            Ok(())
        }
    }

    const DESK: ScreenShape = ScreenShape {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    };
    const LAPTOP: ScreenShape = ScreenShape {
        x: 0,
        y: 0,
        width: 1366,
        height: 768,
    };

    fn primary_mock(configure: impl FnOnce(&mut MockPrimaryScreen)) -> Arc<MockPrimaryScreen> {
        let mut mock = MockPrimaryScreen::new();
        mock.expect_shape().return_const(DESK);
        mock.expect_toggle_mask().return_const(ModifierMask::empty());
        configure(&mut mock);
        Arc::new(mock)
    }

    /// desk ── right ──► laptop ── right ──► tablet
    fn make_router(
        primary: Arc<MockPrimaryScreen>,
    ) -> (Router, Arc<RecordingTransmitter>) {
        let graph = build_screen_graph(
            "desk",
            &["desk".to_string(), "laptop".to_string(), "tablet".to_string()],
            &[
                ScreenLink {
                    screen: "desk".to_string(),
                    edge: Edge::Right,
                    neighbour: "laptop".to_string(),
                },
                ScreenLink {
                    screen: "laptop".to_string(),
                    edge: Edge::Right,
                    neighbour: "tablet".to_string(),
                },
            ],
        )
        .unwrap();
        let settings = RouterSettings {
            switch_zone: 1,
            options: HashMap::from([(
                "laptop".to_string(),
                vec![(OptionId::HALF_DUPLEX_CAPS_LOCK, 1)],
            )]),
        };
        let transmitter = Arc::new(RecordingTransmitter::default());
        let router = Router::new(
            graph,
            settings,
            primary as Arc<dyn PrimaryScreen>,
            Arc::clone(&transmitter) as Arc<dyn ScreenTransmitter>,
        );
        (router, transmitter)
    }

    async fn connect(router: &mut Router, name: &str, shape: ScreenShape) -> Uuid {
        let id = Uuid::new_v4();
        let (reply, rx) = oneshot::channel();
        router
            .handle_event(RouterEvent::Connected {
                name: name.to_string(),
                connection_id: id,
                reply,
            })
            .await
            .unwrap();
        rx.await.unwrap().expect("registration accepted");
        client_says(
            router,
            name,
            id,
            Message::Info(ScreenInfo {
                x: shape.x as i16,
                y: shape.y as i16,
                width: shape.width as i16,
                height: shape.height as i16,
                warp_zone: 1,
                cursor_x: 0,
                cursor_y: 0,
            }),
        )
        .await;
        id
    }

    async fn client_says(router: &mut Router, name: &str, id: Uuid, message: Message) {
        router
            .handle_event(RouterEvent::Message {
                name: name.to_string(),
                connection_id: id,
                message,
            })
            .await
            .unwrap();
    }

    async fn primary(router: &mut Router, event: PrimaryEvent) {
        router.handle_primary(event).await.unwrap();
    }

    fn key(action: KeyAction, id: KeyId, mask: ModifierMask, button: KeyButton) -> PrimaryEvent {
        PrimaryEvent::Key(KeyEvent {
            action,
            id,
            mask,
            button,
            count: 1,
        })
    }

    // ── Handshake follow-up ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_first_info_is_acknowledged_with_options() {
        // Arrange
        let (mut router, tx) = make_router(primary_mock(|_| {}));

        // Act
        connect(&mut router, "laptop", LAPTOP).await;

        // Assert
        assert_eq!(
            tx.messages_to("laptop"),
            vec![
                Message::InfoAck,
                Message::ResetOptions,
                Message::SetOptions(vec![(OptionId::HALF_DUPLEX_CAPS_LOCK, 1)]),
            ]
        );
        assert_eq!(router.registry().shape("laptop"), Some(LAPTOP));
    }

    #[tokio::test]
    async fn test_repeated_info_is_only_acknowledged() {
        // Arrange
        let (mut router, tx) = make_router(primary_mock(|_| {}));
        let id = connect(&mut router, "tablet", LAPTOP).await;
        tx.clear();

        // Act
        client_says(
            &mut router,
            "tablet",
            id,
            Message::Info(ScreenInfo {
                width: 800,
                height: 600,
                ..ScreenInfo::default()
            }),
        )
        .await;

        // Assert
        assert_eq!(tx.messages_to("tablet"), vec![Message::InfoAck]);
        assert_eq!(
            router.registry().shape("tablet"),
            Some(ScreenShape::new(0, 0, 800, 600))
        );
    }

    #[tokio::test]
    async fn test_unknown_name_is_rejected() {
        // Arrange
        let (mut router, _) = make_router(primary_mock(|_| {}));
        let (reply, rx) = oneshot::channel();

        // Act
        router
            .handle_event(RouterEvent::Connected {
                name: "ghost".to_string(),
                connection_id: Uuid::new_v4(),
                reply,
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(
            rx.await.unwrap(),
            Err(RegistryError::UnknownScreen("ghost".to_string()))
        );
    }

    // ── Edge crossing ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_right_edge_switches_to_neighbour() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
        });
        let (mut router, tx) = make_router(mock);
        connect(&mut router, "laptop", LAPTOP).await;
        tx.clear();

        // Act
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;

        // Assert
        assert_eq!(router.active(), "laptop");
        assert_eq!(router.cursor(), (1, 540));
        assert_eq!(
            tx.messages_to("laptop"),
            vec![Message::Enter {
                x: 1,
                y: 540,
                seq: 0,
                mask: ModifierMask::empty(),
            }]
        );
    }

    #[tokio::test]
    async fn test_edge_without_connected_neighbour_does_nothing() {
        // Arrange: laptop is configured but never connected.
        let (mut router, tx) = make_router(primary_mock(|_| {}));

        // Act
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 100 }).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 0, y: 100 }).await;

        // Assert
        assert_eq!(router.active(), "desk");
        assert!(tx.sent().is_empty());
    }

    #[tokio::test]
    async fn test_entry_coordinate_is_clamped_to_smaller_neighbour() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
        });
        let (mut router, _) = make_router(mock);
        connect(&mut router, "laptop", LAPTOP).await;

        // Act: desk is 1080 tall, laptop only 768
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 1000 }).await;

        // Assert
        assert_eq!(router.cursor(), (1, 767));
    }

    #[tokio::test]
    async fn test_deltas_move_virtual_pointer_and_cross_between_secondaries() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
        });
        let (mut router, tx) = make_router(mock);
        connect(&mut router, "laptop", LAPTOP).await;
        connect(&mut router, "tablet", LAPTOP).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 300 }).await;
        tx.clear();

        // Act
        primary(&mut router, PrimaryEvent::PointerDelta { dx: 100, dy: 10 }).await;
        primary(&mut router, PrimaryEvent::PointerDelta { dx: 2000, dy: 0 }).await;

        // Assert
        let sent = tx.sent();
        assert_eq!(
            sent[0],
            ("laptop".to_string(), Message::MouseMove { x: 101, y: 310 }, false)
        );
        assert_eq!(sent[1], ("laptop".to_string(), Message::Leave, true));
        assert_eq!(
            sent[2],
            (
                "tablet".to_string(),
                Message::Enter {
                    x: 1,
                    y: 310,
                    seq: 1,
                    mask: ModifierMask::empty(),
                },
                false
            )
        );
        assert_eq!(router.active(), "tablet");
    }

    #[tokio::test]
    async fn test_crossing_back_to_primary_shows_cursor_at_entry_point() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
            m.expect_enter()
                .withf(|x, y| (*x, *y) == (1918, 200))
                .times(1)
                .return_const(());
        });
        let (mut router, tx) = make_router(mock);
        connect(&mut router, "laptop", LAPTOP).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 200 }).await;
        tx.clear();

        // Act: run off laptop's left edge
        primary(&mut router, PrimaryEvent::PointerDelta { dx: -50, dy: 0 }).await;

        // Assert
        assert_eq!(router.active(), "desk");
        assert_eq!(router.cursor(), (1918, 200));
        assert_eq!(tx.sent(), vec![("laptop".to_string(), Message::Leave, true)]);
    }

    #[tokio::test]
    async fn test_motion_past_unlinked_edge_is_clamped() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
        });
        let (mut router, tx) = make_router(mock);
        connect(&mut router, "laptop", LAPTOP).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 10 }).await;
        tx.clear();

        // Act: laptop has no top neighbour
        primary(&mut router, PrimaryEvent::PointerDelta { dx: 0, dy: -500 }).await;

        // Assert
        assert_eq!(router.active(), "laptop");
        assert_eq!(router.cursor(), (1, 0));
        assert_eq!(tx.messages_to("laptop"), vec![Message::MouseMove { x: 1, y: 0 }]);
    }

    #[tokio::test]
    async fn test_held_button_locks_cursor_to_screen() {
        // Arrange
        let (mut router, tx) = make_router(primary_mock(|_| {}));
        connect(&mut router, "laptop", LAPTOP).await;
        tx.clear();

        // Act
        primary(
            &mut router,
            PrimaryEvent::Button {
                button: 1,
                down: true,
            },
        )
        .await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;

        // Assert
        assert_eq!(router.active(), "desk");
        assert!(tx.sent().is_empty());
    }

    // ── Forwarding ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_input_is_forwarded_only_while_away() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
        });
        let (mut router, tx) = make_router(mock);
        connect(&mut router, "laptop", LAPTOP).await;
        primary(&mut router, key(KeyAction::Press, KeyId(0x61), ModifierMask::empty(), 38)).await;
        assert!(tx.messages_to("laptop").iter().all(|m| !matches!(m, Message::KeyDown { .. })));
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;
        tx.clear();

        // Act
        primary(&mut router, key(KeyAction::Release, KeyId(0x61), ModifierMask::empty(), 38)).await;
        primary(&mut router, PrimaryEvent::Wheel { delta: -120 }).await;
        primary(
            &mut router,
            PrimaryEvent::Button {
                button: 3,
                down: true,
            },
        )
        .await;
        primary(
            &mut router,
            PrimaryEvent::Key(KeyEvent {
                action: KeyAction::Repeat,
                id: KeyId(0x62),
                mask: ModifierMask::empty(),
                button: 56,
                count: 4,
            }),
        )
        .await;

        // Assert
        assert_eq!(
            tx.messages_to("laptop"),
            vec![
                Message::KeyUp {
                    id: KeyId(0x61),
                    mask: ModifierMask::empty(),
                    button: 38,
                },
                Message::MouseWheel { delta: -120 },
                Message::MouseDown { button: 3 },
                Message::KeyRepeat {
                    id: KeyId(0x62),
                    mask: ModifierMask::empty(),
                    count: 4,
                    button: 56,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_switch_sends_held_modifiers_before_enter() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
        });
        let (mut router, tx) = make_router(mock);
        connect(&mut router, "laptop", LAPTOP).await;
        primary(&mut router, key(KeyAction::Press, keys::SHIFT_L, ModifierMask::empty(), 50)).await;
        primary(&mut router, key(KeyAction::Press, keys::CAPS_LOCK, ModifierMask::SHIFT, 66)).await;
        tx.clear();

        // Act
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;

        // Assert: Shift is replayed, CapsLock (a lock) is not
        assert_eq!(
            tx.messages_to("laptop"),
            vec![
                Message::KeyDown {
                    id: keys::SHIFT_L,
                    mask: ModifierMask::SHIFT,
                    button: 50,
                },
                Message::Enter {
                    x: 1,
                    y: 540,
                    seq: 0,
                    mask: ModifierMask::SHIFT,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_scroll_lock_locks_cursor_to_screen() {
        // Arrange
        let (mut router, tx) = make_router(primary_mock(|_| {}));
        connect(&mut router, "laptop", LAPTOP).await;
        primary(
            &mut router,
            key(KeyAction::Release, keys::SCROLL_LOCK, ModifierMask::SCROLL_LOCK, 78),
        )
        .await;
        tx.clear();

        // Act
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;

        // Assert
        assert_eq!(router.active(), "desk");
        assert!(tx.sent().is_empty());
    }

    // ── Disconnect, screensaver ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_disconnect_of_active_screen_returns_to_primary_centre() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
            m.expect_enter()
                .withf(|x, y| (*x, *y) == (960, 540))
                .times(1)
                .return_const(());
        });
        let (mut router, _) = make_router(mock);
        let id = connect(&mut router, "laptop", LAPTOP).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;

        // Act
        router
            .handle_event(RouterEvent::Disconnected {
                name: "laptop".to_string(),
                connection_id: id,
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(router.active(), "desk");
        assert_eq!(router.cursor(), (960, 540));
        assert!(router.registry().get("laptop").is_none());
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_newer_session() {
        // Arrange
        let (mut router, _) = make_router(primary_mock(|_| {}));
        let old = connect(&mut router, "laptop", LAPTOP).await;
        router
            .handle_event(RouterEvent::Disconnected {
                name: "laptop".to_string(),
                connection_id: old,
            })
            .await
            .unwrap();
        let new = connect(&mut router, "laptop", LAPTOP).await;

        // Act
        router
            .handle_event(RouterEvent::Disconnected {
                name: "laptop".to_string(),
                connection_id: old,
            })
            .await
            .unwrap();

        // Assert
        assert!(router.registry().is_current("laptop", new));
    }

    #[tokio::test]
    async fn test_screensaver_returns_home_then_broadcasts() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
            m.expect_enter().times(1).return_const(());
        });
        let (mut router, tx) = make_router(mock);
        connect(&mut router, "laptop", LAPTOP).await;
        connect(&mut router, "tablet", LAPTOP).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;
        tx.clear();

        // Act
        primary(&mut router, PrimaryEvent::Screensaver { active: true }).await;

        // Assert
        assert_eq!(router.active(), "desk");
        assert_eq!(
            tx.sent(),
            vec![
                ("laptop".to_string(), Message::Leave, true),
                ("laptop".to_string(), Message::Screensaver { on: true }, false),
                ("tablet".to_string(), Message::Screensaver { on: true }, false),
            ]
        );
    }

    // ── Clipboard ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_client_grab_is_broadcast_to_others() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_grab_clipboard()
                .withf(|id| *id == ClipboardId::CLIPBOARD)
                .times(1)
                .return_const(());
        });
        let (mut router, tx) = make_router(mock);
        let laptop = connect(&mut router, "laptop", LAPTOP).await;
        connect(&mut router, "tablet", LAPTOP).await;
        tx.clear();

        // Act
        client_says(
            &mut router,
            "laptop",
            laptop,
            Message::GrabClipboard {
                id: ClipboardId::CLIPBOARD,
                seq: 0,
            },
        )
        .await;

        // Assert
        assert_eq!(router.clipboard_owner(ClipboardId::CLIPBOARD), Some("laptop"));
        assert_eq!(
            tx.sent(),
            vec![(
                "tablet".to_string(),
                Message::GrabClipboard {
                    id: ClipboardId::CLIPBOARD,
                    seq: 0,
                },
                false
            )]
        );
    }

    #[tokio::test]
    async fn test_stale_grab_from_inactive_screen_is_ignored() {
        // Arrange: by the time tablet is entered the enter sequence is 2
        let mock = primary_mock(|m| {
            m.expect_leave().times(2).return_const(());
            m.expect_enter().times(1).return_const(());
        });
        let (mut router, _) = make_router(mock);
        let laptop = connect(&mut router, "laptop", LAPTOP).await;
        connect(&mut router, "tablet", LAPTOP).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;
        primary(&mut router, PrimaryEvent::PointerDelta { dx: -5000, dy: 0 }).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;
        primary(&mut router, PrimaryEvent::PointerDelta { dx: 5000, dy: 0 }).await;
        assert_eq!(router.active(), "tablet");

        // Act: laptop reports a grab from its first visit
        client_says(
            &mut router,
            "laptop",
            laptop,
            Message::GrabClipboard {
                id: ClipboardId::SELECTION,
                seq: 0,
            },
        )
        .await;

        // Assert
        assert_eq!(router.clipboard_owner(ClipboardId::SELECTION), Some("desk"));
    }

    #[tokio::test]
    async fn test_query_for_primary_clipboard_is_answered_locally() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_clipboard()
                .returning(|_| Some(Clipboard::from_text("hello")));
        });
        let (mut router, tx) = make_router(mock);
        let laptop = connect(&mut router, "laptop", LAPTOP).await;
        tx.clear();

        // Act
        client_says(
            &mut router,
            "laptop",
            laptop,
            Message::QueryClipboard {
                id: ClipboardId::CLIPBOARD,
                seq: 0,
            },
        )
        .await;

        // Assert
        assert_eq!(
            tx.sent(),
            vec![(
                "laptop".to_string(),
                Message::ClipboardData {
                    id: ClipboardId::CLIPBOARD,
                    seq: 0,
                    data: Clipboard::from_text("hello").marshall(),
                },
                false
            )]
        );
    }

    #[tokio::test]
    async fn test_query_is_relayed_to_owner_and_answer_piped_back() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_grab_clipboard().return_const(());
        });
        let (mut router, tx) = make_router(mock);
        let laptop = connect(&mut router, "laptop", LAPTOP).await;
        let tablet = connect(&mut router, "tablet", LAPTOP).await;
        let clip = ClipboardId::CLIPBOARD;
        client_says(&mut router, "laptop", laptop, Message::GrabClipboard { id: clip, seq: 0 }).await;
        tx.clear();

        // Act
        client_says(&mut router, "tablet", tablet, Message::QueryClipboard { id: clip, seq: 0 }).await;
        let data = Clipboard::from_text("copied").marshall();
        client_says(
            &mut router,
            "laptop",
            laptop,
            Message::ClipboardData {
                id: clip,
                seq: 0,
                data: data.clone(),
            },
        )
        .await;

        // Assert
        assert_eq!(
            tx.sent(),
            vec![
                (
                    "laptop".to_string(),
                    Message::QueryClipboard { id: clip, seq: 0 },
                    false
                ),
                (
                    "tablet".to_string(),
                    Message::ClipboardData { id: clip, seq: 0, data },
                    false
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_return_home_pulls_secondary_clipboard_onto_primary() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_leave().times(1).return_const(());
            m.expect_enter().times(1).return_const(());
            m.expect_grab_clipboard().return_const(());
            m.expect_set_clipboard()
                .withf(|id, c| *id == ClipboardId::CLIPBOARD && c.text().as_deref() == Some("from laptop"))
                .times(1)
                .return_const(());
        });
        let (mut router, tx) = make_router(mock);
        let laptop = connect(&mut router, "laptop", LAPTOP).await;
        primary(&mut router, PrimaryEvent::PointerMove { x: 1919, y: 540 }).await;
        client_says(
            &mut router,
            "laptop",
            laptop,
            Message::GrabClipboard {
                id: ClipboardId::CLIPBOARD,
                seq: 0,
            },
        )
        .await;
        tx.clear();

        // Act
        primary(&mut router, PrimaryEvent::PointerDelta { dx: -5000, dy: 0 }).await;
        client_says(
            &mut router,
            "laptop",
            laptop,
            Message::ClipboardData {
                id: ClipboardId::CLIPBOARD,
                seq: 0,
                data: Clipboard::from_text("from laptop").marshall(),
            },
        )
        .await;

        // Assert
        assert_eq!(
            tx.sent(),
            vec![
                ("laptop".to_string(), Message::Leave, true),
                (
                    "laptop".to_string(),
                    Message::QueryClipboard {
                        id: ClipboardId::CLIPBOARD,
                        seq: 0,
                    },
                    false
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_reverts_clipboard_ownership_to_primary() {
        // Arrange
        let mock = primary_mock(|m| {
            m.expect_grab_clipboard().return_const(());
        });
        let (mut router, _) = make_router(mock);
        let laptop = connect(&mut router, "laptop", LAPTOP).await;
        client_says(
            &mut router,
            "laptop",
            laptop,
            Message::GrabClipboard {
                id: ClipboardId::SELECTION,
                seq: 0,
            },
        )
        .await;

        // Act
        router
            .handle_event(RouterEvent::Disconnected {
                name: "laptop".to_string(),
                connection_id: laptop,
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(router.clipboard_owner(ClipboardId::SELECTION), Some("desk"));
    }

    // ── Admin requests ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_status_reports_connection_states_and_neighbours() {
        // Arrange
        let (mut router, _) = make_router(primary_mock(|_| {}));
        connect(&mut router, "laptop", LAPTOP).await;

        // Act
        let status = router.status();

        // Assert
        assert_eq!(status.active, "desk");
        assert_eq!(status.screen("desk").unwrap().state, "primary");
        let laptop = status.screen("laptop").unwrap();
        assert_eq!(laptop.state, "connected");
        assert_eq!(laptop.shape, Some(LAPTOP));
        assert_eq!(laptop.neighbours.get("left").map(String::as_str), Some("desk"));
        assert_eq!(status.screen("tablet").unwrap().state, "disconnected");
        assert_eq!(status.clipboards.len(), 2);
    }

    #[tokio::test]
    async fn test_edit_layout_reply_reports_rejection() {
        // Arrange
        let (mut router, _) = make_router(primary_mock(|_| {}));
        let (reply, rx) = oneshot::channel();

        // Act: desk right is already laptop
        router
            .handle_event(RouterEvent::EditLayout {
                edit: LayoutEdit::Link(ScreenLink {
                    screen: "tablet".to_string(),
                    edge: Edge::Left,
                    neighbour: "desk".to_string(),
                }),
                reply,
            })
            .await
            .unwrap();

        // Assert
        assert!(matches!(rx.await.unwrap(), Err(GraphError::Contradiction { .. })));
        assert_eq!(router.graph().neighbour("desk", Edge::Right), Some("laptop"));
    }

    #[tokio::test]
    async fn test_transmit_failure_is_reported() {
        // Arrange
        let transmitter = Arc::new(RecordingTransmitter {
            fail_for: Some("laptop".to_string()),
            ..RecordingTransmitter::default()
        });
        let graph = build_screen_graph("desk", &["desk".to_string(), "laptop".to_string()], &[])
            .unwrap();
        let mut router = Router::new(
            graph,
            RouterSettings::default(),
            primary_mock(|_| {}) as Arc<dyn PrimaryScreen>,
            transmitter as Arc<dyn ScreenTransmitter>,
        );
        let id = Uuid::new_v4();
        let (reply, _rx) = oneshot::channel();
        router
            .handle_event(RouterEvent::Connected {
                name: "laptop".to_string(),
                connection_id: id,
                reply,
            })
            .await
            .unwrap();

        // Act
        let result = router
            .handle_event(RouterEvent::Message {
                name: "laptop".to_string(),
                connection_id: id,
                message: Message::Info(ScreenInfo::default()),
            })
            .await;

        // Assert
        assert!(matches!(result, Err(RouteError::Transmit { .. })));
    }
}
