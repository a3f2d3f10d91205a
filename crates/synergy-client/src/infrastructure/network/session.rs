//! ClientSession: one connection to the server, from greeting to close.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! client                                  server
//!   ◄──────────────────── "Synergy" 1.3 ─────    AwaitHello
//!   ── "Synergy" 1.3 name ─────────────────►    AwaitHelloBack
//!   ◄──────────────────────────────── QINF ─
//!   ── DINF x y w h zone mx my ────────────►    AwaitInfo
//!   ◄──────────────────────────────── CIAK ─    Active
//!   ◄──── records in both directions ──────►
//! ```
//!
//! The greeting through `CIAK` must finish within the handshake timeout.
//! Once active, every record is dispatched in arrival order to the
//! [`SecondaryScreen`].  Nothing arriving for three heartbeats ends the
//! session.
//!
//! # Tasks
//!
//! - a **reader task** owns the read half and forwards whole frames over a
//!   channel, so waiting for a frame can be abandoned without losing bytes;
//! - a **writer task** owns the write half and drains a bounded queue.  A
//!   full queue means the server stopped reading and the session closes.
//!
//! However the session ends, every synthetic key and button is released.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use synergy_core::protocol::{
    FrameReader, FrameWriter, Hello, HelloBack, Message, OptionId, ScreenInfo, PROTOCOL_MAJOR,
};
use synergy_core::{Clipboard, ClipboardId, FrameError, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::application::secondary_screen::{ScreenEvent, SecondaryScreen};

/// Greeting through `CIAK`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound records queued before the session counts as wedged.
pub const OUTBOUND_QUEUE: usize = 256;

/// Heartbeat assumed until the server sets one.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(3);

const INBOUND_QUEUE: usize = 64;

/// How long the writer gets to drain after the session ends.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitHello,
    AwaitHelloBack,
    AwaitInfo,
    Active,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server speaks unsupported protocol {major}.{minor}")]
    UnsupportedServer { major: u16, minor: u16 },

    #[error("server does not support protocol {major}.{minor}")]
    Incompatible { major: u16, minor: u16 },

    #[error("server does not know a screen named {0:?}")]
    UnknownClient(String),

    #[error("a screen named {0:?} is already connected")]
    Busy(String),

    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("no record for {0:?}")]
    IdleTimeout(Duration),

    #[error("unexpected {got} while in {state:?}")]
    UnexpectedRecord { state: SessionState, got: String },

    #[error("server reported a protocol violation")]
    PeerViolation,

    #[error("connection closed by server")]
    Closed,

    #[error("outbound queue full")]
    QueueFull,

    #[error("writer stopped")]
    WriterStopped,
}

impl SessionError {
    /// Errors that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::UnsupportedServer { .. }
                | SessionError::Incompatible { .. }
                | SessionError::UnknownClient(_)
                | SessionError::Busy(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Screen name announced in the greeting.
    pub name: String,
    pub handshake_timeout: Duration,
    /// Heartbeat until `DSOP` sets one; the session gives up after three.
    pub heartbeat: Duration,
    /// Jump zone reported in `DINF`.
    pub warp_zone: i16,
}

impl SessionSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            heartbeat: DEFAULT_HEARTBEAT,
            warp_zone: 1,
        }
    }
}

type Inbound = Result<Vec<u8>, FrameError>;

/// The sending side of the writer queue.
struct Outbox {
    queue: mpsc::Sender<Vec<u8>>,
}

impl Outbox {
    fn send(&self, message: &Message) -> Result<(), SessionError> {
        trace!("→ {}", message.tag());
        self.send_raw(message.encode()?)
    }

    fn send_raw(&self, payload: Vec<u8>) -> Result<(), SessionError> {
        self.queue.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SessionError::WriterStopped,
        })
    }
}

pub struct ClientSession {
    screen: Arc<dyn SecondaryScreen>,
    settings: SessionSettings,
    state: SessionState,
    heartbeat: Duration,
    /// Sequence number of the last `CINN`.
    enter_seq: u32,
    /// Clipboards another screen took since this one last fetched them.
    grabbed_elsewhere: [bool; ClipboardId::COUNT],
}

impl ClientSession {
    pub fn new(screen: Arc<dyn SecondaryScreen>, settings: SessionSettings) -> Self {
        let heartbeat = settings.heartbeat;
        Self {
            screen,
            settings,
            state: SessionState::Connecting,
            heartbeat,
            enter_seq: 0,
            grabbed_elsewhere: [false; ClipboardId::COUNT],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Heartbeat currently in force.
    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Runs the session over `stream` until it ends.
    ///
    /// `upstream` carries what the local screen reports (clipboard grabs,
    /// screensaver changes); it outlives the session so a reconnect keeps
    /// reading the same channel.
    ///
    /// # Errors
    ///
    /// Returns why the session ended.  A `CBYE`, a clean close by the server
    /// or a shutdown request is `Ok(())`.
    pub async fn run<S>(
        &mut self,
        stream: S,
        upstream: &mut mpsc::UnboundedReceiver<ScreenEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.state = SessionState::AwaitHello;
        self.heartbeat = self.settings.heartbeat;
        self.grabbed_elsewhere = [false; ClipboardId::COUNT];

        let (read_half, write_half) = tokio::io::split(stream);
        let (frames_tx, mut frames) = mpsc::channel(INBOUND_QUEUE);
        let reader_task = tokio::spawn(read_loop(FrameReader::new(read_half), frames_tx));
        let (queue, outbound) = mpsc::channel(OUTBOUND_QUEUE);
        let mut writer_task = tokio::spawn(write_loop(FrameWriter::new(write_half), outbound));
        let outbox = Outbox { queue };

        let result = tokio::select! {
            result = self.drive(&mut frames, &outbox, upstream) => result,
            _ = shutdown_requested(shutdown) => {
                debug!("session stopped by shutdown");
                Ok(())
            }
        };

        self.state = SessionState::Closed;
        if let Err(e) = self.screen.release_all() {
            warn!("could not release synthetic input: {e}");
        }
        if matches!(result, Err(SessionError::Protocol(_))) {
            let _ = outbox.send(&Message::ProtocolViolation);
        }
        drop(outbox);
        reader_task.abort();
        if time::timeout(WRITER_DRAIN, &mut writer_task).await.is_err() {
            writer_task.abort();
        }

        match &result {
            Ok(()) => info!("session closed"),
            Err(e) => info!("session ended: {e}"),
        }
        result
    }

    async fn drive(
        &mut self,
        frames: &mut mpsc::Receiver<Inbound>,
        outbox: &Outbox,
        upstream: &mut mpsc::UnboundedReceiver<ScreenEvent>,
    ) -> Result<(), SessionError> {
        let limit = self.settings.handshake_timeout;
        time::timeout(limit, self.handshake(frames, outbox))
            .await
            .map_err(|_| SessionError::HandshakeTimeout(limit))??;
        if self.state != SessionState::Active {
            return Ok(());
        }
        info!("connected as {:?}", self.settings.name);

        // Only inbound records move the idle deadline.
        let mut last_inbound = Instant::now();
        loop {
            let idle = self.heartbeat * 3;
            tokio::select! {
                _ = time::sleep_until(last_inbound + idle) => {
                    return Err(SessionError::IdleTimeout(idle));
                }
                frame = frames.recv() => {
                    last_inbound = Instant::now();
                    let payload = match frame {
                        None => {
                            info!("server closed the connection");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            debug!("{e}");
                            return Err(e.into());
                        }
                        Some(Ok(payload)) => payload,
                    };
                    let Some(message) = decode(&payload)? else { continue };
                    if self.dispatch(message, outbox)?.is_break() {
                        return Ok(());
                    }
                }
                Some(event) = upstream.recv() => self.forward(event, outbox)?,
            }
        }
    }

    /// Greeting, `QINF`/`DINF` and `CIAK`.
    async fn handshake(
        &mut self,
        frames: &mut mpsc::Receiver<Inbound>,
        outbox: &Outbox,
    ) -> Result<(), SessionError> {
        let payload = next_frame(frames).await?.ok_or(SessionError::Closed)?;
        let hello = Hello::decode(&payload).map_err(|e| {
            debug!("bad greeting: {e}");
            e
        })?;
        if hello.major != PROTOCOL_MAJOR {
            return Err(SessionError::UnsupportedServer {
                major: hello.major,
                minor: hello.minor,
            });
        }
        debug!(major = hello.major, minor = hello.minor, "server greeting");
        self.state = SessionState::AwaitHelloBack;
        outbox.send_raw(HelloBack::new(self.settings.name.as_str()).encode())?;

        while self.state != SessionState::Active {
            let payload = next_frame(frames).await?.ok_or(SessionError::Closed)?;
            let Some(message) = decode(&payload)? else { continue };
            match message {
                Message::QueryInfo => {
                    outbox.send(&Message::Info(self.screen_info()))?;
                    self.state = SessionState::AwaitInfo;
                }
                Message::InfoAck if self.state == SessionState::AwaitInfo => {
                    self.state = SessionState::Active;
                }
                Message::KeepAlive => outbox.send(&Message::KeepAlive)?,
                Message::Close => {
                    info!("server closed the session during the handshake");
                    return Ok(());
                }
                other => return Err(self.rejection(other)),
            }
        }
        Ok(())
    }

    /// The error for a record that ends the session.
    fn rejection(&self, message: Message) -> SessionError {
        match message {
            Message::Incompatible { major, minor } => SessionError::Incompatible { major, minor },
            Message::UnknownClient => SessionError::UnknownClient(self.settings.name.clone()),
            Message::Busy => SessionError::Busy(self.settings.name.clone()),
            Message::ProtocolViolation => SessionError::PeerViolation,
            other => SessionError::UnexpectedRecord {
                state: self.state,
                got: other.tag().to_string(),
            },
        }
    }

    /// Applies one record.  `Break` ends the session cleanly.
    fn dispatch(&mut self, message: Message, outbox: &Outbox) -> Result<ControlFlow<()>, SessionError> {
        trace!("← {}", message.tag());
        let screen = Arc::clone(&self.screen);
        let applied = match message {
            Message::KeepAlive => {
                outbox.send(&Message::KeepAlive)?;
                Ok(())
            }
            Message::QueryInfo => {
                outbox.send(&Message::Info(self.screen_info()))?;
                Ok(())
            }
            Message::InfoAck => Ok(()),
            Message::ResetOptions => {
                self.heartbeat = self.settings.heartbeat;
                screen.reset_options();
                Ok(())
            }
            Message::SetOptions(options) => {
                self.apply_heartbeat(&options);
                screen.set_options(&options);
                Ok(())
            }
            Message::Enter { x, y, seq, mask } => {
                self.enter_seq = seq;
                let entered = screen.enter(x.into(), y.into(), mask);
                self.request_stale_clipboards(outbox)?;
                entered
            }
            Message::Leave => screen.leave(),
            Message::GrabClipboard { id, .. } if id.is_valid() => {
                self.grabbed_elsewhere[id.index()] = true;
                screen.grab_clipboard(id)
            }
            Message::ClipboardData { id, data, .. } if id.is_valid() => {
                match Clipboard::unmarshall(&data) {
                    Ok(clipboard) => {
                        self.grabbed_elsewhere[id.index()] = false;
                        screen.set_clipboard(id, &clipboard)
                    }
                    Err(e) => {
                        warn!("dropping {id} data from server: {e}");
                        Ok(())
                    }
                }
            }
            Message::QueryClipboard { id, seq } if id.is_valid() => {
                let data = screen.clipboard(id).unwrap_or_default().marshall();
                outbox.send(&Message::ClipboardData { id, seq, data })?;
                Ok(())
            }
            Message::GrabClipboard { id, .. }
            | Message::ClipboardData { id, .. }
            | Message::QueryClipboard { id, .. } => {
                debug!("ignoring record for unknown {id}");
                Ok(())
            }
            Message::Screensaver { on } => screen.screensaver(on),
            Message::KeyDown { id, mask, button } => screen.key_down(id, mask, button),
            Message::KeyRepeat {
                id,
                mask,
                count,
                button,
            } => screen.key_repeat(id, mask, count, button),
            Message::KeyUp { id, mask, button } => screen.key_up(id, mask, button),
            Message::MouseDown { button } => screen.mouse_down(button),
            Message::MouseUp { button } => screen.mouse_up(button),
            Message::MouseMove { x, y } => screen.mouse_move(x.into(), y.into()),
            Message::MouseWheel { delta } => screen.mouse_wheel(delta),
            Message::Close => {
                info!("server closed the session");
                return Ok(ControlFlow::Break(()));
            }
            Message::Info(_) => {
                debug!("ignoring DINF from server");
                Ok(())
            }
            other @ (Message::Incompatible { .. }
            | Message::UnknownClient
            | Message::Busy
            | Message::ProtocolViolation) => return Err(self.rejection(other)),
        };
        if let Err(e) = applied {
            warn!("screen: {e}");
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Sends what the local screen reported.
    fn forward(&mut self, event: ScreenEvent, outbox: &Outbox) -> Result<(), SessionError> {
        match event {
            ScreenEvent::ClipboardGrabbed(id) => {
                if let Some(flag) = self.grabbed_elsewhere.get_mut(id.index()) {
                    *flag = false;
                }
                outbox.send(&Message::GrabClipboard {
                    id,
                    seq: self.enter_seq,
                })
            }
            ScreenEvent::Screensaver(on) => outbox.send(&Message::Screensaver { on }),
        }
    }

    fn apply_heartbeat(&mut self, options: &[(OptionId, i32)]) {
        if let Some(&(_, ms)) = options.iter().find(|(id, _)| *id == OptionId::HEARTBEAT) {
            match u64::try_from(ms) {
                Ok(ms) if ms > 0 => self.heartbeat = Duration::from_millis(ms),
                _ => debug!(ms, "ignoring heartbeat option"),
            }
        }
    }

    fn request_stale_clipboards(&self, outbox: &Outbox) -> Result<(), SessionError> {
        for id in ClipboardId::all() {
            if self.grabbed_elsewhere[id.index()] {
                outbox.send(&Message::QueryClipboard {
                    id,
                    seq: self.enter_seq,
                })?;
            }
        }
        Ok(())
    }

    fn screen_info(&self) -> ScreenInfo {
        let shape = self.screen.shape();
        let (cursor_x, cursor_y) = self.screen.cursor();
        ScreenInfo {
            x: saturate(shape.x),
            y: saturate(shape.y),
            width: saturate(shape.width),
            height: saturate(shape.height),
            warp_zone: self.settings.warp_zone,
            cursor_x: saturate(cursor_x),
            cursor_y: saturate(cursor_y),
        }
    }
}

fn saturate(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Decodes a record.  Unknown tags are skipped (`None`).
fn decode(payload: &[u8]) -> Result<Option<Message>, SessionError> {
    match Message::decode(payload) {
        Ok(message) => Ok(Some(message)),
        Err(ProtocolError::UnknownTag(tag)) => {
            debug!("ignoring unknown record {tag}");
            Ok(None)
        }
        Err(e) => {
            debug!("malformed record: {e}");
            Err(e.into())
        }
    }
}

async fn next_frame(frames: &mut mpsc::Receiver<Inbound>) -> Result<Option<Vec<u8>>, SessionError> {
    match frames.recv().await {
        Some(Ok(payload)) => Ok(Some(payload)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

/// Resolves once shutdown is requested or the sender is gone.
pub(crate) async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn read_loop<R>(mut reader: FrameReader<R>, frames: mpsc::Sender<Inbound>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = match reader.read_frame().await {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => break,
            Err(e) => Err(e),
        };
        let failed = next.is_err();
        if frames.send(next).await.is_err() || failed {
            break;
        }
    }
}

async fn write_loop<W>(mut writer: FrameWriter<W>, mut outbound: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(payload) = outbound.recv().await {
        if let Err(e) = writer.write_frame(&payload).await {
            warn!("write to server failed: {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
