//! ClientProxy: one secondary's connection, from greeting to disconnect.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! server                                  client
//!   ── "Synergy" 1.3 ───────────────────────►
//!   ◄─────────────────── "Synergy" 1.3 name ──
//!   (router registers name, or EUNK / EBSY)
//!   ── QINF ────────────────────────────────►
//!   ◄──────────────────────────────── DINF ──
//!   (router answers CIAK, CROP, DSOP)
//!   ◄──── records in both directions ───────►
//! ```
//!
//! The greeting through the first `DINF` must finish within
//! [`HANDSHAKE_TIMEOUT`].
//!
//! # Tasks
//!
//! After registration the connection is split:
//!
//! - a **writer task** owns the write half and drains a bounded queue.  After
//!   `H` seconds without outbound traffic it writes `CALV`.  On shutdown it
//!   writes `CBYE`.
//! - the **reader loop** (the task that called [`serve_client`]) forwards
//!   every inbound record to the router.  `3·H` seconds of silence, a
//!   malformed record, or the writer stopping ends the session.
//!
//! The router reaches the writer queues through [`ClientLinks`].  A full
//! queue means the client stopped reading; the session is closed rather than
//! letting the router block.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use synergy_core::protocol::{FrameReader, FrameWriter, Hello, HelloBack, Message, PROTOCOL_MAJOR};
use synergy_core::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::NetworkError;
use crate::application::manage_clients::RegistryError;
use crate::application::route_input::{RouterEvent, ScreenTransmitter};

/// Greeting through first `DINF`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound records queued per client before the session counts as wedged.
pub const OUTBOUND_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct ProxySettings {
    /// Idle time before the writer sends `CALV`.  The reader gives up after
    /// three times this long.
    pub heartbeat: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(3),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

// ── Outbound links ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Outbound {
    message: Message,
    /// Signalled once the record is on the socket.
    written: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Clone)]
struct Link {
    connection_id: Uuid,
    queue: mpsc::Sender<Outbound>,
    close: Arc<Notify>,
}

/// The writer queue of every registered client, keyed by screen name.
#[derive(Debug, Clone, Default)]
pub struct ClientLinks {
    links: Arc<Mutex<HashMap<String, Link>>>,
}

impl ClientLinks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Link>> {
        self.links.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, name: &str, link: Link) {
        self.lock().insert(name.to_string(), link);
    }

    /// Drops `name`'s link if it still belongs to `connection_id`.
    fn remove(&self, name: &str, connection_id: Uuid) {
        let mut links = self.lock();
        if links
            .get(name)
            .is_some_and(|l| l.connection_id == connection_id)
        {
            links.remove(name);
        }
    }

    fn get(&self, name: &str) -> Result<Link, String> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| format!("{name} has no open connection"))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn enqueue(link: &Link, outbound: Outbound) -> Result<(), String> {
        match link.queue.try_send(outbound) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                link.close.notify_one();
                Err("outbound queue full, closing connection".to_string())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err("connection closed".to_string()),
        }
    }
}

#[async_trait]
impl ScreenTransmitter for ClientLinks {
    async fn send(&self, screen: &str, message: Message) -> Result<(), String> {
        let link = self.get(screen)?;
        Self::enqueue(
            &link,
            Outbound {
                message,
                written: None,
            },
        )
    }

    async fn send_flushed(
        &self,
        screen: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<(), String> {
        let link = self.get(screen)?;
        let (written, done) = oneshot::channel();
        Self::enqueue(
            &link,
            Outbound {
                message,
                written: Some(written),
            },
        )?;
        match time::timeout(timeout, done).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err("connection closed before the record was written".to_string()),
            Err(_) => Err(format!("record not written within {timeout:?}")),
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Runs one client connection to completion.
///
/// `peer` is only used in log lines.  The stream is generic so tests can
/// drive a session over an in-memory duplex pipe.
///
/// # Errors
///
/// Returns why the session ended; a clean close by the client or by shutdown
/// is `Ok(())`.
pub async fn serve_client<S>(
    stream: S,
    peer: String,
    router: mpsc::Sender<RouterEvent>,
    links: ClientLinks,
    settings: ProxySettings,
    shutdown: watch::Receiver<bool>,
) -> Result<(), NetworkError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let connection_id = Uuid::new_v4();
    let deadline = Instant::now() + settings.handshake_timeout;
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    let greeting = time::timeout_at(
        deadline,
        greet(&mut reader, &mut writer, &router, connection_id),
    )
    .await
    .map_err(|_| NetworkError::HandshakeTimeout(settings.handshake_timeout))?;
    let name = match greeting {
        Ok(name) => name,
        Err(e) => {
            let _ = writer.shutdown().await;
            return Err(e);
        }
    };
    info!("{peer} is screen {name} ({connection_id})");

    // From here on the router knows the name; every exit path below must
    // end with a Disconnected event.
    let (queue, outbound) = mpsc::channel(OUTBOUND_QUEUE);
    let close = Arc::new(Notify::new());
    links.insert(
        &name,
        Link {
            connection_id,
            queue: queue.clone(),
            close: Arc::clone(&close),
        },
    );
    let (writer_exit_tx, writer_exit) = oneshot::channel::<()>();
    let writer_task = tokio::spawn(write_loop(
        writer,
        outbound,
        close,
        settings.heartbeat,
        shutdown,
        name.clone(),
        writer_exit_tx,
    ));

    let result = run_registered(
        &mut reader,
        queue,
        &router,
        &name,
        connection_id,
        deadline,
        settings,
        writer_exit,
    )
    .await;

    links.remove(&name, connection_id);
    let _ = router
        .send(RouterEvent::Disconnected {
            name: name.clone(),
            connection_id,
        })
        .await;
    let _ = writer_task.await;

    match &result {
        Ok(()) => info!("screen {name} closed"),
        Err(e) => info!("screen {name} dropped: {e}"),
    }
    result
}

/// Asks for screen info, waits for it, then forwards records until the
/// session ends.
#[allow(clippy::too_many_arguments)]
async fn run_registered<R>(
    reader: &mut FrameReader<R>,
    queue: mpsc::Sender<Outbound>,
    router: &mpsc::Sender<RouterEvent>,
    name: &str,
    connection_id: Uuid,
    deadline: Instant,
    settings: ProxySettings,
    writer_exit: oneshot::Receiver<()>,
) -> Result<(), NetworkError>
where
    R: AsyncRead + Unpin,
{
    queue
        .send(Outbound {
            message: Message::QueryInfo,
            written: None,
        })
        .await
        .map_err(|_| NetworkError::Closed)?;
    drop(queue);
    time::timeout_at(deadline, first_info(reader, router, name, connection_id))
        .await
        .map_err(|_| NetworkError::HandshakeTimeout(settings.handshake_timeout))??;
    read_loop(reader, router, name, connection_id, settings.heartbeat * 3, writer_exit).await
}

/// Exchanges greetings and registers the name with the router.
async fn greet<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    router: &mpsc::Sender<RouterEvent>,
    connection_id: Uuid,
) -> Result<String, NetworkError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_frame(&Hello::current().encode()).await?;

    let payload = reader.read_frame().await?.ok_or(NetworkError::Closed)?;
    let hello = match HelloBack::decode(&payload) {
        Ok(hello) => hello,
        Err(e) => {
            debug!("bad greeting: {e}");
            return Err(e.into());
        }
    };
    if hello.major != PROTOCOL_MAJOR {
        write_message(writer, &Message::Incompatible {
            major: hello.major,
            minor: hello.minor,
        })
        .await?;
        return Err(NetworkError::Incompatible {
            major: hello.major,
            minor: hello.minor,
        });
    }

    let (reply, registered) = oneshot::channel();
    router
        .send(RouterEvent::Connected {
            name: hello.name.clone(),
            connection_id,
            reply,
        })
        .await
        .map_err(|_| NetworkError::RouterGone)?;
    match registered.await.map_err(|_| NetworkError::RouterGone)? {
        Ok(()) => Ok(hello.name),
        Err(e) => {
            let answer = match e {
                RegistryError::UnknownScreen(_) => Message::UnknownClient,
                RegistryError::AlreadyConnected(_) => Message::Busy,
            };
            write_message(writer, &answer).await?;
            Err(e.into())
        }
    }
}

/// Waits for the `DINF` that completes the handshake.
async fn first_info<R>(
    reader: &mut FrameReader<R>,
    router: &mpsc::Sender<RouterEvent>,
    name: &str,
    connection_id: Uuid,
) -> Result<(), NetworkError>
where
    R: AsyncRead + Unpin,
{
    let payload = reader.read_frame().await?.ok_or(NetworkError::Closed)?;
    let message = Message::decode(&payload)?;
    if !matches!(message, Message::Info(_)) {
        return Err(NetworkError::UnexpectedRecord {
            expected: "DINF",
            got: message.tag().to_string(),
        });
    }
    forward(router, name, connection_id, message).await
}

async fn read_loop<R>(
    reader: &mut FrameReader<R>,
    router: &mpsc::Sender<RouterEvent>,
    name: &str,
    connection_id: Uuid,
    idle: Duration,
    mut writer_exit: oneshot::Receiver<()>,
) -> Result<(), NetworkError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = time::timeout(idle, reader.read_frame()) => frame,
            _ = &mut writer_exit => return Ok(()),
        };
        let payload = match frame {
            Err(_) => return Err(NetworkError::IdleTimeout(idle)),
            Ok(Ok(None)) => return Ok(()),
            Ok(Ok(Some(payload))) => payload,
            Ok(Err(e)) => {
                debug!("{name}: {e}");
                return Err(e.into());
            }
        };
        match Message::decode(&payload) {
            Ok(Message::ProtocolViolation) => return Err(NetworkError::PeerViolation),
            Ok(message) => forward(router, name, connection_id, message).await?,
            Err(ProtocolError::UnknownTag(tag)) => debug!("{name}: ignoring unknown record {tag}"),
            Err(e) => {
                debug!("{name}: {e}");
                return Err(e.into());
            }
        }
    }
}

async fn forward(
    router: &mpsc::Sender<RouterEvent>,
    name: &str,
    connection_id: Uuid,
    message: Message,
) -> Result<(), NetworkError> {
    trace!("{name} → {}", message.tag());
    router
        .send(RouterEvent::Message {
            name: name.to_string(),
            connection_id,
            message,
        })
        .await
        .map_err(|_| NetworkError::RouterGone)
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::Receiver<Outbound>,
    close: Arc<Notify>,
    heartbeat: Duration,
    mut shutdown: watch::Receiver<bool>,
    name: String,
    _exit: oneshot::Sender<()>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(Outbound { message, written }) = next else { break };
                if let Err(e) = write_message(&mut writer, &message).await {
                    warn!("write to {name} failed: {e}");
                    break;
                }
                if let Some(written) = written {
                    let _ = written.send(());
                }
            }
            _ = time::sleep(heartbeat) => {
                if let Err(e) = write_message(&mut writer, &Message::KeepAlive).await {
                    warn!("keep-alive to {name} failed: {e}");
                    break;
                }
            }
            _ = close.notified() => {
                warn!("closing {name}: outbound queue overflowed");
                break;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = write_message(&mut writer, &Message::Close).await;
                    break;
                }
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_message<W>(writer: &mut FrameWriter<W>, message: &Message) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    trace!("→ {}", message.tag());
    writer.write_frame(&message.encode()?).await?;
    Ok(())
}
