//! End-to-end tests: `run_client` against a scripted server over loopback TCP.
//!
//! The client side is the real stack (`SynthesizingScreen` over a recording
//! `MockDisplay`); the server side is driven by hand with the core codec.

use std::sync::Arc;
use std::time::Duration;

use synergy_client::application::emulate_input::{DisplayEvent, SynthesizingScreen};
use synergy_client::infrastructure::display::mock::{DisplayCall, MockDisplay};
use synergy_client::infrastructure::network::session::{SessionError, SessionSettings};
use synergy_client::infrastructure::network::{run_client, ClientConnectionConfig, NetworkError};
use synergy_core::keymap::layouts::{KEYCODE_A, KEYCODE_SHIFT_L};
use synergy_core::protocol::{FrameReader, FrameWriter, Hello, HelloBack, Message, ScreenInfo};
use synergy_core::{Clipboard, ClipboardId, KeyId, ModifierMask};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct FakeServer {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl FakeServer {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let (read, write) = stream.into_split();
        Self {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
        }
    }

    async fn send(&mut self, message: &Message) {
        self.writer.write_frame(&message.encode().unwrap()).await.unwrap();
    }

    async fn recv_frame(&mut self) -> Option<Vec<u8>> {
        timeout(WAIT, self.reader.read_frame()).await.unwrap().unwrap()
    }

    async fn recv(&mut self) -> Message {
        let payload = self.recv_frame().await.expect("client closed");
        Message::decode(&payload).unwrap()
    }

    async fn greet(&mut self) -> HelloBack {
        self.writer.write_frame(&Hello::current().encode()).await.unwrap();
        let payload = self.recv_frame().await.expect("client closed");
        HelloBack::decode(&payload).unwrap()
    }

    /// Greeting through `CIAK`; returns the screen info the client sent.
    async fn handshake(&mut self) -> ScreenInfo {
        let hello = self.greet().await;
        assert_eq!(hello.name, "laptop");
        self.send(&Message::QueryInfo).await;
        let Message::Info(info) = self.recv().await else {
            panic!("expected DINF");
        };
        self.send(&Message::InfoAck).await;
        info
    }

    /// Round-trips a keep-alive so everything sent before it was applied.
    async fn sync(&mut self) {
        self.send(&Message::KeepAlive).await;
        assert_eq!(self.recv().await, Message::KeepAlive);
    }
}

struct Harness {
    listener: TcpListener,
    display: Arc<MockDisplay>,
    screen: Arc<SynthesizingScreen>,
    shutdown: watch::Sender<bool>,
    client: JoinHandle<Result<(), NetworkError>>,
}

async fn start(settings: SessionSettings) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ClientConnectionConfig {
        server: listener.local_addr().unwrap().to_string(),
        connect_timeout: Duration::from_secs(2),
        reconnect_interval: Duration::from_millis(100),
    };
    let display = Arc::new(MockDisplay::with_shape(synergy_core::ScreenShape::new(0, 0, 1366, 768)));
    let (screen, upstream) = SynthesizingScreen::new(display.clone(), ModifierMask::empty()).unwrap();
    let screen = Arc::new(screen);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let client = tokio::spawn(run_client(config, screen.clone(), upstream, settings, shutdown_rx));
    Harness {
        listener,
        display,
        screen,
        shutdown,
        client,
    }
}

fn settings() -> SessionSettings {
    SessionSettings::new("laptop")
}

#[tokio::test]
async fn test_handshake_reports_the_local_screen() {
    // Arrange
    let harness = start(settings()).await;
    let mut server = FakeServer::accept(&harness.listener).await;

    // Act
    let info = server.handshake().await;

    // Assert
    assert_eq!((info.width, info.height), (1366, 768));
    assert_eq!((info.cursor_x, info.cursor_y), (683, 384));
    assert_eq!(info.warp_zone, 1);

    harness.shutdown.send(true).unwrap();
    assert!(timeout(WAIT, harness.client).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_key_and_mouse_records_reach_the_display() {
    // Arrange
    let harness = start(settings()).await;
    let mut server = FakeServer::accept(&harness.listener).await;
    server.handshake().await;

    // Act
    server
        .send(&Message::Enter {
            x: 100,
            y: 200,
            seq: 1,
            mask: ModifierMask::empty(),
        })
        .await;
    server
        .send(&Message::KeyDown {
            id: KeyId(0x41),
            mask: ModifierMask::SHIFT,
            button: 38,
        })
        .await;
    server
        .send(&Message::KeyUp {
            id: KeyId(0x41),
            mask: ModifierMask::SHIFT,
            button: 38,
        })
        .await;
    server.send(&Message::MouseMove { x: 300, y: 400 }).await;
    server.sync().await;

    // Assert
    let keys = harness.display.keys();
    assert_eq!(
        keys[..3],
        [
            (KEYCODE_SHIFT_L, true),
            (KEYCODE_A, true),
            (KEYCODE_SHIFT_L, false),
        ]
    );
    assert!(keys[3..].contains(&(KEYCODE_A, false)));
    assert!(harness.screen.keys_down().is_empty());
    let calls = harness.display.take_calls();
    assert!(calls.contains(&DisplayCall::Motion { x: 100, y: 200 }));
    assert_eq!(calls.last(), Some(&DisplayCall::Flush));
    assert!(calls.contains(&DisplayCall::Motion { x: 300, y: 400 }));
    assert!(harness.screen.is_active());
}

#[tokio::test]
async fn test_clipboard_grabbed_elsewhere_is_fetched_on_enter() {
    // Arrange
    let harness = start(settings()).await;
    let mut server = FakeServer::accept(&harness.listener).await;
    server.handshake().await;
    server
        .send(&Message::GrabClipboard {
            id: ClipboardId::CLIPBOARD,
            seq: 0,
        })
        .await;

    // Act
    server
        .send(&Message::Enter {
            x: 0,
            y: 0,
            seq: 4,
            mask: ModifierMask::empty(),
        })
        .await;
    let query = server.recv().await;
    let data = Clipboard::from_text("hello").marshall();
    server
        .send(&Message::ClipboardData {
            id: ClipboardId::CLIPBOARD,
            seq: 4,
            data: data.clone(),
        })
        .await;
    server
        .send(&Message::QueryClipboard {
            id: ClipboardId::CLIPBOARD,
            seq: 4,
        })
        .await;
    let answer = server.recv().await;

    // Assert
    assert_eq!(
        query,
        Message::QueryClipboard {
            id: ClipboardId::CLIPBOARD,
            seq: 4
        }
    );
    assert_eq!(
        answer,
        Message::ClipboardData {
            id: ClipboardId::CLIPBOARD,
            seq: 4,
            data
        }
    );
}

#[tokio::test]
async fn test_local_clipboard_change_is_announced() {
    // Arrange
    let harness = start(settings()).await;
    let mut server = FakeServer::accept(&harness.listener).await;
    server.handshake().await;
    server
        .send(&Message::Enter {
            x: 0,
            y: 0,
            seq: 7,
            mask: ModifierMask::empty(),
        })
        .await;
    server.sync().await;

    // Act
    harness
        .display
        .push_event(DisplayEvent::ClipboardChanged(ClipboardId::SELECTION));
    harness.screen.pump_events();

    // Assert
    assert_eq!(
        server.recv().await,
        Message::GrabClipboard {
            id: ClipboardId::SELECTION,
            seq: 7
        }
    );
}

#[tokio::test]
async fn test_close_releases_keys_and_reconnects() {
    // Arrange
    let harness = start(settings()).await;
    let mut server = FakeServer::accept(&harness.listener).await;
    server.handshake().await;
    server
        .send(&Message::KeyDown {
            id: KeyId(0x61),
            mask: ModifierMask::empty(),
            button: 38,
        })
        .await;
    server.sync().await;

    // Act
    server.send(&Message::Close).await;
    let mut second = FakeServer::accept(&harness.listener).await;
    second.handshake().await;

    // Assert
    assert_eq!(harness.display.keys().last(), Some(&(KEYCODE_A, false)));
    assert!(harness.screen.keys_down().is_empty());
}

#[tokio::test]
async fn test_unknown_records_are_skipped() {
    // Arrange
    let harness = start(settings()).await;
    let mut server = FakeServer::accept(&harness.listener).await;
    server.handshake().await;

    // Act
    server.writer.write_frame(b"ZZZZ\x00\x01").await.unwrap();
    server.sync().await;

    // Assert: still connected and answering.
    server.send(&Message::QueryInfo).await;
    assert!(matches!(server.recv().await, Message::Info(_)));
    assert!(!harness.client.is_finished());
}

#[tokio::test]
async fn test_silent_server_is_dropped_after_three_heartbeats() {
    // Arrange
    let harness = start(SessionSettings {
        heartbeat: Duration::from_millis(100),
        ..settings()
    })
    .await;
    let mut server = FakeServer::accept(&harness.listener).await;
    server.handshake().await;

    // Act: say nothing.
    let closed = server.recv_frame().await;

    // Assert
    assert!(closed.is_none());
    let mut second = FakeServer::accept(&harness.listener).await;
    second.greet().await;
}

#[tokio::test]
async fn test_busy_answer_stops_the_client() {
    // Arrange
    let harness = start(settings()).await;
    let mut server = FakeServer::accept(&harness.listener).await;

    // Act
    server.greet().await;
    server.send(&Message::Busy).await;
    let result = timeout(WAIT, harness.client).await.unwrap().unwrap();

    // Assert
    assert!(matches!(
        result,
        Err(NetworkError::Session(SessionError::Busy(name))) if name == "laptop"
    ));
}
