//! Integration tests for the input routing pipeline.
//!
//! These tests exercise the application layer of synergy-server end-to-end:
//! a `synergys.toml` document is parsed, turned into a screen graph, and
//! handed to a `Router` driven through `RouterEvent`s with a headless primary
//! and a channel-backed transmitter standing in for the network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use synergy_core::protocol::ScreenInfo;
use synergy_core::{Edge, GraphError, Message, ScreenShape};
use synergy_server::application::route_input::{Router, RouterEvent, RouterSettings, ScreenTransmitter};
use synergy_server::application::update_layout::{build_screen_graph, LayoutEdit, UpdateLayoutError};
use synergy_server::infrastructure::primary_screen::headless::HeadlessPrimary;
use synergy_server::infrastructure::primary_screen::PrimaryEvent;
use synergy_server::infrastructure::storage::config::ServerConfig;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

const ROW: &str = r#"
[server]
name = "desk"

[[screens]]
name = "desk"

[[screens]]
name = "laptop"

[[screens]]
name = "tablet"

[[links]]
screen = "desk"
edge = "right"
neighbour = "laptop"

[[links]]
screen = "laptop"
edge = "right"
neighbour = "tablet"
"#;

/// Forwards every record to a channel the test reads.
struct ChannelTransmitter(mpsc::UnboundedSender<(String, Message)>);

#[async_trait]
impl ScreenTransmitter for ChannelTransmitter {
    async fn send(&self, screen: &str, message: Message) -> Result<(), String> {
        self.0
            .send((screen.to_string(), message))
            .map_err(|_| "test receiver dropped".to_string())
    }

    async fn send_flushed(&self, screen: &str, message: Message, _timeout: Duration) -> Result<(), String> {
        self.send(screen, message).await
    }
}

fn router_from(toml_text: &str) -> (Router, Arc<HeadlessPrimary>, mpsc::UnboundedReceiver<(String, Message)>) {
    let config: ServerConfig = toml::from_str(toml_text).expect("valid config");
    let graph = build_screen_graph(&config.server.name, &config.screen_names(), &config.screen_links())
        .expect("valid layout");
    let (primary, _inject, _events) = HeadlessPrimary::new(ScreenShape::new(0, 0, 1920, 1080));
    let primary = Arc::new(primary);
    let (tx, rx) = mpsc::unbounded_channel();
    let settings = RouterSettings {
        switch_zone: config.server.switch_zone,
        options: HashMap::new(),
    };
    let router = Router::new(graph, settings, primary.clone(), Arc::new(ChannelTransmitter(tx)));
    (router, primary, rx)
}

async fn connect(router: &mut Router, name: &str, width: i16, height: i16) {
    let connection_id = Uuid::new_v4();
    let (reply, rx) = oneshot::channel();
    router
        .handle_event(RouterEvent::Connected {
            name: name.to_string(),
            connection_id,
            reply,
        })
        .await
        .unwrap();
    rx.await.unwrap().expect("registration accepted");
    router
        .handle_event(RouterEvent::Message {
            name: name.to_string(),
            connection_id,
            message: Message::Info(ScreenInfo {
                width,
                height,
                ..ScreenInfo::default()
            }),
        })
        .await
        .unwrap();
}

fn drain(rx: &mut mpsc::UnboundedReceiver<(String, Message)>) -> Vec<(String, Message)> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_config_links_imply_reverse_links() {
    // Arrange
    let config: ServerConfig = toml::from_str(ROW).unwrap();

    // Act
    let graph = build_screen_graph("desk", &config.screen_names(), &config.screen_links()).unwrap();

    // Assert
    assert_eq!(graph.neighbour("laptop", Edge::Left), Some("desk"));
    assert_eq!(graph.neighbour("tablet", Edge::Left), Some("laptop"));
    assert_eq!(graph.neighbour("desk", Edge::Left), None);
}

#[test]
fn test_contradictory_reverse_link_is_rejected() {
    // Arrange
    let text = format!("{ROW}\n[[links]]\nscreen = \"tablet\"\nedge = \"left\"\nneighbour = \"desk\"\n");
    let config: ServerConfig = toml::from_str(&text).unwrap();

    // Act
    let result = build_screen_graph("desk", &config.screen_names(), &config.screen_links());

    // Assert
    assert!(matches!(
        result,
        Err(UpdateLayoutError::Graph(GraphError::Contradiction { .. }))
    ));
}

#[tokio::test]
async fn test_cursor_walks_along_the_row_and_back() {
    // Arrange
    let (mut router, primary, mut rx) = router_from(ROW);
    connect(&mut router, "laptop", 1366, 768).await;
    connect(&mut router, "tablet", 1024, 768).await;
    drain(&mut rx);

    // Act: desk → laptop → tablet.
    router
        .handle_event(RouterEvent::Primary(PrimaryEvent::PointerMove { x: 1919, y: 300 }))
        .await
        .unwrap();
    router
        .handle_event(RouterEvent::Primary(PrimaryEvent::PointerDelta { dx: 1400, dy: 0 }))
        .await
        .unwrap();

    // Assert
    assert_eq!(router.active(), "tablet");
    assert!(!primary.cursor_home());
    let sent = drain(&mut rx);
    let order: Vec<(&str, &str)> = sent
        .iter()
        .filter(|(_, m)| matches!(m, Message::Enter { .. } | Message::Leave))
        .map(|(s, m)| (s.as_str(), if matches!(m, Message::Leave) { "leave" } else { "enter" }))
        .collect();
    assert_eq!(order, vec![("laptop", "enter"), ("laptop", "leave"), ("tablet", "enter")]);

    // Act: all the way back.
    router
        .handle_event(RouterEvent::Primary(PrimaryEvent::PointerDelta { dx: -2000, dy: 0 }))
        .await
        .unwrap();
    router
        .handle_event(RouterEvent::Primary(PrimaryEvent::PointerDelta { dx: -2000, dy: 0 }))
        .await
        .unwrap();

    // Assert
    assert_eq!(router.active(), "desk");
    assert!(primary.cursor_home());
}

#[tokio::test]
async fn test_unlinking_an_edge_stops_crossings_there() {
    // Arrange
    let (mut router, _primary, mut rx) = router_from(ROW);
    connect(&mut router, "laptop", 1366, 768).await;
    let (reply, edited) = oneshot::channel();

    // Act
    router
        .handle_event(RouterEvent::EditLayout {
            edit: LayoutEdit::Unlink {
                screen: "desk".to_string(),
                edge: Edge::Right,
            },
            reply,
        })
        .await
        .unwrap();
    drain(&mut rx);
    router
        .handle_event(RouterEvent::Primary(PrimaryEvent::PointerMove { x: 1919, y: 300 }))
        .await
        .unwrap();

    // Assert
    assert_eq!(edited.await.unwrap(), Ok(()));
    assert_eq!(router.active(), "desk");
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_status_reflects_connections_and_layout() {
    // Arrange
    let (mut router, _primary, _rx) = router_from(ROW);
    connect(&mut router, "laptop", 1366, 768).await;
    let (reply, status) = oneshot::channel();

    // Act
    router.handle_event(RouterEvent::Status { reply }).await.unwrap();
    let snapshot = status.await.unwrap();

    // Assert
    assert_eq!(snapshot.active, "desk");
    let laptop = snapshot.screen("laptop").unwrap();
    assert_eq!(laptop.state, "connected");
    assert_eq!(laptop.neighbours.get("right").map(String::as_str), Some("tablet"));
    assert_eq!(snapshot.screen("tablet").unwrap().state, "disconnected");
}
