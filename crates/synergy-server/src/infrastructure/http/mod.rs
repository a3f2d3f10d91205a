//! HTTP admin surface.
//!
//! A small status page and layout editor served on its own port when
//! `[http] enabled = true`.  Every connection carries exactly one request.
//!
//! | Request      | Effect                                                 |
//! |--------------|--------------------------------------------------------|
//! | `GET /`      | Status snapshot as JSON                                |
//! | `HEAD /`     | Same headers as `GET /`, no body                       |
//! | `POST /`     | Layout edit from form fields `action`, `screen`, ...   |
//!
//! The router owns the live graph, so both routes go through
//! [`RouterEvent`] round trips rather than touching shared state.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use synergy_core::Edge;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::application::route_input::RouterEvent;
use crate::application::update_layout::{LayoutEdit, ScreenLink};
use crate::infrastructure::network::NetworkError;

pub mod protocol;

pub use protocol::{parse_form_data, read_request, write_reply, HttpError, HttpReply, HttpRequest};

/// How long a client may take to deliver its whole request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Binds the admin port.
///
/// # Errors
///
/// Returns [`NetworkError::BindFailed`] if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::BindFailed { addr, source })?;
    info!("admin page on http://{}/", listener.local_addr().unwrap_or(addr));
    Ok(listener)
}

/// Serves admin requests until `shutdown` becomes `true`.
pub async fn run_http(
    listener: TcpListener,
    router: mpsc::Sender<RouterEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let router = router.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, &router).await {
                            debug!("admin connection from {peer}: {e}");
                        }
                    });
                }
                Err(e) => error!("admin accept error: {e}"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("admin page stopped");
                    break;
                }
            }
        }
    }
}

/// Reads one request from `stream`, answers it and closes the write side.
pub async fn serve_connection<S>(stream: S, router: &mpsc::Sender<RouterEvent>) -> Result<(), HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let reply = match tokio::time::timeout(REQUEST_TIMEOUT, read_request(&mut reader)).await {
        Ok(Ok(request)) => {
            debug!(method = %request.method, uri = %request.uri, "admin request");
            handle(&request, router).await
        }
        Ok(Err(HttpError::Status { status, detail })) => HttpReply::error(status, &detail),
        Ok(Err(e)) => return Err(e),
        Err(_) => HttpReply::error(400, "request not received in time"),
    };

    write_reply(&mut write_half, &reply).await?;
    write_half.shutdown().await?;
    Ok(())
}

/// Routes a parsed request.
pub async fn handle(request: &HttpRequest, router: &mpsc::Sender<RouterEvent>) -> HttpReply {
    if request.path() != "/" {
        return not_found(request);
    }
    match request.method.as_str() {
        "GET" | "HEAD" => status_page(request, router).await,
        "POST" => edit_layout(request, router).await,
        _ => {
            let mut reply = HttpReply::new(request, 405).with_header("Allow", "GET, HEAD, POST");
            reply.set_text(format!("method {} not allowed\n", request.method));
            reply
        }
    }
}

fn not_found(request: &HttpRequest) -> HttpReply {
    let mut reply = HttpReply::new(request, 404);
    reply.set_text(format!("{} not found\n", request.path()));
    reply
}

fn router_gone(request: &HttpRequest) -> HttpReply {
    warn!("admin request while the router is stopped");
    let mut reply = HttpReply::new(request, 503);
    reply.set_text("server is shutting down\n".to_string());
    reply
}

async fn status_page(request: &HttpRequest, router: &mpsc::Sender<RouterEvent>) -> HttpReply {
    let (tx, rx) = oneshot::channel();
    if router.send(RouterEvent::Status { reply: tx }).await.is_err() {
        return router_gone(request);
    }
    let Ok(snapshot) = rx.await else {
        return router_gone(request);
    };

    match snapshot.to_json() {
        Ok(json) => {
            let mut reply = HttpReply::new(request, 200);
            reply.set_json(json);
            reply
        }
        Err(e) => {
            error!("status serialization failed: {e}");
            let mut reply = HttpReply::new(request, 500);
            reply.set_text(format!("{e}\n"));
            reply
        }
    }
}

async fn edit_layout(request: &HttpRequest, router: &mpsc::Sender<RouterEvent>) -> HttpReply {
    let edit = match parse_form_data(request)
        .ok_or_else(|| "expected a multipart/form-data body".to_string())
        .and_then(|fields| layout_edit(&fields))
    {
        Ok(edit) => edit,
        Err(reason) => return bad_request(request, &reason),
    };

    let (tx, rx) = oneshot::channel();
    if router.send(RouterEvent::EditLayout { edit, reply: tx }).await.is_err() {
        return router_gone(request);
    }
    match rx.await {
        Ok(Ok(())) => {
            let mut reply = HttpReply::new(request, 200);
            reply.set_text("layout updated\n".to_string());
            reply
        }
        Ok(Err(e)) => bad_request(request, &e.to_string()),
        Err(_) => router_gone(request),
    }
}

fn bad_request(request: &HttpRequest, reason: &str) -> HttpReply {
    let mut reply = HttpReply::new(request, 400);
    reply.set_text(format!("{reason}\n"));
    reply
}

/// Builds a [`LayoutEdit`] from submitted form fields.
fn layout_edit(fields: &BTreeMap<String, Vec<u8>>) -> Result<LayoutEdit, String> {
    let field = |name: &str| -> Result<String, String> {
        let raw = fields.get(name).ok_or_else(|| format!("missing field {name:?}"))?;
        let value = std::str::from_utf8(raw)
            .map_err(|_| format!("field {name:?} is not UTF-8"))?
            .trim();
        if value.is_empty() {
            return Err(format!("field {name:?} is empty"));
        }
        Ok(value.to_string())
    };

    let screen = field("screen")?;
    let edge: Edge = field("edge")?.parse().map_err(|e| format!("{e}"))?;
    match field("action")?.as_str() {
        "link" => Ok(LayoutEdit::Link(ScreenLink {
            screen,
            edge,
            neighbour: field("neighbour")?,
        })),
        "unlink" => Ok(LayoutEdit::Unlink { screen, edge }),
        other => Err(format!("unknown action {other:?}")),
    }
}
