//! C4 Protocol Bridge: the HTTP/SSE front door onto a stdio MCP server
//! (§3, §4.4, §6). Grounded on the teacher's `transport::stdio::StdioTransport`
//! (its `make_service_fn`/`service_fn`/`with_graceful_shutdown` server,
//! stdout line-splitting pump, and SSE fan-out) but retargeted at the exact
//! routes and status codes mandated here, and built on the consolidated
//! `jsonrpc`/`sse` types rather than that module's duplicated definitions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::bridge::jsonrpc::JsonRpcMessage;
use crate::bridge::middleware::{LoggingMiddleware, MiddlewareChain, RequestContext};
use crate::bridge::sse::{PendingBuffer, SseClient, SseMessage};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::runtime::{AttachedRead, AttachedWrite};

/// Shared state for one running bridge instance. One `Bridge` is created per
/// workload with an SSE transport; stdio-only workloads never construct one.
pub struct Bridge {
    config: BridgeConfig,
    clients: Arc<Mutex<HashMap<Uuid, SseClient>>>,
    pending: Mutex<PendingBuffer>,
    inbound_tx: mpsc::Sender<JsonRpcMessage>,
    http_shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    pump_shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    middleware: MiddlewareChain,
}

impl Bridge {
    /// Start the bridge: spawns the stdin-writer / stdout-reader pump tasks
    /// over the container's attached streams and the HTTP listener, and
    /// returns once both are up.
    pub async fn start(
        config: BridgeConfig,
        addr: SocketAddr,
        stdin: Box<dyn AttachedWrite>,
        stdout: Box<dyn AttachedRead>,
    ) -> Result<Arc<Self>> {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        let (pump_shutdown_tx, pump_shutdown_rx) = oneshot::channel();

        let mut middleware = MiddlewareChain::new();
        middleware.push(Arc::new(LoggingMiddleware));

        let bridge = Arc::new(Self {
            pending: Mutex::new(PendingBuffer::new(config.pending_buffer_cap)),
            clients: Arc::new(Mutex::new(HashMap::new())),
            config,
            inbound_tx,
            http_shutdown_tx: Mutex::new(None),
            pump_shutdown_tx: Mutex::new(Some(pump_shutdown_tx)),
            middleware,
        });

        tokio::spawn(run_pump(bridge.clone(), stdin, stdout, inbound_rx, pump_shutdown_rx));
        bridge.start_http_server(addr).await?;
        Ok(bridge)
    }

    async fn start_http_server(self: &Arc<Self>, addr: SocketAddr) -> Result<()> {
        let bridge = self.clone();
        let make_svc = make_service_fn(move |_conn| {
            let bridge = bridge.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    let bridge = bridge.clone();
                    async move { Ok::<_, hyper::Error>(bridge.route(req).await) }
                }))
            }
        });

        let server = Server::try_bind(&addr)
            .map_err(|e| Error::Transport(format!("failed to bind bridge listener on {}: {}", addr, e)))?
            .serve(make_svc);

        let (tx, rx) = oneshot::channel();
        *self.http_shutdown_tx.lock().await = Some(tx);

        let server = server.with_graceful_shutdown(async {
            rx.await.ok();
        });

        tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "bridge HTTP server exited with error");
            }
        });

        tracing::info!(%addr, "protocol bridge listening");
        Ok(())
    }

    /// `/health` bypasses the middleware chain entirely; every other route
    /// passes through it outer-first before reaching `dispatch` (§4.4).
    async fn route(self: &Arc<Self>, req: Request<Body>) -> Response<Body> {
        if req.uri().path() == "/health" {
            return self.dispatch(req).await;
        }

        let bridge = self.clone();
        let handler = move |req: Request<Body>, _ctx: RequestContext| -> crate::bridge::middleware::HandlerResult {
            let bridge = bridge.clone();
            Box::pin(async move { bridge.dispatch(req).await })
        };
        self.middleware.run(req, &handler).await
    }

    async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/sse") => self.handle_sse(req).await,
            (&Method::POST, "/messages") => self.handle_post(req).await,
            (&Method::GET, "/health") => Response::builder()
                .status(StatusCode::OK)
                .body(Body::from("ok"))
                .unwrap(),
            (_, "/sse") | (_, "/messages") | (_, "/health") => Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .body(Body::empty())
                .unwrap(),
            _ => Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()).unwrap(),
        }
    }

    /// `GET /sse` (§6): registers a client, emits the `endpoint` event with
    /// this connection's `/messages?session_id=` URL, drains anything
    /// buffered while no client was connected, then streams forwarded
    /// messages until the client disconnects.
    async fn handle_sse(&self, req: Request<Body>) -> Response<Body> {
        let base_url = base_url_for(&req);
        let (mut sender, body) = Body::channel();
        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity);
        let client = SseClient::new(tx);
        let client_id = client.id;

        {
            let mut clients = self.clients.lock().await;
            clients.insert(client_id, client);
        }
        tracing::debug!(%client_id, "sse client connected");

        let endpoint = SseMessage::endpoint(format!("{}/messages?session_id={}", base_url, client_id));
        if sender.send_data(endpoint.to_sse_string().into()).await.is_err() {
            self.clients.lock().await.remove(&client_id);
            return Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty()).unwrap();
        }

        let backlog = {
            let mut pending = self.pending.lock().await;
            pending.drain()
        };
        for item in backlog {
            if sender.send_data(item.message.to_sse_string().into()).await.is_err() {
                break;
            }
        }

        let clients = self.clients.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sender.send_data(message.to_sse_string().into()).await.is_err() {
                    break;
                }
            }
            clients.lock().await.remove(&client_id);
            tracing::debug!(%client_id, "sse client disconnected");
        });

        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(body)
            .unwrap()
    }

    /// `POST /messages?session_id=` (§6): 400 only when the `session_id`
    /// param itself is missing or the body is unparseable; 404 whenever a
    /// `session_id` is present but doesn't name a connected client — whether
    /// because it's not a well-formed UUID or simply unknown (§8 scenario 2,
    /// P4: "`POST /messages` with unknown `session_id` returns 404").
    async fn handle_post(&self, req: Request<Body>) -> Response<Body> {
        let raw_session_id = match req.uri().query().and_then(session_id_param) {
            Some(raw) => raw,
            None => {
                return Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from("session_id is required"))
                    .unwrap()
            }
        };

        let client_exists = match Uuid::parse_str(raw_session_id) {
            Ok(id) => self.clients.lock().await.contains_key(&id),
            Err(_) => false,
        };
        if !client_exists {
            return Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from("unknown session"))
                .unwrap();
        }

        let body_bytes = match hyper::body::to_bytes(req.into_body()).await {
            Ok(b) => b,
            Err(e) => {
                return Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from(format!("error reading body: {}", e)))
                    .unwrap()
            }
        };

        let message = match JsonRpcMessage::parse_line(&String::from_utf8_lossy(&body_bytes)) {
            Some(m) => m,
            None => {
                return Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from("invalid JSON-RPC message"))
                    .unwrap()
            }
        };

        match self.inbound_tx.try_send(message) {
            Ok(()) => Response::builder().status(StatusCode::ACCEPTED).body(Body::from("accepted")).unwrap(),
            Err(_) => Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from(Error::Backpressure.to_string()))
                .unwrap(),
        }
    }

    /// Forward a message parsed off the container's stdout to connected SSE
    /// clients, buffering it if none are currently connected (§4.4/P10).
    async fn forward(&self, message: JsonRpcMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outbound JSON-RPC message");
                return;
            }
        };
        let sse_message = SseMessage::message(json);

        let clients = self.clients.lock().await;
        if clients.is_empty() {
            drop(clients);
            self.pending.lock().await.push(sse_message);
            return;
        }

        let mut stale = Vec::new();
        for (id, client) in clients.iter() {
            if client.try_send(sse_message.clone()).is_err() {
                tracing::warn!(client_id = %id, "evicting slow sse client, queue full");
                stale.push(*id);
            }
        }
        drop(clients);
        if !stale.is_empty() {
            let mut clients = self.clients.lock().await;
            for id in stale {
                clients.remove(&id);
            }
        }
    }

    /// Graceful shutdown: stop accepting HTTP connections, cancel the pump,
    /// drop every SSE client's queue so its forwarding task exits.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.http_shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(tx) = self.pump_shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        self.clients.lock().await.clear();
    }
}

async fn run_pump(
    bridge: Arc<Bridge>,
    mut stdin: Box<dyn AttachedWrite>,
    mut stdout: Box<dyn AttachedRead>,
    mut inbound_rx: mpsc::Receiver<JsonRpcMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut buf = [0u8; 4096];
    let mut carry = Vec::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!("bridge stdio pump shutting down");
                break;
            }
            Some(message) = inbound_rx.recv() => {
                if let Err(e) = write_message(&mut stdin, &message).await {
                    tracing::error!(error = %e, "failed to write message to container stdin");
                    break;
                }
            }
            read = stdout.read(&mut buf) => {
                match read {
                    Ok(0) => {
                        tracing::info!("container stdout closed (EOF)");
                        break;
                    }
                    Ok(n) => {
                        carry.extend_from_slice(&buf[..n]);
                        while let Some(pos) = carry.iter().position(|b| *b == b'\n') {
                            let line = carry.drain(..=pos).collect::<Vec<u8>>();
                            let line = String::from_utf8_lossy(&line);
                            match JsonRpcMessage::parse_line(line.trim()) {
                                Some(msg) => bridge.forward(msg).await,
                                None if line.trim().is_empty() => {}
                                None => tracing::warn!(line = %line.trim(), "dropping unparseable stdout line"),
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "error reading container stdout");
                        break;
                    }
                }
            }
        }
    }
}

async fn write_message(stdin: &mut (dyn AttachedWrite), message: &JsonRpcMessage) -> Result<()> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    stdin.write_all(json.as_bytes()).await.map_err(Error::Io)?;
    stdin.flush().await.map_err(Error::Io)?;
    Ok(())
}

/// Extract the raw `session_id` query param, if present, without attempting
/// to parse it as a UUID — a malformed value is still "present" for the
/// purposes of distinguishing a missing param (400) from an unknown session
/// (404); see [`Bridge::handle_post`].
fn session_id_param(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| pair.strip_prefix("session_id="))
}

fn parse_session_id(query: &str) -> Option<Uuid> {
    session_id_param(query).and_then(|raw| Uuid::parse_str(raw).ok())
}

/// Infer `scheme://host` for the `endpoint` event's URL from the request's
/// TLS state (never set on this hyper server; kept for forward-proxy cases)
/// and the `X-Forwarded-Proto`/`Host` headers per §6.
fn base_url_for(req: &Request<Body>) -> String {
    let host = req
        .headers()
        .get(hyper::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", scheme, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_session_id_accepts_valid_uuid() {
        let id = Uuid::new_v4();
        let query = format!("session_id={}", id);
        assert_eq!(parse_session_id(&query), Some(id));
    }

    #[test]
    fn parse_session_id_rejects_missing_param() {
        assert_eq!(parse_session_id("foo=bar"), None);
    }

    #[test]
    fn parse_session_id_rejects_malformed_uuid() {
        assert_eq!(parse_session_id("session_id=not-a-uuid"), None);
    }

    /// A malformed `session_id` is still *present*, so `handle_post` must
    /// be able to tell it apart from a missing param (§8 scenario 2/P4:
    /// malformed or unknown both resolve to 404, only a missing param is
    /// 400).
    #[test]
    fn session_id_param_is_present_even_when_not_a_valid_uuid() {
        assert_eq!(session_id_param("session_id=bogus"), Some("bogus"));
        assert_eq!(session_id_param("foo=bar"), None);
    }

    #[tokio::test]
    async fn handle_post_missing_session_id_param_is_400() {
        let bridge = test_bridge().await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/messages")
            .body(Body::from("{}"))
            .unwrap();
        let resp = bridge.handle_post(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    /// §8 scenario 2: `POST /messages?session_id=bogus` is 404, not 400.
    #[tokio::test]
    async fn handle_post_malformed_session_id_is_404_not_400() {
        let bridge = test_bridge().await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/messages?session_id=bogus")
            .body(Body::from("{}"))
            .unwrap();
        let resp = bridge.handle_post(req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handle_post_well_formed_but_unknown_session_id_is_404() {
        let bridge = test_bridge().await;
        let unknown = Uuid::new_v4();
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("/messages?session_id={}", unknown))
            .body(Body::from("{}"))
            .unwrap();
        let resp = bridge.handle_post(req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    /// Builds a `Bridge` with no stdio pump task, suitable for exercising
    /// `handle_post`/`handle_sse` in isolation from a real container.
    async fn test_bridge() -> Bridge {
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        Bridge {
            config: BridgeConfig::default(),
            clients: Arc::new(Mutex::new(HashMap::new())),
            pending: Mutex::new(PendingBuffer::new(8)),
            inbound_tx,
            http_shutdown_tx: Mutex::new(None),
            pump_shutdown_tx: Mutex::new(None),
            middleware: MiddlewareChain::new(),
        }
    }

    #[test]
    fn base_url_defaults_to_http_localhost() {
        let req = Request::builder().uri("/sse").body(Body::empty()).unwrap();
        assert_eq!(base_url_for(&req), "http://localhost");
    }

    #[test]
    fn base_url_honors_forwarded_proto_and_host_headers() {
        let req = Request::builder()
            .uri("/sse")
            .header(hyper::header::HOST, "bridge.example")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();
        assert_eq!(base_url_for(&req), "https://bridge.example");
    }
}
