//! HTTP server for receiving UPnP event notifications.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use warp::http::StatusCode;
use warp::Filter;

use gena_parser::DidlDecoder;

use crate::config::ServerConfig;
use crate::event::Event;
use crate::registry::CallbackRegistry;

/// Errors from server lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `start()` was called while the listener is already bound
    #[error("notification server is already started")]
    AlreadyStarted,

    /// The listening socket could not be bound
    #[error("failed to bind notification server: {0}")]
    Bind(String),

    /// The server task failed during shutdown
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// State held only while the listener is bound.
struct RunningServer {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// HTTP server that accepts inbound NOTIFY requests and fans them out to
/// registered callbacks.
///
/// The server exposes a single endpoint on every path. NOTIFY requests are
/// parsed and dispatched to each callback registered for the request's
/// subscription id; any other method gets a 204 so stray traffic on the
/// callback port is tolerated without being treated as an error.
///
/// Dispatch is fire-and-forget: the HTTP response is sent before any
/// callback runs. Events are queued per registered handler and delivered
/// one at a time, so each handler sees a subscription's events in the order
/// their NOTIFY requests arrived, and one handler's failure or slowness
/// never affects the others or the remote device's NOTIFY latency.
pub struct EventServer {
    config: ServerConfig,
    registry: Arc<CallbackRegistry>,
    decoder: Arc<dyn DidlDecoder>,
    shutdown_hooks: Mutex<Vec<ShutdownHook>>,
    running: Mutex<Option<RunningServer>>,
}

impl EventServer {
    /// Create a server that is not yet listening.
    ///
    /// `decoder` is handed to the event body parser for embedded DIDL-Lite
    /// content descriptors.
    pub fn new(config: ServerConfig, decoder: Arc<dyn DidlDecoder>) -> Self {
        Self {
            config,
            registry: Arc::new(CallbackRegistry::new()),
            decoder,
            shutdown_hooks: Mutex::new(Vec::new()),
            running: Mutex::new(None),
        }
    }

    /// The callback registry shared with subscriptions.
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// The externally reachable base URL, suitable for the `CALLBACK`
    /// subscription header.
    ///
    /// While the server is running this reflects the actually bound port,
    /// which matters when the configured port was 0.
    pub async fn callback_url(&self) -> String {
        let port = match self.running.lock().await.as_ref() {
            Some(running) => running.local_addr.port(),
            None => self.config.listen_port,
        };
        format!("http://{}:{}", self.config.listen_host, port)
    }

    /// The bound socket address, if the server is running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Register a hook to run during [`shutdown`](Self::shutdown), after the
    /// listener stops accepting connections and before outstanding
    /// connections are drained.
    pub async fn register_shutdown_hook<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.shutdown_hooks
            .lock()
            .await
            .push(Box::new(move || Box::pin(hook())));
    }

    /// Bind the listening socket and start serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyStarted`] when called while the server
    /// is running, and [`ServerError::Bind`] when the socket cannot be bound.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = SocketAddr::new(self.config.listen_host, self.config.listen_port);
        let routes = notify_route(self.registry.clone(), self.decoder.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!(%local_addr, "event notification server listening");
        let task = tokio::spawn(server);

        *running = Some(RunningServer {
            shutdown_tx,
            task,
            local_addr,
        });
        Ok(())
    }

    /// Stop accepting connections, run registered shutdown hooks, then drain
    /// outstanding connections within the configured grace period.
    ///
    /// Safe to call when [`start`](Self::start) was never called; that is a
    /// no-op.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        // Stop accepting new connections.
        let _ = running.shutdown_tx.send(());

        let hooks: Vec<ShutdownHook> = self.shutdown_hooks.lock().await.drain(..).collect();
        for hook in hooks {
            hook().await;
        }

        let abort = running.task.abort_handle();
        match tokio::time::timeout(self.config.drain_timeout, running.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServerError::Shutdown(format!("server task failed: {e}"))),
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.config.drain_timeout,
                    "forcing connection close after drain timeout"
                );
                abort.abort();
                Ok(())
            }
        }
    }
}

/// Warp filter for the single notification endpoint, matching any path.
fn notify_route(
    registry: Arc<CallbackRegistry>,
    decoder: Arc<dyn DidlDecoder>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::optional::<String>("sid"))
        .and(warp::header::optional::<String>("seq"))
        .and(warp::body::bytes())
        .and_then(
            move |method: warp::http::Method,
                  _path: warp::path::FullPath,
                  sid: Option<String>,
                  seq: Option<String>,
                  body: bytes::Bytes| {
                let registry = registry.clone();
                let decoder = decoder.clone();
                async move {
                    Ok::<_, warp::Rejection>(
                        handle_notify(method, sid, seq, body, registry, decoder).await,
                    )
                }
            },
        )
}

/// Handle one inbound request.
///
/// Responds 204 to anything that is not a NOTIFY, 400 when the body is not
/// UTF-8, cannot be parsed, or the `SID` header is missing, and 200
/// otherwise. The 200 is sent without waiting for callback execution.
async fn handle_notify(
    method: warp::http::Method,
    sid: Option<String>,
    seq: Option<String>,
    body: bytes::Bytes,
    registry: Arc<CallbackRegistry>,
    decoder: Arc<dyn DidlDecoder>,
) -> impl warp::Reply {
    // Non-event traffic reaching the callback endpoint is not an error.
    if method.as_str() != "NOTIFY" {
        return warp::reply::with_status("", StatusCode::NO_CONTENT);
    }

    let body_text = match std::str::from_utf8(&body) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting NOTIFY with non-UTF-8 body");
            return warp::reply::with_status("", StatusCode::BAD_REQUEST);
        }
    };
    let variables = match gena_parser::parse_event_body(body_text, decoder.as_ref()) {
        Ok(variables) => variables,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting NOTIFY with malformed body");
            return warp::reply::with_status("", StatusCode::BAD_REQUEST);
        }
    };

    let Some(sid) = sid else {
        tracing::warn!("rejecting NOTIFY without SID header");
        return warp::reply::with_status("", StatusCode::BAD_REQUEST);
    };
    let seq = seq.unwrap_or_default();

    let event = Arc::new(Event {
        sid: sid.clone(),
        seq,
        variables,
    });

    // Enqueueing preserves arrival order per handler; invocation failures
    // are logged by the registry's delivery workers.
    let handlers = registry.deliver(&sid, event).await;
    tracing::debug!(sid = %sid, handlers, "dispatching event");

    warp::reply::with_status("", StatusCode::OK)
}
