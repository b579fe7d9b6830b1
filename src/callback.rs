//! Minimal HTTP listener for the provider's redirect back to us.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::error::RelayError;
use crate::oauth::query::parse_query;
use crate::relay::{Relay, Resumed};

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// A parsed `GET` request line.
#[derive(Debug, PartialEq, Eq)]
pub struct CallbackRequest {
    pub path: String,
    pub params: CallbackParams,
}

/// What came of one inbound connection.
#[derive(Debug)]
pub enum Handled {
    Resumed(Resumed),
    Declined(String),
    Failed(RelayError),
    /// Not a callback (wrong path, favicon, malformed request).
    Ignored,
}

/// How long a connection may stay silent before it is dropped.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How often [`CallbackServer::serve`] ages out paused actions.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct CallbackServer {
    relay: Arc<Relay>,
    path: String,
    read_timeout: Duration,
    prune_interval: Duration,
}

impl CallbackServer {
    /// Serve callbacks on the path component of `redirect_uri`.
    pub fn new(relay: Arc<Relay>, redirect_uri: &str) -> Self {
        Self {
            relay,
            path: callback_path(redirect_uri),
            read_timeout: READ_TIMEOUT,
            prune_interval: PRUNE_INTERVAL,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Accept callbacks until the listener fails, one task per connection.
    /// Resumed actions are forwarded to `resumed`; paused actions past their
    /// TTL are pruned every prune interval.
    pub async fn serve(
        self,
        listener: TcpListener,
        resumed: mpsc::UnboundedSender<Resumed>,
    ) -> Result<(), RelayError> {
        let server = Arc::new(self);
        let mut prune =
            tokio::time::interval(server.prune_interval.max(Duration::from_millis(1)));
        prune.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let server = Arc::clone(&server);
                    let resumed = resumed.clone();
                    tokio::spawn(async move {
                        match server.handle(stream).await {
                            Ok(Handled::Resumed(r)) => {
                                if resumed.send(r).is_err() {
                                    tracing::warn!("no consumer for resumed actions");
                                }
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(%peer, error = %e, "callback connection failed"),
                        }
                    });
                }
                _ = prune.tick() => {
                    let pruned = server.relay.prune_pending().await;
                    if pruned > 0 {
                        tracing::info!(pruned, "aged out paused actions");
                    }
                }
            }
        }
    }

    /// Wait for a single callback and return what it resumed.
    pub async fn listen_once(
        &self,
        listener: &TcpListener,
        timeout: Duration,
    ) -> Result<Resumed, RelayError> {
        tokio::time::timeout(timeout, self.accept_until_callback(listener))
            .await
            .map_err(|_| {
                RelayError::Declined(format!(
                    "no callback received within {}s",
                    timeout.as_secs()
                ))
            })?
    }

    /// Connections are handled concurrently so an idle one cannot hold up
    /// the real callback. Unfinished ones are aborted on return.
    async fn accept_until_callback(&self, listener: &TcpListener) -> Result<Resumed, RelayError> {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let server = self.clone();
                    connections.spawn(async move { server.handle(stream).await });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    match joined {
                        Ok(Ok(Handled::Resumed(resumed))) => return Ok(resumed),
                        Ok(Ok(Handled::Declined(reason))) => return Err(RelayError::Declined(reason)),
                        Ok(Ok(Handled::Failed(e))) => return Err(e),
                        Ok(Ok(Handled::Ignored)) => {}
                        Ok(Err(e)) => tracing::debug!(error = %e, "callback connection failed"),
                        Err(e) => tracing::warn!(error = %e, "callback task panicked"),
                    }
                }
            }
        }
    }

    async fn handle(&self, mut stream: TcpStream) -> Result<Handled, RelayError> {
        let mut buf = vec![0u8; 8192];
        let n = match tokio::time::timeout(self.read_timeout, stream.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                tracing::debug!("connection sent no request; closing");
                return Ok(Handled::Ignored);
            }
        };
        let raw = String::from_utf8_lossy(&buf[..n]);

        let handled = match parse_callback_request(&raw) {
            Some(request) if request.path == self.path => self.dispatch(request.params).await,
            _ => Handled::Ignored,
        };

        let (status, content_type, body) = render(&handled);
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len(),
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;
        Ok(handled)
    }

    async fn dispatch(&self, params: CallbackParams) -> Handled {
        if let Some(error) = params.error {
            if let Some(state) = params.state.as_deref() {
                if let Err(e) = self.relay.abandon(state).await {
                    tracing::warn!(error = %e, "declined callback carried an invalid state");
                }
            }
            return Handled::Declined(error);
        }

        let state = match params.state {
            Some(state) => state,
            None => return Handled::Failed(RelayError::MalformedCallback("missing state".into())),
        };
        let Some(code) = params.code else {
            return Handled::Failed(RelayError::MalformedCallback("missing code".into()));
        };

        match self.relay.handle_callback(&code, &state).await {
            Ok(resumed) => Handled::Resumed(resumed),
            Err(e) => Handled::Failed(e),
        }
    }
}

/// Parse `GET /path?query HTTP/1.1`; `None` for anything else.
pub fn parse_callback_request(request: &str) -> Option<CallbackRequest> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let mut params = CallbackParams::default();
    for (key, value) in parse_query(query) {
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "code" => params.code = Some(value),
            "state" => params.state = Some(value),
            "error" => params.error = Some(value),
            _ => {}
        }
    }

    Some(CallbackRequest {
        path: path.to_string(),
        params,
    })
}

/// Path component of a redirect URI (`https://host/cb?x` → `/cb`).
pub fn callback_path(redirect_uri: &str) -> String {
    let without_scheme = redirect_uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(redirect_uri);
    let path = without_scheme
        .find('/')
        .map(|i| &without_scheme[i..])
        .unwrap_or("/");
    let path = path.split(['?', '#']).next().unwrap_or("/");
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn render(handled: &Handled) -> (&'static str, &'static str, String) {
    match handled {
        Handled::Resumed(_) => (
            "200 OK",
            "text/html",
            page(
                "Authorization complete",
                "You can close this window and return to the conversation.",
            ),
        ),
        Handled::Failed(RelayError::UnknownCorrelation(_)) => (
            "200 OK",
            "text/html",
            page(
                "Authorization complete",
                "Access was granted, but the original request has expired. Please ask again.",
            ),
        ),
        Handled::Declined(_) => (
            "200 OK",
            "text/html",
            page("Authorization declined", "No access was granted."),
        ),
        Handled::Failed(e) => {
            let status = match e {
                RelayError::TokenExchange(_) | RelayError::Timeout { .. } => "502 Bad Gateway",
                _ => "400 Bad Request",
            };
            (status, "application/json", e.to_json().to_string())
        }
        Handled::Ignored => ("404 Not Found", "text/plain", "Not Found".to_string()),
    }
}

fn page(title: &str, message: &str) -> String {
    format!("<!DOCTYPE html><html><body><h1>{title}</h1><p>{message}</p></body></html>")
}
