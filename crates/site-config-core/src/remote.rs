//! Remote configuration store boundary.
//!
//! The sync layer only needs three capabilities from the hosted backend:
//! read the single configuration row, upsert it, and subscribe to its change
//! feed.  [`RemoteStore`] captures that contract so the service can be
//! exercised against scripted stores in tests; [`HttpRemoteStore`] is the
//! production implementation speaking HTTP for request/response calls and a
//! websocket for the change feed.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::{
        header::{HeaderName as WsHeaderName, HeaderValue as WsHeaderValue},
        Request as WsRequest,
    },
    Message as WsMessage,
};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Path prefix for configuration row reads and writes.
const CONFIG_ENDPOINT: &str = "/api/v1/site-config";
/// Suffix appended to the row path for the change-feed websocket.
const FEED_SUFFIX: &str = "/feed";
/// Maximum time to wait for the feed's subscription acknowledgment.
const FEED_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Error taxonomy for remote store interactions.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials were rejected by the backend.
    #[error("unauthorized - invalid API key for the configuration backend")]
    Unauthorized,
    /// Request failed due to proxy or malformed input (4xx excluding 401/404).
    #[error("proxy error or malformed request: status {0}")]
    Proxy(u16),
    /// Backend reported a temporary outage (5xx).
    #[error("transient backend error: status {0}")]
    Retryable(u16),
    /// The provided URL violates the required transport policy.
    #[error("insecure base url requires explicit opt-in: {0}")]
    InsecureUrl(String),
    /// Transport-level issue (DNS, TLS, socket, etc.).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Response payload could not be decoded as JSON.
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
    /// Websocket-level failure on the change feed.
    #[error("change feed error: {0}")]
    Feed(String),
    /// The feed connected but never acknowledged the subscription.
    #[error("change feed handshake failed: {0}")]
    FeedHandshake(String),
}

/// Kind of change reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The configuration row was created.
    Insert,
    /// The configuration row was updated.
    Update,
}

/// One change-feed notification carrying the new row payload.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Whether the row was inserted or updated.
    pub kind: ChangeKind,
    /// The new row payload as stored by the backend.
    pub row: Value,
}

/// Read/write/subscribe contract against the hosted configuration backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads the configuration row stored under `key` (`None` when absent).
    async fn fetch_row(&self, key: &str) -> Result<Option<Value>, RemoteError>;

    /// Creates or replaces the configuration row stored under `key`.
    async fn upsert_row(&self, key: &str, row: &Value) -> Result<(), RemoteError>;

    /// Opens a change feed filtered to `key`.
    ///
    /// The returned future resolves only after the backend acknowledges the
    /// subscription, so a successful return means the feed is live.
    async fn open_feed(&self, key: &str) -> Result<Box<dyn ChangeFeed>, RemoteError>;
}

/// A live change-feed connection.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Waits for the next change notification.
    ///
    /// `Ok(None)` signals a clean close of the feed; callers should treat it
    /// like a transport failure and reconnect.
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>, RemoteError>;
}

/// Additional options governing how the HTTP client is constructed.
#[derive(Debug, Clone, Copy)]
pub struct RemoteStoreOptions {
    /// Whether plaintext (HTTP) endpoints are allowed.
    pub allow_plaintext: bool,
    /// Whether TLS certificate validation should be skipped.
    pub accept_invalid_certs: bool,
}

impl Default for RemoteStoreOptions {
    fn default() -> Self {
        Self {
            allow_plaintext: false,
            accept_invalid_certs: false,
        }
    }
}

/// Production remote store speaking HTTP + websocket to the hosted backend.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    /// Underlying HTTP client (shared across requests).
    client: Client,
    /// Backend base URL (scheme + host).
    base_url: String,
    /// Headers attached to every request, including the API key.
    headers: HeaderMap,
}

impl HttpRemoteStore {
    /// Builds a remote store for the given backend URL and API key.
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        app_version: &str,
        options: RemoteStoreOptions,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.into();
        // Guard against accidentally pointing the portal at plaintext endpoints
        // unless the caller explicitly opted in via `allow_plaintext`.
        if !options.allow_plaintext && base_url.starts_with("http://") {
            return Err(RemoteError::InsecureUrl(base_url));
        }

        let mut headers = HeaderMap::new();
        let user_agent = format!("wayfarer-portal/{}", app_version);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent).map_err(|_| RemoteError::Proxy(400))?,
        );
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Api-Key",
            HeaderValue::from_str(api_key).map_err(|_| RemoteError::Proxy(400))?,
        );

        let client = Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(RemoteError::Transport)?;

        Ok(Self {
            client,
            base_url,
            headers,
        })
    }

    /// Returns the base URL currently configured for the store.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Internal helper: sends the request and classifies the HTTP status.
    async fn send_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "site-config HTTP request");

        let builder = self
            .client
            .request(method, &url)
            .headers(self.headers.clone());
        let builder = match body {
            Some(bytes) => builder.body(bytes),
            None => builder,
        };
        let response = builder.send().await?;

        let status = response.status();
        debug!(url = %url, status = %status, "site-config HTTP response");
        classify_status(status)?;
        Ok(response)
    }

    /// Builds the websocket request for the change feed, carrying credentials.
    fn feed_request(&self, key: &str) -> Result<WsRequest<()>, RemoteError> {
        let mut base =
            Url::parse(&self.base_url).map_err(|err| RemoteError::Feed(err.to_string()))?;
        let target_scheme = match base.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        base.set_scheme(target_scheme)
            .map_err(|_| RemoteError::Feed("invalid feed scheme".into()))?;
        base.set_path(&format!("{CONFIG_ENDPOINT}/{key}{FEED_SUFFIX}"));
        base.set_query(None);
        base.set_fragment(None);

        let mut request = base
            .into_client_request()
            .map_err(|err| RemoteError::Feed(err.to_string()))?;
        {
            let request_headers = request.headers_mut();
            // Propagate the HTTP credential headers through the websocket
            // handshake so the feed endpoint can authorise the subscription.
            for (name, value) in self.headers.iter() {
                let header_name = WsHeaderName::from_bytes(name.as_str().as_bytes())
                    .map_err(|_| RemoteError::Proxy(400))?;
                let header_value = WsHeaderValue::from_bytes(value.as_bytes())
                    .map_err(|_| RemoteError::Proxy(400))?;
                request_headers.append(header_name, header_value);
            }
        }
        Ok(request)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_row(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        let path = format!("{CONFIG_ENDPOINT}/{key}");
        let response = match self.send_request(Method::GET, &path, None).await {
            Ok(response) => response,
            Err(RemoteError::Proxy(404)) => {
                // A missing row is a normal cold-start condition, not an error.
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let bytes = response.bytes().await?;
        let row: Value = serde_json::from_slice(&bytes)?;
        Ok(Some(row))
    }

    async fn upsert_row(&self, key: &str, row: &Value) -> Result<(), RemoteError> {
        let path = format!("{CONFIG_ENDPOINT}/{key}");
        let body = serde_json::to_vec(row)?;
        self.send_request(Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    async fn open_feed(&self, key: &str) -> Result<Box<dyn ChangeFeed>, RemoteError> {
        let request = self.feed_request(key)?;
        let (mut stream, _) = connect_async(request)
            .await
            .map_err(|err| RemoteError::Feed(err.to_string()))?;

        // The backend confirms the subscription with a `subscribed` frame;
        // only then is the feed considered live.
        let ack = timeout(FEED_ACK_TIMEOUT, stream.next())
            .await
            .map_err(|_| RemoteError::FeedHandshake("timed out waiting for ack".into()))?;
        match ack {
            Some(Ok(WsMessage::Text(text))) => {
                let frame: Value = serde_json::from_str(&text)
                    .map_err(|err| RemoteError::FeedHandshake(err.to_string()))?;
                if frame.get("type").and_then(Value::as_str) != Some("subscribed") {
                    return Err(RemoteError::FeedHandshake(format!(
                        "unexpected frame: {text}"
                    )));
                }
            }
            Some(Ok(other)) => {
                return Err(RemoteError::FeedHandshake(format!(
                    "unexpected frame type: {other:?}"
                )));
            }
            Some(Err(err)) => return Err(RemoteError::FeedHandshake(err.to_string())),
            None => {
                return Err(RemoteError::FeedHandshake(
                    "feed closed before acknowledgment".into(),
                ))
            }
        }

        Ok(Box::new(WebsocketFeed { stream }))
    }
}

/// Change feed backed by a live websocket connection.
struct WebsocketFeed {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChangeFeed for WebsocketFeed {
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>, RemoteError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    match parse_event(&text) {
                        Some(event) => return Ok(Some(event)),
                        None => {
                            // Unknown frame types (heartbeats and the like)
                            // are skipped rather than treated as failures.
                            debug!("site-config: ignoring unrecognised feed frame");
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    self.stream
                        .send(WsMessage::Pong(payload))
                        .await
                        .map_err(|err| RemoteError::Feed(err.to_string()))?;
                }
                Some(Ok(WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Binary(_))) | Some(Ok(WsMessage::Frame(_))) => {
                    debug!("site-config: ignoring non-text feed frame");
                }
                Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
                Some(Err(err)) => return Err(RemoteError::Feed(err.to_string())),
            }
        }
    }
}

/// Parses a change notification frame, returning `None` for non-event frames.
fn parse_event(text: &str) -> Option<ChangeEvent> {
    let frame: Value = serde_json::from_str(text).ok()?;
    let kind = match frame.get("type").and_then(Value::as_str)? {
        "insert" => ChangeKind::Insert,
        "update" => ChangeKind::Update,
        _ => return None,
    };
    let row = frame.get("row")?.clone();
    Some(ChangeEvent { kind, row })
}

/// Maps an HTTP status to the remote error taxonomy.
fn classify_status(status: StatusCode) -> Result<(), RemoteError> {
    if status.is_success() {
        return Ok(());
    }
    match status.as_u16() {
        401 => Err(RemoteError::Unauthorized),
        code if (400..500).contains(&code) => Err(RemoteError::Proxy(code)),
        code => Err(RemoteError::Retryable(code)),
    }
}
