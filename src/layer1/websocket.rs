// WebSocket Client for the live minute-aggregate stream
// connect -> auth -> subscribe -> lazily yield text messages

use futures::{SinkExt, Stream, StreamExt};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::core::ConnectionStatus;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed: {0}")]
    Closed(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => StreamError::Closed(e.to_string()),
            other => StreamError::Transport(other.to_string()),
        }
    }
}

// ============================================================================
// Protocol Messages
// ============================================================================

/// Authentication message, sent first after the socket opens
pub fn create_auth_message(api_key: &str) -> String {
    serde_json::json!({
        "action": "auth",
        "params": api_key,
    }).to_string()
}

/// Subscription message for a channel pattern such as `AM.*`
pub fn create_subscribe_message(channels: &str) -> String {
    serde_json::json!({
        "action": "subscribe",
        "params": channels,
    }).to_string()
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct WebSocketStats {
    pub state: ConnectionStatus,
    pub message_count: u64,
    pub error_count: u64,
}

impl fmt::Display for WebSocketStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WebSocketStats(state={:?}, messages={}, errors={})",
               self.state, self.message_count, self.error_count)
    }
}

// ============================================================================
// Stream Client
// ============================================================================

/// Factory for authenticated, subscribed stream connections
pub struct StreamClient {
    url: String,
    api_key: String,
    subscription: String,
    connect_timeout: Duration,

    state: Arc<RwLock<ConnectionStatus>>,
    message_count: Arc<RwLock<u64>>,
    error_count: Arc<RwLock<u64>>,
}

impl StreamClient {
    pub fn new(url: &str, api_key: &str, subscription: &str, connect_timeout_secs: u64) -> Self {
        info!(url = url, subscription = subscription, "Stream client created");

        Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
            subscription: subscription.to_string(),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            state: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            message_count: Arc::new(RwLock::new(0)),
            error_count: Arc::new(RwLock::new(0)),
        }
    }

    pub fn from_config(config: &crate::core::ProviderConfig) -> Self {
        Self::new(
            &config.ws_url,
            &config.api_key,
            &config.subscription,
            config.ws_connect_timeout_secs,
        )
    }

    /// Open the socket, authenticate and subscribe.
    /// The returned connection yields messages until the server closes it.
    pub async fn connect(&self) -> Result<StreamConnection, StreamError> {
        info!(url = %self.url, "Connecting to stream");
        *self.state.write() = ConnectionStatus::Connecting;

        let connected = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await;
        let mut ws = match connected {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                *self.state.write() = ConnectionStatus::Failed;
                *self.error_count.write() += 1;
                return Err(StreamError::Connect(e.to_string()));
            }
            Err(_) => {
                *self.state.write() = ConnectionStatus::Failed;
                *self.error_count.write() += 1;
                return Err(StreamError::Timeout(self.connect_timeout));
            }
        };

        *self.state.write() = ConnectionStatus::Authenticating;
        if let Err(e) = send_handshake(&mut ws, &self.api_key, &self.subscription).await {
            *self.state.write() = ConnectionStatus::Failed;
            *self.error_count.write() += 1;
            return Err(e);
        }

        *self.state.write() = ConnectionStatus::Connected;
        info!(subscription = %self.subscription, "Connected and waiting for data");

        Ok(StreamConnection {
            ws,
            finished: false,
            state: Arc::clone(&self.state),
            message_count: Arc::clone(&self.message_count),
            error_count: Arc::clone(&self.error_count),
        })
    }

    pub fn is_connected(&self) -> bool {
        *self.state.read() == ConnectionStatus::Connected
    }

    pub fn get_stats(&self) -> WebSocketStats {
        WebSocketStats {
            state: *self.state.read(),
            message_count: *self.message_count.read(),
            error_count: *self.error_count.read(),
        }
    }
}

async fn send_handshake(
    ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    api_key: &str,
    subscription: &str,
) -> Result<(), StreamError> {
    ws.send(Message::Text(create_auth_message(api_key))).await?;
    debug!("Auth message sent");
    ws.send(Message::Text(create_subscribe_message(subscription))).await?;
    debug!(subscription = subscription, "Subscribe message sent");
    Ok(())
}

// ============================================================================
// Stream Connection
// ============================================================================

/// Normal closure, going away, or a close frame without a code
fn is_clean_close(frame: Option<&CloseFrame<'_>>) -> bool {
    match frame {
        None => true,
        Some(f) => matches!(f.code, CloseCode::Normal | CloseCode::Away),
    }
}

fn describe_close(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        Some(f) => format!("code {} ({})", u16::from(f.code), f.reason),
        None => "no close frame".to_string(),
    }
}

/// One live connection. Pulling the next message is the only suspension point.
pub struct StreamConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    finished: bool,
    state: Arc<RwLock<ConnectionStatus>>,
    message_count: Arc<RwLock<u64>>,
    error_count: Arc<RwLock<u64>>,
}

impl StreamConnection {
    /// Next text message. `None` once the server has closed the connection
    /// normally (1000, 1001 or no code); `Some(Err(_))` on any other close code
    /// or a transport fault, after which the connection is finished.
    pub async fn next_message(&mut self) -> Option<Result<String, StreamError>> {
        if self.finished {
            return None;
        }

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    *self.message_count.write() += 1;
                    return Some(Ok(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!(bytes = data.len(), "Received unexpected binary message");
                }
                // tungstenite answers pings itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    if is_clean_close(frame.as_ref()) {
                        info!(frame = ?frame, "Stream closed by server");
                        self.finish(ConnectionStatus::Disconnected);
                        return None;
                    }
                    error!(frame = ?frame, "Stream closed unexpectedly");
                    *self.error_count.write() += 1;
                    self.finish(ConnectionStatus::Failed);
                    return Some(Err(StreamError::Closed(describe_close(frame.as_ref()))));
                }
                Some(Err(e)) => {
                    error!(error = %e, "Stream transport error");
                    *self.error_count.write() += 1;
                    self.finish(ConnectionStatus::Failed);
                    return Some(Err(e.into()));
                }
                None => {
                    info!("Stream ended");
                    self.finish(ConnectionStatus::Disconnected);
                    return None;
                }
            }
        }
    }

    fn finish(&mut self, status: ConnectionStatus) {
        self.finished = true;
        *self.state.write() = status;
    }

    /// Adapt into a `futures::Stream` for `StreamPipeline::run`
    pub fn into_stream(self) -> impl Stream<Item = Result<String, StreamError>> + Send {
        futures::stream::unfold(self, |mut conn| async move {
            conn.next_message().await.map(|item| (item, conn))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    #[test]
    fn test_auth_message() {
        let msg = create_auth_message("secret");
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(value["action"], "auth");
        assert_eq!(value["params"], "secret");
    }

    #[test]
    fn test_subscribe_message() {
        let msg = create_subscribe_message("AM.*");
        assert!(msg.contains("\"subscribe\""));
        assert!(msg.contains("AM.*"));
    }

    #[test]
    fn test_client_initial_stats() {
        let client = StreamClient::new("ws://127.0.0.1:1", "k", "AM.*", 1);
        let stats = client.get_stats();
        assert_eq!(stats.state, ConnectionStatus::Disconnected);
        assert_eq!(stats.message_count, 0);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = StreamClient::new(&format!("ws://{}", addr), "k", "AM.*", 2);
        let result = client.connect().await;
        assert!(matches!(result, Err(StreamError::Connect(_))));
        assert_eq!(client.get_stats().state, ConnectionStatus::Failed);
    }

    #[tokio::test]
    async fn test_handshake_order_and_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (handshake_tx, handshake_rx) = oneshot::channel::<Vec<String>>();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut server = tokio_tungstenite::accept_async(socket).await.unwrap();

            let mut received = Vec::new();
            while received.len() < 2 {
                match server.next().await {
                    Some(Ok(Message::Text(text))) => received.push(text),
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
            let _ = handshake_tx.send(received);

            server
                .send(Message::Text(r#"[{"ev":"status","status":"auth_success"}]"#.to_string()))
                .await
                .unwrap();
            server.send(Message::Ping(vec![1, 2, 3])).await.unwrap();
            server
                .send(Message::Text(r#"[{"ev":"AM","sym":"AAPL","c":106.0,"v":1500000}]"#.to_string()))
                .await
                .unwrap();
            server.close(None).await.unwrap();
        });

        let client = StreamClient::new(&format!("ws://{}", addr), "secret", "AM.*", 5);
        let conn = client.connect().await.unwrap();
        assert!(client.is_connected());

        let messages: Vec<Result<String, StreamError>> = conn.into_stream().collect().await;
        assert_eq!(messages.len(), 2);
        assert!(messages[0].as_ref().unwrap().contains("auth_success"));
        assert!(messages[1].as_ref().unwrap().contains("\"AAPL\""));

        let handshake = handshake_rx.await.unwrap();
        assert_eq!(handshake.len(), 2);
        assert!(handshake[0].contains("\"auth\""));
        assert!(handshake[0].contains("secret"));
        assert!(handshake[1].contains("\"subscribe\""));
        assert!(handshake[1].contains("AM.*"));

        let stats = client.get_stats();
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.state, ConnectionStatus::Disconnected);
    }

    enum Ending {
        Close(Option<CloseFrame<'static>>),
        DropSocket,
    }

    /// Server that accepts auth + subscribe, sends `texts`, then ends as told
    async fn serve_and_end(texts: Vec<&'static str>, ending: Ending) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut server = tokio_tungstenite::accept_async(socket).await.unwrap();

            let mut handshake = 0;
            while handshake < 2 {
                match server.next().await {
                    Some(Ok(Message::Text(_))) => handshake += 1,
                    Some(Ok(_)) => continue,
                    _ => return,
                }
            }
            for text in texts {
                server.send(Message::Text(text.to_string())).await.unwrap();
            }
            match ending {
                Ending::Close(frame) => {
                    let _ = server.close(frame).await;
                    // drain until the client acknowledges
                    while let Some(Ok(_)) = server.next().await {}
                }
                Ending::DropSocket => drop(server),
            }
        });

        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_abnormal_close_code_is_error() {
        let url = serve_and_end(
            vec![r#"[{"ev":"status","status":"auth_failed","message":"authentication failed"}]"#],
            Ending::Close(Some(CloseFrame { code: CloseCode::Error, reason: "internal error".into() })),
        )
        .await;

        let client = StreamClient::new(&url, "bad-key", "AM.*", 5);
        let conn = client.connect().await.unwrap();
        let messages: Vec<Result<String, StreamError>> = conn.into_stream().collect().await;

        assert_eq!(messages.len(), 2);
        assert!(messages[0].as_ref().unwrap().contains("auth_failed"));
        match &messages[1] {
            Err(StreamError::Closed(reason)) => assert!(reason.contains("1011")),
            other => panic!("expected close error, got {:?}", other),
        }

        let stats = client.get_stats();
        assert_eq!(stats.state, ConnectionStatus::Failed);
        assert_eq!(stats.error_count, 1);
    }

    #[tokio::test]
    async fn test_going_away_close_is_clean() {
        let url = serve_and_end(
            Vec::new(),
            Ending::Close(Some(CloseFrame { code: CloseCode::Away, reason: "restart".into() })),
        )
        .await;

        let client = StreamClient::new(&url, "k", "AM.*", 5);
        let conn = client.connect().await.unwrap();
        let messages: Vec<Result<String, StreamError>> = conn.into_stream().collect().await;

        assert!(messages.is_empty());
        assert_eq!(client.get_stats().state, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_dropped_socket_is_transport_error() {
        let url = serve_and_end(
            vec![r#"[{"ev":"AM","sym":"AAPL","c":106.0,"v":1500000}]"#],
            Ending::DropSocket,
        )
        .await;

        let client = StreamClient::new(&url, "k", "AM.*", 5);
        let conn = client.connect().await.unwrap();
        let messages: Vec<Result<String, StreamError>> = conn.into_stream().collect().await;

        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_ok());
        assert!(matches!(messages[1], Err(StreamError::Transport(_)) | Err(StreamError::Closed(_))));
        assert_eq!(client.get_stats().state, ConnectionStatus::Failed);
    }

    #[test]
    fn test_close_classification() {
        assert!(is_clean_close(None));
        assert!(is_clean_close(Some(&CloseFrame { code: CloseCode::Normal, reason: "".into() })));
        assert!(!is_clean_close(Some(&CloseFrame { code: CloseCode::Policy, reason: "".into() })));
    }
}
