//! Realtime websocket client
//!
//! Joins the bookmarks channel on a Phoenix-style realtime server and
//! forwards row changes for one owner. A lost connection is retried with
//! exponential backoff until the subscription is cancelled.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::message::{ChannelMessage, ServerEvent};
use super::subscription::{OwnerFilter, Subscription, SubscriptionSink, SubscriptionStatus};
use super::ChangeStream;
use crate::backend::{BackendError, BackendResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Default interval between heartbeats
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Time allowed for connecting and joining
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);
const PROTOCOL_VERSION: &str = "1.0.0";

/// Change stream backed by a hosted realtime server
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    /// Websocket URL, e.g. `wss://project.example.co/realtime/v1/websocket`
    url: String,
    api_key: Option<String>,
    access_token: Option<String>,
    heartbeat: Duration,
}

/// Why one connection attempt ended
#[derive(Debug)]
enum Disconnect {
    /// The consumer cancelled; stop for good
    Cancelled,
    /// The connection failed; retry after backoff
    Lost {
        status: SubscriptionStatus,
        reason: String,
        joined: bool,
    },
}

fn lost(status: SubscriptionStatus, reason: impl Into<String>, joined: bool) -> Disconnect {
    Disconnect::Lost {
        status,
        reason: reason.into(),
        joined,
    }
}

impl RealtimeClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: None,
            access_token: None,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }

    /// Project API key, sent as the `apikey` query parameter
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// User access token, sent with the channel join
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval.max(MIN_HEARTBEAT);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Full websocket endpoint including query parameters
    pub fn endpoint(&self) -> BackendResult<Url> {
        let mut url = Url::parse(&self.url).map_err(|e| BackendError::Connection {
            url: self.url.clone(),
            details: e.to_string(),
        })?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(BackendError::Connection {
                url: self.url.clone(),
                details: format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
            });
        }

        {
            let mut query = url.query_pairs_mut();
            if let Some(api_key) = &self.api_key {
                query.append_pair("apikey", api_key);
            }
            query.append_pair("vsn", PROTOCOL_VERSION);
        }

        Ok(url)
    }

    /// Connect, join and listen until cancelled, reconnecting as needed
    async fn run(self, endpoint: Url, filter: OwnerFilter, mut sink: SubscriptionSink) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.connect_and_listen(&endpoint, &filter, &mut sink).await {
                Disconnect::Cancelled => break,
                Disconnect::Lost {
                    status,
                    reason,
                    joined,
                } => {
                    warn!("Realtime channel {}: {}", status, reason);
                    sink.set_status(status);
                    if joined {
                        backoff = INITIAL_BACKOFF;
                    }
                }
            }

            debug!("Reconnecting to {} in {:?}", self.url, backoff);
            tokio::select! {
                _ = sink.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        sink.set_status(SubscriptionStatus::Closed);
        info!("Realtime subscription for {} closed", filter.owner_id());
    }

    async fn connect_and_listen(
        &self,
        endpoint: &Url,
        filter: &OwnerFilter,
        sink: &mut SubscriptionSink,
    ) -> Disconnect {
        debug!("Connecting to {}", self.url);

        let connect = tokio::time::timeout(JOIN_TIMEOUT, connect_async(endpoint.as_str()));
        let ws_stream = tokio::select! {
            _ = sink.cancelled() => return Disconnect::Cancelled,
            result = connect => match result {
                Ok(Ok((ws_stream, _response))) => ws_stream,
                Ok(Err(e)) => {
                    return lost(SubscriptionStatus::ChannelError, format!("connect failed: {}", e), false)
                }
                Err(_) => return lost(SubscriptionStatus::TimedOut, "connect timed out", false),
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let mut next_ref = 0u64;

        // Join
        let join_ref = bump(&mut next_ref);
        let join = ChannelMessage::join(filter, self.access_token.as_deref(), &join_ref);
        if let Err(e) = send(&mut write, &join).await {
            return lost(SubscriptionStatus::ChannelError, e.to_string(), false);
        }

        let deadline = Instant::now() + JOIN_TIMEOUT;
        loop {
            tokio::select! {
                _ = sink.cancelled() => {
                    write.close().await.ok();
                    return Disconnect::Cancelled;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return lost(SubscriptionStatus::TimedOut, "no reply to channel join", false);
                }
                frame = read.next() => {
                    let event = match read_event(frame) {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(reason) => return lost(SubscriptionStatus::ChannelError, reason, false),
                    };
                    match event {
                        ServerEvent::Reply { msg_ref, ok, message } if msg_ref.as_deref() == Some(join_ref.as_str()) => {
                            if ok {
                                break;
                            }
                            let reason = format!("join rejected: {}", message.unwrap_or_default());
                            return lost(SubscriptionStatus::ChannelError, reason, false);
                        }
                        ServerEvent::System { ok: false, message } | ServerEvent::Reply { ok: false, message, .. } => {
                            return lost(SubscriptionStatus::ChannelError, message.unwrap_or_default(), false);
                        }
                        ServerEvent::ChannelError | ServerEvent::ChannelClosed => {
                            return lost(SubscriptionStatus::ChannelError, "channel failed during join", false);
                        }
                        _ => {}
                    }
                }
            }
        }

        info!("Realtime channel SUBSCRIBED for {}", filter.owner_id());
        sink.set_status(SubscriptionStatus::Subscribed);

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending_heartbeat: Option<String> = None;

        loop {
            tokio::select! {
                _ = sink.cancelled() => {
                    let leave = ChannelMessage::leave(&bump(&mut next_ref));
                    send(&mut write, &leave).await.ok();
                    write.close().await.ok();
                    return Disconnect::Cancelled;
                }
                _ = heartbeat.tick() => {
                    if pending_heartbeat.is_some() {
                        return lost(SubscriptionStatus::TimedOut, "heartbeat reply missed", true);
                    }
                    let heartbeat_ref = bump(&mut next_ref);
                    if let Err(e) = send(&mut write, &ChannelMessage::heartbeat(&heartbeat_ref)).await {
                        return lost(SubscriptionStatus::ChannelError, e.to_string(), true);
                    }
                    pending_heartbeat = Some(heartbeat_ref);
                }
                frame = read.next() => {
                    let event = match read_event(frame) {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(reason) => return lost(SubscriptionStatus::ChannelError, reason, true),
                    };
                    match event {
                        ServerEvent::Change(change) => {
                            debug!("Realtime {} for {}", change.kind(), change.id());
                            if !sink.send(change) {
                                return Disconnect::Cancelled;
                            }
                        }
                        ServerEvent::Reply { msg_ref, ok, message } => {
                            if msg_ref.is_some() && msg_ref == pending_heartbeat {
                                pending_heartbeat = None;
                            } else if !ok {
                                warn!(
                                    "Realtime server rejected message {:?}: {}",
                                    msg_ref,
                                    message.unwrap_or_default()
                                );
                            }
                        }
                        ServerEvent::System { ok: true, message } => {
                            debug!("Realtime system: {}", message.unwrap_or_default());
                        }
                        ServerEvent::System { ok: false, message } => {
                            return lost(SubscriptionStatus::ChannelError, message.unwrap_or_default(), true);
                        }
                        ServerEvent::ChannelError => {
                            return lost(SubscriptionStatus::ChannelError, "server reported channel error", true);
                        }
                        ServerEvent::ChannelClosed => {
                            return lost(SubscriptionStatus::ChannelError, "channel closed by server", true);
                        }
                        ServerEvent::Ignored => {}
                    }
                }
            }
        }
    }
}

impl ChangeStream for RealtimeClient {
    fn subscribe(&self, filter: OwnerFilter) -> BackendResult<Subscription> {
        let endpoint = self.endpoint()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            BackendError::Subscription("realtime client requires a Tokio runtime".to_string())
        })?;

        let (subscription, sink) = Subscription::channel();
        runtime.spawn(self.clone().run(endpoint, filter, sink));
        Ok(subscription)
    }
}

fn bump(next_ref: &mut u64) -> String {
    *next_ref += 1;
    next_ref.to_string()
}

async fn send(write: &mut WsWriter, message: &ChannelMessage) -> BackendResult<()> {
    let text = message.encode()?;
    write
        .send(Message::Text(text))
        .await
        .map_err(|e| BackendError::Protocol(format!("send failed: {}", e)))
}

/// Decode one websocket frame
///
/// `Ok(None)` for frames that carry nothing for us, `Err` when the
/// connection is gone.
fn read_event(
    frame: Option<Result<Message, tungstenite::Error>>,
) -> Result<Option<ServerEvent>, String> {
    match frame {
        Some(Ok(Message::Text(text))) => {
            match ChannelMessage::decode(&text).and_then(ChannelMessage::into_server_event) {
                Ok(event) => Ok(Some(event)),
                Err(e) => {
                    warn!("Ignoring undecodable realtime frame: {}", e);
                    Ok(None)
                }
            }
        }
        Some(Ok(Message::Close(_))) | None => Err("connection closed".to_string()),
        Some(Err(e)) => Err(format!("websocket error: {}", e)),
        Some(Ok(_)) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bookmark, ChangeEvent};
    use crate::realtime::SubscriptionUpdate;
    use serde_json::json;
    use tokio::net::TcpListener;

    fn reply_to(message: &ChannelMessage) -> Message {
        let reply = ChannelMessage {
            topic: message.topic.clone(),
            event: "phx_reply".to_string(),
            payload: json!({"status": "ok", "response": {}}),
            msg_ref: message.msg_ref.clone(),
        };
        Message::Text(reply.encode().unwrap())
    }

    async fn wait_for_status(subscription: &mut Subscription, wanted: SubscriptionStatus) {
        let wait = async {
            while let Some(update) = subscription.next().await {
                if update == SubscriptionUpdate::Status(wanted) {
                    return;
                }
            }
            panic!("subscription ended before reaching {}", wanted);
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for status");
    }

    #[test]
    fn test_endpoint_adds_query_parameters() {
        let client = RealtimeClient::new("wss://example.co/realtime/v1/websocket")
            .with_api_key("anon-key");
        let endpoint = client.endpoint().unwrap();

        assert_eq!(endpoint.scheme(), "wss");
        assert_eq!(endpoint.path(), "/realtime/v1/websocket");
        assert_eq!(endpoint.query(), Some("apikey=anon-key&vsn=1.0.0"));
    }

    #[test]
    fn test_endpoint_rejects_http() {
        let client = RealtimeClient::new("https://example.co/realtime");
        assert!(matches!(
            client.endpoint(),
            Err(BackendError::Connection { .. })
        ));
    }

    #[test]
    fn test_heartbeat_has_floor() {
        let client = RealtimeClient::new("ws://localhost").with_heartbeat(Duration::ZERO);
        assert_eq!(client.heartbeat, MIN_HEARTBEAT);
    }

    #[test]
    fn test_subscribe_outside_runtime_fails() {
        let client = RealtimeClient::new("ws://localhost:4000/socket");
        let err = client.subscribe(OwnerFilter::new("alice")).unwrap_err();
        assert!(matches!(err, BackendError::Subscription(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_channel_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RealtimeClient::new(&format!("ws://{}/socket", addr));
        let mut subscription = client.subscribe(OwnerFilter::new("alice")).unwrap();

        wait_for_status(&mut subscription, SubscriptionStatus::ChannelError).await;
        subscription.cancel();
    }

    #[tokio::test]
    async fn test_join_then_receive_change() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bookmark = Bookmark::new("alice", "Example", "https://example.com");
        let record = serde_json::to_value(&bookmark).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let frame = ws.next().await.unwrap().unwrap();
            let join = ChannelMessage::decode(frame.to_text().unwrap()).unwrap();
            assert_eq!(join.event, "phx_join");
            ws.send(reply_to(&join)).await.unwrap();

            let change = ChannelMessage {
                topic: join.topic.clone(),
                event: "postgres_changes".to_string(),
                payload: json!({"data": {"type": "INSERT", "record": record}}),
                msg_ref: None,
            };
            ws.send(Message::Text(change.encode().unwrap())).await.unwrap();

            // Wait for the leave on cancel
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    let message = ChannelMessage::decode(&text).unwrap();
                    if message.event == "phx_leave" {
                        return true;
                    }
                }
            }
            false
        });

        let client = RealtimeClient::new(&format!("ws://{}/socket", addr)).with_api_key("key");
        let mut subscription = client.subscribe(OwnerFilter::new("alice")).unwrap();

        assert_eq!(
            subscription.next().await,
            Some(SubscriptionUpdate::Status(SubscriptionStatus::Subscribed))
        );
        assert_eq!(
            subscription.next().await,
            Some(SubscriptionUpdate::Event(ChangeEvent::Insert(bookmark)))
        );

        subscription.cancel();
        let saw_leave = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(saw_leave);
    }

    #[tokio::test]
    async fn test_missed_heartbeat_reply_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let frame = ws.next().await.unwrap().unwrap();
            let join = ChannelMessage::decode(frame.to_text().unwrap()).unwrap();
            ws.send(reply_to(&join)).await.unwrap();

            // Swallow heartbeats without replying
            while let Some(Ok(_)) = ws.next().await {}
        });

        let client = RealtimeClient::new(&format!("ws://{}/socket", addr))
            .with_heartbeat(Duration::from_millis(50));
        let mut subscription = client.subscribe(OwnerFilter::new("alice")).unwrap();

        wait_for_status(&mut subscription, SubscriptionStatus::Subscribed).await;
        wait_for_status(&mut subscription, SubscriptionStatus::TimedOut).await;
        subscription.cancel();
    }
}
