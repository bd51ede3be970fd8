//! `RemoteClient` adapter over an HTTP/JSON MTProto session gateway.
//!
//! The gateway owns the actual MTProto connection (and its auth handshake);
//! this crate only speaks its small JSON API:
//!
//! | method | path                  | body                         |
//! |--------|-----------------------|------------------------------|
//! | POST   | `/session/connect`    | api id/hash, phone, session  |
//! | GET    | `/session/authorized` |                              |
//! | POST   | `/session/disconnect` |                              |
//! | POST   | `/resolve`            | `{username}`                 |
//! | POST   | `/messages`           | `{peer, limit}`              |
//! | POST   | `/invoke`             | `{request}` (raw TL request) |

mod errors;
pub mod wire;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use tgm_core::{
    client::{
        port::RemoteClient,
        types::{ChannelRef, RawMessage, RpcRequest, RpcResponse},
    },
    config::Config,
    Error, Result,
};

use crate::{
    errors::map_gateway_error,
    wire::{
        AuthorizedResponse, ConnectRequest, ConnectResponse, Entity, ErrorBody, InputPeer,
        InvokeEnvelope, InvokeRequest, InvokeResult, Message, MessagesRequest, MessagesResponse,
        ResolveRequest,
    },
};

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub api_id: i32,
    pub api_hash: String,
    pub phone: Option<String>,
    pub session: Option<String>,
}

impl BridgeConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            base_url: cfg.bridge_url.clone(),
            timeout: cfg.bridge_timeout,
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            phone: cfg.phone.clone(),
            session: cfg.session_string.clone(),
        }
    }
}

pub struct BridgeClient {
    cfg: BridgeConfig,
    http: reqwest::Client,
    connected: AtomicBool,
    session: RwLock<Option<String>>,
}

impl BridgeClient {
    pub fn new(cfg: BridgeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::External(format!("bridge client build error: {e}")))?;
        let session = RwLock::new(cfg.session.clone());
        Ok(Self {
            cfg,
            http,
            connected: AtomicBool::new(false),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.cfg.base_url.trim_end_matches('/'))
    }

    async fn post<B, T>(&self, path: &str, body: &B, subject: Option<&str>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(path, e))?;
        decode(resp, subject).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.transport_error(path, e))?;
        decode(resp, None).await
    }

    /// A request that never reached the gateway also means the connection is
    /// gone; the supervisor reconnects on the next call.
    fn transport_error(&self, path: &str, e: reqwest::Error) -> Error {
        if e.is_connect() {
            self.connected.store(false, Ordering::SeqCst);
        }
        Error::External(format!("bridge request {path} failed: {e}"))
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response, subject: Option<&str>) -> Result<T> {
    let status = resp.status();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let text = resp
        .text()
        .await
        .map_err(|e| Error::External(format!("bridge response read error: {e}")))?;

    if !status.is_success() {
        let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| ErrorBody {
            message: Some(text.chars().take(200).collect()),
            ..ErrorBody::default()
        });
        return Err(map_gateway_error(status.as_u16(), retry_after, body, subject));
    }

    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl RemoteClient for BridgeClient {
    async fn connect(&self) -> Result<()> {
        let session = self.session_token();
        let req = ConnectRequest {
            api_id: self.cfg.api_id,
            api_hash: &self.cfg.api_hash,
            phone: self.cfg.phone.as_deref(),
            session: session.as_deref(),
        };
        let resp: ConnectResponse = self.post("/session/connect", &req, None).await?;

        if let Some(token) = resp.session.filter(|s| !s.is_empty()) {
            if let Ok(mut guard) = self.session.write() {
                *guard = Some(token);
            }
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(
            gateway = %self.cfg.base_url,
            authorized = resp.authorized,
            "Connected to session gateway"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let _: serde_json::Value = self
            .post("/session/disconnect", &serde_json::json!({}), None)
            .await?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool> {
        let resp: AuthorizedResponse = self.get("/session/authorized").await?;
        Ok(resp.authorized)
    }

    fn session_token(&self) -> Option<String> {
        self.session.read().ok().and_then(|g| g.clone())
    }

    async fn resolve_entity(&self, name: &str) -> Result<ChannelRef> {
        let entity: Entity = self
            .post("/resolve", &ResolveRequest { username: name }, Some(name))
            .await?;
        entity
            .into_channel_ref(name)
            .ok_or_else(|| Error::ChannelUnavailable {
                channel: name.to_string(),
                reason: "not a channel".to_string(),
            })
    }

    async fn fetch_messages(&self, channel: &ChannelRef, limit: usize) -> Result<Vec<RawMessage>> {
        let req = MessagesRequest {
            peer: InputPeer::channel(channel),
            limit,
        };
        let resp: MessagesResponse = self
            .post("/messages", &req, Some(&channel.username))
            .await?;

        let total = resp.messages.len();
        let out: Vec<RawMessage> = resp
            .messages
            .into_iter()
            .filter_map(|m| match m {
                Message::Message(body) => Some(body.into_raw()),
                Message::MessageService { .. } | Message::Other => None,
            })
            .collect();
        if out.len() < total {
            debug!(
                channel = %channel.username,
                skipped = total - out.len(),
                "Dropped service messages"
            );
        }
        Ok(out)
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        match request {
            RpcRequest::MessageReactions {
                channel,
                message_ids,
            } => {
                let req = InvokeEnvelope {
                    request: InvokeRequest::GetMessagesReactions {
                        peer: InputPeer::channel(&channel),
                        id: message_ids.iter().map(|id| id.0).collect(),
                    },
                };
                let res: InvokeResult = self
                    .post("/invoke", &req, Some(&channel.username))
                    .await?;
                Ok(match res.into_reactions() {
                    Some(all) => RpcResponse::Reactions(all),
                    None => RpcResponse::Unknown("non-updates result".to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tgm_core::domain::{ChannelId, PostId};

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: String) -> BridgeClient {
        BridgeClient::new(BridgeConfig {
            base_url,
            timeout: Duration::from_secs(5),
            api_id: 1,
            api_hash: "hash".into(),
            phone: Some("+1".into()),
            session: None,
        })
        .unwrap()
    }

    fn gateway() -> Router {
        Router::new()
            .route(
                "/session/connect",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["api_id"], 1);
                    Json(json!({"connected": true, "authorized": true, "session": "1BVts..."}))
                }),
            )
            .route(
                "/session/authorized",
                get(|| async { Json(json!({"authorized": true})) }),
            )
            .route(
                "/resolve",
                post(|Json(body): Json<Value>| async move {
                    if body["username"] == "durov" {
                        Ok(Json(json!({
                            "_": "Channel", "id": 1006503122, "title": "Durov's Channel",
                            "username": "durov", "access_hash": 99
                        })))
                    } else {
                        Err((
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": "USERNAME_NOT_OCCUPIED"})),
                        ))
                    }
                }),
            )
            .route(
                "/messages",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["peer"]["_"], "InputPeerChannel");
                    assert_eq!(body["peer"]["access_hash"], 99);
                    Json(json!({"messages": [
                        {"_": "Message", "id": 10, "date": "2025-03-01T12:00:00Z", "message": "hi", "views": 5},
                        {"_": "MessageService", "id": 9, "date": "2025-03-01T11:00:00Z"}
                    ]}))
                }),
            )
            .route(
                "/invoke",
                post(|| async {
                    (
                        StatusCode::from_u16(420).unwrap(),
                        Json(json!({"error": "FLOOD_WAIT_12", "message": "A wait of 12 seconds is required"})),
                    )
                }),
            )
    }

    #[tokio::test]
    async fn speaks_the_gateway_api() {
        let c = client(serve(gateway()).await);

        c.connect().await.unwrap();
        assert!(c.is_connected());
        assert!(c.is_authorized().await.unwrap());
        assert_eq!(c.session_token().as_deref(), Some("1BVts..."));

        let ch = c.resolve_entity("durov").await.unwrap();
        assert_eq!(ch.id, ChannelId(1006503122));
        assert_eq!(ch.title.as_deref(), Some("Durov's Channel"));

        let msgs = c.fetch_messages(&ch, 10).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, PostId(10));
        assert_eq!(msgs[0].views, Some(5));
    }

    #[tokio::test]
    async fn gateway_errors_map_to_core_errors() {
        let c = client(serve(gateway()).await);

        let err = c.resolve_entity("ghost").await.unwrap_err();
        assert!(matches!(err, Error::ChannelUnavailable { ref channel, .. } if channel == "ghost"));

        let ch = ChannelRef {
            id: ChannelId(1),
            username: "durov".into(),
            title: None,
            access_hash: Some(99),
        };
        let err = c
            .call(RpcRequest::MessageReactions {
                channel: ch,
                message_ids: vec![PostId(10)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FloodWait { seconds: 12 }));
    }

    #[tokio::test]
    async fn unreachable_gateway_marks_client_disconnected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let c = client(format!("http://{addr}"));
        c.connected.store(true, Ordering::SeqCst);
        let err = c.is_authorized().await.unwrap_err();
        assert!(matches!(err, Error::External(_)));
        assert!(!c.is_connected());
    }
}
