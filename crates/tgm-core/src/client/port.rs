use async_trait::async_trait;

use crate::{
    client::types::{ChannelRef, RawMessage, RpcRequest, RpcResponse},
    Result,
};

/// Hexagonal port for the remote messaging platform.
///
/// Implementations own the session and the auth handshake; they must decode
/// remote payloads into the typed structs in `client::types` and map
/// flood-control signals to `Error::FloodWait`.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    fn is_connected(&self) -> bool;
    async fn is_authorized(&self) -> Result<bool>;

    /// Session token to persist after a successful connect, if the client
    /// issued one.
    fn session_token(&self) -> Option<String>;

    async fn resolve_entity(&self, name: &str) -> Result<ChannelRef>;

    /// Up to `limit` most recent messages, newest first.
    async fn fetch_messages(&self, channel: &ChannelRef, limit: usize) -> Result<Vec<RawMessage>>;

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse>;
}
