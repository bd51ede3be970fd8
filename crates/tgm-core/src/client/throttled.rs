use std::sync::Arc;

use crate::{
    client::{
        port::RemoteClient,
        types::{ChannelRef, RawMessage, RpcRequest, RpcResponse},
    },
    ratelimit::WindowLimiter,
    Result,
};

/// RemoteClient decorator that takes a rate-limit slot before every data call.
///
/// Session management calls (connect, authorization checks) pass straight
/// through; entity resolution, message pages and raw RPC calls each consume
/// one slot of the shared window.
pub struct ThrottledClient {
    inner: Arc<dyn RemoteClient>,
    limiter: Arc<WindowLimiter>,
}

impl ThrottledClient {
    pub fn new(inner: Arc<dyn RemoteClient>, limiter: Arc<WindowLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait::async_trait]
impl RemoteClient for ThrottledClient {
    async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn is_authorized(&self) -> Result<bool> {
        self.inner.is_authorized().await
    }

    fn session_token(&self) -> Option<String> {
        self.inner.session_token()
    }

    async fn resolve_entity(&self, name: &str) -> Result<ChannelRef> {
        self.limiter.acquire().await;
        self.inner.resolve_entity(name).await
    }

    async fn fetch_messages(&self, channel: &ChannelRef, limit: usize) -> Result<Vec<RawMessage>> {
        self.limiter.acquire().await;
        self.inner.fetch_messages(channel, limit).await
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        self.limiter.acquire().await;
        self.inner.call(request).await
    }
}
