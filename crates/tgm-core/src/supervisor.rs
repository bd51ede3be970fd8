//! Owner of the process-wide remote client connection.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{client::port::RemoteClient, Error, Result};

#[derive(Clone, Debug, Serialize)]
pub struct SupervisorStatus {
    pub started: bool,
    pub connected: bool,
    pub session_file: String,
}

/// Single connection per process. Connect and reconnect go through one async
/// mutex so concurrent requests never race two handshakes.
pub struct ClientSupervisor {
    client: Arc<dyn RemoteClient>,
    session_file: PathBuf,
    connect_lock: Mutex<()>,
    started: AtomicBool,
}

impl ClientSupervisor {
    pub fn new(client: Arc<dyn RemoteClient>, session_file: impl Into<PathBuf>) -> Self {
        Self {
            client,
            session_file: session_file.into(),
            connect_lock: Mutex::new(()),
            started: AtomicBool::new(false),
        }
    }

    /// Connect and verify authorization. An unauthorized session is fatal.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;

        self.client.connect().await?;
        if !self.client.is_authorized().await? {
            let _ = self.client.disconnect().await;
            return Err(Error::Auth(
                "session is not authorized; provide SESSION_STRING or sign in through the gateway"
                    .to_string(),
            ));
        }

        if let Some(token) = self.client.session_token() {
            if let Err(e) = save_session_token(&self.session_file, &token) {
                warn!(path = %self.session_file.display(), error = %e, "Failed to persist session");
            }
        }

        self.started.store(true, Ordering::SeqCst);
        info!("Remote client connected and authorized");
        Ok(())
    }

    /// Reconnect if the connection dropped since `start`.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.client.is_connected() {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;
        // Another caller may have reconnected while we waited.
        if self.client.is_connected() {
            return Ok(());
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::Auth("client supervisor not started".to_string()));
        }

        warn!("Remote client disconnected, reconnecting");
        self.client.connect().await
    }

    pub async fn stop(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        self.started.store(false, Ordering::SeqCst);
        if self.client.is_connected() {
            self.client.disconnect().await?;
        }
        info!("Remote client disconnected");
        Ok(())
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            started: self.started.load(Ordering::SeqCst),
            connected: self.client.is_connected(),
            session_file: self.session_file.display().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SessionFileData {
    session: String,
    saved_at: String,
}

/// Read a previously saved session token. A missing or empty file is `None`.
pub fn load_session_token(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    let data: SessionFileData = serde_json::from_str(&txt)?;
    Ok(Some(data.session).filter(|s| !s.is_empty()))
}

pub fn save_session_token(path: &Path, token: &str) -> Result<()> {
    let data = SessionFileData {
        session: token.to_string(),
        saved_at: Utc::now().to_rfc3339(),
    };
    std::fs::write(path, serde_json::to_string(&data)?)?;
    Ok(())
}
