//! Periodic refresh of every known channel.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{service::MonitorService, Result};

#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub interval: Duration,
    pub limit: usize,
    /// Refreshed on every tick alongside the stored channels.
    pub seed_channels: Vec<String>,
}

#[derive(Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    service: Arc<MonitorService>,
    cfg: PollerConfig,
    state: Mutex<PollerState>,
}

#[derive(Default)]
struct PollerState {
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl Poller {
    pub fn new(service: Arc<MonitorService>, cfg: PollerConfig) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                service,
                cfg,
                state: Mutex::new(PollerState::default()),
            }),
        }
    }

    /// Spawn the loop if it is not already running. The first tick fires
    /// immediately.
    pub async fn start(&self) {
        let mut st = self.inner.state.lock().await;
        if st.task.is_some() {
            return;
        }

        let tok = CancellationToken::new();
        st.cancel = Some(tok.clone());
        let poller = self.clone();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(poller.inner.cfg.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tok.cancelled() => break,
                    _ = tick.tick() => {
                        tokio::select! {
                            _ = tok.cancelled() => break,
                            res = poller.run_once() => {
                                if let Err(e) = res {
                                    warn!(error = %e, "Poll cycle failed");
                                }
                            }
                        }
                    }
                }
            }
        });
        st.task = Some(handle);

        info!(
            interval_secs = self.inner.cfg.interval.as_secs(),
            seeds = self.inner.cfg.seed_channels.len(),
            "Poller started"
        );
    }

    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(tok) = st.cancel.take() {
            tok.cancel();
        }
        if let Some(handle) = st.task.take() {
            let _ = handle.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.task.is_some()
    }

    /// One poll cycle: stored channels plus seeds, deduplicated, in order.
    pub async fn run_once(&self) -> Result<usize> {
        let stored = self.inner.service.list_channels().await?;
        let mut names: Vec<String> = Vec::new();
        // Rows whose handle moved to another channel id keep a parked
        // `name#id` username that no longer resolves.
        for name in stored
            .into_iter()
            .map(|c| c.username)
            .filter(|u| !u.contains('#'))
            .chain(self.inner.cfg.seed_channels.iter().cloned())
        {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                names.push(name);
            }
        }

        if names.is_empty() {
            info!("No channels to poll");
            return Ok(0);
        }

        let report = self
            .inner
            .service
            .refresh_all(&names, self.inner.cfg.limit)
            .await?;
        info!(
            channels = report.channels_attempted(),
            with_posts = report.channels_with_posts(),
            posts = report.total_posts(),
            "Poll cycle finished"
        );
        Ok(report.total_posts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::types::RawMessage,
        pacing::Pacing,
        pipeline::ChannelFetcher,
        domain::{Channel, ChannelId},
        retry::RetryPolicy,
        store::PostStore,
        supervisor::ClientSupervisor,
        testing::{t0, FakeClient, MemoryStore},
        Error,
    };

    async fn service(client: Arc<FakeClient>, store: Arc<MemoryStore>, dir: &tempfile::TempDir) -> Arc<MonitorService> {
        let sup = Arc::new(ClientSupervisor::new(client.clone(), dir.path().join("s")));
        sup.start().await.unwrap();
        let fetcher = ChannelFetcher::new(client, RetryPolicy::flood_control(), Pacing::none());
        Arc::new(MonitorService::new(sup, fetcher, store))
    }

    fn page(ids: &[i64]) -> Vec<RawMessage> {
        ids.iter()
            .map(|&id| {
                let mut m = RawMessage::text(id, t0(), "x");
                m.reactions = Some(vec![]);
                m
            })
            .collect()
    }

    #[tokio::test]
    async fn run_once_refreshes_seeds_and_stored_channels() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            FakeClient::new()
                .with_channel("a", 1, page(&[1]))
                .with_channel("b", 2, page(&[2, 1])),
        );
        let store = Arc::new(MemoryStore::new());
        let svc = service(client.clone(), store.clone(), &dir).await;
        svc.refresh_channel("a", None).await.unwrap();

        let poller = Poller::new(
            svc,
            PollerConfig {
                interval: Duration::from_secs(60),
                limit: 5,
                seed_channels: vec!["b".into(), "a".into()],
            },
        );

        assert_eq!(poller.run_once().await.unwrap(), 3);
        assert_eq!(store.post_count(), 3);
        let polled: Vec<String> = client.fetch_limits().into_iter().skip(1).map(|(c, _)| c).collect();
        assert_eq!(polled, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new().with_channel("a", 1, page(&[1])));
        let store = Arc::new(MemoryStore::new());
        let svc = service(client.clone(), store, &dir).await;

        let poller = Poller::new(
            svc,
            PollerConfig {
                interval: Duration::from_secs(60),
                limit: 5,
                seed_channels: vec!["a".into()],
            },
        );
        poller.start().await;
        assert!(poller.is_running().await);

        tokio::time::sleep(Duration::from_secs(125)).await;
        poller.stop().await;
        assert!(!poller.is_running().await);

        assert_eq!(client.fetch_limits().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_a_cycle_waiting_out_flood_control() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            FakeClient::new()
                .with_channel("a", 1, page(&[1]))
                .with_fetch_error("a", Error::FloodWait { seconds: 100 }),
        );
        let store = Arc::new(MemoryStore::new());
        let svc = service(client.clone(), store.clone(), &dir).await;

        let poller = Poller::new(
            svc,
            PollerConfig {
                interval: Duration::from_secs(600),
                limit: 5,
                seed_channels: vec!["a".into()],
            },
        );
        poller.start().await;
        // First cycle is now sleeping 110s before its retry.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.fetch_limits().len(), 1);

        let before = tokio::time::Instant::now();
        poller.stop().await;
        assert!(tokio::time::Instant::now() - before < Duration::from_secs(1));
        assert!(!poller.is_running().await);
        assert_eq!(store.post_count(), 0);
    }

    #[tokio::test]
    async fn run_once_skips_parked_usernames() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new().with_channel("a", 2, page(&[1])));
        let store = Arc::new(MemoryStore::new());
        let svc = service(client.clone(), store.clone(), &dir).await;
        store
            .upsert_channel(&Channel {
                id: ChannelId(1),
                username: "a".into(),
                title: "old".into(),
                last_updated: t0(),
            })
            .await
            .unwrap();
        svc.refresh_channel("a", None).await.unwrap();

        let poller = Poller::new(
            svc,
            PollerConfig {
                interval: Duration::from_secs(60),
                limit: 5,
                seed_channels: vec![],
            },
        );
        assert_eq!(poller.run_once().await.unwrap(), 1);
        let polled: Vec<String> = client.fetch_limits().into_iter().skip(1).map(|(c, _)| c).collect();
        assert_eq!(polled, vec!["a"]);
    }
}
