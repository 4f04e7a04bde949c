//! Connectivity tracking.
//!
//! The engine only reacts to reported path changes. Platforms with a native
//! path monitor feed it directly; elsewhere [`HttpReachabilityProbe`] polls
//! the backend and reports edges.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::BackendResult;
use crate::config::BackendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathTransition {
    CameOnline,
    WentOffline,
    Unchanged,
}

#[derive(Debug, Default)]
pub(crate) struct NetworkMonitor {
    online: AtomicBool,
}

impl NetworkMonitor {
    pub(crate) fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub(crate) fn record(&self, online: bool) -> PathTransition {
        match (self.online.swap(online, Ordering::SeqCst), online) {
            (false, true) => PathTransition::CameOnline,
            (true, false) => PathTransition::WentOffline,
            _ => PathTransition::Unchanged,
        }
    }
}

/// Reports whether the backend answers HTTP at all.
#[derive(Debug, Clone)]
pub struct HttpReachabilityProbe {
    client: Client,
    url: String,
    anon_key: String,
    interval: Duration,
}

impl HttpReachabilityProbe {
    pub fn new(config: &BackendConfig, interval: Duration) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(interval.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/", config.rest_url()),
            anon_key: config.supabase_anon_key.clone(),
            interval,
        })
    }

    /// Any HTTP response counts as reachable; only transport errors do not.
    pub async fn check(&self) -> bool {
        match self
            .client
            .head(&self.url)
            .header("apikey", &self.anon_key)
            .send()
            .await
        {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(%error, "Backend unreachable");
                false
            }
        }
    }

    /// Poll forever, publishing only changes.
    pub fn spawn(self, tx: watch::Sender<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                let reachable = self.check().await;
                tx.send_if_modified(|current| {
                    let changed = *current != reachable;
                    *current = reachable;
                    changed
                });
                if tx.is_closed() {
                    break;
                }
            }
        })
    }
}
