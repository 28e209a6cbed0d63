//! Background session renewal.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::session::SessionClient;

/// Periodically extends the session so it doesn't lapse while idle.
///
/// Each tick forces a refresh if tokens are held. Ticks without a session
/// do nothing; the keeper keeps running and picks up a later sign-in.
#[derive(Debug)]
pub struct SessionKeeper {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SessionKeeper {
    /// Start renewing `client`'s session every `interval`.
    ///
    /// The first renewal happens one `interval` from now. Must be called from
    /// inside a tokio runtime.
    #[must_use]
    pub fn spawn(client: SessionClient, interval: Duration) -> Self {
        let (shutdown, rx) = watch::channel(false);
        tracing::info!(interval_secs = interval.as_secs(), "Starting session keeper");
        let task = tokio::spawn(run(client, interval, rx));
        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Whether the renewal loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for it to exit. A renewal already underway
    /// finishes first.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Session keeper task failed");
        }
    }
}

impl Drop for SessionKeeper {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn run(client: SessionClient, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut next_tick = tokio::time::Instant::now() + interval;

    while !*shutdown.borrow() {
        tokio::select! {
            () = tokio::time::sleep_until(next_tick) => {
                async {
                    if client.has_session() {
                        let extended = client.extend_session().await;
                        tracing::debug!(extended, "Session renewal tick");
                    } else {
                        tracing::debug!("No session to renew");
                    }
                }
                .instrument(tracing::debug_span!("session_renewal"))
                .await;
                next_tick = tokio::time::Instant::now() + interval;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!("Session keeper shutting down");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::paths;
    use crate::store::{MemorySessionStore, SessionStore, StoreKeys};
    use crate::testing::{ScriptedTransport, grant, tokens};
    use std::sync::Arc;

    fn signed_in_client(transport: &Arc<ScriptedTransport>) -> SessionClient {
        let store = Arc::new(MemorySessionStore::new());
        store
            .set(
                StoreKeys::TOKENS,
                &serde_json::to_string(&tokens("a1", "r1")).unwrap(),
            )
            .unwrap();
        let client = SessionClient::new(transport.clone(), store);
        client.load();
        client
    }

    #[tokio::test]
    async fn test_renews_on_interval() {
        let transport = ScriptedTransport::new();
        transport.ok(paths::REFRESH, grant("a2", "r2", 3600));
        transport.ok(paths::REFRESH, grant("a3", "r3", 3600));
        let client = signed_in_client(&transport);

        let keeper = SessionKeeper::spawn(client.clone(), Duration::from_millis(20));
        while transport.calls_to(paths::REFRESH) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        keeper.shutdown().await;

        assert_eq!(client.tokens().unwrap().access_token, "a3");
    }

    #[tokio::test]
    async fn test_idle_without_session() {
        let transport = ScriptedTransport::new();
        let client = SessionClient::new(transport.clone(), Arc::new(MemorySessionStore::new()));
        client.load();

        let keeper = SessionKeeper::spawn(client, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(keeper.is_running());
        keeper.shutdown().await;

        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_drop_stops_loop() {
        let transport = ScriptedTransport::new();
        let client = signed_in_client(&transport);

        let keeper = SessionKeeper::spawn(client, Duration::from_millis(10));
        drop(keeper);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(transport.calls_to(paths::REFRESH), 0);
    }
}
