use std::collections::HashMap;

use tokio::sync::watch;
use tokio::task::{Id, JoinSet};

use crate::domain::errors::CourierError;

use super::dispatcher::Dispatcher;
use super::listen_loop;

/// Listener group handle.
/// - one task per channel, each with its own subscription
/// - `join()` resolves with the first failing loop; the rest keep running
///   until the group is dropped, which aborts them and releases their
///   subscriptions
/// - `request_shutdown()` stops loops between messages (in-flight messages finish)
pub struct ListenerGroup {
    shutdown_tx: watch::Sender<bool>,
    tasks: JoinSet<Result<(), CourierError>>,
    channels: HashMap<Id, String>,
}

impl ListenerGroup {
    pub(crate) fn spawn(dispatcher: Dispatcher, channel_ids: Vec<String>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = JoinSet::new();
        let mut channels = HashMap::with_capacity(channel_ids.len());
        for channel_id in channel_ids {
            let d = dispatcher.clone();
            let rx = shutdown_rx.clone();
            let ch = channel_id.clone();

            let handle = tasks.spawn(async move { listen_loop::run(&d, &ch, Some(rx)).await });
            channels.insert(handle.id(), channel_id);
        }

        Self {
            shutdown_tx,
            tasks,
            channels,
        }
    }

    /// Number of loops not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ask every loop to stop after its current message.
    pub fn request_shutdown(&self) {
        // ignore send error: loops may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every loop. Returns the first error any loop produced.
    ///
    /// Cancel-safe: can be raced in `select!` and called again afterwards.
    pub async fn join(&mut self) -> Result<(), CourierError> {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(()))) => {
                    tracing::debug!(channel = self.channel_name(id), "listener finished");
                }
                Ok((id, Err(err))) => {
                    tracing::error!(channel = self.channel_name(id), error = %err, "listener failed");
                    return Err(err);
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    let channel_id = self.channel_name(join_err.id()).to_string();
                    tracing::error!(channel = %channel_id, error = %join_err, "listener panicked");
                    return Err(CourierError::ListenerPanicked {
                        channel_id,
                        message: join_err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Shutdown and wait for all loops.
    pub async fn shutdown_and_join(mut self) -> Result<(), CourierError> {
        self.request_shutdown();
        self.join().await
    }

    /// Abort every loop immediately.
    pub fn abort_all(&mut self) {
        self.tasks.abort_all();
    }

    fn channel_name(&self, id: Id) -> &str {
        self.channels.get(&id).map(String::as_str).unwrap_or("<unknown>")
    }
}

impl std::fmt::Debug for ListenerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGroup")
            .field("channels", &self.channels.values().collect::<Vec<_>>())
            .field("running", &self.tasks.len())
            .finish()
    }
}
