//! Host signal routing.
//!
//! [`ChangeNotifier`] owns the real-time change subscription and turns host
//! events (connectivity, lifecycle, a periodic timer) into engine triggers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::db::{MutationQueue, NoteStore};
use crate::models::ChangeEvent;
use crate::remote::{ChangeSubscription, RemoteStore};
use crate::sync::SyncEngine;

/// Event raised by the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    Online,
    Offline,
    /// The platform asked for a background sync
    BackgroundSyncRequested,
    /// The app became visible again
    Foreground,
    Shutdown,
}

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Interval of the backstop sync timer; values under a millisecond are
    /// raised to one
    pub tick_interval: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
        }
    }
}

/// Routes host signals and remote changes into a [`SyncEngine`]
pub struct ChangeNotifier;

impl ChangeNotifier {
    /// Start the notifier loop on the current tokio runtime
    pub fn spawn<R, S>(engine: Arc<SyncEngine<R, S>>, config: NotifierConfig) -> NotifierHandle
    where
        R: RemoteStore,
        S: NoteStore + MutationQueue + Send + Sync + 'static,
    {
        let (sender, signals) = mpsc::unbounded_channel();
        let join = tokio::spawn(run(engine, signals, config));
        NotifierHandle { sender, join }
    }
}

/// Handle to a running notifier.
///
/// The loop exits on [`HostSignal::Shutdown`] or once every sender is dropped.
#[derive(Debug)]
pub struct NotifierHandle {
    sender: mpsc::UnboundedSender<HostSignal>,
    join: JoinHandle<()>,
}

impl NotifierHandle {
    /// Deliver a host signal; `false` once the loop has exited
    pub fn send(&self, signal: HostSignal) -> bool {
        self.sender.send(signal).is_ok()
    }

    /// A sender for host adapters living elsewhere
    pub fn sender(&self) -> mpsc::UnboundedSender<HostSignal> {
        self.sender.clone()
    }

    /// Stop the loop and wait for it to tear down
    pub async fn shutdown(self) {
        let _ = self.sender.send(HostSignal::Shutdown);
        if let Err(error) = self.join.await {
            tracing::warn!("Change notifier task failed: {}", error);
        }
    }
}

async fn run<R, S>(
    engine: Arc<SyncEngine<R, S>>,
    mut signals: mpsc::UnboundedReceiver<HostSignal>,
    config: NotifierConfig,
) where
    R: RemoteStore,
    S: NoteStore + MutationQueue + Send + Sync + 'static,
{
    let mut subscription = None;
    if engine.is_online() {
        subscription = subscribe(&engine).await;
        engine.request_sync();
    }

    // `interval_at` rejects a zero period.
    let period = config.tick_interval.max(MIN_TICK_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Some(HostSignal::Online) => {
                    engine.on_connectivity_changed(true);
                    if subscription.is_none() {
                        subscription = subscribe(&engine).await;
                    }
                }
                Some(HostSignal::Offline) => {
                    subscription = None;
                    engine.on_connectivity_changed(false);
                }
                Some(HostSignal::BackgroundSyncRequested | HostSignal::Foreground) => {
                    engine.request_sync();
                }
                Some(HostSignal::Shutdown) | None => break,
            },
            event = next_change(&mut subscription) => match event {
                Some(event) => {
                    let kind = event.kind();
                    if let Err(error) = engine.on_remote_change(event) {
                        tracing::warn!("Failed to apply remote {} event: {}", kind, error);
                    }
                }
                None => {
                    tracing::debug!("Remote change feed closed");
                    subscription = None;
                }
            },
            _ = ticker.tick() => engine.on_timer_tick(),
        }
    }

    drop(subscription);
    tracing::debug!("Change notifier stopped");
}

async fn subscribe<R, S>(engine: &SyncEngine<R, S>) -> Option<ChangeSubscription>
where
    R: RemoteStore,
    S: NoteStore + MutationQueue + Send + Sync + 'static,
{
    let Some(user) = engine.remote().current_user_id().await else {
        tracing::debug!("No signed-in user; real-time changes disabled");
        return None;
    };

    match engine.remote().subscribe_changes(&user).await {
        Ok(subscription) => Some(subscription),
        Err(error) => {
            tracing::warn!("Failed to subscribe to remote changes: {}", error);
            None
        }
    }
}

async fn next_change(subscription: &mut Option<ChangeSubscription>) -> Option<ChangeEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
