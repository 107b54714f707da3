//! Background unread-count polling.
//!
//! One task per authenticated session. It polls on a fixed interval
//! (immediately on start), applies each result to the shared
//! `UnreadSnapshot`, and expires toasts. The task ends when the session it
//! was started for ends, or when its `PollerHandle` is dropped.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::auth::{SessionEpoch, SessionSlot};

use super::UnreadSnapshot;

/// Time between unread-count polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(8);

/// How long a toast stays up
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub toast_duration: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            toast_duration: DEFAULT_TOAST_DURATION,
        }
    }
}

/// Changes worth telling the user about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadEvent {
    /// New messages arrived; show a toast
    Toast { count: u64 },
    /// The toast timed out or was dismissed
    ToastCleared,
    /// The badge value changed
    Badge { count: u64 },
}

type PollFuture = Pin<Box<dyn Future<Output = Result<u64, ApiError>> + Send>>;

/// Owns the polling task. Dropping the handle stops it.
pub struct PollerHandle {
    task: JoinHandle<()>,
    snapshot: Arc<watch::Sender<UnreadSnapshot>>,
    events: mpsc::UnboundedSender<UnreadEvent>,
    epoch: SessionEpoch,
}

impl PollerHandle {
    /// Start polling for the current session.
    ///
    /// Returns `None` when nobody is logged in.
    pub fn spawn(
        client: ApiClient,
        config: PollerConfig,
        events: mpsc::UnboundedSender<UnreadEvent>,
    ) -> Option<Self> {
        let session = client.credentials().subscribe();
        let epoch = {
            let slot = session.borrow();
            if !slot.is_active() {
                debug!("No session, not starting unread poller");
                return None;
            }
            slot.epoch
        };

        let (snapshot, _) = watch::channel(UnreadSnapshot::default());
        let snapshot = Arc::new(snapshot);

        let poller = Poller {
            client,
            config,
            epoch,
            snapshot: snapshot.clone(),
            events: events.clone(),
            session,
        };
        let task = tokio::spawn(poller.run());
        info!(interval_secs = config.interval.as_secs(), "Unread poller started");

        Some(Self {
            task,
            snapshot,
            events,
            epoch,
        })
    }

    pub fn snapshot(&self) -> UnreadSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Session this poller belongs to
    pub fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    /// Zero the badge and the toast baseline right away, without waiting
    /// for the next poll.
    pub fn reset(&self) {
        let mut had_badge = false;
        let mut had_toast = false;
        self.snapshot.send_modify(|s| {
            had_badge = s.count > 0;
            had_toast = s.toast_active;
            s.reset();
        });
        if had_toast {
            let _ = self.events.send(UnreadEvent::ToastCleared);
        }
        if had_badge {
            let _ = self.events.send(UnreadEvent::Badge { count: 0 });
        }
        debug!("Unread badge reset");
    }

    pub fn dismiss_toast(&self) {
        if self.snapshot.send_if_modified(UnreadSnapshot::dismiss_toast) {
            let _ = self.events.send(UnreadEvent::ToastCleared);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn shutdown(self) {
        // Drop aborts the task
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Unread poller stopped");
    }
}

struct Poller {
    client: ApiClient,
    config: PollerConfig,
    epoch: SessionEpoch,
    snapshot: Arc<watch::Sender<UnreadSnapshot>>,
    events: mpsc::UnboundedSender<UnreadEvent>,
    session: watch::Receiver<SessionSlot>,
}

impl Poller {
    async fn run(mut self) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: Option<(PollFuture, u64)> = None;
        let mut toast_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                changed = self.session.changed() => {
                    if changed.is_err() || !self.session_valid() {
                        info!("Session ended, stopping unread poller");
                        break;
                    }
                }

                result = wait_in_flight(&mut in_flight) => {
                    let generation = in_flight.take().map(|(_, g)| g).unwrap_or_default();
                    if !self.session_valid() {
                        debug!("Discarding poll result from ended session");
                        break;
                    }
                    if self.apply(result, generation) {
                        toast_deadline = Some(Instant::now() + self.config.toast_duration);
                    }
                }

                _ = wait_deadline(toast_deadline) => {
                    toast_deadline = None;
                    if self.snapshot.send_if_modified(UnreadSnapshot::dismiss_toast) {
                        let _ = self.events.send(UnreadEvent::ToastCleared);
                    }
                }

                _ = ticker.tick(), if in_flight.is_none() => {
                    if !self.session_valid() {
                        break;
                    }
                    let generation = self.snapshot.borrow().reset_generation;
                    let client = self.client.clone();
                    let poll: PollFuture = Box::pin(async move { client.unread_count().await });
                    in_flight = Some((poll, generation));
                }
            }
        }
    }

    fn session_valid(&self) -> bool {
        let slot = self.session.borrow();
        slot.is_active() && slot.epoch == self.epoch
    }

    /// Apply one poll result. Returns `true` if a toast was raised.
    fn apply(&self, result: Result<u64, ApiError>, generation: u64) -> bool {
        let count = match result {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Unread poll failed");
                return false;
            }
        };

        let mut toast = false;
        let mut badge_changed = false;
        self.snapshot.send_if_modified(|s| {
            if s.reset_generation != generation {
                // The badge was reset while this poll was out
                return false;
            }
            badge_changed = s.count != count;
            toast = s.observe(count, Utc::now());
            true
        });

        if badge_changed {
            let _ = self.events.send(UnreadEvent::Badge { count });
        }
        if toast {
            info!(count, "New unread messages");
            let _ = self.events.send(UnreadEvent::Toast { count });
        }
        toast
    }
}

async fn wait_in_flight(in_flight: &mut Option<(PollFuture, u64)>) -> Result<u64, ApiError> {
    match in_flight {
        Some((poll, _)) => poll.await,
        None => pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
