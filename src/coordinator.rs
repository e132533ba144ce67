//! Keeps a published [`DeviceSnapshot`] in sync with the heater.
//!
//! Every configured device gets its own [`Coordinator`]. It owns a single polling task, so there
//! is never more than one `update` in flight for a device. Each poll is bounded by a timeout
//! strictly shorter than the polling interval, and the next poll is scheduled one interval after
//! the previous one completes.
//!
//! Subscribers never see poll errors as errors. They observe an [`Update`] with the last good
//! snapshot and a flag saying whether the most recent poll succeeded.

use crate::client::{ClientError, HeaterClient};
use crate::snapshot::DeviceSnapshot;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const POLL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub interval: Duration,
    /// How long a single `update` may take before the poll is considered failed.
    pub timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { interval: POLL_INTERVAL, timeout: POLL_TIMEOUT }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.timeout >= self.interval {
            return Err(ConfigError::TimeoutNotShorterThanInterval {
                timeout: self.timeout,
                interval: self.interval,
            });
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the poll interval must not be zero")]
    ZeroInterval,
    #[error("the poll timeout ({timeout:?}) must be shorter than the poll interval ({interval:?})")]
    TimeoutNotShorterThanInterval { timeout: Duration, interval: Duration },
}

#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("could not update the device state")]
    Client(#[source] ClientError),
    #[error("device did not respond within {0:?}")]
    Timeout(Duration),
    #[error("device is offline or returned no data")]
    DeviceOffline,
}

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("invalid polling configuration")]
    Config(#[source] ConfigError),
    #[error("the initial poll of the device failed")]
    InitialPoll(#[source] PollError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Phase {
    Idle,
    Polling,
    Succeeded,
    Failed,
}

/// What happened to a [`Handle::request_refresh`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshRequest {
    /// The polling task has been woken up to poll right away.
    Scheduled,
    /// A poll is already in flight or about to start, its result will be published instead.
    Coalesced,
}

/// The state published to subscribers after every poll.
#[derive(Clone, Debug)]
pub struct Update {
    /// The snapshot from the most recent successful poll.
    ///
    /// A coordinator only exists once a poll has succeeded, so this is always present.
    pub snapshot: Arc<DeviceSnapshot>,
    pub last_update_succeeded: bool,
    /// Why the most recent poll failed, if it did.
    pub error: Option<Arc<PollError>>,
    /// Number of polls completed, including the initial one.
    pub polls: u64,
}

impl Update {
    pub fn is_available(&self) -> bool {
        self.last_update_succeeded && self.snapshot.online
    }
}

struct PollState {
    phase: Phase,
    /// A refresh has been requested and the poll answering it has not started yet.
    refresh_pending: bool,
}

struct Shared<C> {
    client: Arc<C>,
    config: CoordinatorConfig,
    state: Mutex<PollState>,
    refresh: Notify,
    updates: watch::Sender<Update>,
}

pub struct Coordinator<C> {
    handle: Handle<C>,
    task: AbortOnDropHandle<()>,
}

impl<C: HeaterClient + 'static> Coordinator<C> {
    /// Poll the device once and, if that succeeds, start polling it periodically.
    pub async fn setup(client: Arc<C>, config: CoordinatorConfig) -> Result<Self, SetupError> {
        config.validate().map_err(SetupError::Config)?;
        let snapshot = poll(&*client, config.timeout).await.map_err(SetupError::InitialPoll)?;
        info!(device = client.name(), unique_id = %snapshot.unique_id, "initial poll succeeded");
        let (updates, _) = watch::channel(Update {
            snapshot: Arc::new(snapshot),
            last_update_succeeded: true,
            error: None,
            polls: 1,
        });
        let shared = Arc::new(Shared {
            client,
            config,
            state: Mutex::new(PollState { phase: Phase::Idle, refresh_pending: false }),
            refresh: Notify::new(),
            updates,
        });
        let task = AbortOnDropHandle::new(tokio::spawn(run(Arc::clone(&shared))));
        Ok(Self { handle: Handle { shared }, task })
    }

    pub fn handle(&self) -> Handle<C> {
        self.handle.clone()
    }

    /// Stop polling. Any pending timer or in-flight poll is cancelled.
    pub async fn shutdown(self) {
        self.task.abort();
        let _cancelled = self.task.await;
        debug!(device = self.handle.shared.client.name(), "polling stopped");
    }
}

/// A cheap, cloneable view of a [`Coordinator`] for the things that present its data.
pub struct Handle<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Handle<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<C: HeaterClient> Handle<C> {
    pub fn client(&self) -> &Arc<C> {
        &self.shared.client
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.shared.config
    }

    pub fn latest(&self) -> Update {
        self.shared.updates.borrow().clone()
    }

    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        Arc::clone(&self.shared.updates.borrow().snapshot)
    }

    pub fn last_update_succeeded(&self) -> bool {
        self.shared.updates.borrow().last_update_succeeded
    }

    pub fn is_available(&self) -> bool {
        self.shared.updates.borrow().is_available()
    }

    pub fn last_error(&self) -> Option<Arc<PollError>> {
        self.shared.updates.borrow().error.clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock_state().phase
    }

    /// Ask for a poll as soon as possible, without waiting for it.
    pub fn request_refresh(&self) -> RefreshRequest {
        let mut state = self.shared.lock_state();
        if state.phase == Phase::Polling || state.refresh_pending {
            debug!(phase = %state.phase, "refresh request coalesced into the next poll");
            return RefreshRequest::Coalesced;
        }
        state.refresh_pending = true;
        self.shared.refresh.notify_one();
        RefreshRequest::Scheduled
    }

    /// Receive every published [`Update`].
    pub fn subscribe(&self) -> watch::Receiver<Update> {
        self.shared.updates.subscribe()
    }

    /// The current [`Update`] followed by every subsequently published one.
    pub fn updates(&self) -> WatchStream<Update> {
        WatchStream::new(self.subscribe())
    }
}

impl<C: HeaterClient> Shared<C> {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        self.lock_state().phase = phase;
    }

    fn refresh_pending(&self) -> bool {
        self.lock_state().refresh_pending
    }

    async fn poll_and_publish(&self) {
        {
            let mut state = self.lock_state();
            state.phase = Phase::Polling;
            state.refresh_pending = false;
        }
        let device = self.client.name();
        match poll(&*self.client, self.config.timeout).await {
            Ok(snapshot) => {
                self.set_phase(Phase::Succeeded);
                let recovered = !self.updates.borrow().last_update_succeeded;
                if recovered {
                    info!(device, "device is reachable again");
                } else {
                    debug!(device, "poll succeeded");
                }
                self.updates.send_modify(|update| {
                    update.snapshot = Arc::new(snapshot);
                    update.last_update_succeeded = true;
                    update.error = None;
                    update.polls += 1;
                });
            }
            Err(err) => {
                self.set_phase(Phase::Failed);
                warn!(device, ?err, "poll failed, keeping the last known state");
                self.updates.send_modify(|update| {
                    update.last_update_succeeded = false;
                    update.error = Some(Arc::new(err));
                    update.polls += 1;
                });
            }
        }
        self.set_phase(Phase::Idle);
    }
}

async fn run<C: HeaterClient>(shared: Arc<Shared<C>>) {
    let mut next_due = Instant::now() + shared.config.interval;
    loop {
        tokio::select! {
            () = tokio::time::sleep_until(next_due) => {}
            () = shared.refresh.notified() => {
                // A timer poll may have answered the request already, leaving a stale permit.
                if !shared.refresh_pending() {
                    continue;
                }
                debug!("polling ahead of schedule");
            }
        }
        shared.poll_and_publish().await;
        // Scheduling from the completion time keeps slow polls from piling up.
        next_due = Instant::now() + shared.config.interval;
    }
}

async fn poll<C: HeaterClient>(client: &C, timeout: Duration) -> Result<DeviceSnapshot, PollError> {
    match tokio::time::timeout(timeout, client.update()).await {
        Err(_elapsed) => Err(PollError::Timeout(timeout)),
        Ok(Err(err)) => Err(PollError::Client(err)),
        Ok(Ok(())) if !client.is_online() => Err(PollError::DeviceOffline),
        Ok(Ok(())) => Ok(DeviceSnapshot::capture(client)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{Behaviour, FakeClient};
    use crate::registers::{Value, WATER_IN_T};
    use tokio::sync::Semaphore;

    async fn setup() -> (Arc<FakeClient>, Coordinator<FakeClient>) {
        let client = Arc::new(FakeClient::new());
        let coordinator = Coordinator::setup(Arc::clone(&client), CoordinatorConfig::default())
            .await
            .expect("setup");
        (client, coordinator)
    }

    #[test]
    fn config_validation() {
        assert_eq!(CoordinatorConfig::default().validate(), Ok(()));
        let config = CoordinatorConfig { interval: POLL_INTERVAL, timeout: POLL_INTERVAL };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeoutNotShorterThanInterval { .. })
        ));
        let config = CoordinatorConfig { interval: Duration::ZERO, timeout: Duration::ZERO };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
    }

    #[tokio::test(start_paused = true)]
    async fn setup_requires_a_successful_poll() {
        let client = Arc::new(FakeClient::new());
        client.set_behaviour(Behaviour::Fail);
        let result = Coordinator::setup(Arc::clone(&client), CoordinatorConfig::default()).await;
        assert!(matches!(result, Err(SetupError::InitialPoll(PollError::Client(_)))));

        client.set_behaviour(Behaviour::Offline);
        let result = Coordinator::setup(Arc::clone(&client), CoordinatorConfig::default()).await;
        assert!(matches!(result, Err(SetupError::InitialPoll(PollError::DeviceOffline))));

        client.set_behaviour(Behaviour::Hang(Duration::from_secs(60)));
        let result = Coordinator::setup(Arc::clone(&client), CoordinatorConfig::default()).await;
        assert!(matches!(
            result,
            Err(SetupError::InitialPoll(PollError::Timeout(POLL_TIMEOUT)))
        ));

        let config = CoordinatorConfig { interval: POLL_TIMEOUT, timeout: POLL_INTERVAL };
        let result = Coordinator::setup(Arc::clone(&client), config).await;
        assert!(matches!(result, Err(SetupError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval() {
        let (client, coordinator) = setup().await;
        let handle = coordinator.handle();
        assert_eq!(client.update_count(), 1);
        assert!(handle.is_available());
        assert_eq!(handle.phase(), Phase::Idle);

        let start = Instant::now();
        let mut updates = handle.subscribe();
        client.set_status(16, 270);
        updates.changed().await.unwrap();
        assert!(start.elapsed() >= POLL_INTERVAL);
        assert!(start.elapsed() < POLL_INTERVAL + Duration::from_secs(1));
        assert_eq!(client.update_count(), 2);
        let update = updates.borrow_and_update().clone();
        assert_eq!(update.polls, 2);
        assert_eq!(update.snapshot.value(WATER_IN_T), Some(Value::Celsius(27.0)));

        updates.changed().await.unwrap();
        assert!(start.elapsed() >= POLL_INTERVAL * 2);
        assert_eq!(client.update_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_poll_keeps_the_snapshot() {
        let (client, coordinator) = setup().await;
        let handle = coordinator.handle();
        let before = handle.snapshot();
        let mut updates = handle.subscribe();

        client.set_behaviour(Behaviour::Hang(Duration::from_secs(60)));
        client.set_status(16, 300);
        let start = Instant::now();
        updates.changed().await.unwrap();
        assert!(start.elapsed() >= POLL_INTERVAL + POLL_TIMEOUT);
        assert!(!handle.last_update_succeeded());
        assert!(!handle.is_available());
        assert!(Arc::ptr_eq(&before, &handle.snapshot()));
        assert!(matches!(handle.last_error().as_deref(), Some(PollError::Timeout(_))));

        client.set_behaviour(Behaviour::Succeed);
        updates.changed().await.unwrap();
        assert!(handle.last_update_succeeded());
        assert!(handle.is_available());
        assert!(handle.last_error().is_none());
        assert_eq!(handle.snapshot().value(WATER_IN_T), Some(Value::Celsius(30.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_and_offline_polls_are_published() {
        let (client, coordinator) = setup().await;
        let handle = coordinator.handle();
        let before = handle.snapshot();
        let mut updates = handle.subscribe();

        client.set_behaviour(Behaviour::Fail);
        updates.changed().await.unwrap();
        assert!(matches!(handle.last_error().as_deref(), Some(PollError::Client(_))));
        assert!(Arc::ptr_eq(&before, &handle.snapshot()));

        client.set_behaviour(Behaviour::Offline);
        updates.changed().await.unwrap();
        assert!(matches!(handle.last_error().as_deref(), Some(PollError::DeviceOffline)));
        assert!(!handle.is_available());
        assert!(Arc::ptr_eq(&before, &handle.snapshot()));
        assert_eq!(handle.latest().polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_polls_right_away() {
        let (client, coordinator) = setup().await;
        let handle = coordinator.handle();
        let mut updates = handle.subscribe();
        let start = Instant::now();
        assert_eq!(handle.request_refresh(), RefreshRequest::Scheduled);
        updates.changed().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(client.update_count(), 2);

        // The next regular poll is one interval after the refresh.
        updates.changed().await.unwrap();
        assert!(start.elapsed() >= POLL_INTERVAL);
        assert_eq!(client.update_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_refreshes_poll_once() {
        let (client, coordinator) = setup().await;
        let handle = coordinator.handle();
        // Let the polling task park on its timer first.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.request_refresh(), RefreshRequest::Scheduled);
        assert_eq!(handle.request_refresh(), RefreshRequest::Coalesced);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.update_count(), 2);

        // Once answered, the next request polls again.
        assert_eq!(handle.request_refresh(), RefreshRequest::Scheduled);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.update_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_before_the_task_runs_polls_once() {
        let (client, coordinator) = setup().await;
        let handle = coordinator.handle();
        assert_eq!(handle.request_refresh(), RefreshRequest::Scheduled);
        assert_eq!(handle.request_refresh(), RefreshRequest::Coalesced);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.update_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_during_poll_is_coalesced() {
        let (client, coordinator) = setup().await;
        let handle = coordinator.handle();
        let mut updates = handle.subscribe();
        let gate = Arc::new(Semaphore::new(0));
        *client.gate.lock().unwrap() = Some(Arc::clone(&gate));

        assert_eq!(handle.request_refresh(), RefreshRequest::Scheduled);
        while client.update_count() < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.phase(), Phase::Polling);
        assert_eq!(handle.request_refresh(), RefreshRequest::Coalesced);
        assert_eq!(handle.request_refresh(), RefreshRequest::Coalesced);

        gate.add_permits(1);
        updates.changed().await.unwrap();
        assert!(handle.last_update_succeeded());
        assert_eq!(client.update_count(), 2);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.update_count(), 2);
        assert_eq!(handle.phase(), Phase::Idle);
        tokio::time::sleep(POLL_INTERVAL).await;
        assert_eq!(client.update_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_polling() {
        let (client, coordinator) = setup().await;
        let handle = coordinator.handle();
        coordinator.shutdown().await;
        tokio::time::sleep(POLL_INTERVAL * 4).await;
        assert_eq!(client.update_count(), 1);
        // Handles outlive the coordinator and keep the last published state.
        assert!(handle.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn devices_poll_independently() {
        let (_, first_coordinator) = setup().await;
        let (second, second_coordinator) = setup().await;
        second.set_behaviour(Behaviour::Fail);
        let mut updates = second_coordinator.handle().subscribe();
        updates.changed().await.unwrap();
        assert!(first_coordinator.handle().is_available());
        assert!(!second_coordinator.handle().is_available());
    }
}
