//! Debounced autosave.
//!
//! The scheduler keeps a single "latest snapshot" slot and a debounce
//! deadline. The host drives it by calling [`AutoSaveScheduler::tick`] from
//! its timer (nominally once per [`TICK_INTERVAL`]); a tick both advances the
//! cosmetic tick counter and submits the pending snapshot once the deadline
//! has passed. At most one commit is in flight at any time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::SaveError;

/// Quiet period after the last qualifying change before a save is submitted.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(6);

/// Period of the cosmetic "saving in N" counter.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// What the scheduler saves and how. Supplied by the owner of the draft.
#[async_trait]
pub trait AutoSaveTarget: Send + Sync + 'static {
    type Snapshot: Clone + Send + Sync + 'static;
    type Baseline: Clone + Send + Sync + 'static;

    /// Last persisted version, or `None` when nothing was persisted yet.
    fn baseline(&self) -> Option<Self::Baseline>;

    fn current(&self, baseline: &Self::Baseline) -> Self::Snapshot;

    fn has_changed(&self, current: &Self::Snapshot, baseline: &Self::Baseline) -> bool;

    async fn commit(
        &self,
        snapshot: Self::Snapshot,
        baseline: Self::Baseline,
    ) -> Result<Self::Baseline, SaveError>;
}

/// Cosmetic tick counter. `next_tick` plays the role of the interval handle:
/// it is set exactly while `elapsed_ticks` is incrementing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerState {
    pub elapsed_ticks: u32,
    next_tick: Option<Instant>,
}

impl TimerState {
    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    fn start(&mut self, now: Instant) {
        if self.next_tick.is_none() {
            self.next_tick = Some(now + TICK_INTERVAL);
        }
    }

    fn advance(&mut self, now: Instant) {
        while let Some(at) = self.next_tick {
            if at > now {
                break;
            }
            self.elapsed_ticks += 1;
            self.next_tick = Some(at + TICK_INTERVAL);
        }
    }

    fn stop(&mut self) {
        self.next_tick = None;
    }

    fn clear(&mut self) {
        self.elapsed_ticks = 0;
        self.next_tick = None;
    }
}

#[derive(Debug, Clone)]
pub struct SaveAttempt<S> {
    pub value: S,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoSaveStatus {
    pub pending_ticks: u32,
    pub is_saving: bool,
    pub last_error: Option<SaveError>,
}

struct SchedulerState<S> {
    timer: TimerState,
    pending: Option<S>,
    fire_at: Option<Instant>,
    in_flight: Option<SaveAttempt<S>>,
    last_error: Option<SaveError>,
}

impl<S: Clone> SchedulerState<S> {
    fn new() -> Self {
        Self {
            timer: TimerState::default(),
            pending: None,
            fire_at: None,
            in_flight: None,
            last_error: None,
        }
    }

    fn cancel(&mut self) {
        self.pending = None;
        self.fire_at = None;
        self.timer.clear();
    }

    fn is_due(&self, now: Instant) -> bool {
        self.fire_at.is_some_and(|at| at <= now)
    }

    fn begin(&mut self, snapshot: &S) {
        self.timer.stop();
        self.in_flight = Some(SaveAttempt {
            value: snapshot.clone(),
            started_at: Utc::now(),
        });
    }
}

/// Cloneable handle; clones share state, so a commit awaited on one clone is
/// visible as `is_saving` through every other.
pub struct AutoSaveScheduler<T: AutoSaveTarget> {
    target: Arc<T>,
    enabled: bool,
    window: Duration,
    state: Arc<Mutex<SchedulerState<T::Snapshot>>>,
}

impl<T: AutoSaveTarget> Clone for AutoSaveScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            enabled: self.enabled,
            window: self.window,
            state: self.state.clone(),
        }
    }
}

impl<T: AutoSaveTarget> AutoSaveScheduler<T> {
    pub fn new(target: Arc<T>, enabled: bool) -> Self {
        Self {
            target,
            enabled,
            window: DEBOUNCE_WINDOW,
            state: Arc::new(Mutex::new(SchedulerState::new())),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn request_save(&self) -> bool {
        self.request_save_at(Instant::now())
    }

    /// Signals that the draft may have changed. Returns whether a save is
    /// now scheduled. Never fails: a disabled scheduler, a missing baseline
    /// or an unchanged draft are plain no-ops.
    pub fn request_save_at(&self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(baseline) = self.target.baseline() else {
            log::trace!("Autosave skipped: nothing persisted yet");
            return false;
        };
        let current = self.target.current(&baseline);
        if !self.target.has_changed(&current, &baseline) {
            return false;
        }

        let mut state = self.lock();
        state.pending = Some(current);
        state.fire_at = Some(now + self.window);
        state.timer.elapsed_ticks = state.timer.elapsed_ticks.max(1);
        state.timer.start(now);
        log::trace!("Autosave scheduled in {:?}", self.window);
        true
    }

    pub async fn tick(&self) -> Option<Result<T::Baseline, SaveError>> {
        self.tick_at(Instant::now()).await
    }

    /// Advances the tick counter and, when the debounce deadline has passed,
    /// commits the latest snapshot. Returns `None` when nothing was
    /// submitted.
    pub async fn tick_at(&self, now: Instant) -> Option<Result<T::Baseline, SaveError>> {
        {
            let mut state = self.lock();
            state.timer.advance(now);
            if !state.is_due(now) {
                return None;
            }
        }

        let baseline = self.target.baseline();
        let (snapshot, baseline) = {
            let mut state = self.lock();
            if !state.is_due(now) {
                return None;
            }
            if state.in_flight.is_some() {
                // Picked up by the next cycle once the running save is done.
                log::debug!("Autosave fire dropped: a save is already in flight");
                state.fire_at = Some(now + self.window);
                return None;
            }
            state.fire_at = None;
            let snapshot = state.pending.take()?;
            let Some(baseline) = baseline else {
                log::warn!("Autosave fire dropped: baseline disappeared");
                state.timer.clear();
                return None;
            };
            state.begin(&snapshot);
            (snapshot, baseline)
        };

        log::debug!("Autosave submitting snapshot");
        Some(self.finish(self.target.commit(snapshot, baseline).await))
    }

    /// Cancels the scheduled save without submitting it and clears the tick
    /// counter. A commit that is already running is not affected.
    pub fn flush(&self) {
        self.lock().cancel();
        log::trace!("Autosave flushed");
    }

    /// Like [`flush`](Self::flush), but refuses while a commit is in flight.
    /// Check and cancel happen under one lock, so no fire can start in
    /// between. Returns whether the scheduler was idle and got flushed.
    pub fn flush_if_idle(&self) -> bool {
        let mut state = self.lock();
        if state.in_flight.is_some() {
            return false;
        }
        state.cancel();
        log::trace!("Autosave flushed");
        true
    }

    /// Commits the current draft right away, ignoring the debounce window
    /// and the change check. Refused with [`SaveError::InFlight`] while
    /// another commit is running.
    pub async fn retry(&self) -> Result<T::Baseline, SaveError> {
        let baseline = self.target.baseline().ok_or(SaveError::NoBaseline)?;
        let snapshot = self.target.current(&baseline);
        {
            let mut state = self.lock();
            if state.in_flight.is_some() {
                return Err(SaveError::InFlight);
            }
            state.pending = None;
            state.fire_at = None;
            state.begin(&snapshot);
        }

        log::info!("Autosave retry requested");
        self.finish(self.target.commit(snapshot, baseline).await)
    }

    pub fn status(&self) -> AutoSaveStatus {
        let state = self.lock();
        AutoSaveStatus {
            pending_ticks: state.timer.elapsed_ticks,
            is_saving: state.in_flight.is_some(),
            last_error: state.last_error.clone(),
        }
    }

    pub fn pending_ticks(&self) -> u32 {
        self.lock().timer.elapsed_ticks
    }

    pub fn is_saving(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<SaveError> {
        self.lock().last_error.clone()
    }

    pub fn timer(&self) -> TimerState {
        self.lock().timer.clone()
    }

    /// Deadline of the scheduled save, if one is armed.
    pub fn next_fire_at(&self) -> Option<Instant> {
        self.lock().fire_at
    }

    pub fn in_flight(&self) -> Option<SaveAttempt<T::Snapshot>> {
        self.lock().in_flight.clone()
    }

    fn finish(
        &self,
        result: Result<T::Baseline, SaveError>,
    ) -> Result<T::Baseline, SaveError> {
        let mut state = self.lock();
        let attempt = state.in_flight.take();
        if state.fire_at.is_some() {
            // A newer snapshot was scheduled while this one was saving.
            state.timer.clear();
            state.timer.elapsed_ticks = 1;
            state.timer.start(Instant::now());
        } else {
            state.timer.clear();
        }
        let elapsed_ms = attempt.map_or(0, |attempt| {
            (Utc::now() - attempt.started_at).num_milliseconds()
        });
        match &result {
            Ok(_) => {
                state.last_error = None;
                log::info!("Autosave committed in {} ms", elapsed_ms);
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                log::warn!("Autosave failed: {}", e);
            }
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState<T::Snapshot>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeTarget {
        baseline: Mutex<Option<String>>,
        current: Mutex<String>,
        commits: Mutex<Vec<String>>,
        fail: AtomicBool,
        gate: Option<Arc<Notify>>,
    }

    impl FakeTarget {
        fn persisted(content: &str) -> Self {
            Self {
                baseline: Mutex::new(Some(content.to_string())),
                current: Mutex::new(content.to_string()),
                ..Self::default()
            }
        }

        fn gated(content: &str, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::persisted(content)
            }
        }

        fn type_text(&self, content: &str) {
            *self.current.lock().unwrap() = content.to_string();
        }

        fn commits(&self) -> Vec<String> {
            self.commits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AutoSaveTarget for FakeTarget {
        type Snapshot = String;
        type Baseline = String;

        fn baseline(&self) -> Option<String> {
            self.baseline.lock().unwrap().clone()
        }

        fn current(&self, _baseline: &String) -> String {
            self.current.lock().unwrap().clone()
        }

        fn has_changed(&self, current: &String, baseline: &String) -> bool {
            current.trim() != baseline.trim()
        }

        async fn commit(&self, snapshot: String, _baseline: String) -> Result<String, SaveError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.commits.lock().unwrap().push(snapshot.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err(SaveError::Rejected("server said no".to_string()));
            }
            *self.baseline.lock().unwrap() = Some(snapshot.clone());
            Ok(snapshot)
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    async fn wait_until_saving(scheduler: &AutoSaveScheduler<FakeTarget>) {
        while !scheduler.is_saving() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_disabled_scheduler_ignores_changes() {
        let target = Arc::new(FakeTarget::persisted("a"));
        let scheduler = AutoSaveScheduler::new(target.clone(), false);
        target.type_text("ab");
        assert!(!scheduler.request_save());
        assert_eq!(scheduler.status(), AutoSaveStatus::default());
    }

    #[tokio::test]
    async fn test_no_baseline_is_a_noop() {
        let target = Arc::new(FakeTarget::default());
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        target.type_text("brand new");
        assert!(!scheduler.request_save());
        assert!(scheduler.next_fire_at().is_none());
    }

    #[tokio::test]
    async fn test_unchanged_draft_is_not_scheduled() {
        let target = Arc::new(FakeTarget::persisted("same"));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        target.type_text("  same\n");
        assert!(!scheduler.request_save());
        assert_eq!(scheduler.pending_ticks(), 0);
        assert!(!scheduler.timer().is_running());
    }

    #[tokio::test]
    async fn test_ticks_count_seconds() {
        let target = Arc::new(FakeTarget::persisted("a"));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        let t0 = Instant::now();
        target.type_text("ab");
        assert!(scheduler.request_save_at(t0));
        assert_eq!(scheduler.pending_ticks(), 1);
        assert!(scheduler.timer().is_running());

        assert!(scheduler.tick_at(t0 + secs(3)).await.is_none());
        assert_eq!(scheduler.pending_ticks(), 4);
    }

    #[tokio::test]
    async fn test_burst_of_requests_commits_once_with_latest_snapshot() {
        let target = Arc::new(FakeTarget::persisted("a"));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        let t0 = Instant::now();

        for (offset, text) in [(0, "ab"), (2, "abc"), (4, "abcd")] {
            target.type_text(text);
            assert!(scheduler.request_save_at(t0 + secs(offset)));
            assert!(scheduler.tick_at(t0 + secs(offset)).await.is_none());
        }

        assert!(scheduler.tick_at(t0 + secs(9)).await.is_none());
        let result = scheduler.tick_at(t0 + secs(10)).await;
        assert_eq!(result, Some(Ok("abcd".to_string())));
        assert_eq!(target.commits(), vec!["abcd".to_string()]);

        let status = scheduler.status();
        assert_eq!(status.pending_ticks, 0);
        assert!(!status.is_saving);
        assert!(status.last_error.is_none());
        assert!(!scheduler.timer().is_running());

        assert!(scheduler.tick_at(t0 + secs(30)).await.is_none());
        assert_eq!(target.commits().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_retained_until_next_success() {
        let target = Arc::new(FakeTarget::persisted("a"));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        let t0 = Instant::now();
        target.fail.store(true, Ordering::SeqCst);

        target.type_text("ab");
        scheduler.request_save_at(t0);
        let result = scheduler.tick_at(t0 + secs(6)).await;
        assert!(matches!(result, Some(Err(SaveError::Rejected(_)))));

        let status = scheduler.status();
        assert_eq!(status.pending_ticks, 0);
        assert!(!status.is_saving);
        assert!(status.last_error.is_some());

        target.fail.store(false, Ordering::SeqCst);
        target.type_text("abc");
        scheduler.request_save_at(t0 + secs(7));
        assert!(scheduler.last_error().is_some());
        let result = scheduler.tick_at(t0 + secs(13)).await;
        assert_eq!(result, Some(Ok("abc".to_string())));
        assert!(scheduler.last_error().is_none());
    }

    #[tokio::test]
    async fn test_requests_during_commit_never_start_a_second_commit() {
        let gate = Arc::new(Notify::new());
        let target = Arc::new(FakeTarget::gated("a", gate.clone()));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        let t0 = Instant::now();

        target.type_text("ab");
        scheduler.request_save_at(t0);
        let background = scheduler.clone();
        let first = tokio::spawn(async move { background.tick_at(t0 + secs(6)).await });
        wait_until_saving(&scheduler).await;
        assert_eq!(scheduler.in_flight().map(|attempt| attempt.value), Some("ab".to_string()));

        for offset in 7..20 {
            target.type_text(&format!("ab{}", offset));
            scheduler.request_save_at(t0 + secs(offset));
            assert!(scheduler.tick_at(t0 + secs(offset + 6)).await.is_none());
        }
        assert_eq!(scheduler.retry().await, Err(SaveError::InFlight));
        assert!(scheduler.last_error().is_none());

        gate.notify_one();
        assert_eq!(first.await.unwrap(), Some(Ok("ab".to_string())));
        assert_eq!(target.commits(), vec!["ab".to_string()]);

        // The latest snapshot goes out on the next natural cycle.
        gate.notify_one();
        let result = scheduler.tick_at(t0 + secs(40)).await;
        assert_eq!(result, Some(Ok("ab19".to_string())));
        assert_eq!(target.commits().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_queued_during_commit_keeps_ticking() {
        let gate = Arc::new(Notify::new());
        let target = Arc::new(FakeTarget::gated("a", gate.clone()));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        let t0 = Instant::now();

        target.type_text("ab");
        scheduler.request_save_at(t0);
        let background = scheduler.clone();
        let first = tokio::spawn(async move { background.tick_at(t0 + secs(6)).await });
        wait_until_saving(&scheduler).await;

        target.type_text("abc");
        assert!(scheduler.request_save_at(t0 + secs(7)));

        gate.notify_one();
        assert_eq!(first.await.unwrap(), Some(Ok("ab".to_string())));

        let status = scheduler.status();
        assert_eq!(status.pending_ticks, 1);
        assert!(!status.is_saving);
        assert!(scheduler.timer().is_running());
        assert!(scheduler.next_fire_at().is_some());
    }

    #[tokio::test]
    async fn test_flush_if_idle_refuses_while_saving() {
        let gate = Arc::new(Notify::new());
        let target = Arc::new(FakeTarget::gated("a", gate.clone()));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        let t0 = Instant::now();

        target.type_text("ab");
        scheduler.request_save_at(t0);
        let background = scheduler.clone();
        let first = tokio::spawn(async move { background.tick_at(t0 + secs(6)).await });
        wait_until_saving(&scheduler).await;

        target.type_text("abc");
        scheduler.request_save_at(t0 + secs(7));
        assert!(!scheduler.flush_if_idle());
        assert!(scheduler.next_fire_at().is_some());

        gate.notify_one();
        assert!(first.await.unwrap().is_some());
        assert!(scheduler.flush_if_idle());
        assert!(scheduler.next_fire_at().is_none());
        assert_eq!(scheduler.pending_ticks(), 0);
        assert!(!scheduler.timer().is_running());
    }

    #[tokio::test]
    async fn test_flush_cancels_scheduled_save() {
        let target = Arc::new(FakeTarget::persisted("a"));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        let t0 = Instant::now();

        target.type_text("ab");
        scheduler.request_save_at(t0);
        scheduler.flush();
        assert_eq!(scheduler.pending_ticks(), 0);
        assert!(!scheduler.timer().is_running());
        assert!(scheduler.next_fire_at().is_none());

        assert!(scheduler.tick_at(t0 + secs(60)).await.is_none());
        assert!(target.commits().is_empty());

        // A later change re-arms the scheduler.
        target.type_text("abc");
        assert!(scheduler.request_save_at(t0 + secs(61)));
        assert!(scheduler.tick_at(t0 + secs(67)).await.is_some());
    }

    #[tokio::test]
    async fn test_retry_bypasses_window_and_change_check() {
        let target = Arc::new(FakeTarget::persisted("same"));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        assert_eq!(scheduler.retry().await, Ok("same".to_string()));
        assert_eq!(target.commits(), vec!["same".to_string()]);
    }

    #[tokio::test]
    async fn test_retry_cancels_scheduled_fire() {
        let target = Arc::new(FakeTarget::persisted("a"));
        let scheduler = AutoSaveScheduler::new(target.clone(), true);
        let t0 = Instant::now();
        target.type_text("ab");
        scheduler.request_save_at(t0);
        assert!(scheduler.retry().await.is_ok());
        assert!(scheduler.tick_at(t0 + secs(6)).await.is_none());
        assert_eq!(target.commits().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_without_baseline() {
        let target = Arc::new(FakeTarget::default());
        let scheduler = AutoSaveScheduler::new(target, true);
        assert_eq!(scheduler.retry().await, Err(SaveError::NoBaseline));
    }

    #[tokio::test]
    async fn test_custom_window() {
        let target = Arc::new(FakeTarget::persisted("a"));
        let scheduler = AutoSaveScheduler::new(target.clone(), true).with_window(secs(2));
        let t0 = Instant::now();
        target.type_text("ab");
        scheduler.request_save_at(t0);
        assert!(scheduler.tick_at(t0 + secs(2)).await.is_some());
    }
}
