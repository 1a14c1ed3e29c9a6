//! Runs a [`Rotator`] on a tokio task.
//!
//! The driver owns the rotator, executes its effects against a
//! [`MediaSurface`], turns scheduled effects into sleeping timer tasks, and
//! publishes a snapshot after every event.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::event::{RotatorEffect, RotatorEvent};
use crate::rotator::{Phase, Rotator, RotatorSnapshot};
use crate::{MediaError, MediaEvent};

/// The element side: whatever actually shows and preloads media.
///
/// `load`, `play` and `preload` may fail synchronously; the driver feeds
/// those failures back into the rotator. Asynchronous element events are
/// reported through [`RotatorHandle::report`].
pub trait MediaSurface: Send + 'static {
    fn load(&mut self, index: usize, url: &str) -> Result<(), MediaError>;

    fn play(&mut self, index: usize) -> Result<(), MediaError>;

    /// Pause and rewind.
    fn stop(&mut self, index: usize);

    fn preload(&mut self, index: usize, url: &str) -> Result<(), MediaError>;

    /// Drop a hidden preload element.
    fn release_preload(&mut self, index: usize);
}

/// Event loop owning a rotator and its surface.
pub struct RotatorDriver<S> {
    rotator: Rotator,
    surface: S,
    events: mpsc::UnboundedReceiver<RotatorEvent>,
    timer_tx: mpsc::WeakUnboundedSender<RotatorEvent>,
    snapshots: watch::Sender<RotatorSnapshot>,
    timers: Vec<JoinHandle<()>>,
}

impl<S: MediaSurface> RotatorDriver<S> {
    /// Start the rotator on a new task. Must be called inside a tokio runtime.
    ///
    /// The task runs until [`RotatorHandle::shutdown`] or until every handle
    /// and event sender is dropped; either way the rotator is torn down.
    pub fn spawn(rotator: Rotator, surface: S) -> RotatorHandle {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(rotator.snapshot());

        let driver = Self {
            rotator,
            surface,
            events,
            timer_tx: events_tx.downgrade(),
            snapshots,
            timers: Vec::new(),
        };

        let _ = events_tx.send(RotatorEvent::Start);
        let task = tokio::spawn(driver.run());

        RotatorHandle {
            events: events_tx,
            snapshots: snapshot_rx,
            task,
        }
    }

    async fn run(mut self) -> Rotator {
        while let Some(event) = self.events.recv().await {
            let teardown = event == RotatorEvent::Teardown;
            self.dispatch(event);
            if teardown {
                break;
            }
        }

        if self.rotator.phase() != Phase::Stopped {
            debug!("All rotator handles dropped, tearing down");
            self.dispatch(RotatorEvent::Teardown);
        }
        self.cancel_timers();
        self.rotator
    }

    /// Handle one event plus any failures its effects report back.
    fn dispatch(&mut self, event: RotatorEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            trace!(?event, "Rotator event");
            for effect in self.rotator.handle(event) {
                if let Some(follow_up) = self.apply(effect) {
                    queue.push_back(follow_up);
                }
            }
        }
        self.snapshots.send_replace(self.rotator.snapshot());
    }

    fn apply(&mut self, effect: RotatorEffect) -> Option<RotatorEvent> {
        match effect {
            RotatorEffect::Load { index, url } => {
                self.surface
                    .load(index, &url)
                    .err()
                    .map(|e| RotatorEvent::Failed {
                        index,
                        reason: e.to_string(),
                    })
            }
            RotatorEffect::Play { index } => {
                self.surface
                    .play(index)
                    .err()
                    .map(|e| RotatorEvent::Failed {
                        index,
                        reason: e.to_string(),
                    })
            }
            RotatorEffect::StopPlayback { index } => {
                self.surface.stop(index);
                None
            }
            RotatorEffect::ScheduleAdvance { delay, epoch } => {
                self.schedule(delay, RotatorEvent::Tick { epoch });
                None
            }
            RotatorEffect::ScheduleSettle { delay, epoch } => {
                self.schedule(delay, RotatorEvent::SettleElapsed { epoch });
                None
            }
            RotatorEffect::CancelTimers => {
                self.cancel_timers();
                None
            }
            RotatorEffect::Preload { index, url } => self
                .surface
                .preload(index, &url)
                .err()
                .map(|e| RotatorEvent::PreloadFailed {
                    index,
                    reason: e.to_string(),
                }),
            RotatorEffect::ReleasePreload { index } => {
                self.surface.release_preload(index);
                None
            }
        }
    }

    fn schedule(&mut self, delay: Duration, event: RotatorEvent) {
        self.timers.retain(|timer| !timer.is_finished());

        let tx = self.timer_tx.clone();
        self.timers.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(event);
            }
        }));
    }

    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

/// Handle to a running rotator.
#[derive(Debug)]
pub struct RotatorHandle {
    events: mpsc::UnboundedSender<RotatorEvent>,
    snapshots: watch::Receiver<RotatorSnapshot>,
    task: JoinHandle<Rotator>,
}

impl RotatorHandle {
    /// Send an event to the rotator.
    pub fn send(&self, event: RotatorEvent) -> Result<(), MediaError> {
        self.events
            .send(event)
            .map_err(|_| MediaError::DriverStopped("event channel closed".to_string()))
    }

    /// Report an event from the visible element showing `index`.
    ///
    /// Returns whether the event meant anything to the rotator.
    pub fn report(&self, index: usize, event: &MediaEvent) -> Result<bool, MediaError> {
        match RotatorEvent::from_media(index, event) {
            Some(event) => self.send(event).map(|()| true),
            None => Ok(false),
        }
    }

    /// Report an event from the hidden preload element for `index`.
    pub fn report_preload(&self, index: usize, event: &MediaEvent) -> Result<bool, MediaError> {
        match RotatorEvent::from_preload(index, event) {
            Some(event) => self.send(event).map(|()| true),
            None => Ok(false),
        }
    }

    /// Jump to a resource.
    pub fn select(&self, index: usize) -> Result<(), MediaError> {
        self.send(RotatorEvent::Select(index))
    }

    /// A sender a surface can keep for reporting events later.
    pub fn sender(&self) -> mpsc::UnboundedSender<RotatorEvent> {
        self.events.clone()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> RotatorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published state.
    pub fn subscribe(&self) -> watch::Receiver<RotatorSnapshot> {
        self.snapshots.clone()
    }

    /// Tear the rotator down and wait for the task to finish.
    pub async fn shutdown(self) -> Result<Rotator, MediaError> {
        if self.events.send(RotatorEvent::Teardown).is_err() {
            warn!("Rotator task already gone");
        }
        self.task
            .await
            .map_err(|e| MediaError::DriverStopped(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotator::RotatorConfig;
    use hashbrown::HashSet;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Load(usize),
        Play(usize),
        Stop(usize),
        Preload(usize),
        Release(usize),
    }

    /// Surface that records calls and fails loads of chosen indices.
    #[derive(Clone, Default)]
    struct RecordingSurface {
        calls: Arc<Mutex<Vec<Call>>>,
        broken: HashSet<usize>,
    }

    impl RecordingSurface {
        fn broken(indices: &[usize]) -> Self {
            Self {
                broken: indices.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, call: Call) -> usize {
            self.calls().iter().filter(|c| **c == call).count()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn check(&self, index: usize) -> Result<(), MediaError> {
            if self.broken.contains(&index) {
                Err(MediaError::LoadFailed {
                    index,
                    reason: "404".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl MediaSurface for RecordingSurface {
        fn load(&mut self, index: usize, _url: &str) -> Result<(), MediaError> {
            self.record(Call::Load(index));
            self.check(index)
        }

        fn play(&mut self, index: usize) -> Result<(), MediaError> {
            self.record(Call::Play(index));
            Ok(())
        }

        fn stop(&mut self, index: usize) {
            self.record(Call::Stop(index));
        }

        fn preload(&mut self, index: usize, _url: &str) -> Result<(), MediaError> {
            self.record(Call::Preload(index));
            self.check(index)
        }

        fn release_preload(&mut self, index: usize) {
            self.record(Call::Release(index));
        }
    }

    fn sources(n: usize) -> RotatorConfig {
        RotatorConfig::new((0..n).map(|i| format!("/videos/hero{i}.webm")).collect())
    }

    async fn wait_for_phase(handle: &RotatorHandle, phase: Phase) {
        let mut rx = handle.subscribe();
        rx.wait_for(|snapshot| snapshot.phase == phase).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_advances_after_interval() {
        let surface = RecordingSurface::default();
        let rotator = Rotator::new(sources(3).with_preload_window(0)).unwrap();
        let handle = RotatorDriver::spawn(rotator, surface.clone());

        wait_for_phase(&handle, Phase::Loading(0)).await;
        handle.report(0, &MediaEvent::CanPlay).unwrap();
        handle.report(0, &MediaEvent::Playing).unwrap();
        wait_for_phase(&handle, Phase::Playing(0)).await;
        assert!(handle.snapshot().playable);

        let started = tokio::time::Instant::now();
        wait_for_phase(&handle, Phase::Loading(1)).await;
        assert!(started.elapsed() >= Duration::from_secs(29));

        assert_eq!(
            surface.calls(),
            vec![Call::Load(0), Call::Play(0), Call::Stop(0), Call::Load(1)]
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_source_is_skipped_after_settle() {
        let surface = RecordingSurface::broken(&[0]);
        let rotator = Rotator::new(sources(3).with_preload_window(0)).unwrap();
        let handle = RotatorDriver::spawn(rotator, surface.clone());

        wait_for_phase(&handle, Phase::Settling(0)).await;
        assert_eq!(surface.count(Call::Load(0)), 3);
        assert_eq!(handle.snapshot().display, crate::Display::Fallback);

        let started = tokio::time::Instant::now();
        wait_for_phase(&handle, Phase::Loading(1)).await;
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(handle.snapshot().failed, vec![0]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_failure_feeds_failed_set() {
        let surface = RecordingSurface::broken(&[1]);
        let rotator = Rotator::new(sources(4).with_preload_window(1)).unwrap();
        let handle = RotatorDriver::spawn(rotator, surface.clone());

        let mut rx = handle.subscribe();
        rx.wait_for(|snapshot| snapshot.failed == vec![1]).await.unwrap();

        wait_for_phase(&handle, Phase::Loading(2)).await;
        assert_eq!(surface.count(Call::Load(1)), 0);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_preloads() {
        let surface = RecordingSurface::default();
        let rotator = Rotator::new(sources(4)).unwrap();
        let handle = RotatorDriver::spawn(rotator, surface.clone());

        wait_for_phase(&handle, Phase::Loading(0)).await;
        handle.report_preload(1, &MediaEvent::CanPlayThrough).unwrap();

        let rotator = handle.shutdown().await.unwrap();
        assert_eq!(rotator.phase(), Phase::Stopped);

        let calls = surface.calls();
        assert!(calls.contains(&Call::Stop(0)));
        assert_eq!(surface.count(Call::Release(1)), 1);
        assert_eq!(surface.count(Call::Release(2)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_tears_down() {
        let surface = RecordingSurface::default();
        let rotator = Rotator::new(sources(3)).unwrap();
        let handle = RotatorDriver::spawn(rotator, surface.clone());

        wait_for_phase(&handle, Phase::Loading(0)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(surface.calls().contains(&Call::Release(1)));
        assert!(surface.calls().contains(&Call::Release(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_is_not_forwarded() {
        let rotator = Rotator::new(sources(2)).unwrap();
        let handle = RotatorDriver::spawn(rotator, RecordingSurface::default());

        assert!(!handle.report(0, &MediaEvent::Abort).unwrap());
        assert!(handle.report(0, &MediaEvent::Waiting).unwrap());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_shutdown_fails() {
        let rotator = Rotator::new(sources(2)).unwrap();
        let handle = RotatorDriver::spawn(rotator, RecordingSurface::default());
        let sender = handle.sender();

        handle.shutdown().await.unwrap();
        assert!(sender.send(RotatorEvent::Select(1)).is_err());
    }
}
