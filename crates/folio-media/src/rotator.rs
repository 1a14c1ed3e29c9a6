//! The rotator state machine.
//!
//! [`Rotator::handle`] is the only place state changes. It never sleeps or
//! touches an element; it returns [`RotatorEffect`]s for the driver to carry
//! out, so every transition can be tested synchronously.

use std::time::Duration;

use folio_core::RotatorSettings;
use tracing::{debug, info, trace, warn};

use crate::event::{RotatorEffect, RotatorEvent};
use crate::failed::{FailedSet, Selection};
use crate::preload::Preloader;
use crate::MediaError;

// ==================== Configuration ====================

/// Rotator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RotatorConfig {
    /// Ordered media URLs, fixed for the rotator's lifetime.
    pub sources: Vec<String>,
    /// Display time per resource.
    pub interval: Duration,
    /// Pause after a failure before switching.
    pub settle_delay: Duration,
    /// Reloads of the same index before it is marked failed.
    pub max_immediate_retries: u32,
    /// Upcoming resources kept preloaded.
    pub preload_window: usize,
}

impl RotatorConfig {
    /// Default timings over the given sources.
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &RotatorSettings) -> Self {
        Self {
            sources: settings.sources.clone(),
            interval: settings.interval(),
            settle_delay: settings.settle_delay(),
            max_immediate_retries: settings.max_immediate_retries,
            preload_window: settings.preload_window,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_max_immediate_retries(mut self, retries: u32) -> Self {
        self.max_immediate_retries = retries;
        self
    }

    pub fn with_preload_window(mut self, window: usize) -> Self {
        self.preload_window = window;
        self
    }
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self::from_settings(&RotatorSettings::default())
    }
}

// ==================== State ====================

/// Where the rotator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not started.
    #[default]
    Idle,
    /// Waiting for resource `i` to become playable.
    Loading(usize),
    /// Resource `i` is playing.
    Playing(usize),
    /// Resource `i` failed; waiting out the settle delay.
    Settling(usize),
    /// Torn down. Terminal.
    Stopped,
}

impl Phase {
    /// Index the phase refers to.
    pub fn index(&self) -> Option<usize> {
        match self {
            Phase::Loading(i) | Phase::Playing(i) | Phase::Settling(i) => Some(*i),
            Phase::Idle | Phase::Stopped => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Phase::Loading(_))
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Phase::Playing(_))
    }

    /// Index of a resource currently on screen (loading or playing).
    fn active(&self) -> Option<usize> {
        match self {
            Phase::Loading(i) | Phase::Playing(i) => Some(*i),
            _ => None,
        }
    }
}

/// What the page should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Display {
    /// The element for this resource.
    Media { index: usize, url: String },
    /// The static fallback background.
    Fallback,
}

/// Observable rotator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatorSnapshot {
    pub phase: Phase,
    pub current: usize,
    pub failed: Vec<usize>,
    pub retries: u32,
    pub playable: bool,
    pub display: Display,
}

// ==================== Rotator ====================

/// Hero media rotator.
#[derive(Debug, Clone)]
pub struct Rotator {
    config: RotatorConfig,
    failed: FailedSet,
    preloader: Preloader,
    phase: Phase,
    current: usize,
    retries: u32,
    epoch: u64,
    buffering: bool,
    after_reset: bool,
}

impl Rotator {
    /// Create a rotator. Fails on an empty source list or a zero interval.
    pub fn new(config: RotatorConfig) -> Result<Self, MediaError> {
        if config.sources.is_empty() {
            return Err(MediaError::NoSources);
        }
        if config.interval.is_zero() {
            return Err(MediaError::InvalidConfig(
                "rotation interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            preloader: Preloader::new(config.preload_window),
            config,
            failed: FailedSet::new(),
            phase: Phase::Idle,
            current: 0,
            retries: 0,
            epoch: 0,
            buffering: false,
            after_reset: false,
        })
    }

    pub fn config(&self) -> &RotatorConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Timer generation; bumped on every transition.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn failed(&self) -> &FailedSet {
        &self.failed
    }

    pub fn preloader(&self) -> &Preloader {
        &self.preloader
    }

    pub fn len(&self) -> usize {
        self.config.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.config.sources.is_empty()
    }

    fn url(&self, index: usize) -> String {
        self.config.sources[index].clone()
    }

    /// Apply one event and return the effects to carry out, in order.
    pub fn handle(&mut self, event: RotatorEvent) -> Vec<RotatorEffect> {
        let mut effects = Vec::new();

        if self.phase == Phase::Stopped {
            trace!(?event, "Rotator stopped, event ignored");
            return effects;
        }

        match event {
            RotatorEvent::Start => {
                if self.phase == Phase::Idle {
                    let last = self.len() - 1;
                    self.advance_from(last, &mut effects);
                }
            }
            RotatorEvent::Tick { epoch } => {
                if epoch != self.epoch {
                    trace!(epoch, current = self.epoch, "Stale tick ignored");
                } else if let Some(index) = self.phase.active() {
                    self.advance_from(index, &mut effects);
                }
            }
            RotatorEvent::LoadStarted(index) => {
                trace!(index, "Media load started");
            }
            RotatorEvent::Ready(index) => {
                if self.phase == Phase::Loading(index) {
                    effects.push(RotatorEffect::Play { index });
                }
            }
            RotatorEvent::Playing(index) => {
                if self.phase.active() == Some(index) {
                    if self.phase.is_loading() {
                        info!(index, url = %self.config.sources[index], "Media playing");
                    }
                    self.phase = Phase::Playing(index);
                    self.retries = 0;
                    self.buffering = false;
                    self.after_reset = false;
                }
            }
            RotatorEvent::Buffering(index) => {
                if self.phase == Phase::Playing(index) {
                    debug!(index, "Media buffering");
                    self.buffering = true;
                }
            }
            RotatorEvent::Failed { index, reason } => {
                self.handle_failure(index, &reason, &mut effects);
            }
            RotatorEvent::SettleElapsed { epoch } => match self.phase {
                Phase::Settling(index) if epoch == self.epoch => {
                    self.advance_from(index, &mut effects);
                }
                _ => trace!(epoch, "Stale settle timer ignored"),
            },
            RotatorEvent::PreloadReady(index) => {
                debug!(index, "Media preloaded");
                if self.preloader.confirm_ready(index) {
                    effects.push(RotatorEffect::ReleasePreload { index });
                }
            }
            RotatorEvent::PreloadFailed { index, reason } => {
                if index >= self.len() {
                    warn!(index, "Preload failure for unknown media ignored");
                } else {
                    warn!(index, reason = %reason, "Media preload failed");
                    self.failed.insert(index);
                    if self.preloader.confirm_failed(index) {
                        effects.push(RotatorEffect::ReleasePreload { index });
                    }
                    self.refresh_preloads(&mut effects);
                }
            }
            RotatorEvent::Select(index) => {
                if index >= self.len() {
                    warn!(index, len = self.len(), "Selection out of range ignored");
                } else if self.phase.active() == Some(index) {
                    debug!(index, "Selected media already current");
                } else {
                    self.load(
                        Selection {
                            index,
                            reset: false,
                        },
                        &mut effects,
                    );
                }
            }
            RotatorEvent::Teardown => self.teardown(&mut effects),
        }

        effects
    }

    /// Current observable state.
    pub fn snapshot(&self) -> RotatorSnapshot {
        let display = match self.phase {
            Phase::Loading(index) if !self.after_reset => Display::Media {
                index,
                url: self.url(index),
            },
            Phase::Playing(index) => Display::Media {
                index,
                url: self.url(index),
            },
            _ => Display::Fallback,
        };

        RotatorSnapshot {
            phase: self.phase,
            current: self.current,
            failed: self.failed.sorted(),
            retries: self.retries,
            playable: self.phase.is_playing() && !self.buffering,
            display,
        }
    }

    fn advance_from(&mut self, index: usize, effects: &mut Vec<RotatorEffect>) {
        if let Some(selection) = self.failed.select_after(index, self.len()) {
            self.load(selection, effects);
        }
    }

    /// Commit a move to `selection` and restart the advance timer.
    fn load(&mut self, selection: Selection, effects: &mut Vec<RotatorEffect>) {
        if let Some(previous) = self.phase.active() {
            effects.push(RotatorEffect::StopPlayback { index: previous });
        }

        if selection.reset {
            info!(failed = self.failed.len(), "Every media source failed, clearing failed set");
            self.failed.clear();
            self.after_reset = true;
        }

        let index = selection.index;
        self.current = index;
        self.phase = Phase::Loading(index);
        self.retries = 0;
        self.buffering = false;
        self.epoch += 1;

        let url = self.url(index);
        info!(index, url = %url, "Loading media");

        effects.push(RotatorEffect::CancelTimers);
        effects.push(RotatorEffect::Load { index, url });
        effects.push(RotatorEffect::ScheduleAdvance {
            delay: self.config.interval,
            epoch: self.epoch,
        });
        self.refresh_preloads(effects);
    }

    fn handle_failure(&mut self, index: usize, reason: &str, effects: &mut Vec<RotatorEffect>) {
        if index >= self.len() {
            warn!(index, "Failure for unknown media ignored");
            return;
        }

        if self.phase.active() != Some(index) {
            if self.failed.insert(index) {
                warn!(index, reason, "Media failed while not current");
            }
            self.preloader.forget(index);
            return;
        }

        if self.retries < self.config.max_immediate_retries {
            self.retries += 1;
            warn!(index, reason, attempt = self.retries, "Media failed, retrying");
            self.phase = Phase::Loading(index);
            self.buffering = false;
            effects.push(RotatorEffect::Load {
                index,
                url: self.url(index),
            });
            return;
        }

        warn!(index, reason, url = %self.config.sources[index], "Media failed, skipping");
        self.failed.insert(index);
        self.preloader.forget(index);
        self.phase = Phase::Settling(index);
        self.buffering = false;
        self.epoch += 1;

        effects.push(RotatorEffect::StopPlayback { index });
        effects.push(RotatorEffect::CancelTimers);
        effects.push(RotatorEffect::ScheduleSettle {
            delay: self.config.settle_delay,
            epoch: self.epoch,
        });
    }

    fn refresh_preloads(&mut self, effects: &mut Vec<RotatorEffect>) {
        for index in self.preloader.plan(self.current, self.len(), &self.failed) {
            effects.push(RotatorEffect::Preload {
                index,
                url: self.url(index),
            });
        }
    }

    fn teardown(&mut self, effects: &mut Vec<RotatorEffect>) {
        if let Some(index) = self.phase.active() {
            effects.push(RotatorEffect::StopPlayback { index });
        }
        effects.push(RotatorEffect::CancelTimers);
        for index in self.preloader.release_all() {
            effects.push(RotatorEffect::ReleasePreload { index });
        }
        self.phase = Phase::Stopped;
        self.epoch += 1;
        info!("Media rotator stopped");
    }
}
