//! Deterministic rotation runs on a virtual clock.
//!
//! Loads and preloads of indices listed as broken fail; everything else
//! becomes ready and plays at once. Timers fire in due order without real
//! sleeping.

use std::collections::VecDeque;
use std::time::Duration;

use folio_media::{Phase, Rotator, RotatorEffect, RotatorEvent, RotatorSnapshot};
use hashbrown::HashSet;
use tracing::trace;

/// A phase or failed-set change observed during the run.
#[derive(Debug, Clone)]
pub struct Step {
    pub at: Duration,
    pub snapshot: RotatorSnapshot,
}

/// Scripted rotation run.
pub struct Simulation {
    rotator: Rotator,
    broken: HashSet<usize>,
    clock: Duration,
    advance: Option<(Duration, u64)>,
    settle: Option<(Duration, u64)>,
    steps: Vec<Step>,
}

impl Simulation {
    pub fn new(rotator: Rotator, broken: impl IntoIterator<Item = usize>) -> Self {
        Self {
            rotator,
            broken: broken.into_iter().collect(),
            clock: Duration::ZERO,
            advance: None,
            settle: None,
            steps: Vec::new(),
        }
    }

    /// Start the rotator and fire up to `timers` timers, then tear down.
    pub fn run(mut self, timers: usize) -> Vec<Step> {
        self.dispatch(RotatorEvent::Start);

        for _ in 0..timers {
            let Some(event) = self.next_timer() else {
                break;
            };
            self.dispatch(event);
        }

        self.dispatch(RotatorEvent::Teardown);
        self.steps
    }

    /// Advance the clock to the earliest pending timer and take it.
    fn next_timer(&mut self) -> Option<RotatorEvent> {
        let settle_first = match (self.advance, self.settle) {
            (None, None) => return None,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (Some((advance_at, _)), Some((settle_at, _))) => settle_at <= advance_at,
        };

        if settle_first {
            let (at, epoch) = self.settle.take()?;
            self.clock = at;
            Some(RotatorEvent::SettleElapsed { epoch })
        } else {
            let (at, epoch) = self.advance.take()?;
            self.clock = at;
            Some(RotatorEvent::Tick { epoch })
        }
    }

    fn dispatch(&mut self, event: RotatorEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let before = self.rotator.snapshot();
            for effect in self.rotator.handle(event) {
                queue.extend(self.apply(effect));
            }
            let after = self.rotator.snapshot();
            if after.phase != before.phase || after.failed != before.failed {
                self.steps.push(Step {
                    at: self.clock,
                    snapshot: after,
                });
            }
        }
    }

    fn apply(&mut self, effect: RotatorEffect) -> Option<RotatorEvent> {
        trace!(?effect, "Simulated effect");
        match effect {
            RotatorEffect::Load { index, .. } => Some(if self.broken.contains(&index) {
                RotatorEvent::Failed {
                    index,
                    reason: "simulated load failure".to_string(),
                }
            } else {
                RotatorEvent::Ready(index)
            }),
            RotatorEffect::Play { index } => Some(RotatorEvent::Playing(index)),
            RotatorEffect::Preload { index, .. } => Some(if self.broken.contains(&index) {
                RotatorEvent::PreloadFailed {
                    index,
                    reason: "simulated preload failure".to_string(),
                }
            } else {
                RotatorEvent::PreloadReady(index)
            }),
            RotatorEffect::ScheduleAdvance { delay, epoch } => {
                self.advance = Some((self.clock + delay, epoch));
                None
            }
            RotatorEffect::ScheduleSettle { delay, epoch } => {
                self.settle = Some((self.clock + delay, epoch));
                None
            }
            RotatorEffect::CancelTimers => {
                self.advance = None;
                self.settle = None;
                None
            }
            RotatorEffect::StopPlayback { .. } | RotatorEffect::ReleasePreload { .. } => None,
        }
    }
}

/// One line per step.
pub fn describe(step: &Step) -> String {
    let phase = match step.snapshot.phase {
        Phase::Idle => "idle".to_string(),
        Phase::Loading(i) => format!("loading #{i}"),
        Phase::Playing(i) => format!("playing #{i}"),
        Phase::Settling(i) => format!("settling #{i}"),
        Phase::Stopped => "stopped".to_string(),
    };
    let display = match &step.snapshot.display {
        folio_media::Display::Media { url, .. } => url.as_str(),
        folio_media::Display::Fallback => "<fallback>",
    };
    format!(
        "{:>9.1}s  {:<12} {:<24} failed={:?}",
        step.at.as_secs_f64(),
        phase,
        display,
        step.snapshot.failed
    )
}
