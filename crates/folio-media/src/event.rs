//! Rotator inputs and outputs.

use std::time::Duration;

use tracing::debug;

use crate::MediaEvent;

/// Input to [`Rotator::handle`](crate::Rotator::handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotatorEvent {
    /// Begin rotating.
    Start,
    /// Advance timer fired.
    Tick { epoch: u64 },
    /// The element started fetching resource `i`.
    LoadStarted(usize),
    /// Resource `i` has enough data to start.
    Ready(usize),
    /// Resource `i` is playing.
    Playing(usize),
    /// Playback of `i` is waiting for data.
    Buffering(usize),
    /// Resource failed to load or play.
    Failed { index: usize, reason: String },
    /// Settle delay after a failure is over.
    SettleElapsed { epoch: u64 },
    /// A preload finished.
    PreloadReady(usize),
    /// A preload failed.
    PreloadFailed { index: usize, reason: String },
    /// Manual jump.
    Select(usize),
    /// The display is going away.
    Teardown,
}

impl RotatorEvent {
    /// Translate an event from the element showing resource `index`.
    ///
    /// `Abort` is not a failure; the element aborts whenever its source is
    /// swapped.
    pub fn from_media(index: usize, event: &MediaEvent) -> Option<Self> {
        match event {
            MediaEvent::LoadStart => Some(RotatorEvent::LoadStarted(index)),
            MediaEvent::LoadedData | MediaEvent::CanPlay | MediaEvent::CanPlayThrough => {
                Some(RotatorEvent::Ready(index))
            }
            MediaEvent::Playing => Some(RotatorEvent::Playing(index)),
            MediaEvent::Waiting | MediaEvent::Stalled => Some(RotatorEvent::Buffering(index)),
            MediaEvent::Error(reason) => Some(RotatorEvent::Failed {
                index,
                reason: reason.clone(),
            }),
            MediaEvent::Abort => {
                debug!(index, "Media load aborted");
                None
            }
            MediaEvent::LoadedMetadata { .. } | MediaEvent::Ended => None,
        }
    }

    /// Translate an event from a hidden preload element.
    pub fn from_preload(index: usize, event: &MediaEvent) -> Option<Self> {
        match event {
            MediaEvent::CanPlayThrough => Some(RotatorEvent::PreloadReady(index)),
            MediaEvent::Error(reason) => Some(RotatorEvent::PreloadFailed {
                index,
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// Side effect requested by the rotator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotatorEffect {
    /// Point the visible element at a resource.
    Load { index: usize, url: String },
    /// Start playback.
    Play { index: usize },
    /// Pause and rewind.
    StopPlayback { index: usize },
    /// Deliver `Tick { epoch }` after `delay`.
    ScheduleAdvance { delay: Duration, epoch: u64 },
    /// Deliver `SettleElapsed { epoch }` after `delay`.
    ScheduleSettle { delay: Duration, epoch: u64 },
    /// Drop every pending timer.
    CancelTimers,
    /// Start a hidden preload.
    Preload { index: usize, url: String },
    /// Release a preload handle.
    ReleasePreload { index: usize },
}
