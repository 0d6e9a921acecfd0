// THEORY:
// A `DetectionTimeline` annotates a recording with motion. Once the recording's
// first frame is written (`begin`), every detection result that arrives is
// stamped with a frame index: the elapsed time divided by the sampling
// interval. A player can then line the changed cells up with the recorded
// video without knowing anything about the detector's clock.
//
// It is an ordinary `DetectionListener`, so it plugs into the gate's listener
// slot like any other consumer.

use crate::listener::DetectionListener;
use crate::pipeline::{ChangedCell, DetectionResult};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// One detection result positioned on the recording's timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedDetection {
    pub frame_index: u64,
    pub cells: Vec<ChangedCell>,
    pub aspect_ratio: f64,
    pub x_count: u32,
    pub y_count: u32,
}

#[derive(Default)]
struct TimelineState {
    started_at: Option<Instant>,
    entries: Vec<TimedDetection>,
}

pub struct DetectionTimeline {
    interval: Duration,
    state: Mutex<TimelineState>,
}

impl DetectionTimeline {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(TimelineState::default()),
        }
    }

    /// Marks the start of the recording. Later calls are ignored.
    pub fn begin(&self) {
        self.begin_at(Instant::now());
    }

    pub fn begin_at(&self, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.started_at.get_or_insert(now);
    }

    pub fn is_recording(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started_at
            .is_some()
    }

    /// Records `result` as observed at `now`. Ignored before `begin`.
    pub fn record_at(&self, result: &DetectionResult, now: Instant) -> Option<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let started_at = state.started_at?;
        let interval_ms = self.interval.as_millis().max(1);
        let elapsed_ms = now.saturating_duration_since(started_at).as_millis();
        let frame_index = (elapsed_ms / interval_ms) as u64;

        state.entries.push(TimedDetection {
            frame_index,
            cells: result.cells.clone(),
            aspect_ratio: result.aspect_ratio,
            x_count: result.x_count,
            y_count: result.y_count,
        });
        Some(frame_index)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every entry recorded so far.
    pub fn drain(&self) -> Vec<TimedDetection> {
        std::mem::take(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner).entries)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_string(&state.entries)
    }
}

impl DetectionListener for DetectionTimeline {
    fn on_detect(&self, result: &DetectionResult) {
        self.record_at(result, Instant::now());
    }
}
