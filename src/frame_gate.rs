// THEORY:
// The `FrameGate` sits between a live video source and the `GridDiffEngine`.
// Frames arrive at camera cadence, usually far faster than motion needs to be
// sampled, and the delivery thread belongs to the video pipeline: it must never
// wait on analysis.
//
// Key architectural principles:
// 1.  **Cheap Admission**: `on_frame` does a state check, a throttle check and
//     an `Arc` clone of the luma plane. Everything else happens elsewhere.
// 2.  **Single Worker**: Accepted frames go through a small bounded queue to one
//     long-lived worker task that owns the engine. Results therefore come out
//     in acceptance order and the baseline is never touched by two passes at
//     once. A full queue drops the frame instead of blocking.
// 3.  **Sessions**: Every `start` opens a new session with its own generation
//     number. Work tagged with an older generation is discarded, so a result
//     computed around a `stop` is never delivered, and the first frame of a new
//     session always lands on a freshly reset engine.
// 4.  **Fan-out**: Each result goes to the single listener slot and then to the
//     event stream, both from the worker.

use crate::config::{DetectionConfig, DetectionRequest};
use crate::core_modules::grid_engine::GridDiffEngine;
use crate::core_modules::luma_plane::LumaPlane;
use crate::error::GateError;
use crate::events::{self, EventStream};
use crate::frame::{FrameSource, VideoFrame, VideoSink};
use crate::listener::{DetectionListener, ListenerSlot};
use crate::pipeline::{DetectionResult, MotionEvent, Sensitivity};
use futures::Stream;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tunables for a `FrameGate`.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum time between two frames that reach the engine.
    pub sample_interval: Duration,
    /// Accepted frames that may wait for the worker.
    pub queue_capacity: usize,
    /// Events buffered per event-stream subscriber.
    pub event_capacity: usize,
    /// Sensitivity used until the first `configure` call.
    pub sensitivity: Sensitivity,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

impl From<&DetectionConfig> for GateConfig {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            sample_interval: Duration::from_millis(config.sample_interval_ms),
            queue_capacity: config.queue_capacity.max(1),
            event_capacity: config.event_capacity.max(1),
            sensitivity: Sensitivity::from_level(config.level),
        }
    }
}

/// Drops frames that arrive sooner than `interval` after the last accepted one.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_accepted: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    /// Records `now` as the latest acceptance if the interval has elapsed.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

/// One accepted frame on its way to the worker.
struct FrameTask {
    plane: LumaPlane,
    rotation: i32,
    sensitivity: Sensitivity,
    session: u64,
    sequence: u64,
    timestamp_ms: u64,
}

/// State of a running detection session.
struct Session {
    generation: u64,
    started_at: Instant,
    throttle: Throttle,
    next_sequence: u64,
    source: Arc<dyn FrameSource>,
    sink: Arc<dyn VideoSink>,
}

struct GateShared {
    config: GateConfig,
    started: AtomicBool,
    generation: AtomicU64,
    sensitivity: AtomicU8,
    session: Mutex<Option<Session>>,
    listener: ListenerSlot,
    events: EventStream,
}

impl GateShared {
    fn is_current(&self, session: u64) -> bool {
        self.started.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == session
    }

    fn sensitivity(&self) -> Sensitivity {
        Sensitivity::from_level(self.sensitivity.load(Ordering::Relaxed) as i32)
    }

    /// The delivery-path half of the gate. Never waits on the worker.
    fn accept(&self, frame: &dyn VideoFrame, now: Instant, tasks: &mpsc::Sender<FrameTask>) {
        if !self.started.load(Ordering::Acquire) {
            return;
        }

        let task = {
            let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(session) = guard.as_mut() else {
                return;
            };
            if !session.throttle.admit(now) {
                return;
            }
            let Some(plane) = frame.to_luma_plane() else {
                debug!("frame has no luma plane, skipping");
                return;
            };
            let sequence = session.next_sequence;
            session.next_sequence += 1;
            FrameTask {
                plane,
                rotation: frame.rotation(),
                sensitivity: self.sensitivity(),
                session: session.generation,
                sequence,
                timestamp_ms: now.saturating_duration_since(session.started_at).as_millis() as u64,
            }
        };

        match tasks.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => {
                debug!(sequence = task.sequence, "detection worker busy, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("detection worker has exited, dropping frame");
            }
        }
    }

    /// Delivers a finished pass unless its session has ended in the meantime.
    ///
    /// The session is checked before each consumer. A `stop` racing with the
    /// listener call itself can still let that one call through.
    fn deliver(&self, task: &FrameTask, result: DetectionResult) {
        if !self.is_current(task.session) {
            debug!(sequence = task.sequence, "session ended, discarding detection result");
            return;
        }
        self.listener.notify(&result);
        if !self.is_current(task.session) {
            debug!(sequence = task.sequence, "session ended during delivery, not publishing");
            return;
        }
        self.events
            .publish(MotionEvent::new(task.sequence, task.timestamp_ms, &result));
    }
}

/// The sink a gate attaches to its frame source.
struct GateSink {
    shared: Arc<GateShared>,
    tasks: mpsc::Sender<FrameTask>,
}

impl VideoSink for GateSink {
    fn on_frame(&self, frame: &dyn VideoFrame) {
        self.shared.accept(frame, Instant::now(), &self.tasks);
    }
}

/// Throttles a frame stream into the `GridDiffEngine` and distributes results.
///
/// Must be created inside a tokio runtime, which hosts the detection worker.
/// Dropping the gate disposes it. A disposed gate cannot be started again.
pub struct FrameGate {
    shared: Arc<GateShared>,
    tasks: Mutex<Option<mpsc::Sender<FrameTask>>>,
    worker: JoinHandle<()>,
}

impl FrameGate {
    pub fn new(config: GateConfig) -> Result<Self, GateError> {
        let handle = Handle::try_current().map_err(|_| GateError::NoRuntime)?;
        let (tasks, receiver) = mpsc::channel::<FrameTask>(config.queue_capacity.max(1));

        let shared = Arc::new(GateShared {
            started: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            sensitivity: AtomicU8::new(config.sensitivity.threshold()),
            session: Mutex::new(None),
            listener: ListenerSlot::default(),
            events: EventStream::new(config.event_capacity),
            config,
        });

        let worker = handle.spawn(run_worker(Arc::clone(&shared), receiver));

        Ok(Self {
            shared,
            tasks: Mutex::new(Some(tasks)),
            worker,
        })
    }

    /// Applies a host request: disabling stops and resets, enabling starts if
    /// needed and always updates the sensitivity.
    pub fn configure(&self, request: DetectionRequest, source: Arc<dyn FrameSource>) {
        if !request.enabled {
            self.stop();
            return;
        }
        if !self.is_started() {
            self.start(source);
        }
        self.set_sensitivity(request.sensitivity());
    }

    /// Attaches to `source` and opens a new session. No-op if already started
    /// or disposed.
    pub fn start(&self, source: Arc<dyn FrameSource>) {
        let Some(tasks) = self.tasks.lock().unwrap_or_else(PoisonError::into_inner).clone() else {
            warn!("frame gate has been disposed, not starting");
            return;
        };
        let sink: Arc<dyn VideoSink> = Arc::new(GateSink {
            shared: Arc::clone(&self.shared),
            tasks,
        });

        {
            let mut guard = self.shared.session.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_some() {
                return;
            }
            let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
            *guard = Some(Session {
                generation,
                started_at: Instant::now(),
                throttle: Throttle::new(self.shared.config.sample_interval),
                next_sequence: 0,
                source: Arc::clone(&source),
                sink: Arc::clone(&sink),
            });
            self.shared.started.store(true, Ordering::Release);
            info!(
                session = generation,
                interval_ms = self.shared.config.sample_interval.as_millis() as u64,
                "motion detection started"
            );
        }

        // Outside the lock: a source may deliver a frame from inside `attach`.
        source.attach(sink);
    }

    /// Detaches from the source and ends the session. No-op if not started.
    pub fn stop(&self) {
        let session = {
            let mut guard = self.shared.session.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(session) = guard.take() else {
                return;
            };
            self.shared.started.store(false, Ordering::Release);
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            session
        };

        session.source.detach(&session.sink);
        info!(session = session.generation, "motion detection stopped");
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    /// Feeds one frame as if delivered by the attached source.
    pub fn on_frame(&self, frame: &dyn VideoFrame) {
        self.on_frame_at(frame, Instant::now());
    }

    /// Like `on_frame`, with an explicit arrival time.
    pub fn on_frame_at(&self, frame: &dyn VideoFrame, now: Instant) {
        let guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tasks) = guard.as_ref() {
            self.shared.accept(frame, now, tasks);
        }
    }

    pub fn set_sensitivity(&self, sensitivity: Sensitivity) {
        self.shared
            .sensitivity
            .store(sensitivity.threshold(), Ordering::Relaxed);
    }

    pub fn sensitivity(&self) -> Sensitivity {
        self.shared.sensitivity()
    }

    pub fn sample_interval(&self) -> Duration {
        self.shared.config.sample_interval
    }

    /// Registers the in-process listener, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn DetectionListener>) {
        self.shared.listener.set(listener);
    }

    pub fn remove_listener(&self) {
        self.shared.listener.clear();
    }

    /// Subscribes to the event stream. Events published before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<MotionEvent> {
        self.shared.events.subscribe()
    }

    /// The event stream as a `futures::Stream`.
    pub fn events(&self) -> impl Stream<Item = MotionEvent> + use<> {
        events::into_stream(self.subscribe())
    }

    /// Stops detection, drops the listener, closes the event stream and lets
    /// the worker exit once its queue is drained.
    pub fn dispose(&self) {
        self.stop();
        self.shared.listener.clear();
        self.shared.events.close();
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_worker_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

impl Drop for FrameGate {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_worker(shared: Arc<GateShared>, mut tasks: mpsc::Receiver<FrameTask>) {
    let mut engine = GridDiffEngine::new();
    let mut engine_session = 0u64;

    while let Some(task) = tasks.recv().await {
        if !shared.is_current(task.session) {
            debug!(sequence = task.sequence, "skipping frame from an ended session");
            continue;
        }
        if task.session != engine_session {
            engine.reset();
            engine_session = task.session;
        }

        match engine.try_detect(&task.plane, task.rotation, task.sensitivity) {
            Ok(result) => shared.deliver(&task, result),
            Err(error) => {
                warn!(%error, sequence = task.sequence, "refusing malformed luma plane");
            }
        }
    }

    debug!("detection worker exiting");
}
