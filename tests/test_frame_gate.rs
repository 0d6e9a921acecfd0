use futures::StreamExt;
use grid_motion::{
    DetectionRequest, DetectionResult, FrameBroadcaster, FrameGate, FrameSource, GateConfig, I420Frame,
    MotionEvent, RgbaFrame, Sensitivity, GRID_COLUMNS, GRID_ROWS,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

const W: u32 = 160;
const H: u32 = 120;
const INTERVAL: Duration = Duration::from_millis(300);

fn test_config() -> GateConfig {
    GateConfig {
        sample_interval: INTERVAL,
        queue_capacity: 32,
        event_capacity: 64,
        sensitivity: Sensitivity::from_level(2),
    }
}

fn flat_frame(luma: u8, rotation: i32) -> I420Frame {
    I420Frame::from_luma(W, H, W, vec![luma; (W * H) as usize], rotation)
}

fn enable(level: i32) -> DetectionRequest {
    DetectionRequest { enabled: true, level }
}

async fn next_event(receiver: &mut broadcast::Receiver<MotionEvent>) -> MotionEvent {
    tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("timed out waiting for a motion event")
        .expect("event stream closed")
}

/// Lets the worker drain its queue, then reports whether anything else arrived.
async fn settle(receiver: &mut broadcast::Receiver<MotionEvent>) -> bool {
    tokio::time::sleep(Duration::from_millis(50)).await;
    receiver.try_recv().is_ok()
}

fn counting_listener(gate: &FrameGate) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    gate.set_listener(Arc::new(move |_: &DetectionResult| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    calls
}

#[tokio::test]
async fn single_brightened_block_is_reported_end_to_end() {
    let gate = FrameGate::new(test_config()).unwrap();
    let source = Arc::new(FrameBroadcaster::new());
    gate.configure(enable(2), source.clone());
    let mut events = gate.subscribe();

    let before = vec![80u8; (W * H) as usize];
    let mut after = before.clone();
    // Cell (column 7, row 4) covers x 70..80, y 40..50.
    for y in 40..50 {
        for x in 70..80 {
            after[(y * W + x) as usize] += 50;
        }
    }

    let t0 = Instant::now();
    gate.on_frame_at(&I420Frame::from_luma(W, H, W, before, 0), t0);
    gate.on_frame_at(&I420Frame::from_luma(W, H, W, after, 0), t0 + INTERVAL);

    let baseline = next_event(&mut events).await;
    assert_eq!(baseline.sequence, 0);
    assert!(baseline.cells.is_empty());

    let event = next_event(&mut events).await;
    assert_eq!(event.sequence, 1);
    assert_eq!(event.timestamp_ms - baseline.timestamp_ms, 300);
    assert_eq!((event.x_count, event.y_count), (GRID_COLUMNS, GRID_ROWS));
    assert_eq!(event.cells.len(), 1);
    let cell = event.cells[0];
    assert_eq!(cell.luma, 130);
    assert!((cell.rect.left - 0.0625 * 7.0).abs() < 1e-5);
    assert!((cell.rect.top - (10.0 / 120.0) * 4.0).abs() < 1e-5);
    assert!((cell.rect.right - 0.0625 * 8.0).abs() < 1e-5);
    assert!((cell.rect.bottom - (10.0 / 120.0) * 5.0).abs() < 1e-5);
    assert!((event.aspect_ratio - 160.0 / 120.0).abs() < 1e-9);
}

#[tokio::test]
async fn frames_every_fifty_ms_are_sampled_every_three_hundred() {
    let gate = FrameGate::new(test_config()).unwrap();
    gate.start(Arc::new(FrameBroadcaster::new()));
    let mut events = gate.subscribe();

    let t0 = Instant::now();
    for i in 0..20u64 {
        gate.on_frame_at(&flat_frame(50, 0), t0 + Duration::from_millis(50 * i));
    }

    let mut timestamps = Vec::new();
    for _ in 0..4 {
        timestamps.push(next_event(&mut events).await.timestamp_ms);
    }
    assert!(!settle(&mut events).await);
    let offsets: Vec<u64> = timestamps.iter().map(|t| t - timestamps[0]).collect();
    assert_eq!(offsets, vec![0, 300, 600, 900]);
}

#[tokio::test]
async fn frames_are_ignored_until_started() {
    let gate = FrameGate::new(test_config()).unwrap();
    let mut events = gate.subscribe();
    gate.on_frame(&flat_frame(10, 0));
    assert!(!settle(&mut events).await);
    assert!(!gate.is_started());
}

#[tokio::test]
async fn source_deliveries_reach_the_gate() {
    let gate = FrameGate::new(test_config()).unwrap();
    let source = Arc::new(FrameBroadcaster::new());
    gate.start(source.clone());
    let mut events = gate.subscribe();

    source.deliver(&flat_frame(10, 0));
    // Arrives well inside the interval and is throttled.
    source.deliver(&flat_frame(200, 0));

    let event = next_event(&mut events).await;
    assert_eq!(event.sequence, 0);
    assert!(!settle(&mut events).await);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let gate = FrameGate::new(test_config()).unwrap();
    let source = Arc::new(FrameBroadcaster::new());

    gate.stop();
    gate.start(source.clone());
    gate.start(source.clone());
    assert!(gate.is_started());
    assert_eq!(source.sink_count(), 1);

    gate.stop();
    gate.stop();
    assert!(!gate.is_started());
    assert_eq!(source.sink_count(), 0);
}

#[tokio::test]
async fn disabling_detaches_and_updates_sensitivity_only_while_enabled() {
    let gate = FrameGate::new(test_config()).unwrap();
    let source = Arc::new(FrameBroadcaster::new());

    gate.configure(enable(5), source.clone());
    assert_eq!(gate.sensitivity().threshold(), 5);
    gate.configure(enable(9), source.clone());
    assert_eq!(gate.sensitivity().threshold(), 9);
    assert_eq!(source.sink_count(), 1);

    gate.configure(DetectionRequest { enabled: false, level: 1 }, source.clone());
    assert!(!gate.is_started());
    assert_eq!(source.sink_count(), 0);
    assert_eq!(gate.sensitivity().threshold(), 9);
}

#[tokio::test]
async fn results_pending_at_stop_are_discarded() {
    let gate = FrameGate::new(test_config()).unwrap();
    gate.start(Arc::new(FrameBroadcaster::new()));
    let calls = counting_listener(&gate);
    let mut events = gate.subscribe();

    let t0 = Instant::now();
    gate.on_frame_at(&flat_frame(10, 0), t0);
    gate.on_frame_at(&flat_frame(90, 0), t0 + INTERVAL);
    // The worker has not run yet on this single-threaded runtime.
    gate.stop();

    assert!(!settle(&mut events).await);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn restarting_clears_the_baseline() {
    let gate = FrameGate::new(test_config()).unwrap();
    let source: Arc<dyn FrameSource> = Arc::new(FrameBroadcaster::new());
    let mut events = gate.subscribe();

    gate.start(Arc::clone(&source));
    gate.on_frame_at(&flat_frame(10, 0), Instant::now());
    assert!(next_event(&mut events).await.cells.is_empty());
    gate.stop();

    gate.start(Arc::clone(&source));
    let t0 = Instant::now();
    // Identical content and a very different one both start from scratch.
    gate.on_frame_at(&flat_frame(200, 0), t0);
    let first = next_event(&mut events).await;
    assert_eq!(first.sequence, 0);
    assert!(first.cells.is_empty());

    gate.on_frame_at(&flat_frame(10, 0), t0 + INTERVAL);
    let second = next_event(&mut events).await;
    assert_eq!(second.cells.len(), (GRID_COLUMNS * GRID_ROWS) as usize);
}

#[tokio::test]
async fn rotation_change_mid_stream_rebaselines() {
    let gate = FrameGate::new(test_config()).unwrap();
    gate.start(Arc::new(FrameBroadcaster::new()));
    let mut events = gate.subscribe();

    let t0 = Instant::now();
    gate.on_frame_at(&flat_frame(10, 0), t0);
    gate.on_frame_at(&flat_frame(250, 90), t0 + INTERVAL);
    gate.on_frame_at(&flat_frame(10, 90), t0 + INTERVAL * 2);

    assert!(next_event(&mut events).await.cells.is_empty());
    let rotated = next_event(&mut events).await;
    assert!(rotated.cells.is_empty());
    assert!((rotated.aspect_ratio - 0.75).abs() < 1e-9);
    let compared = next_event(&mut events).await;
    assert_eq!(compared.cells.len(), (GRID_COLUMNS * GRID_ROWS) as usize);
}

#[tokio::test]
async fn frames_without_luma_and_malformed_planes_are_skipped() {
    let gate = FrameGate::new(test_config()).unwrap();
    gate.start(Arc::new(FrameBroadcaster::new()));
    let mut events = gate.subscribe();

    let t0 = Instant::now();
    gate.on_frame_at(&I420Frame::from_luma(W, H, W, Vec::new(), 0), t0);
    gate.on_frame_at(&I420Frame::from_luma(W, H, W / 2, vec![0u8; (W * H) as usize], 0), t0 + INTERVAL);
    gate.on_frame_at(&RgbaFrame::new(W, H, vec![255u8; (W * H * 4) as usize], 0), t0 + INTERVAL * 2);

    let event = next_event(&mut events).await;
    assert_eq!(event.sequence, 1);
    assert!(event.cells.is_empty());
    assert!(!settle(&mut events).await);
}

#[tokio::test]
async fn listener_slot_keeps_the_last_registration() {
    let gate = FrameGate::new(test_config()).unwrap();
    gate.start(Arc::new(FrameBroadcaster::new()));
    let first = counting_listener(&gate);
    let second = counting_listener(&gate);
    let mut events = gate.subscribe();

    let t0 = Instant::now();
    gate.on_frame_at(&flat_frame(10, 0), t0);
    next_event(&mut events).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    gate.remove_listener();
    gate.on_frame_at(&flat_frame(10, 0), t0 + INTERVAL);
    next_event(&mut events).await;
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropping_the_gate_ends_the_event_stream() {
    let gate = FrameGate::new(test_config()).unwrap();
    let source = Arc::new(FrameBroadcaster::new());
    gate.start(source.clone());
    let stream = gate.events();

    drop(gate);
    assert_eq!(source.sink_count(), 0);
    let remaining: Vec<MotionEvent> = tokio::time::timeout(Duration::from_secs(2), stream.collect())
        .await
        .expect("event stream did not end");
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn dispose_ends_the_event_stream_and_the_worker() {
    let gate = FrameGate::new(test_config()).unwrap();
    let source = Arc::new(FrameBroadcaster::new());
    gate.start(source.clone());
    let mut stream = Box::pin(gate.events());

    gate.dispose();
    assert!(!gate.is_started());
    assert_eq!(source.sink_count(), 0);
    let next = tokio::time::timeout(Duration::from_millis(500), stream.next())
        .await
        .expect("event stream did not end after dispose");
    assert!(next.is_none());

    // Late subscribers see an already finished stream.
    let late: Vec<MotionEvent> = tokio::time::timeout(Duration::from_millis(500), gate.events().collect())
        .await
        .expect("late subscription did not end");
    assert!(late.is_empty());

    let mut finished = false;
    for _ in 0..50 {
        if gate.is_worker_finished() {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(finished, "detection worker still running after dispose");

    // A disposed gate stays down.
    gate.start(source.clone());
    assert!(!gate.is_started());
    assert_eq!(source.sink_count(), 0);
}

#[tokio::test]
async fn stop_from_the_listener_suppresses_the_event() {
    let gate = Arc::new(FrameGate::new(test_config()).unwrap());
    gate.start(Arc::new(FrameBroadcaster::new()));
    let mut events = gate.subscribe();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let weak = Arc::downgrade(&gate);
    gate.set_listener(Arc::new(move |_: &DetectionResult| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = weak.upgrade() {
            gate.stop();
        }
    }));

    gate.on_frame_at(&flat_frame(10, 0), Instant::now());
    assert!(!settle(&mut events).await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!gate.is_started());
}
