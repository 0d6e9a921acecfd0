// THEORY:
// The `EventStream` is the cross-boundary side of the detector's output. It is
// a broadcast channel the detection worker writes to; whatever transport sits
// on the far side (a UI bridge, a websocket, a log) subscribes to it and does
// its own marshaling.
//
// Delivery is strictly best-effort: with no subscriber the event is dropped on
// the spot, and a subscriber that falls behind skips ahead rather than
// applying backpressure to the worker. Closing the stream drops its sender,
// so every subscriber sees the end of the stream once it has drained.

use crate::pipeline::MotionEvent;
use futures::Stream;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

pub struct EventStream {
    capacity: usize,
    sender: Mutex<Option<broadcast::Sender<MotionEvent>>>,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel::<MotionEvent>(capacity);
        Self {
            capacity,
            sender: Mutex::new(Some(sender)),
        }
    }

    /// A new receiver. After `close` it is already at end of stream.
    pub fn subscribe(&self) -> broadcast::Receiver<MotionEvent> {
        match self.sender.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel::<MotionEvent>(self.capacity).1,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Publishes to current subscribers. Returns false if nobody received it.
    pub fn publish(&self, event: MotionEvent) -> bool {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return false;
        };
        match sender.send(event) {
            Ok(_) => true,
            Err(_) => {
                debug!("no event subscribers, dropping motion event");
                false
            }
        }
    }

    /// Drops the sender. Subscribers drain what was already sent, then see the end of the stream.
    pub fn close(&self) {
        if self.sender.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            debug!("event stream closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

/// Adapts a receiver into a `Stream`, skipping over events a slow consumer missed.
/// The stream ends when the sending side is dropped.
pub fn into_stream(receiver: broadcast::Receiver<MotionEvent>) -> impl Stream<Item = MotionEvent> {
    futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => return Some((event, receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
