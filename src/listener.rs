// THEORY:
// The listener is the in-process side of the detector's output. Co-located
// consumers that want a result as soon as the worker has it register a
// `DetectionListener`; plain closures qualify. The gate keeps a single slot:
// registering replaces whatever was there, and the slot is read without
// holding its lock across the callback.

use crate::pipeline::DetectionResult;
use std::sync::{Arc, PoisonError, RwLock};

/// A co-located consumer of detection results.
///
/// Called from the detection worker, never from the frame delivery path.
pub trait DetectionListener: Send + Sync {
    fn on_detect(&self, result: &DetectionResult);
}

impl<F> DetectionListener for F
where
    F: Fn(&DetectionResult) + Send + Sync,
{
    fn on_detect(&self, result: &DetectionResult) {
        self(result)
    }
}

/// Holds at most one listener; registering replaces the previous one.
#[derive(Default)]
pub struct ListenerSlot {
    current: RwLock<Option<Arc<dyn DetectionListener>>>,
}

impl ListenerSlot {
    pub fn set(&self, listener: Arc<dyn DetectionListener>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_set(&self) -> bool {
        self.current.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Invokes the listener, if any. The lock is released before the call.
    pub fn notify(&self, result: &DetectionResult) -> bool {
        let listener = self.current.read().unwrap_or_else(PoisonError::into_inner).clone();
        match listener {
            Some(listener) => {
                listener.on_detect(result);
                true
            }
            None => false,
        }
    }
}
