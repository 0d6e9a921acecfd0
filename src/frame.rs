// THEORY:
// The `frame` module is the boundary with whatever produces video. The detector
// does not capture or decode anything itself; it only needs three things from
// the outside world:
//
// 1.  A `VideoFrame` that can hand over its luma plane and its rotation.
// 2.  A `VideoSink` that the source pushes frames into (the `FrameGate`
//     registers one of these).
// 3.  A `FrameSource` that sinks can be attached to and detached from.
//
// `I420Frame` and `RgbaFrame` cover the two common in-memory layouts, and
// `FrameBroadcaster` is a minimal source for hosts that already have frames in
// hand (tests, the replay tester, or an adapter around a real camera track).

use crate::core_modules::luma_plane::LumaPlane;
use image::{GrayImage, RgbaImage};
use std::sync::{Arc, Mutex, PoisonError};

/// One decoded video frame as delivered by a source.
pub trait VideoFrame: Send + Sync {
    /// Rotation in degrees needed to display the frame upright.
    fn rotation(&self) -> i32;

    /// Extracts the luma plane, or `None` when the frame has none to offer.
    fn to_luma_plane(&self) -> Option<LumaPlane>;
}

/// Receives frames pushed by a `FrameSource`.
pub trait VideoSink: Send + Sync {
    fn on_frame(&self, frame: &dyn VideoFrame);
}

/// A push-based frame producer.
pub trait FrameSource: Send + Sync {
    fn attach(&self, sink: Arc<dyn VideoSink>);
    /// Detaches a sink previously passed to `attach`. Unknown sinks are ignored.
    fn detach(&self, sink: &Arc<dyn VideoSink>);
}

/// A planar YUV 4:2:0 frame. Only the Y plane is used for detection.
#[derive(Debug, Clone)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub stride_y: u32,
    pub data_y: Arc<[u8]>,
    pub stride_u: u32,
    pub data_u: Arc<[u8]>,
    pub stride_v: u32,
    pub data_v: Arc<[u8]>,
    pub rotation: i32,
}

impl I420Frame {
    /// A frame with only the luma plane populated; chroma planes are empty.
    pub fn from_luma(width: u32, height: u32, stride_y: u32, data_y: impl Into<Arc<[u8]>>, rotation: i32) -> Self {
        let empty: Arc<[u8]> = Arc::from(Vec::new());
        Self {
            width,
            height,
            stride_y,
            data_y: data_y.into(),
            stride_u: 0,
            data_u: Arc::clone(&empty),
            stride_v: 0,
            data_v: empty,
            rotation,
        }
    }

    pub fn from_luma_image(image: &GrayImage, rotation: i32) -> Self {
        Self::from_luma(image.width(), image.height(), image.width(), image.as_raw().as_slice(), rotation)
    }
}

impl VideoFrame for I420Frame {
    fn rotation(&self) -> i32 {
        self.rotation
    }

    fn to_luma_plane(&self) -> Option<LumaPlane> {
        if self.data_y.is_empty() {
            return None;
        }
        Some(LumaPlane::new(self.width, self.height, self.stride_y, Arc::clone(&self.data_y)))
    }
}

/// An interleaved RGBA frame; luma is derived on extraction.
#[derive(Debug, Clone)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub rotation: i32,
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>, rotation: i32) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            rotation,
        }
    }

    pub fn from_image(image: &RgbaImage, rotation: i32) -> Self {
        Self::new(image.width(), image.height(), image.as_raw().as_slice(), rotation)
    }
}

impl VideoFrame for RgbaFrame {
    fn rotation(&self) -> i32 {
        self.rotation
    }

    fn to_luma_plane(&self) -> Option<LumaPlane> {
        LumaPlane::from_rgba(self.width, self.height, &self.data)
    }
}

/// A `FrameSource` that forwards every delivered frame to its attached sinks.
#[derive(Default)]
pub struct FrameBroadcaster {
    sinks: Mutex<Vec<Arc<dyn VideoSink>>>,
}

impl FrameBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes one frame to every attached sink, in attach order.
    pub fn deliver(&self, frame: &dyn VideoFrame) {
        // Snapshot so a sink may detach itself from inside `on_frame`.
        let sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for sink in sinks {
            sink.on_frame(frame);
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl FrameSource for FrameBroadcaster {
    fn attach(&self, sink: Arc<dyn VideoSink>) {
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        if !sinks.iter().any(|s| Arc::ptr_eq(s, &sink)) {
            sinks.push(sink);
        }
    }

    fn detach(&self, sink: &Arc<dyn VideoSink>) {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| !Arc::ptr_eq(s, sink));
    }
}
