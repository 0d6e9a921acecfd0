// THEORY:
// This file is the main entry point for the `grid_motion` library crate.
// It exposes two layers to the outside world:
//
// 1.  The `FrameGate` (in `frame_gate`), which sits on a live video stream,
//     decides which frames are worth analyzing, and fans the results out to a
//     listener and an event stream.
// 2.  The `GridDiffEngine` (in `core_modules`), the pure analysis step. It
//     slices a luma plane into a fixed 16x12 grid, averages each cell, and
//     reports which cells changed since the previous sample.
//
// Everything a host needs (frames, results, configuration) is re-exported here
// so consumers rarely have to reach into the individual modules.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_gate;
pub mod listener;
pub mod pipeline;
pub mod timeline;

pub use config::{Config, DetectionConfig, DetectionRequest, LoggingConfig};
pub use core_modules::grid_engine::{GridDiffEngine, LumaMatrix};
pub use core_modules::luma_plane::LumaPlane;
pub use core_modules::rotation::{NormalizedRect, Rotation};
pub use error::{ConfigError, GateError, PlaneError};
pub use events::EventStream;
pub use frame::{FrameBroadcaster, FrameSource, I420Frame, RgbaFrame, VideoFrame, VideoSink};
pub use frame_gate::{FrameGate, GateConfig};
pub use listener::DetectionListener;
pub use pipeline::{ChangedCell, DetectionResult, MotionEvent, Sensitivity, GRID_COLUMNS, GRID_ROWS};
pub use timeline::{DetectionTimeline, TimedDetection};
