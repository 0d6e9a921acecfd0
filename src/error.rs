// THEORY:
// Errors are split by concern. `PlaneError` is per frame and recoverable: the
// engine refuses the pass and keeps its baseline. `ConfigError` comes from
// loading the TOML file. `GateError` covers constructing a gate outside a
// tokio runtime.

/// Reasons a luma plane is refused by the detector.
///
/// All of these are per-frame conditions: the pass is skipped and the
/// comparison baseline is left as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaneError {
    #[error("luma plane has a zero dimension: {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },
    #[error("row stride {stride} is smaller than the plane width {width}")]
    StrideTooSmall { stride: u32, width: u32 },
    #[error("luma buffer too short: got {got} bytes, expected at least {expected}")]
    BufferTooShort { got: usize, expected: usize },
    #[error("plane {width}x{height} is too small to form a {columns}x{rows} grid")]
    GridTooCoarse {
        width: u32,
        height: u32,
        columns: u32,
        rows: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("frame gate must be created inside a tokio runtime")]
    NoRuntime,
}
