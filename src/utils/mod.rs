//! Shared utilities
//!
//! - `error`: the crate error type
//! - `logging`: tracing subscriber presets
//! - `metrics`: binary confusion matrix and derived scores

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{JaundiceError, Result};
pub use logging::init_logging;
pub use metrics::{BinaryConfusionMatrix, BinaryMetrics, RunningAverage};

/// Human-readable duration: `42.0s`, `3m 05s`, `2h 14m`
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }

    let whole = seconds.round() as u64;
    let (hours, minutes, secs) = (whole / 3600, (whole % 3600) / 60, whole % 60);
    if hours == 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}h {:02}m", hours, minutes)
    }
}

/// Probability as a percentage with two decimals
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.2}%", confidence * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.0), "42.0s");
        assert_eq!(format_duration(185.0), "3m 05s");
        assert_eq!(format_duration(8040.0), "2h 14m");
    }

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(0.5), "50.00%");
        assert_eq!(format_confidence(0.98765), "98.77%");
    }
}
