//! Error type, logging setup and evaluation metrics

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{CropDocError, Result};
pub use logging::{init_logging, LogConfig};
pub use metrics::{ConfusionMatrix, Metrics};

/// `42.0s`, `3m 5s` or `2h 10m`
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.1}s");
    }
    let whole = seconds as u64;
    let (h, m, s) = (whole / 3600, (whole % 3600) / 60, whole % 60);
    if h == 0 {
        format!("{m}m {s}s")
    } else {
        format!("{h}h {m}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
        assert_eq!(format_duration(7200.0), "2h 0m");
    }
}
