//! Formatting helpers shared by the core and its consumers.

use std::time::Duration;

/// Clock-style `HH:MM:SS` for run times and ETAs; fractions of a second are
/// dropped. Negative or non-finite input renders as "??:??:??".
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    if !(seconds.is_finite() && seconds >= 0.0) {
        return "??:??:??".into();
    }
    let whole = seconds.trunc() as u64;
    let (hours, rest) = (whole / 3600, whole % 3600);
    format!("{:02}:{:02}:{:02}", hours, rest / 60, rest % 60)
}

/// ETA for progress lines; "--:--:--" when unknown.
#[must_use]
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => format_duration(eta.as_secs_f64()),
        None => "--:--:--".to_string(),
    }
}

/// Trial sizes as reported by the service, in megabytes.
#[must_use]
pub fn format_size_mb(size_mb: f64) -> String {
    if size_mb.is_finite() && size_mb >= 0.0 {
        format!("{size_mb:.2} MB")
    } else {
        "? MB".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00:00:00");
        assert_eq!(format_duration(3725.9), "01:02:05");
        assert_eq!(format_duration(-1.0), "??:??:??");
        assert_eq!(format_duration(f64::NAN), "??:??:??");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(Some(Duration::from_secs(90))), "00:01:30");
        assert_eq!(format_eta(None), "--:--:--");
    }

    #[test]
    fn test_format_size_mb() {
        assert_eq!(format_size_mb(4.256), "4.26 MB");
        assert_eq!(format_size_mb(f64::INFINITY), "? MB");
    }
}
