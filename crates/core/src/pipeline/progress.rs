//! Progress scraping for ffmpeg's stderr.

use regex_lite::Regex;

use super::traits::ProgressParser;

/// Reads `time=HH:MM:SS.xx` and `out_time_ms=<micros>` markers.
///
/// Without a known duration every line yields `None`.
pub struct FfmpegProgressParser {
    duration_secs: Option<f64>,
    time_regex: Option<Regex>,
    out_time_regex: Option<Regex>,
}

impl FfmpegProgressParser {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| *d > 0.0),
            time_regex: Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok(),
            // ffmpeg reports out_time_ms in microseconds.
            out_time_regex: Regex::new(r"out_time_ms=(\d+)").ok(),
        }
    }

    /// Position in seconds carried by `line`, if any.
    pub fn position_secs(&self, line: &str) -> Option<f64> {
        if let Some(caps) = self.out_time_regex.as_ref().and_then(|re| re.captures(line)) {
            let micros: f64 = caps.get(1)?.as_str().parse().ok()?;
            return Some(micros / 1_000_000.0);
        }

        let caps = self.time_regex.as_ref()?.captures(line)?;
        let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
        let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
        let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }
}

impl ProgressParser for FfmpegProgressParser {
    fn parse_line(&mut self, line: &str) -> Option<f32> {
        let duration = self.duration_secs?;
        let position = self.position_secs(line)?;
        Some((position / duration * 100.0).clamp(0.0, 100.0) as f32)
    }
}
