//! Two-stage processing pipeline.
//!
//! A claimed job moves through:
//! 1. **Claim**: the source moves from the watch folder into processing
//! 2. **Stage 1**: the color processor writes `{temp}/{stem}_intermediate.mov`
//! 3. **Stage 2**: the transcoder writes `{output}/{stem}.{container}`
//! 4. **Cleanup**: the intermediate is deleted and the source archived
//!
//! Any failure moves the source to the error folder and removes partial
//! artifacts. Nothing is retried.

mod art;
mod error;
mod ffmpeg;
mod progress;
mod runner;
mod traits;

use std::path::Path;

pub use art::ArtCliProcessor;
pub use error::StageError;
pub use ffmpeg::FfmpegTranscoder;
pub use progress::FfmpegProgressParser;
pub use runner::{PipelineConfig, PipelineRunner, INTERMEDIATE_SUFFIX};
pub use traits::{ColorProcessor, JobObserver, NoopObserver, ProgressParser, Transcoder};

/// Lines of tool output kept for failure details.
pub(crate) const OUTPUT_TAIL_LINES: usize = 20;

/// Last few non-empty lines of a tool's output.
pub(crate) fn output_tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[skip..].join("\n")
}

/// Short tool name for messages: the executable's file name.
pub(crate) fn tool_label(tool: &Path) -> String {
    tool.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| tool.display().to_string())
}
