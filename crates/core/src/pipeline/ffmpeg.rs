//! Stage 2 driver: ffprobe for duration, ffmpeg for the delivery transcode.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::error::StageError;
use super::progress::FfmpegProgressParser;
use super::traits::{ProgressParser, Transcoder};
use super::{tool_label, OUTPUT_TAIL_LINES};
use crate::config::{Config, TranscodeConfig};

/// Transcodes intermediates with ffmpeg.
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    settings: TranscodeConfig,
}

impl FfmpegTranscoder {
    pub fn new(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        settings: TranscodeConfig,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.tools.ffmpeg,
            &config.tools.ffprobe,
            config.transcode.clone(),
        )
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let s = &self.settings;
        vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            s.video_codec.clone(),
            "-b:v".to_string(),
            s.video_bitrate.clone(),
            "-vf".to_string(),
            format!("scale={},format={}", s.scale, s.pixel_format),
            "-c:a".to_string(),
            s.audio_codec.clone(),
            "-ar".to_string(),
            s.audio_sample_rate.to_string(),
            "-f".to_string(),
            s.container.clone(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    fn parse_duration(stdout: &str) -> Result<f64, StageError> {
        let text = stdout.trim();
        text.lines()
            .next()
            .and_then(|line| line.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| StageError::Probe {
                reason: format!("unexpected ffprobe output: {:?}", text),
            })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe_duration(&self, input: &Path) -> Result<f64, StageError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| StageError::Spawn {
                tool: self.ffprobe.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(StageError::Probe {
                reason: format!(
                    "ffprobe exited with {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Self::parse_duration(&String::from_utf8_lossy(&output.stdout))
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        duration_secs: Option<f64>,
        progress_tx: mpsc::Sender<f32>,
    ) -> Result<(), StageError> {
        if !input.exists() {
            return Err(StageError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.build_args(input, output);
        debug!("Running {} {}", self.ffmpeg.display(), args.join(" "));

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StageError::Spawn {
                tool: self.ffmpeg.clone(),
                source: e,
            })?;

        let mut parser = FfmpegProgressParser::new(duration_secs);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);

        if let Some(stderr) = child.stderr.take() {
            // ffmpeg rewrites its stats line with '\r'; split on both.
            let mut reader = BufReader::new(stderr).split(b'\r');
            while let Some(chunk) = reader.next_segment().await? {
                for line in String::from_utf8_lossy(&chunk).lines() {
                    match parser.parse_line(line) {
                        Some(percent) => {
                            let _ = progress_tx.try_send(percent);
                        }
                        None => {
                            if !line.trim().is_empty() {
                                debug!(target: "ingest_core::ffmpeg", "{}", line);
                            }
                        }
                    }
                    if tail.len() == OUTPUT_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let output_tail = tail.into_iter().collect::<Vec<_>>().join("\n");
            return Err(StageError::exit_status(
                tool_label(&self.ffmpeg),
                status.code(),
                output_tail,
            ));
        }

        Ok(())
    }
}
