//! Stage 1 driver for the ART color-science command line tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::error::StageError;
use super::traits::ColorProcessor;
use super::{output_tail, tool_label};
use crate::config::{ColorConfig, Config};

/// Runs `art_cli process` with the embedded camera look applied.
pub struct ArtCliProcessor {
    art_cli: PathBuf,
    target_colorspace: String,
    video_codec: String,
}

impl ArtCliProcessor {
    pub fn new(art_cli: impl Into<PathBuf>, color: &ColorConfig) -> Self {
        Self {
            art_cli: art_cli.into(),
            target_colorspace: color.target_colorspace.clone(),
            video_codec: color.video_codec.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.tools.art_cli, &config.color)
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "process".to_string(),
            "--input".to_string(),
            input.to_string_lossy().to_string(),
            "--output".to_string(),
            output.to_string_lossy().to_string(),
            "--embedded-look".to_string(),
            "--target-colorspace".to_string(),
            self.target_colorspace.clone(),
            "--video-codec".to_string(),
            self.video_codec.clone(),
        ]
    }
}

#[async_trait]
impl ColorProcessor for ArtCliProcessor {
    fn name(&self) -> &str {
        "art-cli"
    }

    async fn process(&self, input: &Path, output: &Path) -> Result<(), StageError> {
        if !input.exists() {
            return Err(StageError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = self.build_args(input, output);
        debug!("Running {} {}", self.art_cli.display(), args.join(" "));

        let result = Command::new(&self.art_cli)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StageError::Spawn {
                tool: self.art_cli.clone(),
                source: e,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail = if stderr.trim().is_empty() {
                output_tail(&String::from_utf8_lossy(&result.stdout))
            } else {
                output_tail(&stderr)
            };
            return Err(StageError::exit_status(
                tool_label(&self.art_cli),
                result.status.code(),
                tail,
            ));
        }

        Ok(())
    }
}
