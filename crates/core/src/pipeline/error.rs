use std::path::PathBuf;

use thiserror::Error;

/// Errors from running one of the external tools.
#[derive(Debug, Error)]
pub enum StageError {
    /// The tool could not be started.
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The tool ran and reported failure.
    #[error("{tool} exited with {}", exit_code_label(*code))]
    ExitStatus {
        tool: String,
        code: Option<i32>,
        /// Last lines the tool wrote before exiting.
        output_tail: String,
    },

    /// The tool exited cleanly but the expected file is not there.
    #[error("expected output was not produced: {path}")]
    OutputMissing { path: PathBuf },

    #[error("failed to probe duration: {reason}")]
    Probe { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn exit_status(tool: impl Into<String>, code: Option<i32>, output_tail: String) -> Self {
        Self::ExitStatus {
            tool: tool.into(),
            code,
            output_tail,
        }
    }

    /// Error text plus any captured tool output, for the history record.
    pub fn details(&self) -> String {
        match self {
            StageError::ExitStatus { output_tail, .. } if !output_tail.trim().is_empty() => {
                format!("{}\n{}", self, output_tail.trim_end())
            }
            _ => self.to_string(),
        }
    }
}

fn exit_code_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
