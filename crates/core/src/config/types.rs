use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub tools: ToolsConfig,
    pub color: ColorConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Managed directories and state artifacts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Folder polled for newly arrived camera files
    pub watch: PathBuf,
    /// Holds the source file while its job is in flight
    pub processing: PathBuf,
    /// Final deliverables
    pub output: PathBuf,
    /// Archive for sources that were transcoded successfully
    pub processed: PathBuf,
    /// Intermediate files produced by the color stage
    pub temp: PathBuf,
    /// Sources whose job failed
    pub error: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs: PathBuf,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("_internal/logs")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("_internal/status.json")
}

fn default_history_file() -> PathBuf {
    PathBuf::from("_internal/history.json")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("_internal/ingest_engine.lock")
}

impl PathsConfig {
    /// Resolve one of the managed folders by its API name.
    pub fn managed_folder(&self, name: &str) -> Option<&PathBuf> {
        match name {
            "watch" => Some(&self.watch),
            "processing" => Some(&self.processing),
            "output" => Some(&self.output),
            "processed" => Some(&self.processed),
            "temp" => Some(&self.temp),
            "error" => Some(&self.error),
            _ => None,
        }
    }

    /// All managed folders with their API names.
    pub fn managed_folders(&self) -> [(&'static str, &PathBuf); 6] {
        [
            ("watch", &self.watch),
            ("processing", &self.processing),
            ("output", &self.output),
            ("processed", &self.processed),
            ("temp", &self.temp),
            ("error", &self.error),
        ]
    }

    /// Location of the engine log file.
    pub fn log_file(&self) -> PathBuf {
        self.logs.join(LOG_FILE_NAME)
    }
}

/// File name of the engine log inside `paths.logs`.
pub const LOG_FILE_NAME: &str = "ingest_engine.log";

/// External tool executables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Color-science command line tool (stage 1)
    pub art_cli: PathBuf,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Stage 1 parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColorConfig {
    /// Passed as `--target-colorspace`
    pub target_colorspace: String,
    #[serde(default = "default_intermediate_codec")]
    pub video_codec: String,
}

fn default_intermediate_codec() -> String {
    "prores422".to_string()
}

/// Stage 2 parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: String,
    #[serde(default = "default_scale")]
    pub scale: String,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
    /// Container format, also used as the deliverable's extension
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_video_codec() -> String {
    "dnxhd".to_string()
}

fn default_video_bitrate() -> String {
    "145M".to_string()
}

fn default_scale() -> String {
    "1920:1080".to_string()
}

fn default_pixel_format() -> String {
    "yuv422p".to_string()
}

fn default_audio_codec() -> String {
    "pcm_s24le".to_string()
}

fn default_audio_sample_rate() -> u32 {
    48000
}

fn default_container() -> String {
    "mxf".to_string()
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            video_bitrate: default_video_bitrate(),
            scale: default_scale(),
            pixel_format: default_pixel_format(),
            audio_codec: default_audio_codec(),
            audio_sample_rate: default_audio_sample_rate(),
            container: default_container(),
        }
    }
}

/// Watcher and orchestrator tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    /// Source extensions accepted by the watcher, e.g. ".mov"
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Minimum time since first observation before a file may be admitted
    #[serde(default = "default_min_file_age")]
    pub min_file_age_secs: u64,
    /// Lower bound between two progress writes to the status store
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".mov".to_string(), ".mxf".to_string()]
}

fn default_poll_interval() -> u64 {
    15
}

fn default_min_file_age() -> u64 {
    10
}

fn default_progress_interval() -> u64 {
    1000
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            poll_interval_secs: default_poll_interval(),
            min_file_age_secs: default_min_file_age(),
            progress_interval_ms: default_progress_interval(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[paths]
watch = "/ingest/watch"
processing = "/ingest/processing"
output = "/ingest/output"
processed = "/ingest/processed"
temp = "/ingest/temp"
error = "/ingest/error"

[tools]
art_cli = "/opt/art/art-cmd"

[color]
target_colorspace = "Rec709"
"#;

    #[test]
    fn test_deserialize_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.paths.watch, PathBuf::from("/ingest/watch"));
        assert_eq!(config.paths.status_file, PathBuf::from("_internal/status.json"));
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.color.video_codec, "prores422");
        assert_eq!(config.transcode.video_bitrate, "145M");
        assert_eq!(config.transcode.container, "mxf");
        assert_eq!(config.processing.poll_interval_secs, 15);
        assert_eq!(config.processing.min_file_age_secs, 10);
        assert_eq!(config.processing.allowed_extensions, vec![".mov", ".mxf"]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
    }

    #[test]
    fn test_deserialize_missing_color_fails() {
        let toml = MINIMAL.replace("[color]\ntarget_colorspace = \"Rec709\"\n", "");
        let result: Result<Config, _> = toml::from_str(&toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_processing_overrides() {
        let toml = format!(
            "{}\n[processing]\nallowed_extensions = [\".MOV\"]\npoll_interval_secs = 5\n",
            MINIMAL
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.processing.allowed_extensions, vec![".MOV"]);
        assert_eq!(config.processing.poll_interval_secs, 5);
        assert_eq!(config.processing.progress_interval_ms, 1000);
    }

    #[test]
    fn test_managed_folder_lookup() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(
            config.paths.managed_folder("error"),
            Some(&PathBuf::from("/ingest/error"))
        );
        assert!(config.paths.managed_folder("logs").is_none());
        assert_eq!(config.paths.managed_folders().len(), 6);
        assert_eq!(
            config.paths.log_file(),
            PathBuf::from("_internal/logs/ingest_engine.log")
        );
    }
}
