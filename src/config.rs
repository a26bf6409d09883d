use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the clipnotes pipeline.
///
/// Every provider section is optional at runtime: a missing endpoint or API
/// key degrades the corresponding stage to its fallback path, it never hard
/// fails a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub captions: CaptionConfig,
    pub speech: SpeechConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub materialize: MaterializeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: u64,

    /// MIME types accepted for uploads.
    pub allowed_mime_types: Vec<String>,

    /// Jobs still `processing` after this many seconds at startup are
    /// failed by the recovery scan.
    pub stale_after_secs: u64,
}

/// Hosted transcript (caption) service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProviderKind {
    /// Local whisper CLI, synchronous.
    Local,
    /// Hosted upload-then-poll provider.
    Hosted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub provider: SpeechProviderKind,

    /// Binary name for the local whisper backend.
    pub whisper_binary: String,
    pub whisper_model: String,

    /// Base endpoint of the hosted provider.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,

    /// Cadence of the hosted provider's status polling loop.
    pub poll_interval_ms: u64,
    /// Attempt cap; exceeding it is a timeout failure.
    pub max_poll_attempts: u32,

    pub request_timeout_secs: u64,
}

/// Generative model used for segmentation, summaries and flashcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint. Defaults to the OpenAI
    /// API when only an API key is set.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// True when no generative model can be reached; callers use the
    /// deterministic fallbacks directly.
    pub fn is_unconfigured(&self) -> bool {
        self.endpoint.is_none() && self.api_key.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub jobs_dir: PathBuf,
}

/// External notes/flashcards sink for materialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializeConfig {
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the usual file locations, falling back to
    /// environment-seeded defaults.
    pub fn load() -> Result<Self> {
        let config_paths = ["clipnotes.toml", "config/clipnotes.toml"];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("loaded configuration from {}", path);
                        config.apply_env_overrides();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables override file values, so secrets can stay out
    /// of config files.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("CLIPNOTES_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(dir) = std::env::var("CLIPNOTES_JOBS_DIR") {
            self.storage.jobs_dir = PathBuf::from(dir);
        }
        if let Ok(endpoint) = std::env::var("CLIPNOTES_CAPTIONS_ENDPOINT") {
            self.captions.endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("CLIPNOTES_CAPTIONS_API_KEY") {
            self.captions.api_key = Some(key);
        }
        if let Ok(endpoint) = std::env::var("CLIPNOTES_SPEECH_ENDPOINT") {
            self.speech.endpoint = Some(endpoint);
            self.speech.provider = SpeechProviderKind::Hosted;
        }
        if let Ok(key) = std::env::var("CLIPNOTES_SPEECH_API_KEY") {
            self.speech.api_key = Some(key);
        }
        if let Ok(endpoint) = std::env::var("CLIPNOTES_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("CLIPNOTES_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("CLIPNOTES_LLM_MODEL") {
            self.llm.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_upload_bytes == 0 {
            return Err(anyhow!("ingest.max_upload_bytes must be greater than 0"));
        }
        if self.ingest.allowed_mime_types.is_empty() {
            return Err(anyhow!("ingest.allowed_mime_types must not be empty"));
        }
        if self.speech.max_poll_attempts == 0 {
            return Err(anyhow!("speech.max_poll_attempts must be greater than 0"));
        }
        if self.speech.poll_interval_ms == 0 {
            return Err(anyhow!("speech.poll_interval_ms must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            ingest: IngestConfig {
                max_upload_bytes: 250 * 1024 * 1024,
                allowed_mime_types: vec![
                    "video/mp4".to_string(),
                    "video/mpeg".to_string(),
                    "video/quicktime".to_string(),
                    "video/webm".to_string(),
                    "video/x-matroska".to_string(),
                    "audio/mpeg".to_string(),
                    "audio/mp4".to_string(),
                    "audio/wav".to_string(),
                    "audio/x-wav".to_string(),
                ],
                stale_after_secs: 15 * 60,
            },
            captions: CaptionConfig {
                endpoint: None,
                api_key: None,
                request_timeout_secs: 15,
            },
            speech: SpeechConfig {
                provider: SpeechProviderKind::Local,
                whisper_binary: "whisper-cli".to_string(),
                whisper_model: "base".to_string(),
                endpoint: None,
                api_key: None,
                poll_interval_ms: 3_000,
                max_poll_attempts: 60,
                request_timeout_secs: 30,
            },
            llm: LlmConfig {
                endpoint: None,
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                max_tokens: 2_048,
                temperature: 0.2,
                timeout_secs: 60,
            },
            storage: StorageConfig {
                jobs_dir: PathBuf::from("./jobs"),
            },
            materialize: MaterializeConfig {
                endpoint: None,
                request_timeout_secs: 15,
            },
        }
    }
}

/// Builder for programmatic configuration, mainly used by tests.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_jobs_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.jobs_dir = dir;
        self
    }

    pub fn with_speech_endpoint(mut self, endpoint: String, api_key: String) -> Self {
        self.config.speech.provider = SpeechProviderKind::Hosted;
        self.config.speech.endpoint = Some(endpoint);
        self.config.speech.api_key = Some(api_key);
        self
    }

    pub fn with_polling(mut self, interval_ms: u64, max_attempts: u32) -> Self {
        self.config.speech.poll_interval_ms = interval_ms;
        self.config.speech.max_poll_attempts = max_attempts;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.ingest.max_upload_bytes = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
