//! Runtime configuration for llm-relay.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Every section falls back to its defaults, so a partial file is valid.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::server::tasks::Task;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "llm-relay", about = "Streaming LLM relay with session cancellation")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Serve a canned reply instead of calling the upstream API.
    #[arg(long)]
    pub mock_upstream: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Upstream completion service.
    pub upstream: UpstreamConfig,

    /// Per-endpoint payload limits.
    pub limits: LimitsConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Hard cap on any request body, enforced by the transport layer.
    pub max_body_bytes: usize,

    /// Interval between SSE keep-alive comments.
    pub keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            max_body_bytes: 64 * 1024,
            keep_alive_secs: 15,
        }
    }
}

impl ServerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

/// Upstream chat-completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix.
    pub base_url: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Model used by the streaming endpoints.
    pub streaming_model: String,

    /// Model used by the buffered (JSON) endpoints.
    pub buffered_model: String,

    /// Sampling seed forwarded upstream, if any.
    pub seed: Option<i64>,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout for buffered calls. Streams have no timeout.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            streaming_model: "gpt-4.1-nano".to_string(),
            buffered_model: "gpt-4.1-mini".to_string(),
            seed: Some(0),
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

impl UpstreamConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Model to use for a given task.
    pub fn model_for(&self, task: Task) -> &str {
        if task.is_streaming() {
            &self.streaming_model
        } else {
            &self.buffered_model
        }
    }
}

/// Maximum payload size, in bytes, accepted by each endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub generate: usize,
    pub summary: usize,
    pub question_response: usize,
    pub topic_info: usize,
    pub catch_topics: usize,
    pub generate_questions: usize,
    pub catch_questions: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            generate: 10_000,
            summary: 2_500,
            question_response: 5_000,
            topic_info: 5_000,
            catch_topics: 2_500,
            generate_questions: 2_500,
            catch_questions: 2_500,
        }
    }
}

impl LimitsConfig {
    pub fn for_task(&self, task: Task) -> usize {
        match task {
            Task::Generate => self.generate,
            Task::Summary => self.summary,
            Task::QuestionResponse => self.question_response,
            Task::TopicInfo => self.topic_info,
            Task::CatchTopics => self.catch_topics,
            Task::GenerateQuestions => self.generate_questions,
            Task::CatchQuestions => self.catch_questions,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Reject settings that parse but cannot be served.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.keep_alive_secs == 0 {
            anyhow::bail!("server.keep_alive_secs must be at least 1");
        }
        Ok(())
    }
}
