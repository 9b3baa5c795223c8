//! Configuration system (layered: defaults < config file < env < setters).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ChatError;
use crate::gate::ReadinessPolicy;
use crate::tools::ToolServerSpec;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to sales data tools.\n\n\
IMPORTANT: You do NOT know the current date. When users ask questions involving dates like \
'last month', 'this year', 'last week' or 'today', you MUST first call the 'get_current_date' \
tool to find out what today's date is before answering.\n\n\
Available tools:\n\
- get_current_date: Get today's date and time (use this when date context is needed)\n\
- get_sales_data: Retrieve sales data with optional filters:\n  \
* num_products: Number of products to return\n  \
* region: Filter by region (North, South, East, West)\n  \
* start_date: Start of date range (YYYY-MM-DD format)\n  \
* end_date: End of date range (YYYY-MM-DD format)\n  \
* groupby: Group results by product, region or period\n\n\
Always use these tools when they can help answer the user's question.";

const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

/// Session and connection settings.
#[derive(Clone, PartialEq)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub plots_enabled: bool,
    pub system_prompt: String,
    pub readiness: ReadinessPolicy,
    /// Bound on opening the stream and on each chunk read. `None` waits indefinitely.
    pub stream_timeout: Option<Duration>,
    pub max_tool_rounds: u32,
    /// Tools whose results are scanned for chartable payloads.
    pub chart_tools: Vec<String>,
    pub tool_server: Option<ToolServerSpec>,
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("plots_enabled", &self.plots_enabled)
            .field("readiness", &self.readiness)
            .field("stream_timeout", &self.stream_timeout)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("chart_tools", &self.chart_tools)
            .field("tool_server", &self.tool_server)
            .finish()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            plots_enabled: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            readiness: ReadinessPolicy::default(),
            stream_timeout: Some(Duration::from_secs(DEFAULT_STREAM_TIMEOUT_SECS)),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            chart_tools: vec!["get_sales_data".to_string()],
            tool_server: None,
        }
    }
}

/// On-disk shape; every field is optional and overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    plots_enabled: Option<bool>,
    system_prompt: Option<String>,
    readiness: Option<ReadinessPolicy>,
    /// Seconds; 0 disables the bound.
    stream_timeout_secs: Option<u64>,
    max_tool_rounds: Option<u32>,
    chart_tools: Option<Vec<String>>,
    tool_server: Option<ToolServerSpec>,
}

impl ChatConfig {
    /// Defaults, then `~/.tabletalk/config.toml` if present, then the environment.
    pub fn load() -> Result<Self, ChatError> {
        let mut config = Self::default();
        let path = Self::default_path();
        if path.exists() {
            config.merge_file(&path)?;
        }
        config.apply_env();
        Ok(config)
    }

    /// Defaults, then an explicit config file (which must exist), then the environment.
    pub fn load_from(path: &Path) -> Result<Self, ChatError> {
        let mut config = Self::default();
        config.merge_file(path)?;
        config.apply_env();
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".tabletalk"))
            .unwrap_or_else(|| PathBuf::from(".tabletalk"))
            .join("config.toml")
    }

    /// Overlay values from a TOML file.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ChatError> {
        let raw = fs::read_to_string(path)?;
        self.merge_toml(&raw)
    }

    pub fn merge_toml(&mut self, raw: &str) -> Result<(), ChatError> {
        let file: FileConfig = toml::from_str(raw)?;
        if let Some(key) = file.api_key {
            self.api_key = Some(key);
        }
        if let Some(url) = file.base_url {
            self.base_url = url;
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(plots) = file.plots_enabled {
            self.plots_enabled = plots;
        }
        if let Some(prompt) = file.system_prompt {
            self.system_prompt = prompt;
        }
        if let Some(readiness) = file.readiness {
            self.readiness = readiness;
        }
        if let Some(secs) = file.stream_timeout_secs {
            self.stream_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(rounds) = file.max_tool_rounds {
            self.max_tool_rounds = rounds;
        }
        if let Some(tools) = file.chart_tools {
            self.chart_tools = tools;
        }
        if let Some(server) = file.tool_server {
            self.tool_server = Some(server);
        }
        Ok(())
    }

    /// Overlay values from process environment variables (loads `.env` first).
    pub fn apply_env(&mut self) {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENROUTER_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = lookup("TABLETALK_MODEL") {
            self.model = model;
        }
        if let Some(raw) = lookup("TABLETALK_PLOTS") {
            match parse_flag(&raw) {
                Some(flag) => self.plots_enabled = flag,
                None => tracing::warn!(value = %raw, "ignoring unrecognized TABLETALK_PLOTS"),
            }
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_plots(mut self, enabled: bool) -> Self {
        self.plots_enabled = enabled;
        self
    }

    pub fn with_tool_server(mut self, spec: ToolServerSpec) -> Self {
        self.tool_server = Some(spec);
        self
    }
}

/// Parse `on/off`-style flags.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
