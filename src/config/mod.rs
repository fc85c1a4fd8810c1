use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";
pub const DEFAULT_ADDR: &str = "127.0.0.1:8501";
pub const DEFAULT_GREETING: &str = "Hello! I'm ByteAgent. I can answer your questions and search the web for real-time information. Feel free to ask me anything!";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "Groq API key not found. Set `GROQ_API_KEY` in the environment, a .env file, or the [keys] table of config.toml."
    )]
    MissingApiKey,

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub model: String,
    /// Model-provider key. Required; see [`AppConfig::require_api_key`].
    pub api_key: Option<String>,
    pub keys: ApiKeys,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub search: SearchConfig,
    pub router: RouterConfig,
    pub server: ServerConfig,
    pub greeting: String,
    pub system_prompt: Option<String>,
}

/// Optional credentials. A missing key only disables the matching tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub news: Option<String>,
    pub cricket: Option<String>,
    pub serper: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub connect_timeout_ms: u64,
    pub read_idle_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_base_ms: u64,
    pub retry_jitter_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            read_idle_timeout_ms: 60_000,
            max_retries: 0,
            retry_base_ms: 500,
            retry_jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsConfig {
    pub timeout_ms: u64,
    pub geocoding_url: String,
    pub forecast_url: String,
    pub news_url: String,
    pub cricket_url: String,
    pub duckduckgo_url: String,
    pub serper_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            geocoding_url: "https://geocoding-api.open-meteo.com".to_string(),
            forecast_url: "https://api.open-meteo.com".to_string(),
            news_url: "https://api.thenewsapi.com".to_string(),
            cricket_url: "https://api.cricapi.com".to_string(),
            duckduckgo_url: "https://api.duckduckgo.com".to_string(),
            serper_url: "https://google.serper.dev".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    Duckduckgo,
    Serper,
}

impl FromStr for SearchProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckduckgo" | "ddg" => Ok(Self::Duckduckgo),
            "serper" => Ok(Self::Serper),
            _ => Err(ConfigError::InvalidValue {
                key: "search.provider",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub enabled: bool,
    pub provider: SearchProvider,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: SearchProvider::default(),
        }
    }
}

/// What to do when a keyword matches but the query after it is empty.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmptyQueryPolicy {
    /// Skip the tool and let the model answer.
    #[default]
    Fallback,
    /// Call the tool anyway with an empty query.
    Invoke,
}

impl FromStr for EmptyQueryPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(Self::Fallback),
            "invoke" => Ok(Self::Invoke),
            _ => Err(ConfigError::InvalidValue {
                key: "router.empty_query",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for EmptyQueryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fallback => write!(f, "fallback"),
            Self::Invoke => write!(f, "invoke"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterConfig {
    pub empty_query: EmptyQueryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            session_idle_secs: 3_600,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            keys: ApiKeys::default(),
            llm: LlmConfig::default(),
            tools: ToolsConfig::default(),
            search: SearchConfig::default(),
            router: RouterConfig::default(),
            server: ServerConfig::default(),
            greeting: DEFAULT_GREETING.to_string(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub greeting: Option<String>,
    pub system_prompt: Option<String>,
    pub keys: Option<PartialKeys>,
    pub llm: Option<PartialLlmConfig>,
    pub tools: Option<PartialToolsConfig>,
    pub search: Option<PartialSearchConfig>,
    pub router: Option<PartialRouterConfig>,
    pub server: Option<PartialServerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialKeys {
    #[serde(alias = "GROQ_API_KEY")]
    pub groq: Option<String>,
    #[serde(alias = "NEWS_API_KEY")]
    pub news: Option<String>,
    #[serde(alias = "CRICKET_API_KEY")]
    pub cricket: Option<String>,
    #[serde(alias = "SERPER_API_KEY")]
    pub serper: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialLlmConfig {
    pub connect_timeout_ms: Option<u64>,
    pub read_idle_timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_base_ms: Option<u64>,
    pub retry_jitter_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialToolsConfig {
    pub timeout_ms: Option<u64>,
    pub geocoding_url: Option<String>,
    pub forecast_url: Option<String>,
    pub news_url: Option<String>,
    pub cricket_url: Option<String>,
    pub duckduckgo_url: Option<String>,
    pub serper_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialSearchConfig {
    pub enabled: Option<bool>,
    pub provider: Option<SearchProvider>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialRouterConfig {
    pub empty_query: Option<EmptyQueryPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialServerConfig {
    pub addr: Option<String>,
    pub session_idle_secs: Option<u64>,
}

impl PartialKeys {
    fn or(self, other: Self) -> Self {
        Self {
            groq: self.groq.or(other.groq),
            news: self.news.or(other.news),
            cricket: self.cricket.or(other.cricket),
            serper: self.serper.or(other.serper),
        }
    }
}

impl PartialLlmConfig {
    fn or(self, other: Self) -> Self {
        Self {
            connect_timeout_ms: self.connect_timeout_ms.or(other.connect_timeout_ms),
            read_idle_timeout_ms: self.read_idle_timeout_ms.or(other.read_idle_timeout_ms),
            max_retries: self.max_retries.or(other.max_retries),
            retry_base_ms: self.retry_base_ms.or(other.retry_base_ms),
            retry_jitter_ms: self.retry_jitter_ms.or(other.retry_jitter_ms),
        }
    }
}

impl PartialToolsConfig {
    fn or(self, other: Self) -> Self {
        Self {
            timeout_ms: self.timeout_ms.or(other.timeout_ms),
            geocoding_url: self.geocoding_url.or(other.geocoding_url),
            forecast_url: self.forecast_url.or(other.forecast_url),
            news_url: self.news_url.or(other.news_url),
            cricket_url: self.cricket_url.or(other.cricket_url),
            duckduckgo_url: self.duckduckgo_url.or(other.duckduckgo_url),
            serper_url: self.serper_url.or(other.serper_url),
        }
    }
}

impl FileConfig {
    /// Field-wise merge where `self` wins over `other`.
    pub fn or(self, other: FileConfig) -> FileConfig {
        FileConfig {
            base_url: self.base_url.or(other.base_url),
            model: self.model.or(other.model),
            greeting: self.greeting.or(other.greeting),
            system_prompt: self.system_prompt.or(other.system_prompt),
            keys: merge_opt(self.keys, other.keys, PartialKeys::or),
            llm: merge_opt(self.llm, other.llm, PartialLlmConfig::or),
            tools: merge_opt(self.tools, other.tools, PartialToolsConfig::or),
            search: merge_opt(self.search, other.search, |a, b| PartialSearchConfig {
                enabled: a.enabled.or(b.enabled),
                provider: a.provider.or(b.provider),
            }),
            router: merge_opt(self.router, other.router, |a, b| PartialRouterConfig {
                empty_query: a.empty_query.or(b.empty_query),
            }),
            server: merge_opt(self.server, other.server, |a, b| PartialServerConfig {
                addr: a.addr.or(b.addr),
                session_idle_secs: a.session_idle_secs.or(b.session_idle_secs),
            }),
        }
    }
}

fn merge_opt<T>(a: Option<T>, b: Option<T>, f: impl FnOnce(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, b) => a.or(b),
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl AppConfig {
    pub fn from_cli(cli: &crate::Cli) -> Result<Self> {
        let project_root = std::env::current_dir().context("resolve current dir")?;
        let project_cfg = load_project_config(&project_root).unwrap_or_default();
        let file_cfg = load_file_config().unwrap_or_default();
        let cfg = Self::from_sources(cli, |k| std::env::var(k).ok(), project_cfg, file_cfg)?;
        Ok(cfg)
    }

    /// Precedence: CLI flags, then environment, then project file, then global file.
    pub fn from_sources(
        cli: &crate::Cli,
        env: impl Fn(&str) -> Option<String>,
        project_cfg: FileConfig,
        file_cfg: FileConfig,
    ) -> Result<Self, ConfigError> {
        let file = project_cfg.or(file_cfg);
        let defaults = AppConfig::default();
        let env = |k: &str| non_empty(env(k));

        let keys = file.keys.unwrap_or_default();
        let api_key = non_empty(cli.api_key.clone())
            .or_else(|| env("GROQ_API_KEY"))
            .or_else(|| env("OPENAI_API_KEY"))
            .or(non_empty(keys.groq));
        let keys = ApiKeys {
            news: env("NEWS_API_KEY").or(non_empty(keys.news)),
            cricket: env("CRICKET_API_KEY").or(non_empty(keys.cricket)),
            serper: env("SERPER_API_KEY").or(non_empty(keys.serper)),
        };

        let base_url = non_empty(cli.base_url.clone())
            .or_else(|| env("BYTECHAT_BASE_URL"))
            .or(file.base_url)
            .unwrap_or(defaults.base_url);
        let model = non_empty(cli.model.clone())
            .or_else(|| env("BYTECHAT_MODEL"))
            .or(file.model)
            .unwrap_or(defaults.model);

        let llm = {
            let p = file.llm.unwrap_or_default();
            let d = defaults.llm;
            LlmConfig {
                connect_timeout_ms: p.connect_timeout_ms.unwrap_or(d.connect_timeout_ms),
                read_idle_timeout_ms: p.read_idle_timeout_ms.unwrap_or(d.read_idle_timeout_ms),
                max_retries: p.max_retries.unwrap_or(d.max_retries),
                retry_base_ms: p.retry_base_ms.unwrap_or(d.retry_base_ms),
                retry_jitter_ms: p.retry_jitter_ms.unwrap_or(d.retry_jitter_ms),
            }
        };

        let tools = {
            let p = file.tools.unwrap_or_default();
            let d = defaults.tools;
            ToolsConfig {
                timeout_ms: p.timeout_ms.unwrap_or(d.timeout_ms),
                geocoding_url: p.geocoding_url.unwrap_or(d.geocoding_url),
                forecast_url: p.forecast_url.unwrap_or(d.forecast_url),
                news_url: p.news_url.unwrap_or(d.news_url),
                cricket_url: p.cricket_url.unwrap_or(d.cricket_url),
                duckduckgo_url: p.duckduckgo_url.unwrap_or(d.duckduckgo_url),
                serper_url: p.serper_url.unwrap_or(d.serper_url),
            }
        };

        let search = {
            let p = file.search.unwrap_or_default();
            let provider = match env("BYTECHAT_SEARCH_PROVIDER") {
                Some(v) => v.parse()?,
                None => p.provider.unwrap_or(defaults.search.provider),
            };
            SearchConfig {
                enabled: p.enabled.unwrap_or(defaults.search.enabled),
                provider,
            }
        };

        let router = {
            let p = file.router.unwrap_or_default();
            let empty_query = match env("BYTECHAT_EMPTY_QUERY") {
                Some(v) => v.parse()?,
                None => p.empty_query.unwrap_or_default(),
            };
            RouterConfig { empty_query }
        };

        let server = {
            let p = file.server.unwrap_or_default();
            ServerConfig {
                addr: non_empty(cli.addr.clone())
                    .or_else(|| env("BYTECHAT_ADDR"))
                    .or(p.addr)
                    .unwrap_or(defaults.server.addr),
                session_idle_secs: p
                    .session_idle_secs
                    .unwrap_or(defaults.server.session_idle_secs),
            }
        };

        Ok(Self {
            base_url,
            model,
            api_key,
            keys,
            llm,
            tools,
            search,
            router,
            server,
            greeting: non_empty(file.greeting).unwrap_or(defaults.greeting),
            system_prompt: non_empty(file.system_prompt),
        })
    }

    /// The model-provider key is the one credential startup cannot do without.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }
}

pub fn load_file_config() -> Result<FileConfig> {
    fn candidate_paths() -> Vec<PathBuf> {
        let mut v = Vec::new();
        if let Ok(p) = std::env::var("BYTECHAT_CONFIG") {
            v.push(PathBuf::from(p));
        }
        if let Some(dir) = dirs::config_dir() {
            v.push(dir.join("bytechat").join("config.toml"));
        }
        v
    }

    for p in candidate_paths() {
        if p.exists() {
            let s = fs::read_to_string(&p)
                .with_context(|| format!("read config file: {}", p.display()))?;
            match toml::from_str::<FileConfig>(&s) {
                Ok(cfg) => {
                    info!(path=%p.display(), "loaded config file");
                    return Ok(cfg);
                }
                Err(e) => {
                    warn!(path=%p.display(), error=%e.to_string(), "parse config failed");
                    continue;
                }
            }
        }
    }
    Ok(FileConfig::default())
}

/// Load project-specific configuration from .bytechat/config.toml
pub fn load_project_config(project_root: &Path) -> Result<FileConfig> {
    let project_config_path = project_root.join(".bytechat").join("config.toml");

    if project_config_path.exists() {
        let s = fs::read_to_string(&project_config_path).with_context(|| {
            format!(
                "read project config file: {}",
                project_config_path.display()
            )
        })?;
        match toml::from_str::<FileConfig>(&s) {
            Ok(cfg) => {
                info!(path=%project_config_path.display(), "loaded project config file");
                Ok(cfg)
            }
            Err(e) => {
                warn!(path=%project_config_path.display(), error=%e.to_string(), "parse project config failed");
                Ok(FileConfig::default())
            }
        }
    } else {
        Ok(FileConfig::default())
    }
}
