//! 配置模块
//!
//! 定义服务配置结构，支持从 YAML / TOML 文件加载。

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_TOKENS,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::error::GateError;
use crate::log_redaction::redact_api_key;
use ahash::AHashMap as HashMap;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 应用配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(rename = "llmConfig")]
    pub llm_config: LlmConfig,
}

impl AppConfig {
    /// 从 YAML 字符串解析
    pub fn from_yaml_str(content: &str) -> Result<Self, GateError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self, GateError> {
        Ok(toml::from_str(content)?)
    }

    /// 从文件加载并校验配置
    ///
    /// 根据扩展名选择格式：`.toml` 按 TOML 解析，其余按 YAML 解析。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content)?,
            _ => Self::from_yaml_str(&content)?,
        };

        config.validate().map_err(GateError::ConfigError)?;
        debug!(path = %path.display(), "配置加载完成");
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        self.log.validate()?;
        self.llm_config
            .validate()
            .map_err(|e| format!("llmConfig: {}", e))
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// EnvFilter 指令，例如 `info` 或 `modelgate=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    /// 校验日志配置
    pub fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("日志级别不能为空".to_string());
        }
        Ok(())
    }
}

/// 大模型服务配置
#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    /// 默认模型
    #[serde(default)]
    pub model: String,
    /// 上游服务地址
    pub url: String,
    /// API Key（使用 Secret 包装以防止意外泄露）
    pub api_key: Secret<String>,
    /// 上下文最大 token 数
    #[serde(default)]
    pub context_max_tokens: u32,
    /// 输出最大 token 数
    #[serde(default = "default_max_token")]
    pub max_token: u32,
    /// 每个模型的并发配置
    #[serde(default)]
    pub model_concurrency: HashMap<String, i64>,
    /// 默认的并发配置
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,
    /// HTTP 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 等待并发许可超时（秒），0 表示不限
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_token() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_acquire_timeout_secs() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field("url", &self.url)
            .field("api_key", &redact_api_key(self.api_key.expose_secret()))
            .field("context_max_tokens", &self.context_max_tokens)
            .field("max_token", &self.max_token)
            .field("model_concurrency", &self.model_concurrency)
            .field("default_concurrency", &self.default_concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            url: String::new(),
            api_key: Secret::new(String::new()),
            context_max_tokens: 0,
            max_token: DEFAULT_MAX_TOKENS,
            model_concurrency: HashMap::new(),
            default_concurrency: DEFAULT_CONCURRENCY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl LlmConfig {
    /// 创建新的配置
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: Secret::new(api_key.into()),
            ..Default::default()
        }
    }

    /// 校验配置
    ///
    /// 每个模型的并发配置允许为非正数，这种情况下回退到默认并发度。
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("服务地址不能为空".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(format!("无效的服务地址: {}", self.url));
        }

        if self.default_concurrency == 0 {
            return Err("默认并发度不能为0".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("请求超时不能为0".to_string());
        }

        if self.max_token == 0 {
            return Err("最大 token 数不能为0".to_string());
        }

        if self.model_concurrency.keys().any(|key| key.trim().is_empty()) {
            return Err("模型名称不能为空".to_string());
        }

        Ok(())
    }

    /// 解析指定模型的并发度
    ///
    /// 配置值为正数时使用配置值，否则使用默认并发度。
    pub fn concurrency_for(&self, model: &str) -> usize {
        resolve_concurrency(
            self.model_concurrency.get(model).copied(),
            self.default_concurrency,
        )
    }

    /// HTTP 请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 等待并发许可的超时，`None` 表示一直等待
    pub fn acquire_timeout(&self) -> Option<Duration> {
        match self.acquire_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// 非正数的配置值回退到默认值
pub(crate) fn resolve_concurrency(configured: Option<i64>, default: usize) -> usize {
    let default = default.max(1);
    match configured {
        Some(value) if value > 0 => usize::try_from(value).unwrap_or(default),
        _ => default,
    }
}
