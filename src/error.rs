//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。

use thiserror::Error;

/// ModelGate 错误类型
#[derive(Error, Debug)]
pub enum GateError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 验证错误
    #[error("验证错误: {0}")]
    ValidationError(String),

    /// 传输错误（连接失败、超时等）
    #[error("发送请求失败: {0}")]
    Transport(String),

    /// 响应体解析错误
    #[error("解析响应失败: {0}")]
    Decode(#[from] serde_json::Error),

    /// 上游返回非成功状态码且响应体中没有错误对象
    #[error("上游返回状态码 {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// 上游在响应体中返回的逻辑错误
    #[error("API返回错误: {message}, type: {kind}, param: {param}, code: {code}")]
    Api {
        message: String,
        kind: String,
        param: String,
        code: String,
    },

    /// 等待并发许可超时
    #[error("获取并发许可超时: model={model}, 等待 {waited_ms}ms")]
    AcquireTimeout { model: String, waited_ms: u64 },

    /// 许可池已关闭
    #[error("许可池已关闭: {0}")]
    PoolClosed(String),

    /// 注册表已关闭
    #[error("注册表已关闭")]
    RegistryClosed,

    /// 响应中没有可用的选项
    #[error("响应中没有可用内容: {0}")]
    EmptyResponse(String),

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl GateError {
    /// 错误类别，用于日志和指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::ConfigError(_) => "config",
            GateError::ValidationError(_) => "validation",
            GateError::Transport(_) => "transport",
            GateError::Decode(_) => "decode",
            GateError::UpstreamStatus { .. } => "upstream_status",
            GateError::Api { .. } => "api",
            GateError::AcquireTimeout { .. } => "acquire_timeout",
            GateError::PoolClosed(_) => "pool_closed",
            GateError::RegistryClosed => "registry_closed",
            GateError::EmptyResponse(_) => "empty_response",
            GateError::IoError(_) => "io",
            GateError::YamlError(_) => "yaml",
            GateError::TomlError(_) => "toml",
        }
    }
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GateError::Transport(format!("请求超时: {}", err))
        } else if err.is_connect() {
            GateError::Transport(format!("连接失败: {}", err))
        } else {
            GateError::Transport(err.to_string())
        }
    }
}
