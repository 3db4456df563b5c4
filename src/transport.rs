//! 传输层
//!
//! 抽象出一次 HTTP POST，便于在测试中替换为脚本化的实现。

use crate::error::GateError;
use crate::types::ChatCompletionRequest;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// 原始 HTTP 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 响应体文本（非 UTF-8 字节按替换字符处理）
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 补全请求的传输 trait
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// 发送一次 JSON POST
    ///
    /// 只有连接失败、超时等传输层问题返回错误；非 2xx 状态码连同响应体一起返回，
    /// 由调用方解析其中可能存在的错误对象。
    async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, GateError>;
}

/// 基于 reqwest 的 HTTP 传输
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// 创建新的 HTTP 传输
    pub fn new() -> Result<Self, GateError> {
        let client = Client::builder()
            .build()
            .map_err(|e| GateError::ConfigError(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self { client })
    }

    /// 使用已有的 reqwest 客户端
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, GateError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        debug!(url = %url, status, bytes = bytes.len(), "收到上游响应");

        Ok(TransportResponse::new(status, bytes.to_vec()))
    }
}
