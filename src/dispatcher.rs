//! 调度器
//!
//! 每次补全调用先从注册表拿到模型对应的许可池并获取许可，再发送一次 HTTP 请求。
//! 许可由 RAII 守卫持有，任何返回路径上都会归还。不做重试、退避或熔断。

use crate::config::LlmConfig;
use crate::constants::{ANALYST_SYSTEM_PROMPT, CHAT_COMPLETIONS_PATH, MAX_ERROR_BODY_CHARS};
use crate::error::GateError;
use crate::log_redaction::redact_bearer;
use crate::prompt::{build_analysis_prompt, TableSample};
use crate::registry::ConcurrencyRegistry;
#[cfg(feature = "monitoring")]
use crate::telemetry::Metrics;
use crate::transport::{CompletionTransport, HttpTransport, TransportResponse};
use crate::types::{
    ApiErrorBody, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Conversation,
    ResponseFormat,
};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// 调度器配置
#[derive(Clone)]
pub struct DispatcherConfig {
    /// 上游服务地址，不含 `/chat/completions`
    pub base_url: String,
    pub api_key: Secret<String>,
    /// 单次 HTTP 往返的超时
    pub request_timeout: Duration,
    /// 等待许可的超时，`None` 表示一直等待
    pub acquire_timeout: Option<Duration>,
}

impl DispatcherConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            base_url: base_url.into(),
            api_key: Secret::new(api_key.into()),
            request_timeout: defaults.request_timeout(),
            acquire_timeout: defaults.acquire_timeout(),
        }
    }

    pub fn from_llm_config(config: &LlmConfig) -> Self {
        Self {
            base_url: config.url.clone(),
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout(),
            acquire_timeout: config.acquire_timeout(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        )
    }
}

impl std::fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("request_timeout", &self.request_timeout)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// 补全调用调度器
///
/// 可以在多个任务间共享（`Arc<Dispatcher>`），所有调用共享同一个注册表。
pub struct Dispatcher {
    registry: Arc<ConcurrencyRegistry>,
    transport: Arc<dyn CompletionTransport>,
    config: DispatcherConfig,
    endpoint: String,
    #[cfg(feature = "monitoring")]
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    /// 创建新的调度器
    pub fn new(
        registry: Arc<ConcurrencyRegistry>,
        transport: Arc<dyn CompletionTransport>,
        config: DispatcherConfig,
    ) -> Self {
        let endpoint = config.endpoint();
        info!(endpoint = %endpoint, "创建调度器");

        Self {
            registry,
            transport,
            config,
            endpoint,
            #[cfg(feature = "monitoring")]
            metrics: None,
        }
    }

    /// 按配置创建使用 HTTP 传输的调度器
    pub fn from_config(
        config: &LlmConfig,
        registry: Arc<ConcurrencyRegistry>,
    ) -> Result<Self, GateError> {
        config.validate().map_err(GateError::ConfigError)?;
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::new(
            registry,
            transport,
            DispatcherConfig::from_llm_config(config),
        ))
    }

    /// 附加监控指标
    #[cfg(feature = "monitoring")]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<ConcurrencyRegistry> {
        &self.registry
    }

    /// 完整的请求地址
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 发送一次补全请求
    ///
    /// # 参数
    /// - `model`: 模型名称，同时作为并发控制的键
    /// - `messages`: 按顺序排列的对话消息
    /// - `temperature`: 采样温度
    /// - `max_tokens`: 最大输出 token 数
    /// - `response_format`: 响应格式，`None` 时使用纯文本
    ///
    /// # 返回
    /// - `Ok(response)`: 上游返回的完整响应
    /// - `Err(_)`: 参数、许可、传输、解析或上游逻辑错误
    #[instrument(skip_all, fields(model = %model))]
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f64,
        max_tokens: u32,
        response_format: Option<ResponseFormat>,
    ) -> Result<ChatCompletionResponse, GateError> {
        if model.trim().is_empty() {
            return Err(GateError::ValidationError("模型名称不能为空".to_string()));
        }

        let request_id = Uuid::new_v4();
        self.record_request(model);

        let pool = self.registry.get_pool(model).map_err(|e| {
            self.record_error(model, &e);
            e
        })?;

        let wait_started = Instant::now();
        let permit = match pool.acquire(self.config.acquire_timeout).await {
            Ok(permit) => permit,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "获取并发许可失败");
                self.record_error(model, &e);
                return Err(e);
            }
        };
        self.record_permit_wait(model, wait_started.elapsed(), pool.in_flight());

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
            response_format: response_format.unwrap_or_default(),
        };

        info!(
            request_id = %request_id,
            messages = request.messages.len(),
            in_flight = pool.in_flight(),
            capacity = pool.capacity(),
            "发送补全请求"
        );
        debug!(request_id = %request_id, messages = ?request.messages, "请求消息");

        let started = Instant::now();
        let result = self.send(&request).await;
        drop(permit);

        let elapsed = started.elapsed();
        self.record_finished(model, elapsed, pool.in_flight());

        match &result {
            Ok(response) => {
                info!(
                    request_id = %request_id,
                    choices = response.choices.len(),
                    prompt_tokens = response.usage.prompt_tokens,
                    completion_tokens = response.usage.completion_tokens,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "收到补全响应"
                );
            }
            Err(e) => {
                error!(
                    request_id = %request_id,
                    kind = e.kind(),
                    error = %redact_bearer(&e.to_string()),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "补全请求失败"
                );
                self.record_error(model, e);
            }
        }

        result
    }

    /// 使用对话历史发送请求
    pub async fn chat(
        &self,
        model: &str,
        conversation: &Conversation,
        temperature: f64,
        max_tokens: u32,
        response_format: Option<ResponseFormat>,
    ) -> Result<ChatCompletionResponse, GateError> {
        self.chat_completion(
            model,
            conversation.messages().to_vec(),
            temperature,
            max_tokens,
            response_format,
        )
        .await
    }

    /// 让模型分析表格样本，返回第一个候选结果的文本
    pub async fn analyze_table(
        &self,
        model: &str,
        file_path: &str,
        sheet_name: &str,
        table: &TableSample,
        max_tokens: u32,
    ) -> Result<String, GateError> {
        let prompt = build_analysis_prompt(file_path, sheet_name, table);
        let response = self
            .chat_completion(
                model,
                vec![
                    ChatMessage::system(ANALYST_SYSTEM_PROMPT),
                    ChatMessage::user(prompt),
                ],
                0.0,
                max_tokens,
                Some(ResponseFormat::text()),
            )
            .await?;

        response
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| GateError::EmptyResponse(format!("model={}", model)))
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, GateError> {
        let response = self
            .transport
            .post_json(
                &self.endpoint,
                self.config.api_key.expose_secret(),
                request,
                self.config.request_timeout,
            )
            .await?;

        decode_response(response)
    }

    #[cfg(feature = "monitoring")]
    fn record_request(&self, model: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(model);
        }
    }

    #[cfg(not(feature = "monitoring"))]
    fn record_request(&self, _model: &str) {}

    #[cfg(feature = "monitoring")]
    fn record_error(&self, model: &str, error: &GateError) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(model, error.kind());
        }
    }

    #[cfg(not(feature = "monitoring"))]
    fn record_error(&self, _model: &str, _error: &GateError) {}

    #[cfg(feature = "monitoring")]
    fn record_permit_wait(&self, model: &str, waited: Duration, in_flight: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.record_permit_wait(model, waited);
            metrics.set_in_flight(model, in_flight);
        }
    }

    #[cfg(not(feature = "monitoring"))]
    fn record_permit_wait(&self, _model: &str, _waited: Duration, _in_flight: usize) {}

    #[cfg(feature = "monitoring")]
    fn record_finished(&self, model: &str, elapsed: Duration, in_flight: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.record_duration(model, elapsed);
            metrics.set_in_flight(model, in_flight);
        }
    }

    #[cfg(not(feature = "monitoring"))]
    fn record_finished(&self, _model: &str, _elapsed: Duration, _in_flight: usize) {}
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

/// 解析上游响应
///
/// 先取出 `error` 对象：即使状态码为 200，只要带有非 null 的错误对象就视为失败，
/// 其余字段是否合法不影响错误的上报。
fn decode_response(response: TransportResponse) -> Result<ChatCompletionResponse, GateError> {
    let value = match serde_json::from_slice::<serde_json::Value>(&response.body) {
        Ok(value) => value,
        Err(_) if !response.is_success() => return Err(upstream_status(&response)),
        Err(e) => return Err(GateError::Decode(e)),
    };

    if let Some(err) = value.get("error").filter(|err| !err.is_null()) {
        let err = ApiErrorBody::deserialize(err).unwrap_or_else(|_| ApiErrorBody {
            message: err.as_str().map_or_else(|| err.to_string(), str::to_string),
            ..Default::default()
        });
        return Err(GateError::Api {
            message: err.message,
            kind: err.kind,
            param: err.param,
            code: err.code,
        });
    }

    if !response.is_success() {
        return Err(upstream_status(&response));
    }

    Ok(serde_json::from_value(value)?)
}

fn upstream_status(response: &TransportResponse) -> GateError {
    GateError::UpstreamStatus {
        status: response.status,
        body: response.body_text().chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}
