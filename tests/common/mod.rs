//! 测试通用工具模块
//!
//! 提供可编排的上游替身和常用的构造函数。

#![allow(dead_code)]

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use modelgate::{
    ChatCompletionRequest, CompletionTransport, ConcurrencyRegistry, Dispatcher,
    DispatcherConfig, GateError, TransportResponse,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// 上游替身的单步行为
#[derive(Debug, Clone)]
pub enum Step {
    /// 立即返回 JSON 响应
    Reply(u16, Value),
    /// 立即返回原始响应体
    Raw(u16, String),
    /// 立即返回传输错误
    Fail(String),
    /// 阻塞直到 `release`，然后返回 JSON 响应
    Hold(u16, Value),
    /// 延迟后返回成功响应
    Delay(Duration),
}

#[derive(Default)]
struct ModelCounters {
    current: usize,
    peak: usize,
}

/// 可编排的上游替身
///
/// 按调用顺序消费脚本，脚本为空时返回成功响应。
pub struct MockUpstream {
    script: Mutex<VecDeque<Step>>,
    gate: Semaphore,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    per_model: Mutex<HashMap<String, ModelCounters>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl MockUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            per_model: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }

    pub fn push_many(&self, step: Step, count: usize) {
        let mut script = self.script.lock();
        for _ in 0..count {
            script.push_back(step.clone());
        }
    }

    /// 放行 `count` 个被 `Hold` 阻塞的调用
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_for(&self, model: &str) -> usize {
        self.per_model
            .lock()
            .get(model)
            .map(|counters| counters.peak)
            .unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().clone()
    }

    /// 等待直到至少 `count` 个调用到达上游
    pub async fn wait_for_in_flight(&self, count: usize) {
        wait_until(|| self.in_flight() >= count).await;
    }

    /// 等待直到上游累计收到 `count` 次调用
    pub async fn wait_for_calls(&self, count: usize) {
        wait_until(|| self.calls() >= count).await;
    }

    fn enter(&self, model: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let mut per_model = self.per_model.lock();
        let counters = per_model.entry(model.to_string()).or_default();
        counters.current += 1;
        counters.peak = counters.peak.max(counters.current);
    }

    fn leave(&self, model: &str) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(counters) = self.per_model.lock().get_mut(model) {
            counters.current -= 1;
        }
    }
}

#[async_trait]
impl CompletionTransport for MockUpstream {
    async fn post_json(
        &self,
        _url: &str,
        _api_key: &str,
        body: &ChatCompletionRequest,
        _timeout: Duration,
    ) -> Result<TransportResponse, GateError> {
        self.requests.lock().push(body.clone());
        self.enter(&body.model);

        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Step::Reply(200, success_body("ok")));

        let result = match step {
            Step::Reply(status, value) => Ok(TransportResponse::new(status, value.to_string())),
            Step::Raw(status, text) => Ok(TransportResponse::new(status, text)),
            Step::Fail(message) => Err(GateError::Transport(message)),
            Step::Hold(status, value) => {
                self.gate.acquire().await.expect("gate closed").forget();
                Ok(TransportResponse::new(status, value.to_string()))
            }
            Step::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse::new(200, success_body("ok").to_string()))
            }
        };

        self.leave(&body.model);
        result
    }
}

/// 轮询条件，2 秒内不满足则 panic
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// 成功的补全响应体
pub fn success_body(content: &str) -> Value {
    json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "created": 1700000000,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
    })
}

/// 带错误对象的响应体
pub fn error_body(message: &str, kind: &str, param: &str, code: &str) -> Value {
    json!({
        "error": {"message": message, "type": kind, "param": param, "code": code}
    })
}

/// 创建使用上游替身的调度器，等待许可不设超时
pub fn create_dispatcher(
    registry: Arc<ConcurrencyRegistry>,
    upstream: Arc<MockUpstream>,
) -> Arc<Dispatcher> {
    let config = DispatcherConfig::new("http://mock.upstream/v1", "sk-test")
        .with_acquire_timeout(None);
    Arc::new(Dispatcher::new(registry, upstream, config))
}
