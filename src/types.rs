//! Chat Completions 接口的请求与响应类型
//!
//! 与 OpenAI 兼容的 `/chat/completions` 接口保持一致。

use crate::constants::DEFAULT_RESPONSE_FORMAT;
use serde::{Deserialize, Deserializer, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[default]
    Assistant,
    Tool,
}

/// 对话消息
///
/// 工具调用的回复中 `content` 可能为 null，按空字符串处理。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// 响应格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
}

impl Default for ResponseFormat {
    fn default() -> Self {
        Self::text()
    }
}

impl ResponseFormat {
    /// 纯文本输出
    pub fn text() -> Self {
        Self {
            kind: DEFAULT_RESPONSE_FORMAT.to_string(),
            json_schema: None,
        }
    }

    /// JSON 对象输出
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
            json_schema: None,
        }
    }

    /// 按 JSON Schema 约束输出
    pub fn json_schema(schema: serde_json::Value) -> Self {
        Self {
            kind: "json_schema".to_string(),
            json_schema: Some(schema),
        }
    }
}

/// `POST /chat/completions` 请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

/// 单个候选结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_tokens: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_tokens: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u32,
}

/// 上游在响应体中携带的错误对象
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, deserialize_with = "string_or_null")]
    pub message: String,
    #[serde(rename = "type", default, deserialize_with = "string_or_null")]
    pub kind: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub param: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub code: String,
}

/// `POST /chat/completions` 响应体
///
/// 缺失或为 null 的字段都取零值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<Choice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

impl ChatCompletionResponse {
    /// 第一个候选结果的文本
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.message.content.as_str())
    }
}

/// null 按类型的默认值处理
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 上游的 `code`、`param` 字段可能是字符串、数字或 null
fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// 多轮对话历史
///
/// 保存系统提示词和之后的每一轮消息，每次调用时整体发送。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以系统提示词开始一段对话
    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(prompt)],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// 把响应中的第一个候选结果追加为助手消息，返回追加的文本
    pub fn record_reply(&mut self, response: &ChatCompletionResponse) -> Option<String> {
        let reply = response.first_content()?.to_string();
        self.push_assistant(reply.clone());
        Some(reply)
    }

    /// 撤销最后一条用户消息（调用失败时使用）
    pub fn pop_user(&mut self) -> Option<ChatMessage> {
        match self.messages.last() {
            Some(message) if message.role == Role::User => self.messages.pop(),
            _ => None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
