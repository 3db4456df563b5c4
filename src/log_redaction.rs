//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 日志脱敏模块
//!
//! 保护 API Key、Bearer Token 等敏感信息不被泄露到日志中。

/// 基础脱敏函数，保留首尾各两个字符
#[inline]
pub fn redact_basic(value: Option<&str>) -> String {
    let Some(value) = value else {
        return "unknown".to_string();
    };

    let value = value.trim();
    if value.is_empty() {
        return "unknown".to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }

    let prefix: String = chars[..2].iter().collect();
    let suffix: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", prefix, suffix)
}

/// API Key 脱敏
#[inline]
pub fn redact_api_key(value: &str) -> String {
    redact_basic(Some(value))
}

/// 对文本中出现的 `Bearer <token>` 进行脱敏
///
/// 上游错误信息偶尔会回显请求头，写日志前统一经过这里。
pub fn redact_bearer(text: &str) -> String {
    const MARKER: &str = "Bearer ";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(MARKER) {
        let (head, tail) = rest.split_at(pos + MARKER.len());
        out.push_str(head);
        let end = tail
            .find(|c: char| c.is_whitespace() || c == '"' || c == ',')
            .unwrap_or(tail.len());
        out.push_str(&redact_basic(Some(&tail[..end])));
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}
