//! 表格分析提示词
//!
//! 把解析出的表格样本拼成一段让模型总结数据特征的提示词。

use crate::constants::ANALYSIS_SAMPLE_ROWS;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// 表格样本
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSample {
    pub columns: Vec<String>,
    #[serde(default, rename = "values")]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TableSample {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }
}

/// 构建表格分析提示词
///
/// 只取前 5 行样本；某行比表头长时，多出的单元格以序号作为列名。
pub fn build_analysis_prompt(file_path: &str, sheet_name: &str, table: &TableSample) -> String {
    let file_name = Path::new(file_path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(file_path);

    let mut prompt = String::new();
    let _ = write!(
        prompt,
        "File: {}\nSheet: {}\nColumns: {}\n\nSample Data:\n",
        file_name,
        sheet_name,
        table.columns.join(", ")
    );

    for (i, row) in table.rows.iter().take(ANALYSIS_SAMPLE_ROWS).enumerate() {
        let _ = write!(prompt, "\nRow {}:", i + 1);
        for (j, value) in row.iter().enumerate() {
            let _ = match table.columns.get(j) {
                Some(column) => write!(prompt, " {}: {},", column, display_value(value)),
                None => write!(prompt, " {}: {},", j + 1, display_value(value)),
            };
        }
    }

    prompt.push_str("\n\nPlease analyze this data and provide key characteristics.");
    prompt
}

/// 字符串不带引号，空单元格显示为 `<nil>`，其它值按 JSON 输出
fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "<nil>".to_string(),
        other => other.to_string(),
    }
}
