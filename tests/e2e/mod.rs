//! 端到端测试

pub mod lifecycle;
