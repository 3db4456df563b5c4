//! 模块集成测试

#[allow(unused_imports)]
pub mod config;
#[allow(unused_imports)]
pub mod registry;
