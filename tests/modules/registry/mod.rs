//! registry 模块集成测试
