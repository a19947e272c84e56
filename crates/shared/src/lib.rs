//! 共享库
//!
//! 决策引擎使用方共用的配置加载和可观测性初始化。

pub mod config;
pub mod observability;
