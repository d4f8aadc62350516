//! # Infrastructure Common
//!
//! 这个 crate 提供了 Lorn DI 各层共享的基础类型。
//!
//! ## 核心内容
//!
//! - [`DependencyError`] - 依赖注入错误类型
//! - [`ConfigError`] - 配置加载错误类型
//! - [`Lifetime`] - 组件生命周期（单例 / 瞬时）
//! - [`LoggingConfig`] - 日志配置与初始化

pub mod errors;
pub mod lifecycle;
pub mod logging;

pub use errors::*;
pub use lifecycle::*;
pub use logging::*;
