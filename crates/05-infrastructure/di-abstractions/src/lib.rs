//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义令牌、provider、扩展和类元数据协议。
//!
//! ## 核心接口
//!
//! - [`Token`] - 注册令牌
//! - [`Provider`] - 为令牌产出值的 provider
//! - [`DiContainer`] - 对象安全的容器视图
//! - [`Extension`] / [`ExtensionManager`] - 生命周期回调扩展
//! - [`ClassMetadataRegistry`] - 类元数据协议
//! - [`Injectable`] - 可注入类型

pub mod container;
pub mod extension;
pub mod factory;
pub mod metadata;
pub mod provider;
pub mod resolver;
pub mod token;

pub use container::*;
pub use extension::*;
pub use factory::*;
pub use metadata::*;
pub use provider::*;
pub use resolver::*;
pub use token::*;
