//! 依赖注入容器抽象接口
//!
//! 提供依赖注入容器的核心抽象，供 provider 与生命周期回调回调容器使用

use crate::metadata::ParameterDescriptor;
use crate::provider::{Instance, SharedProvider};
use crate::token::{Symbol, Token, TokenSource, TypeRef};
use infrastructure_common::{ConfigError, ConfigResult, DependencyResult};
use serde::{Deserialize, Serialize};
use std::any::Any;
use uuid::Uuid;

/// 依赖注入容器 trait
///
/// 对象安全的容器视图，provider 和类元数据回调通过它访问所属容器。
pub trait DiContainer: Send + Sync {
    /// 容器 ID
    fn id(&self) -> Uuid;

    /// 容器配置
    fn config(&self) -> &ContainerConfig;

    /// 注册 provider
    fn register_target(
        &self,
        target: RegisterTarget,
        provider: Option<SharedProvider>,
    ) -> DependencyResult<Token>;

    /// 解析令牌
    fn resolve_token(&self, token: &Token) -> DependencyResult<Instance>;

    /// 解析令牌，任何失败都返回 `None`
    fn resolve_or_none_token(&self, token: &Token) -> Option<Instance>;

    /// 解析令牌，仅在未注册时返回 `None`
    fn resolve_optional_token(&self, token: &Token) -> DependencyResult<Option<Instance>>;

    /// 释放令牌
    fn dispose_token(&self, token: &Token) -> DependencyResult<()>;

    /// 用于向下转型到具体容器
    fn as_any(&self) -> &dyn Any;

    /// 按参数描述符解析依赖
    fn resolve_parameter(&self, parameter: &ParameterDescriptor) -> DependencyResult<Option<Instance>> {
        if !parameter.optional {
            return self.resolve_token(&parameter.token).map(Some);
        }

        match self.config().optional_policy {
            OptionalPolicy::SwallowAll => Ok(self.resolve_or_none_token(&parameter.token)),
            OptionalPolicy::NotRegisteredOnly => self.resolve_optional_token(&parameter.token),
        }
    }
}

/// `register` 的第一个参数：令牌来源或 provider 本身
#[derive(Debug, Clone)]
pub enum RegisterTarget {
    /// 令牌来源，provider 另行提供
    Token(TokenSource),
    /// provider 本身，令牌由 provider 推导
    Provider(SharedProvider),
}

impl From<SharedProvider> for RegisterTarget {
    fn from(provider: SharedProvider) -> Self {
        Self::Provider(provider)
    }
}

impl From<TokenSource> for RegisterTarget {
    fn from(source: TokenSource) -> Self {
        Self::Token(source)
    }
}

impl From<Token> for RegisterTarget {
    fn from(token: Token) -> Self {
        Self::Token(token.into())
    }
}

impl From<&Token> for RegisterTarget {
    fn from(token: &Token) -> Self {
        Self::Token(token.into())
    }
}

impl From<&str> for RegisterTarget {
    fn from(name: &str) -> Self {
        Self::Token(name.into())
    }
}

impl From<String> for RegisterTarget {
    fn from(name: String) -> Self {
        Self::Token(name.into())
    }
}

impl From<Symbol> for RegisterTarget {
    fn from(symbol: Symbol) -> Self {
        Self::Token(symbol.into())
    }
}

impl From<TypeRef> for RegisterTarget {
    fn from(type_ref: TypeRef) -> Self {
        Self::Token(type_ref.into())
    }
}

/// `dispose_all` 遇到失败时的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposePolicy {
    /// 继续释放剩余令牌，最后汇总报告所有失败
    #[default]
    ContinueAndCollect,
    /// 遇到第一个失败立即返回
    HaltOnFirstError,
}

/// 可选依赖的解析策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionalPolicy {
    /// 任何解析失败都视为缺失
    #[default]
    SwallowAll,
    /// 仅令牌未注册视为缺失，其余错误照常返回
    NotRegisteredOnly,
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 是否启用循环依赖检测
    pub enable_circular_dependency_detection: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// `dispose_all` 的失败策略
    pub dispose_policy: DisposePolicy,
    /// 可选依赖的解析策略
    pub optional_policy: OptionalPolicy,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enable_circular_dependency_detection: true,
            max_resolution_depth: 100,
            dispose_policy: DisposePolicy::default(),
            optional_policy: OptionalPolicy::default(),
        }
    }
}

impl ContainerConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::validation_error("max_resolution_depth 必须大于 0"));
        }
        Ok(())
    }
}
