//! 错误类型定义

use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },

    #[error("日志初始化失败: {message}")]
    LoggingInitFailed { message: String },
}

impl ConfigError {
    /// 创建解析错误
    pub fn parse_error(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::ParseError {
            source: source.into(),
        }
    }

    /// 创建验证错误
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// 依赖注入错误类型
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("无效的令牌来源: {source_desc}")]
    InvalidToken { source_desc: String },

    #[error("{operation} 未提供 provider: {token}")]
    MissingProvider {
        token: String,
        operation: &'static str,
    },

    #[error("{operation} 失败, 令牌已注册: {token}")]
    DuplicateToken {
        token: String,
        operation: &'static str,
    },

    #[error("令牌未注册: {token}")]
    TokenNotRegistered { token: String },

    #[error("循环依赖检测到: {dependency_chain}")]
    CircularDependency { dependency_chain: String },

    #[error("解析深度超过上限 {depth}: {token}")]
    ResolutionDepthExceeded { token: String, depth: usize },

    #[error("类型不匹配: {token}, 期望 {expected}")]
    TypeMismatch {
        token: String,
        expected: &'static str,
    },

    #[error("provider 已归属其他容器: {token}")]
    ProviderAlreadyAttached { token: String },

    #[error("{annotation} 不能用于 {member}, 仅支持: {allowed}")]
    InvalidAnnotationTarget {
        annotation: String,
        member: String,
        allowed: String,
    },

    #[error("方法不存在: {type_name}::{method}")]
    MethodNotFound { type_name: String, method: String },

    #[error("参数位置 {index} 超过上限 {max}")]
    ParameterIndexOutOfRange { index: usize, max: usize },

    #[error("组件生命周期管理失败: {message}")]
    LifecycleError { message: String },

    #[error("批量释放失败: {} 个令牌释放出错", .failures.len())]
    DisposeFailed { failures: Vec<DisposeFailure> },
}

/// 批量释放中的单个失败项
#[derive(Debug)]
pub struct DisposeFailure {
    /// 令牌的规范键
    pub token: String,
    /// 释放时产生的错误
    pub error: DependencyError,
}

impl DependencyError {
    /// 创建无效令牌错误
    pub fn invalid_token(source_desc: impl Into<String>) -> Self {
        Self::InvalidToken {
            source_desc: source_desc.into(),
        }
    }

    /// 创建缺少 provider 错误
    pub fn missing_provider(token: impl ToString, operation: &'static str) -> Self {
        Self::MissingProvider {
            token: token.to_string(),
            operation,
        }
    }

    /// 创建重复注册错误
    pub fn duplicate_token(token: impl ToString, operation: &'static str) -> Self {
        Self::DuplicateToken {
            token: token.to_string(),
            operation,
        }
    }

    /// 创建未注册错误
    pub fn not_registered(token: impl ToString) -> Self {
        Self::TokenNotRegistered {
            token: token.to_string(),
        }
    }

    /// 创建类型不匹配错误
    pub fn type_mismatch<T: ?Sized>(token: impl ToString) -> Self {
        Self::TypeMismatch {
            token: token.to_string(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// 创建生命周期回调错误
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::LifecycleError {
            message: message.into(),
        }
    }


    /// 是否为令牌未注册错误
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::TokenNotRegistered { .. })
    }
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
