//! Provider 抽象接口
//!
//! Provider 为某个令牌产出值，并可在注册 / 释放时执行副作用。

use crate::container::DiContainer;
use crate::token::Token;
use infrastructure_common::{DependencyError, DependencyResult};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// 解析结果
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 共享的 provider
pub type SharedProvider = Arc<dyn Provider>;

/// Provider trait
///
/// 容器在调用 `resolve` / `register` / `dispose` 时总是传入自身作为 `owner`。
pub trait Provider: Send + Sync + 'static {
    /// Provider 自身推导出的令牌
    fn token(&self) -> DependencyResult<Token>;

    /// 产出值
    fn resolve(&self, owner: &dyn DiContainer) -> DependencyResult<Instance>;

    /// 注册后的副作用
    fn register(&self, _owner: &dyn DiContainer) -> DependencyResult<()> {
        Ok(())
    }

    /// 释放时的副作用
    fn dispose(&self, _owner: &dyn DiContainer) -> DependencyResult<()> {
        Ok(())
    }

    /// 归属关系
    fn binding(&self) -> &ProviderBinding;

    /// Provider 种类名称，用于日志
    fn kind(&self) -> &'static str;
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &self.kind())
            .field("owner", &self.binding().owner())
            .finish()
    }
}

/// Provider 与容器的归属关系
///
/// 一个 provider 同一时间只能归属一个容器，释放后才能注册到别处。
#[derive(Debug, Default)]
pub struct ProviderBinding {
    owner: Mutex<Option<Uuid>>,
}

impl ProviderBinding {
    /// 创建未归属的绑定
    pub fn new() -> Self {
        Self::default()
    }

    /// 归属到容器
    pub fn attach(&self, owner: Uuid, token: &Token) -> DependencyResult<()> {
        let mut current = self.owner.lock();

        match *current {
            Some(existing) if existing != owner => Err(DependencyError::ProviderAlreadyAttached {
                token: token.to_string(),
            }),
            _ => {
                *current = Some(owner);
                Ok(())
            }
        }
    }

    /// 解除归属
    pub fn detach(&self) {
        self.owner.lock().take();
    }

    /// 当前归属的容器 ID
    pub fn owner(&self) -> Option<Uuid> {
        *self.owner.lock()
    }

    /// 是否已归属
    pub fn is_attached(&self) -> bool {
        self.owner().is_some()
    }
}
