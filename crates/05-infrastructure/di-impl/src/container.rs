//! 层级依赖注入容器

use crate::providers::ClassProvider;
use di_abstractions::{
    ContainerConfig, DiContainer, DisposePolicy, Extension, ExtensionManager, ExtensionToggle, HookEvent,
    Injectable, Instance, RegisterTarget, ResolveContext, ResolveOptions, SharedProvider, Token, TokenSource,
};
use infrastructure_common::{
    ConfigResult, DependencyError, DependencyResult, DisposeFailure, Lifetime,
};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 进程级默认容器
static GLOBAL_CONTAINER: Lazy<Container> = Lazy::new(Container::new);

/// 保持插入顺序的 provider 存储
#[derive(Default)]
struct ProviderStore {
    providers: HashMap<Token, SharedProvider>,
    order: Vec<Token>,
}

impl ProviderStore {
    fn get(&self, token: &Token) -> Option<SharedProvider> {
        self.providers.get(token).cloned()
    }

    fn contains(&self, token: &Token) -> bool {
        self.providers.contains_key(token)
    }

    fn insert(&mut self, token: Token, provider: SharedProvider) {
        self.order.push(token.clone());
        self.providers.insert(token, provider);
    }

    fn remove(&mut self, token: &Token) -> Option<SharedProvider> {
        let provider = self.providers.remove(token)?;
        self.order.retain(|t| t != token);
        Some(provider)
    }
}

struct ContainerInner {
    id: Uuid,
    /// 串行化本容器的注册 / 解析 / 释放，同一线程可重入
    gate: ReentrantMutex<()>,
    store: RwLock<ProviderStore>,
    extensions: ExtensionManager,
    parent: Option<Weak<ContainerInner>>,
    config: ContainerConfig,
    resolving: Mutex<ResolveContext>,
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        for provider in self.store.get_mut().providers.values() {
            if provider.binding().owner() == Some(self.id) {
                provider.binding().detach();
            }
        }
    }
}

/// 依赖注入容器
///
/// 克隆得到的是同一个容器的句柄。子容器只持有父容器的弱引用。
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析期间占用解析链的位置，离开作用域时释放
struct ResolutionGuard<'a> {
    context: &'a Mutex<ResolveContext>,
}

impl<'a> ResolutionGuard<'a> {
    fn enter(context: &'a Mutex<ResolveContext>, token: &Token) -> DependencyResult<Self> {
        context.lock().push_token(token)?;
        Ok(Self { context })
    }
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        self.context.lock().pop_token();
    }
}

impl Container {
    /// 创建使用默认配置的根容器
    pub fn new() -> Self {
        Self::build(ContainerConfig::default(), None)
    }

    /// 创建使用指定配置的根容器
    pub fn with_config(config: ContainerConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::build(config, None))
    }

    /// 进程级默认容器
    pub fn global() -> Self {
        GLOBAL_CONTAINER.clone()
    }

    fn build(config: ContainerConfig, parent: Option<Weak<ContainerInner>>) -> Self {
        let inner = ContainerInner {
            id: Uuid::new_v4(),
            gate: ReentrantMutex::new(()),
            store: RwLock::new(ProviderStore::default()),
            extensions: ExtensionManager::new(),
            parent,
            resolving: Mutex::new(ResolveContext::new(ResolveOptions::from(&config))),
            config,
        };
        debug!("创建容器: {}", inner.id);

        Self { inner: Arc::new(inner) }
    }

    /// 容器 ID
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 创建子容器
    ///
    /// 子容器使用相同的配置，本地未注册的令牌委托给父容器解析。
    pub fn create_child(&self) -> Self {
        let child = Self::build(self.inner.config.clone(), Some(Arc::downgrade(&self.inner)));
        debug!("容器 {} 创建子容器 {}", self.id(), child.id());
        child
    }

    /// 父容器，已释放时返回 `None`
    pub fn parent(&self) -> Option<Self> {
        let parent = self.inner.parent.as_ref()?;
        match parent.upgrade() {
            Some(inner) => Some(Self { inner }),
            None => {
                debug!("容器 {} 的父容器已释放", self.id());
                None
            }
        }
    }

    /// 注册 provider
    ///
    /// `target` 为 provider 时忽略 `provider` 参数，令牌由 provider 推导。
    pub fn register(
        &self,
        target: impl Into<RegisterTarget>,
        provider: Option<SharedProvider>,
    ) -> DependencyResult<Token> {
        let _gate = self.inner.gate.lock();

        let (token, provider) = match target.into() {
            RegisterTarget::Provider(provider) => (provider.token()?, Some(provider)),
            RegisterTarget::Token(source) => (Token::canonicalize(source)?, provider),
        };
        let provider = provider.ok_or_else(|| DependencyError::missing_provider(&token, "register"))?;

        if self.inner.store.read().contains(&token) {
            return Err(DependencyError::duplicate_token(&token, "register"));
        }

        provider.binding().attach(self.id(), &token)?;

        if let Err(e) = self.inner.extensions.emit(&HookEvent::BeforeRegister {
            token: &token,
            provider: &provider,
        }) {
            provider.binding().detach();
            return Err(e);
        }

        self.inner.store.write().insert(token.clone(), provider.clone());

        let registered = provider.register(self).and_then(|()| {
            self.inner.extensions.emit(&HookEvent::AfterRegister {
                token: &token,
                provider: &provider,
            })
        });
        if let Err(e) = registered {
            warn!("注册令牌失败, 回滚: {}: {}", token, e);
            self.inner.store.write().remove(&token);
            provider.binding().detach();
            return Err(e);
        }

        info!("注册令牌: {} ({})", token, provider.kind());
        Ok(token)
    }

    /// 以令牌注册 provider
    pub fn bind(&self, token: impl Into<TokenSource>, provider: SharedProvider) -> DependencyResult<Token> {
        self.register(RegisterTarget::Token(token.into()), Some(provider))
    }

    /// 注册 provider，令牌由 provider 推导
    pub fn add(&self, provider: SharedProvider) -> DependencyResult<Token> {
        self.register(provider, None)
    }

    /// 以类型令牌注册可注入类型
    pub fn register_class<T: Injectable>(&self, lifetime: Lifetime) -> DependencyResult<Token> {
        self.add(Arc::new(ClassProvider::<T>::new(lifetime)))
    }

    /// 解析令牌
    ///
    /// 本地未注册时委托给父容器，只有实际命中的容器会触发扩展回调。
    pub fn resolve(&self, token: impl Into<TokenSource>) -> DependencyResult<Instance> {
        let token = Token::canonicalize(token)?;
        self.resolve_canonical(&token)
    }

    fn resolve_canonical(&self, token: &Token) -> DependencyResult<Instance> {
        let local = {
            let _gate = self.inner.gate.lock();
            let provider = self.inner.store.read().get(token);
            provider.map(|provider| self.resolve_local(token, &provider))
        };

        match local {
            Some(result) => result,
            None => match self.parent() {
                Some(parent) => {
                    debug!("容器 {} 未注册 {}, 委托父容器 {}", self.id(), token, parent.id());
                    parent.resolve_canonical(token)
                }
                None => Err(DependencyError::not_registered(token)),
            },
        }
    }

    fn resolve_local(&self, token: &Token, provider: &SharedProvider) -> DependencyResult<Instance> {
        let _guard = ResolutionGuard::enter(&self.inner.resolving, token)?;
        debug!("解析令牌: {} ({})", token, provider.kind());

        self.inner.extensions.emit(&HookEvent::BeforeResolve { token })?;
        let value = provider.resolve(self)?;
        self.inner.extensions.emit(&HookEvent::AfterResolve { token, value: &value })?;

        Ok(value)
    }

    /// 解析令牌，任何失败都返回 `fallback`
    ///
    /// 未注册以外的错误会记录警告日志。
    pub fn resolve_or(&self, token: impl Into<TokenSource>, fallback: Instance) -> Instance {
        self.resolve_or_none(token).unwrap_or(fallback)
    }

    /// 解析令牌，任何失败都返回 `None`
    pub fn resolve_or_none(&self, token: impl Into<TokenSource>) -> Option<Instance> {
        match self.resolve(token) {
            Ok(value) => Some(value),
            Err(e) => {
                if !e.is_not_registered() {
                    warn!("解析失败, 使用默认值: {}", e);
                }
                None
            }
        }
    }

    /// 解析令牌，仅在令牌未注册时返回 `None`
    pub fn resolve_optional(&self, token: impl Into<TokenSource>) -> DependencyResult<Option<Instance>> {
        let token = Token::canonicalize(token)?;
        let _gate = self.inner.gate.lock();

        if !self.can_resolve(&token) {
            return Ok(None);
        }
        self.resolve_canonical(&token).map(Some)
    }

    /// 解析并转换为具体类型
    pub fn resolve_as<T: Any + Send + Sync>(&self, token: impl Into<TokenSource>) -> DependencyResult<Arc<T>> {
        let token = Token::canonicalize(token)?;
        self.resolve_canonical(&token)?
            .downcast::<T>()
            .map_err(|_| DependencyError::type_mismatch::<T>(&token))
    }

    /// 释放令牌
    ///
    /// 未在本容器注册的令牌直接忽略。释放失败时条目保留。
    pub fn dispose(&self, token: impl Into<TokenSource>) -> DependencyResult<()> {
        let token = Token::canonicalize(token)?;
        self.dispose_canonical(&token)
    }

    fn dispose_canonical(&self, token: &Token) -> DependencyResult<()> {
        let _gate = self.inner.gate.lock();

        let Some(provider) = self.inner.store.read().get(token) else {
            debug!("容器 {} 未注册 {}, 跳过释放", self.id(), token);
            return Ok(());
        };

        self.inner.extensions.emit(&HookEvent::BeforeDispose {
            token,
            provider: &provider,
        })?;
        provider.dispose(self)?;
        self.inner.extensions.emit(&HookEvent::AfterDispose {
            token,
            provider: &provider,
        })?;

        self.inner.store.write().remove(token);
        provider.binding().detach();

        info!("释放令牌: {}", token);
        Ok(())
    }

    /// 按注册顺序释放全部令牌
    pub fn dispose_all(&self) -> DependencyResult<()> {
        let _gate = self.inner.gate.lock();
        let tokens = self.tokens();
        info!("容器 {} 释放全部 {} 个令牌", self.id(), tokens.len());

        let mut failures = Vec::new();
        for token in tokens {
            if let Err(error) = self.dispose_canonical(&token) {
                warn!("释放令牌失败: {}: {}", token, error);

                match self.inner.config.dispose_policy {
                    DisposePolicy::HaltOnFirstError => return Err(error),
                    DisposePolicy::ContinueAndCollect => failures.push(DisposeFailure {
                        token: token.to_string(),
                        error,
                    }),
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DependencyError::DisposeFailed { failures })
        }
    }

    /// 本容器是否注册了令牌（不查找父容器）
    pub fn is_registered(&self, token: impl Into<TokenSource>) -> bool {
        Token::canonicalize(token).map_or(false, |token| self.inner.store.read().contains(&token))
    }

    /// 本容器或任一祖先是否注册了令牌
    pub fn can_resolve(&self, token: impl Into<TokenSource>) -> bool {
        let Ok(token) = Token::canonicalize(token) else {
            return false;
        };

        let mut current = Some(self.clone());
        while let Some(container) = current {
            if container.inner.store.read().contains(&token) {
                return true;
            }
            current = container.parent();
        }
        false
    }

    /// 本容器的令牌，按注册顺序
    pub fn tokens(&self) -> Vec<Token> {
        self.inner.store.read().order.clone()
    }

    /// 本容器注册的令牌数量
    pub fn len(&self) -> usize {
        self.inner.store.read().order.len()
    }

    /// 本容器是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 挂载扩展
    pub fn add_extension(&self, extension: Extension) -> ExtensionToggle {
        self.inner.extensions.add_extension(extension)
    }

    /// 卸载扩展
    pub fn remove_extension(&self, extension: &Extension) -> ExtensionToggle {
        self.inner.extensions.remove_extension(extension)
    }

    /// 已挂载的扩展数量
    pub fn extension_count(&self) -> usize {
        self.inner.extensions.len()
    }

    /// 扩展管理器
    pub fn extensions(&self) -> &ExtensionManager {
        &self.inner.extensions
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Container {}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("tokens", &self.len())
            .field("extensions", &self.extension_count())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

impl DiContainer for Container {
    fn id(&self) -> Uuid {
        self.inner.id
    }

    fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    fn register_target(
        &self,
        target: RegisterTarget,
        provider: Option<SharedProvider>,
    ) -> DependencyResult<Token> {
        self.register(target, provider)
    }

    fn resolve_token(&self, token: &Token) -> DependencyResult<Instance> {
        self.resolve_canonical(token)
    }

    fn resolve_or_none_token(&self, token: &Token) -> Option<Instance> {
        self.resolve_or_none(token)
    }

    fn resolve_optional_token(&self, token: &Token) -> DependencyResult<Option<Instance>> {
        self.resolve_optional(token)
    }

    fn dispose_token(&self, token: &Token) -> DependencyResult<()> {
        self.dispose_canonical(token)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{use_dynamic_value, use_static_value};

    #[test]
    fn test_register_and_resolve_static_value() {
        let container = Container::new();
        container.bind("port", use_static_value(8080_u16)).unwrap();

        assert!(container.is_registered("port"));
        assert_eq!(*container.resolve_as::<u16>("port").unwrap(), 8080);
        assert_eq!(container.tokens(), vec![Token::name("port")]);
    }

    #[test]
    fn test_provider_without_token_needs_explicit_key() {
        let container = Container::new();
        let result = container.add(use_dynamic_value(|| 1_u8));

        assert!(matches!(result, Err(DependencyError::InvalidToken { .. })));
        assert!(container.is_empty());
    }

    #[test]
    fn test_missing_provider() {
        let container = Container::new();
        let result = container.register("port", None);

        assert!(matches!(
            result,
            Err(DependencyError::MissingProvider { operation: "register", .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new();
        container.bind("port", use_static_value(8080_u16)).unwrap();

        assert!(matches!(
            container.resolve_as::<String>("port"),
            Err(DependencyError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_provider_belongs_to_one_container() {
        let first = Container::new();
        let second = Container::new();
        let provider = use_static_value(1_u8);

        first.bind("value", provider.clone()).unwrap();
        assert!(matches!(
            second.bind("value", provider.clone()),
            Err(DependencyError::ProviderAlreadyAttached { .. })
        ));

        first.dispose("value").unwrap();
        second.bind("value", provider).unwrap();
    }

    #[test]
    fn test_dropping_container_releases_providers() {
        let provider = use_static_value(1_u8);
        {
            let container = Container::new();
            container.bind("value", provider.clone()).unwrap();
            assert!(provider.binding().is_attached());
        }
        assert!(!provider.binding().is_attached());
    }

    #[test]
    fn test_orphaned_child_does_not_delegate() {
        let child = {
            let parent = Container::new();
            parent.bind("value", use_static_value(1_u8)).unwrap();
            parent.create_child()
        };

        assert!(child.parent().is_none());
        assert!(child.resolve("value").unwrap_err().is_not_registered());
    }

    #[test]
    fn test_with_config_validates() {
        let config = ContainerConfig {
            max_resolution_depth: 0,
            ..ContainerConfig::default()
        };

        assert!(Container::with_config(config).is_err());
        assert_eq!(Container::global(), Container::global());
    }
}
