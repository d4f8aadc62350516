//! 值 provider

use di_abstractions::{DiContainer, Instance, Provider, ProviderBinding, SharedProvider, Token, TokenSource, TypeRef};
use infrastructure_common::DependencyResult;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 注册 / 释放回调
pub type ValueCallback = Arc<dyn Fn(&dyn DiContainer) -> DependencyResult<()> + Send + Sync>;

type Factory = Arc<dyn Fn() -> DependencyResult<Instance> + Send + Sync>;

/// 静态值 provider
///
/// 每次解析返回同一个预先计算的值。
pub struct StaticValueProvider {
    value: Instance,
    source: TokenSource,
    on_register: Option<ValueCallback>,
    on_dispose: Option<ValueCallback>,
    binding: ProviderBinding,
}

impl StaticValueProvider {
    /// 包装一个值
    ///
    /// 值本身是字符串、符号或令牌时可以推导出令牌。
    pub fn new<V: Any + Send + Sync>(value: V) -> Self {
        Self {
            source: TokenSource::from_value(&value),
            value: Arc::new(value),
            on_register: None,
            on_dispose: None,
            binding: ProviderBinding::new(),
        }
    }

    /// 注册时执行的回调
    pub fn with_on_register<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn DiContainer) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.on_register = Some(Arc::new(callback));
        self
    }

    /// 释放时执行的回调
    pub fn with_on_dispose<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn DiContainer) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.on_dispose = Some(Arc::new(callback));
        self
    }

    /// 包装的值
    pub fn value(&self) -> &Instance {
        &self.value
    }
}

impl Provider for StaticValueProvider {
    fn token(&self) -> DependencyResult<Token> {
        Token::canonicalize(self.source.clone())
    }

    fn resolve(&self, _owner: &dyn DiContainer) -> DependencyResult<Instance> {
        Ok(self.value.clone())
    }

    fn register(&self, owner: &dyn DiContainer) -> DependencyResult<()> {
        self.on_register.as_ref().map_or(Ok(()), |callback| callback(owner))
    }

    fn dispose(&self, owner: &dyn DiContainer) -> DependencyResult<()> {
        self.on_dispose.as_ref().map_or(Ok(()), |callback| callback(owner))
    }

    fn binding(&self) -> &ProviderBinding {
        &self.binding
    }

    fn kind(&self) -> &'static str {
        "static_value"
    }
}

impl fmt::Debug for StaticValueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticValueProvider")
            .field("source", &self.source)
            .field("owner", &self.binding.owner())
            .finish()
    }
}

/// 动态值 provider
///
/// 每次解析都调用一次工厂函数。
pub struct DynamicValueProvider {
    factory: Factory,
    source: TypeRef,
    on_register: Option<ValueCallback>,
    on_dispose: Option<ValueCallback>,
    binding: ProviderBinding,
}

impl DynamicValueProvider {
    /// 包装一个工厂函数
    ///
    /// 具名函数可以推导出令牌，闭包和函数指针不能。
    pub fn new<F, V>(factory: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Any + Send + Sync,
    {
        Self::build(TypeRef::of::<F>(), Arc::new(move || Ok(Arc::new(factory()) as Instance)))
    }

    /// 包装一个可能失败的工厂函数
    pub fn fallible<F, V>(factory: F) -> Self
    where
        F: Fn() -> DependencyResult<V> + Send + Sync + 'static,
        V: Any + Send + Sync,
    {
        Self::build(TypeRef::of::<F>(), Arc::new(move || Ok(Arc::new(factory()?) as Instance)))
    }

    fn build(source: TypeRef, factory: Factory) -> Self {
        Self {
            factory,
            source,
            on_register: None,
            on_dispose: None,
            binding: ProviderBinding::new(),
        }
    }

    /// 注册时执行的回调
    pub fn with_on_register<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn DiContainer) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.on_register = Some(Arc::new(callback));
        self
    }

    /// 释放时执行的回调
    pub fn with_on_dispose<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn DiContainer) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.on_dispose = Some(Arc::new(callback));
        self
    }
}

impl Provider for DynamicValueProvider {
    fn token(&self) -> DependencyResult<Token> {
        Token::canonicalize(self.source)
    }

    fn resolve(&self, _owner: &dyn DiContainer) -> DependencyResult<Instance> {
        (self.factory)()
    }

    fn register(&self, owner: &dyn DiContainer) -> DependencyResult<()> {
        self.on_register.as_ref().map_or(Ok(()), |callback| callback(owner))
    }

    fn dispose(&self, owner: &dyn DiContainer) -> DependencyResult<()> {
        self.on_dispose.as_ref().map_or(Ok(()), |callback| callback(owner))
    }

    fn binding(&self) -> &ProviderBinding {
        &self.binding
    }

    fn kind(&self) -> &'static str {
        "dynamic_value"
    }
}

impl fmt::Debug for DynamicValueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicValueProvider")
            .field("factory", &self.source.type_name())
            .field("owner", &self.binding.owner())
            .finish()
    }
}

/// 静态值 provider
pub fn use_static_value<V: Any + Send + Sync>(value: V) -> SharedProvider {
    Arc::new(StaticValueProvider::new(value))
}

/// 动态值 provider
pub fn use_dynamic_value<F, V>(factory: F) -> SharedProvider
where
    F: Fn() -> V + Send + Sync + 'static,
    V: Any + Send + Sync,
{
    Arc::new(DynamicValueProvider::new(factory))
}
