//! 类 provider
//!
//! 按类元数据中的参数描述符解析依赖并构造实例。

use di_abstractions::{
    ClassMetadata, ClassMetadataRegistry, DiContainer, HookPhase, HookTarget, InjectArgs, Injectable, Instance,
    Provider, ProviderBinding, SharedProvider, Token,
};
use infrastructure_common::{DependencyResult, Lifetime};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type DisposeCallback<T> = Arc<dyn Fn(Arc<T>) -> DependencyResult<()> + Send + Sync>;

/// 类 provider
pub struct ClassProvider<T: Injectable> {
    lifetime: Lifetime,
    registry: ClassMetadataRegistry,
    instance: Mutex<Option<Arc<T>>>,
    on_dispose: Option<DisposeCallback<T>>,
    binding: ProviderBinding,
}

impl<T: Injectable> ClassProvider<T> {
    /// 创建类 provider，读取进程级元数据注册表
    pub fn new(lifetime: Lifetime) -> Self {
        Self {
            lifetime,
            registry: ClassMetadataRegistry::global(),
            instance: Mutex::new(None),
            on_dispose: None,
            binding: ProviderBinding::new(),
        }
    }

    /// 单例类 provider
    pub fn singleton() -> Self {
        Self::new(Lifetime::Singleton)
    }

    /// 瞬时类 provider
    pub fn transient() -> Self {
        Self::new(Lifetime::Transient)
    }

    /// 使用指定的元数据注册表
    pub fn with_registry(mut self, registry: ClassMetadataRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// 释放时对实例执行的回调
    pub fn with_on_dispose<F>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<T>) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.on_dispose = Some(Arc::new(callback));
        self
    }

    /// 生命周期
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// 是否已缓存实例
    pub fn has_instance(&self) -> bool {
        self.instance.lock().is_some()
    }

    /// 获取实例，单例已缓存时直接返回
    pub fn instance(&self, owner: &dyn DiContainer) -> DependencyResult<Arc<T>> {
        if let Some(instance) = self.instance.lock().clone() {
            return Ok(instance);
        }

        let metadata = self.registry.snapshot_of::<T>();
        metadata.run_hooks(HookPhase::Resolve, HookTarget::Static, owner, None)?;

        let args = self.build_args(&metadata, owner)?;
        debug!("构造 {} ({} 个参数)", T::class_name(), args.len());
        let instance = Arc::new(T::construct(args)?);

        metadata.run_hooks(
            HookPhase::Resolve,
            HookTarget::Instance,
            owner,
            Some(instance.as_ref() as &(dyn Any + Send + Sync)),
        )?;

        if self.lifetime.caches_instance() {
            *self.instance.lock() = Some(instance.clone());
        }
        Ok(instance)
    }

    fn build_args(&self, metadata: &ClassMetadata, owner: &dyn DiContainer) -> DependencyResult<InjectArgs> {
        let mut args = InjectArgs::default();
        for parameter in &metadata.constructor_parameters {
            args.set(parameter.index, owner.resolve_parameter(parameter)?)?;
        }
        Ok(args)
    }
}

impl<T: Injectable> Provider for ClassProvider<T> {
    fn token(&self) -> DependencyResult<Token> {
        Token::of::<T>()
    }

    fn resolve(&self, owner: &dyn DiContainer) -> DependencyResult<Instance> {
        let instance: Instance = self.instance(owner)?;
        Ok(instance)
    }

    fn register(&self, owner: &dyn DiContainer) -> DependencyResult<()> {
        self.registry
            .snapshot_of::<T>()
            .run_hooks(HookPhase::Register, HookTarget::Static, owner, None)
    }

    fn dispose(&self, owner: &dyn DiContainer) -> DependencyResult<()> {
        let metadata = self.registry.snapshot_of::<T>();
        metadata.run_hooks(HookPhase::Dispose, HookTarget::Static, owner, None)?;

        let instance = self.instance(owner)?;
        metadata.run_hooks(
            HookPhase::Dispose,
            HookTarget::Instance,
            owner,
            Some(instance.as_ref() as &(dyn Any + Send + Sync)),
        )?;

        if let Some(on_dispose) = &self.on_dispose {
            on_dispose(instance)?;
        }

        self.instance.lock().take();
        Ok(())
    }

    fn binding(&self) -> &ProviderBinding {
        &self.binding
    }

    fn kind(&self) -> &'static str {
        "class"
    }
}

impl<T: Injectable> fmt::Debug for ClassProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassProvider")
            .field("class", &T::class_name())
            .field("lifetime", &self.lifetime)
            .field("cached", &self.has_instance())
            .finish()
    }
}

/// 单例类 provider
pub fn use_class<T: Injectable>() -> SharedProvider {
    Arc::new(ClassProvider::<T>::singleton())
}

/// 指定生命周期的类 provider
pub fn use_class_with<T: Injectable>(lifetime: Lifetime) -> SharedProvider {
    Arc::new(ClassProvider::<T>::new(lifetime))
}
