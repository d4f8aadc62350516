//! 类元数据协议
//!
//! 每个可注入类型在注册表中登记构造参数描述符和生命周期回调，
//! 类 provider 在注册、解析和释放时读取这些条目。条目只追加不删除。

use crate::container::DiContainer;
use crate::factory::check_parameter_index;
use crate::token::{Token, TokenSource};
use dashmap::DashMap;
use infrastructure_common::{DependencyError, DependencyResult};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// 全局类元数据注册表
static GLOBAL_REGISTRY: Lazy<ClassMetadataRegistry> = Lazy::new(ClassMetadataRegistry::new);

/// 描述符所附着的类成员
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// 类本身
    Class,
    /// 实例属性
    Property { name: String },
    /// 静态属性
    StaticProperty { name: String },
    /// 实例访问器
    Accessor { name: String },
    /// 静态访问器
    StaticAccessor { name: String },
    /// 实例方法
    Method { name: String },
    /// 静态方法
    StaticMethod { name: String },
    /// 参数，`method` 为 `None` 时表示构造参数
    Parameter { method: Option<String>, index: usize },
}

impl MemberKind {
    /// 成员种类标签
    pub fn tag(&self) -> MemberKindTag {
        match self {
            Self::Class => MemberKindTag::Class,
            Self::Property { .. } => MemberKindTag::Property,
            Self::StaticProperty { .. } => MemberKindTag::StaticProperty,
            Self::Accessor { .. } => MemberKindTag::Accessor,
            Self::StaticAccessor { .. } => MemberKindTag::StaticAccessor,
            Self::Method { .. } => MemberKindTag::Method,
            Self::StaticMethod { .. } => MemberKindTag::StaticMethod,
            Self::Parameter { .. } => MemberKindTag::Parameter,
        }
    }

    /// 实例属性
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property { name: name.into() }
    }

    /// 静态属性
    pub fn static_property(name: impl Into<String>) -> Self {
        Self::StaticProperty { name: name.into() }
    }

    /// 实例方法
    pub fn method(name: impl Into<String>) -> Self {
        Self::Method { name: name.into() }
    }

    /// 构造参数
    pub fn constructor_parameter(index: usize) -> Self {
        Self::Parameter { method: None, index }
    }

    /// 方法参数
    pub fn method_parameter(method: impl Into<String>, index: usize) -> Self {
        Self::Parameter {
            method: Some(method.into()),
            index,
        }
    }

    /// 成员是否属于类本身而非实例
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Self::Class | Self::StaticProperty { .. } | Self::StaticAccessor { .. } | Self::StaticMethod { .. }
        )
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => f.write_str("class"),
            Self::Property { name } => write!(f, "property `{}`", name),
            Self::StaticProperty { name } => write!(f, "static property `{}`", name),
            Self::Accessor { name } => write!(f, "accessor `{}`", name),
            Self::StaticAccessor { name } => write!(f, "static accessor `{}`", name),
            Self::Method { name } => write!(f, "method `{}`", name),
            Self::StaticMethod { name } => write!(f, "static method `{}`", name),
            Self::Parameter { method: None, index } => write!(f, "constructor parameter #{}", index),
            Self::Parameter {
                method: Some(method),
                index,
            } => write!(f, "parameter #{} of `{}`", index, method),
        }
    }
}

/// 成员种类标签，用于声明注解允许的目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKindTag {
    Class,
    Property,
    StaticProperty,
    Accessor,
    StaticAccessor,
    Method,
    StaticMethod,
    Parameter,
}

impl fmt::Display for MemberKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Class => "class",
            Self::Property => "property",
            Self::StaticProperty => "static property",
            Self::Accessor => "accessor",
            Self::StaticAccessor => "static accessor",
            Self::Method => "method",
            Self::StaticMethod => "static method",
            Self::Parameter => "parameter",
        };
        f.write_str(name)
    }
}

/// 回调作用对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTarget {
    /// 作用于类本身，调用时没有实例
    Static,
    /// 作用于实例
    Instance,
}

/// 回调所属阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Register,
    Resolve,
    Dispose,
}

/// 回调执行时的上下文
pub struct HookContext<'a> {
    /// 所属容器
    pub container: &'a dyn DiContainer,
    /// 类名
    pub class_name: &'static str,
    /// 回调名称
    pub hook_name: &'a str,
    /// 回调附着的成员
    pub member: &'a MemberKind,
    /// 回调作用对象
    pub target: HookTarget,
}

impl fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("container", &self.container.id())
            .field("class_name", &self.class_name)
            .field("hook_name", &self.hook_name)
            .field("member", &self.member)
            .field("target", &self.target)
            .finish()
    }
}

/// 生命周期回调函数
pub type LifecycleCallback =
    Arc<dyn Fn(&HookContext<'_>, Option<&(dyn Any + Send + Sync)>) -> DependencyResult<()> + Send + Sync>;

/// 生命周期回调
#[derive(Clone)]
pub struct LifecycleHook {
    /// 回调名称
    pub name: String,
    /// 附着的成员
    pub member: MemberKind,
    /// 作用对象
    pub target: HookTarget,
    /// 回调函数
    pub callback: LifecycleCallback,
}

impl LifecycleHook {
    /// 创建回调
    pub fn new<F>(name: impl Into<String>, member: MemberKind, target: HookTarget, callback: F) -> Self
    where
        F: Fn(&HookContext<'_>, Option<&(dyn Any + Send + Sync)>) -> DependencyResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            member,
            target,
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHook")
            .field("name", &self.name)
            .field("member", &self.member)
            .field("target", &self.target)
            .finish()
    }
}

/// 参数描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    /// 参数位置
    pub index: usize,
    /// 依赖令牌
    pub token: Token,
    /// 是否可选
    pub optional: bool,
}

/// 某个类的元数据快照
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    /// 类名
    pub class_name: &'static str,
    /// 注册回调
    pub register_hooks: Vec<LifecycleHook>,
    /// 解析回调
    pub resolve_hooks: Vec<LifecycleHook>,
    /// 释放回调
    pub dispose_hooks: Vec<LifecycleHook>,
    /// 构造参数
    pub constructor_parameters: Vec<ParameterDescriptor>,
    /// 方法参数
    pub method_parameters: HashMap<String, Vec<ParameterDescriptor>>,
}

impl ClassMetadata {
    /// 创建空元数据
    pub fn empty(class_name: &'static str) -> Self {
        Self {
            class_name,
            register_hooks: Vec::new(),
            resolve_hooks: Vec::new(),
            dispose_hooks: Vec::new(),
            constructor_parameters: Vec::new(),
            method_parameters: HashMap::new(),
        }
    }

    /// 某阶段的全部回调
    pub fn hooks(&self, phase: HookPhase) -> &[LifecycleHook] {
        match phase {
            HookPhase::Register => &self.register_hooks,
            HookPhase::Resolve => &self.resolve_hooks,
            HookPhase::Dispose => &self.dispose_hooks,
        }
    }

    fn hooks_mut(&mut self, phase: HookPhase) -> &mut Vec<LifecycleHook> {
        match phase {
            HookPhase::Register => &mut self.register_hooks,
            HookPhase::Resolve => &mut self.resolve_hooks,
            HookPhase::Dispose => &mut self.dispose_hooks,
        }
    }

    /// 方法的参数描述符
    pub fn method_parameters(&self, method: &str) -> Option<&[ParameterDescriptor]> {
        self.method_parameters.get(method).map(Vec::as_slice)
    }

    /// 构造参数的个数（按最大位置计算）
    pub fn constructor_arity(&self) -> usize {
        arity(&self.constructor_parameters)
    }

    /// 按顺序执行某阶段、某作用对象的回调
    pub fn run_hooks(
        &self,
        phase: HookPhase,
        target: HookTarget,
        container: &dyn DiContainer,
        instance: Option<&(dyn Any + Send + Sync)>,
    ) -> DependencyResult<()> {
        for hook in self.hooks(phase).iter().filter(|hook| hook.target == target) {
            debug!("执行 {} 的 {:?} 回调: {}", self.class_name, phase, hook.name);

            let context = HookContext {
                container,
                class_name: self.class_name,
                hook_name: &hook.name,
                member: &hook.member,
                target,
            };
            (hook.callback)(&context, instance)?;
        }
        Ok(())
    }
}

/// 参数列表的长度（按最大位置计算）
pub fn arity(parameters: &[ParameterDescriptor]) -> usize {
    parameters.iter().map(|p| p.index.saturating_add(1)).max().unwrap_or(0)
}

/// 类元数据注册表
///
/// 克隆得到的是同一个注册表的句柄。
#[derive(Debug, Clone, Default)]
pub struct ClassMetadataRegistry {
    entries: Arc<DashMap<TypeId, ClassMetadata>>,
}

impl ClassMetadataRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级注册表
    pub fn global() -> Self {
        GLOBAL_REGISTRY.clone()
    }

    /// 开始描述某个类
    pub fn describe<T: 'static>(&self) -> ClassMetadataBuilder<T> {
        ClassMetadataBuilder {
            registry: self.clone(),
            _marker: PhantomData,
        }
    }

    /// 读取某个类的元数据快照
    pub fn snapshot(&self, type_id: TypeId) -> Option<ClassMetadata> {
        self.entries.get(&type_id).map(|entry| entry.value().clone())
    }

    /// 读取某个类的元数据快照，未描述的类返回空元数据
    pub fn snapshot_of<T: 'static>(&self) -> ClassMetadata {
        self.snapshot(TypeId::of::<T>())
            .unwrap_or_else(|| ClassMetadata::empty(std::any::type_name::<T>()))
    }

    /// 是否描述过某个类
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// 已描述的类数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update<T: 'static>(&self, apply: impl FnOnce(&mut ClassMetadata)) {
        let mut entry = self
            .entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| ClassMetadata::empty(std::any::type_name::<T>()));
        apply(entry.value_mut());
    }
}

/// 注解
///
/// 可复用的描述符构造器，只能用于 [`allowed_on`](Annotation::allowed_on) 列出的成员种类。
pub trait Annotation<T: 'static> {
    /// 注解名称
    fn name(&self) -> &str;

    /// 允许的成员种类
    fn allowed_on(&self) -> &[MemberKindTag];

    /// 将注解应用到成员上
    fn apply(&self, builder: &ClassMetadataBuilder<T>, member: &MemberKind) -> DependencyResult<()>;
}

/// 类元数据构造器
///
/// 每次调用立即追加到注册表。
pub struct ClassMetadataBuilder<T: 'static> {
    registry: ClassMetadataRegistry,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Clone for ClassMetadataBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> fmt::Debug for ClassMetadataBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMetadataBuilder")
            .field("class_name", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: 'static> ClassMetadataBuilder<T> {
    /// 所属注册表
    pub fn registry(&self) -> &ClassMetadataRegistry {
        &self.registry
    }

    /// 必需构造参数
    pub fn parameter(&self, index: usize, token: impl Into<TokenSource>) -> DependencyResult<&Self> {
        self.define_parameter(None, index, token, false)
    }

    /// 可选构造参数
    pub fn optional_parameter(&self, index: usize, token: impl Into<TokenSource>) -> DependencyResult<&Self> {
        self.define_parameter(None, index, token, true)
    }

    /// 方法参数
    pub fn method_parameter(
        &self,
        method: impl Into<String>,
        index: usize,
        token: impl Into<TokenSource>,
        optional: bool,
    ) -> DependencyResult<&Self> {
        self.define_parameter(Some(method.into()), index, token, optional)
    }

    /// 声明方法，使其可以被调用方按名称查找
    pub fn declare_method(&self, method: impl Into<String>) -> &Self {
        let method = method.into();
        self.registry.update::<T>(|metadata| {
            metadata.method_parameters.entry(method).or_default();
        });
        self
    }

    /// 定义参数描述符，`method` 为 `None` 时定义构造参数
    pub fn define_parameter(
        &self,
        method: Option<String>,
        index: usize,
        token: impl Into<TokenSource>,
        optional: bool,
    ) -> DependencyResult<&Self> {
        check_parameter_index(index)?;
        let descriptor = ParameterDescriptor {
            index,
            token: Token::canonicalize(token)?,
            optional,
        };

        self.registry.update::<T>(|metadata| match method {
            Some(method) => metadata.method_parameters.entry(method).or_default().push(descriptor),
            None => metadata.constructor_parameters.push(descriptor),
        });
        Ok(self)
    }

    /// 追加原始回调
    pub fn hook(&self, phase: HookPhase, hook: LifecycleHook) -> &Self {
        self.registry.update::<T>(|metadata| metadata.hooks_mut(phase).push(hook));
        self
    }

    /// 注册时的静态回调
    pub fn on_register<F>(&self, name: impl Into<String>, callback: F) -> &Self
    where
        F: Fn(&HookContext<'_>) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.static_hook(HookPhase::Register, name, callback)
    }

    /// 解析时的静态回调，在构造实例之前执行
    pub fn on_resolve_static<F>(&self, name: impl Into<String>, callback: F) -> &Self
    where
        F: Fn(&HookContext<'_>) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.static_hook(HookPhase::Resolve, name, callback)
    }

    /// 释放时的静态回调
    pub fn on_dispose_static<F>(&self, name: impl Into<String>, callback: F) -> &Self
    where
        F: Fn(&HookContext<'_>) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.static_hook(HookPhase::Dispose, name, callback)
    }

    fn static_hook<F>(&self, phase: HookPhase, name: impl Into<String>, callback: F) -> &Self
    where
        F: Fn(&HookContext<'_>) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.hook(
            phase,
            LifecycleHook::new(name, MemberKind::Class, HookTarget::Static, move |context, _| {
                callback(context)
            }),
        )
    }
}

impl<T: Send + Sync + 'static> ClassMetadataBuilder<T> {
    /// 解析时的实例回调，在构造实例之后执行
    pub fn on_resolve<F>(&self, name: impl Into<String>, callback: F) -> &Self
    where
        F: Fn(&HookContext<'_>, &T) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.instance_hook(HookPhase::Resolve, name, callback)
    }

    /// 释放时的实例回调
    pub fn on_dispose<F>(&self, name: impl Into<String>, callback: F) -> &Self
    where
        F: Fn(&HookContext<'_>, &T) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.instance_hook(HookPhase::Dispose, name, callback)
    }

    fn instance_hook<F>(&self, phase: HookPhase, name: impl Into<String>, callback: F) -> &Self
    where
        F: Fn(&HookContext<'_>, &T) -> DependencyResult<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let member = MemberKind::method(name.clone());
        self.hook(
            phase,
            LifecycleHook::new(name, member, HookTarget::Instance, move |context, instance| {
                let instance = instance
                    .and_then(|instance| instance.downcast_ref::<T>())
                    .ok_or_else(|| DependencyError::type_mismatch::<T>(context.class_name))?;
                callback(context, instance)
            }),
        )
    }

    /// 继承父类在此刻已登记的全部条目
    ///
    /// 之后再向父类追加的条目不会同步到子类。实例回调收到的实例经 `upcast` 转换为父类。
    pub fn inherit<P>(&self, upcast: fn(&T) -> &P) -> &Self
    where
        P: Send + Sync + 'static,
    {
        let Some(parent) = self.registry.snapshot(TypeId::of::<P>()) else {
            return self;
        };
        debug!("{} 继承 {} 的元数据", std::any::type_name::<T>(), parent.class_name);

        let adapt = move |hooks: Vec<LifecycleHook>| -> Vec<LifecycleHook> {
            hooks
                .into_iter()
                .map(|hook| match hook.target {
                    HookTarget::Static => hook,
                    HookTarget::Instance => {
                        let callback = hook.callback.clone();
                        LifecycleHook::new(hook.name, hook.member, hook.target, move |context, instance| {
                            match instance.and_then(|instance| instance.downcast_ref::<T>()) {
                                Some(child) => callback(context, Some(upcast(child) as &(dyn Any + Send + Sync))),
                                None => callback(context, instance),
                            }
                        })
                    }
                })
                .collect()
        };

        let register_hooks = adapt(parent.register_hooks);
        let resolve_hooks = adapt(parent.resolve_hooks);
        let dispose_hooks = adapt(parent.dispose_hooks);

        self.registry.update::<T>(|metadata| {
            metadata.register_hooks.extend(register_hooks);
            metadata.resolve_hooks.extend(resolve_hooks);
            metadata.dispose_hooks.extend(dispose_hooks);
            metadata.constructor_parameters.extend(parent.constructor_parameters);
            for (method, parameters) in parent.method_parameters {
                metadata.method_parameters.entry(method).or_default().extend(parameters);
            }
        });
        self
    }
}

impl<T: 'static> ClassMetadataBuilder<T> {
    /// 应用注解
    ///
    /// 成员种类不在注解允许范围内时返回 [`DependencyError::InvalidAnnotationTarget`]。
    pub fn annotate(&self, member: MemberKind, annotation: &dyn Annotation<T>) -> DependencyResult<&Self> {
        let allowed = annotation.allowed_on();
        if !allowed.contains(&member.tag()) {
            return Err(DependencyError::InvalidAnnotationTarget {
                annotation: annotation.name().to_string(),
                member: member.to_string(),
                allowed: allowed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            });
        }

        annotation.apply(self, &member)?;
        Ok(self)
    }
}
