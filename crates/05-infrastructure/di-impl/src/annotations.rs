//! 内置注解
//!
//! - [`Use`] - 为构造参数、方法参数或属性声明依赖
//! - [`Usable`] - 将类注册到容器

use crate::container::Container;
use crate::providers::ClassProvider;
use di_abstractions::{
    Annotation, ClassMetadataBuilder, HookPhase, HookTarget, Injectable, Instance, LifecycleHook, MemberKind,
    MemberKindTag, ParameterDescriptor, SharedProvider, Token, TokenSource,
};
use infrastructure_common::{DependencyError, DependencyResult, Lifetime};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

type PropertySetter<T> = Arc<dyn Fn(&T, Instance) -> DependencyResult<()> + Send + Sync>;
type StaticSetter = Arc<dyn Fn(Instance) -> DependencyResult<()> + Send + Sync>;

/// 依赖声明注解
///
/// 用于参数时定义参数描述符；用于属性时在解析后取得依赖并交给 setter。
/// 可选依赖缺失时不调用 setter。
pub struct Use<T> {
    token: Token,
    optional: bool,
    setter: Option<PropertySetter<T>>,
    static_setter: Option<StaticSetter>,
}

impl<T> Use<T> {
    /// 声明依赖令牌
    pub fn new(token: impl Into<TokenSource>) -> DependencyResult<Self> {
        Ok(Self {
            token: Token::canonicalize(token)?,
            optional: false,
            setter: None,
            static_setter: None,
        })
    }

    /// 标记为可选依赖
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 实例属性的 setter
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&T, Instance) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// 静态属性的 setter
    pub fn with_static_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(Instance) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.static_setter = Some(Arc::new(setter));
        self
    }

    fn descriptor(&self, index: usize) -> ParameterDescriptor {
        ParameterDescriptor {
            index,
            token: self.token.clone(),
            optional: self.optional,
        }
    }

    fn missing_setter(&self, member: &MemberKind) -> DependencyError {
        DependencyError::lifecycle(format!("Use({}) 用于 {} 时需要 setter", self.token, member))
    }
}

impl<T: Send + Sync + 'static> Annotation<T> for Use<T> {
    fn name(&self) -> &str {
        "Use"
    }

    fn allowed_on(&self) -> &[MemberKindTag] {
        &[
            MemberKindTag::Parameter,
            MemberKindTag::Property,
            MemberKindTag::StaticProperty,
        ]
    }

    fn apply(&self, builder: &ClassMetadataBuilder<T>, member: &MemberKind) -> DependencyResult<()> {
        match member {
            MemberKind::Parameter { method, index } => {
                builder.define_parameter(method.clone(), *index, &self.token, self.optional)?;
            }
            MemberKind::Property { name } => {
                let setter = self.setter.clone().ok_or_else(|| self.missing_setter(member))?;
                let descriptor = self.descriptor(0);

                builder.hook(
                    HookPhase::Resolve,
                    LifecycleHook::new(
                        format!("use:{}", name),
                        member.clone(),
                        HookTarget::Instance,
                        move |context, instance| {
                            let instance = instance
                                .and_then(|instance| instance.downcast_ref::<T>())
                                .ok_or_else(|| DependencyError::type_mismatch::<T>(context.class_name))?;

                            match context.container.resolve_parameter(&descriptor)? {
                                Some(value) => setter(instance, value),
                                None => Ok(()),
                            }
                        },
                    ),
                );
            }
            MemberKind::StaticProperty { name } => {
                let setter = self.static_setter.clone().ok_or_else(|| self.missing_setter(member))?;
                let descriptor = self.descriptor(0);

                builder.hook(
                    HookPhase::Resolve,
                    LifecycleHook::new(
                        format!("use:{}", name),
                        member.clone(),
                        HookTarget::Static,
                        move |context, _| match context.container.resolve_parameter(&descriptor)? {
                            Some(value) => setter(value),
                            None => Ok(()),
                        },
                    ),
                );
            }
            other => {
                return Err(DependencyError::InvalidAnnotationTarget {
                    annotation: "Use".to_string(),
                    member: other.to_string(),
                    allowed: "parameter, property, static property".to_string(),
                })
            }
        }

        debug!("Use({}) 应用到 {}", self.token, member);
        Ok(())
    }
}

/// 类注册注解
///
/// 应用时立即把类注册到目标容器（默认为进程级容器）。
pub struct Usable<T> {
    container: Option<Container>,
    token: Option<Token>,
    lifetime: Lifetime,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for Usable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Usable<T> {
    /// 以单例注册到进程级容器
    pub fn new() -> Self {
        Self {
            container: None,
            token: None,
            lifetime: Lifetime::Singleton,
            _marker: PhantomData,
        }
    }

    /// 注册到指定容器
    pub fn in_container(mut self, container: &Container) -> Self {
        self.container = Some(container.clone());
        self
    }

    /// 使用显式令牌代替类型令牌
    pub fn with_token(mut self, token: impl Into<TokenSource>) -> DependencyResult<Self> {
        self.token = Some(Token::canonicalize(token)?);
        Ok(self)
    }

    /// 指定生命周期
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }
}

impl<T: Injectable> Annotation<T> for Usable<T> {
    fn name(&self) -> &str {
        "Usable"
    }

    fn allowed_on(&self) -> &[MemberKindTag] {
        &[MemberKindTag::Class]
    }

    fn apply(&self, builder: &ClassMetadataBuilder<T>, _member: &MemberKind) -> DependencyResult<()> {
        let provider: SharedProvider =
            Arc::new(ClassProvider::<T>::new(self.lifetime).with_registry(builder.registry().clone()));
        let container = self.container.clone().unwrap_or_else(Container::global);

        match &self.token {
            Some(token) => container.bind(token, provider)?,
            None => container.add(provider)?,
        };
        Ok(())
    }
}
