//! 方法调用辅助
//!
//! 按类元数据中登记的方法参数准备参数列表，再调用方法体。

use crate::container::Container;
use di_abstractions::{ClassMetadataRegistry, DiContainer, InjectArgs, Instance, Token, TokenSource};
use infrastructure_common::{DependencyError, DependencyResult};
use tracing::debug;

/// 显式指定的参数
#[derive(Debug, Clone)]
pub enum InvokeArg {
    /// 直接使用的值
    Value(Instance),
    /// 从容器解析的令牌
    Token(Token),
}

/// 调用选项
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    container: Option<Container>,
    registry: Option<ClassMetadataRegistry>,
    args: Vec<(usize, InvokeArg)>,
}

impl InvokeOptions {
    /// 默认选项：进程级容器和进程级元数据注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 从指定容器解析参数
    pub fn in_container(mut self, container: &Container) -> Self {
        self.container = Some(container.clone());
        self
    }

    /// 使用指定的元数据注册表
    pub fn with_registry(mut self, registry: ClassMetadataRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 在某个位置使用给定的值
    pub fn value(mut self, index: usize, value: Instance) -> Self {
        self.args.push((index, InvokeArg::Value(value)));
        self
    }

    /// 在某个位置使用从容器解析的令牌
    pub fn token(mut self, index: usize, token: impl Into<TokenSource>) -> DependencyResult<Self> {
        self.args.push((index, InvokeArg::Token(Token::canonicalize(token)?)));
        Ok(self)
    }
}

/// 以注入的参数调用实例方法
///
/// 方法必须已在 `T` 的元数据中声明，否则返回 [`DependencyError::MethodNotFound`]。
/// 先按登记的参数描述符解析，再用显式参数覆盖对应位置。
pub fn invoke<T, R, F>(instance: &T, method: &str, options: InvokeOptions, call: F) -> DependencyResult<R>
where
    T: 'static,
    F: FnOnce(&T, InjectArgs) -> DependencyResult<R>,
{
    let registry = options.registry.unwrap_or_else(ClassMetadataRegistry::global);
    let container = options.container.unwrap_or_else(Container::global);
    let metadata = registry.snapshot_of::<T>();

    let parameters = metadata
        .method_parameters(method)
        .ok_or_else(|| DependencyError::MethodNotFound {
            type_name: metadata.class_name.to_string(),
            method: method.to_string(),
        })?;

    let mut args = InjectArgs::new(Vec::new());
    for parameter in parameters {
        args.set(parameter.index, container.resolve_parameter(parameter)?)?;
    }

    for (index, arg) in options.args {
        let value = match arg {
            InvokeArg::Value(value) => value,
            InvokeArg::Token(token) => container.resolve(&token)?,
        };
        args.set(index, Some(value))?;
    }

    debug!("调用 {}::{} ({} 个参数)", metadata.class_name, method, args.len());
    call(instance, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::use_static_value;
    use std::sync::Arc;

    struct Greeter;

    impl Greeter {
        fn greet(&self, name: &str, punctuation: &str) -> String {
            format!("hello {}{}", name, punctuation)
        }
    }

    #[test]
    fn test_invoke_resolves_and_overrides() {
        let registry = ClassMetadataRegistry::new();
        registry
            .describe::<Greeter>()
            .method_parameter("greet", 0, "name", false)
            .unwrap();

        let container = Container::new();
        container.bind("name", use_static_value(String::from("lorn"))).unwrap();

        let options = InvokeOptions::new()
            .in_container(&container)
            .with_registry(registry)
            .value(1, Arc::new(String::from("!")));

        let greeting = invoke(&Greeter, "greet", options, |greeter, args| {
            let name = args.required::<String>(0)?;
            let punctuation = args.required::<String>(1)?;
            Ok(greeter.greet(&name, &punctuation))
        })
        .unwrap();

        assert_eq!(greeting, "hello lorn!");
    }

    #[test]
    fn test_undeclared_method_is_rejected() {
        let options = InvokeOptions::new().with_registry(ClassMetadataRegistry::new());
        let result = invoke(&Greeter, "wave", options, |_, _| Ok(()));

        assert!(matches!(result, Err(DependencyError::MethodNotFound { .. })));
    }
}
