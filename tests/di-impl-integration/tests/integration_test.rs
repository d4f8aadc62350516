//! di-impl 跨 crate 集成测试
//!
//! 覆盖注解、元数据继承、方法调用、进程级容器、配置加载和多线程解析。

use di_abstractions::{ClassMetadataRegistry, InjectArgs, Injectable, MemberKind, Token};
use di_impl::{
    invoke, use_class, use_static_value, ClassProvider, Container, ContainerSettingsLoader, InvokeOptions, Usable,
    Use,
};
use infrastructure_common::{DependencyError, DependencyResult, Lifetime};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// 仓储：通过构造参数注入连接串
struct Repository {
    url: Arc<String>,
}

impl Injectable for Repository {
    fn construct(args: InjectArgs) -> DependencyResult<Self> {
        Ok(Self { url: args.required(0)? })
    }
}

/// 服务：通过构造参数注入仓储，通过属性注入可选的审计器
struct OrderService {
    repository: Arc<Repository>,
    auditor: Mutex<Option<Arc<Value>>>,
}

impl Injectable for OrderService {
    fn construct(args: InjectArgs) -> DependencyResult<Self> {
        Ok(Self {
            repository: args.required(0)?,
            auditor: Mutex::new(None),
        })
    }
}

impl OrderService {
    fn place(&self, order_id: &str, channel: &str) -> String {
        format!("{}:{}@{}", order_id, channel, self.repository.url)
    }
}

#[test]
fn test_annotations_wire_a_class_graph() -> anyhow::Result<()> {
    let registry = ClassMetadataRegistry::new();
    let container = Container::new();
    container.bind("database_url", use_static_value(String::from("postgres://orders")))?;

    let repository = registry.describe::<Repository>();
    repository.annotate(MemberKind::constructor_parameter(0), &Use::<Repository>::new("database_url")?)?;
    repository.annotate(MemberKind::Class, &Usable::<Repository>::new().in_container(&container))?;

    let service = registry.describe::<OrderService>();
    service.annotate(
        MemberKind::constructor_parameter(0),
        &Use::<OrderService>::new(Token::of::<Repository>()?)?,
    )?;
    service.annotate(
        MemberKind::property("auditor"),
        &Use::<OrderService>::new("auditor")?
            .optional()
            .with_setter(|service: &OrderService, value| {
                let value = value
                    .downcast::<Value>()
                    .map_err(|_| DependencyError::type_mismatch::<Value>("auditor"))?;
                *service.auditor.lock() = Some(value);
                Ok(())
            }),
    )?;
    service.annotate(
        MemberKind::Class,
        &Usable::<OrderService>::new()
            .in_container(&container)
            .with_lifetime(Lifetime::Transient),
    )?;

    let first = container.resolve_as::<OrderService>("OrderService")?;
    assert_eq!(first.repository.url.as_str(), "postgres://orders");
    assert!(first.auditor.lock().is_none());

    container.bind("auditor", use_static_value(json!({ "sink": "stdout" })))?;
    let second = container.resolve_as::<OrderService>("OrderService")?;
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.repository, &second.repository));
    assert_eq!(
        second.auditor.lock().as_ref().map(|value| value["sink"].clone()),
        Some(json!("stdout"))
    );
    Ok(())
}

#[test]
fn test_usable_with_explicit_token_and_invalid_target() -> anyhow::Result<()> {
    let registry = ClassMetadataRegistry::new();
    let container = Container::new();
    container.bind("database_url", use_static_value(String::from("sqlite::memory:")))?;

    let builder = registry.describe::<Repository>();
    builder.parameter(0, "database_url")?;
    builder.annotate(
        MemberKind::Class,
        &Usable::<Repository>::new().in_container(&container).with_token("repo")?,
    )?;

    assert!(container.is_registered("repo"));
    assert!(!container.is_registered("Repository"));
    assert_eq!(container.resolve_as::<Repository>("repo")?.url.as_str(), "sqlite::memory:");

    let error = builder
        .annotate(MemberKind::property("url"), &Usable::<Repository>::new())
        .unwrap_err();
    assert!(error.to_string().contains("Usable"));
    Ok(())
}

#[test]
fn test_global_container_and_registry() -> anyhow::Result<()> {
    struct GlobalClock;

    impl Injectable for GlobalClock {
        fn construct(_args: InjectArgs) -> DependencyResult<Self> {
            Ok(Self)
        }
    }

    ClassMetadataRegistry::global()
        .describe::<GlobalClock>()
        .annotate(MemberKind::Class, &Usable::<GlobalClock>::new())?;

    let global = Container::global();
    let first = global.resolve("GlobalClock")?;
    let second = Container::global().resolve("GlobalClock")?;
    assert!(Arc::ptr_eq(&first, &second));

    global.dispose("GlobalClock")?;
    assert!(!global.is_registered("GlobalClock"));
    Ok(())
}

#[test]
fn test_metadata_inheritance_through_upcast() -> anyhow::Result<()> {
    struct BaseHandler {
        name: &'static str,
    }

    struct AuditedHandler {
        base: BaseHandler,
        seen: AtomicUsize,
    }

    impl Injectable for AuditedHandler {
        fn construct(args: InjectArgs) -> DependencyResult<Self> {
            let prefix = args.required::<String>(0)?;
            Ok(Self {
                base: BaseHandler {
                    name: if prefix.as_str() == "audit" { "audited" } else { "plain" },
                },
                seen: AtomicUsize::new(0),
            })
        }
    }

    let names = Arc::new(Mutex::new(Vec::new()));
    let registry = ClassMetadataRegistry::new();
    {
        let names = names.clone();
        registry
            .describe::<BaseHandler>()
            .parameter(0, "prefix")?
            .on_resolve("record_name", move |_, base: &BaseHandler| {
                names.lock().push(base.name);
                Ok(())
            });
    }

    let child = registry.describe::<AuditedHandler>();
    child.inherit::<BaseHandler>(|handler| &handler.base);
    child.on_resolve("count", |_, handler: &AuditedHandler| {
        handler.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let container = Container::new();
    container.bind("prefix", use_static_value(String::from("audit")))?;
    container.add(Arc::new(ClassProvider::<AuditedHandler>::singleton().with_registry(registry)))?;

    let handler = container.resolve_as::<AuditedHandler>("AuditedHandler")?;
    assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
    assert_eq!(*names.lock(), vec!["audited"]);
    Ok(())
}

#[test]
fn test_invoke_with_method_parameters() -> anyhow::Result<()> {
    let registry = ClassMetadataRegistry::new();
    let container = Container::new();
    container.bind("database_url", use_static_value(String::from("postgres://orders")))?;
    container.bind("default_channel", use_static_value(String::from("web")))?;

    let builder = registry.describe::<Repository>();
    builder.parameter(0, "database_url")?;
    let service = registry.describe::<OrderService>();
    service.parameter(0, Token::of::<Repository>()?)?;
    service.annotate(
        MemberKind::method_parameter("place", 1),
        &Use::<OrderService>::new("default_channel")?,
    )?;
    container.add(Arc::new(ClassProvider::<Repository>::singleton().with_registry(registry.clone())))?;
    container.add(Arc::new(ClassProvider::<OrderService>::singleton().with_registry(registry.clone())))?;

    let instance = container.resolve_as::<OrderService>("OrderService")?;
    let options = InvokeOptions::new()
        .in_container(&container)
        .with_registry(registry.clone())
        .value(0, Arc::new(String::from("order-7")));

    let receipt = invoke(instance.as_ref(), "place", options, |service, args| {
        let order_id = args.required::<String>(0)?;
        let channel = args.required::<String>(1)?;
        Ok(service.place(&order_id, &channel))
    })?;
    assert_eq!(receipt, "order-7:web@postgres://orders");

    let options = InvokeOptions::new()
        .in_container(&container)
        .with_registry(registry.clone())
        .token(1, "database_url")?
        .value(0, Arc::new(String::from("order-8")));
    let receipt = invoke(instance.as_ref(), "place", options, |service, args| {
        Ok(service.place(&args.required::<String>(0)?, &args.required::<String>(1)?))
    })?;
    assert_eq!(receipt, "order-8:postgres://orders@postgres://orders");

    let missing = invoke(
        instance.as_ref(),
        "cancel",
        InvokeOptions::new().in_container(&container).with_registry(registry),
        |_, _| Ok(()),
    );
    assert!(matches!(missing, Err(DependencyError::MethodNotFound { .. })));
    Ok(())
}

#[test]
fn test_settings_drive_container_behaviour() -> anyhow::Result<()> {
    struct Loop;

    impl Injectable for Loop {
        fn construct(_args: InjectArgs) -> DependencyResult<Self> {
            Ok(Self)
        }
    }

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        "[container]\nenable_circular_dependency_detection = false\nmax_resolution_depth = 4\noptional_policy = \"not_registered_only\""
    )?;

    let settings = ContainerSettingsLoader::new()
        .with_file(file.path())
        .with_env_prefix("LORN_DI_INTEGRATION")
        .load()?;
    let container = settings.build_container()?;

    let registry = ClassMetadataRegistry::new();
    registry.describe::<Loop>().parameter(0, "Loop")?;
    container.add(Arc::new(ClassProvider::<Loop>::singleton().with_registry(registry)))?;

    assert!(matches!(
        container.resolve("Loop"),
        Err(DependencyError::ResolutionDepthExceeded { depth: 4, .. })
    ));
    Ok(())
}

#[test]
fn test_concurrent_singleton_resolution() -> anyhow::Result<()> {
    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    struct Shared;

    impl Injectable for Shared {
        fn construct(_args: InjectArgs) -> DependencyResult<Self> {
            CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            Ok(Self)
        }
    }

    let container = Container::new();
    container.bind(
        "Shared",
        Arc::new(ClassProvider::<Shared>::singleton().with_registry(ClassMetadataRegistry::new())),
    )?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            thread::spawn(move || container.resolve("Shared").map(|value| Arc::as_ptr(&value) as *const () as usize))
        })
        .collect();

    let mut addresses = Vec::new();
    for handle in handles {
        addresses.push(handle.join().map_err(|_| anyhow::anyhow!("thread panicked"))??);
    }

    addresses.dedup();
    assert_eq!(addresses.len(), 1);
    assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_use_class_helper_registers_singletons() -> anyhow::Result<()> {
    struct Telemetry;

    impl Injectable for Telemetry {
        fn construct(_args: InjectArgs) -> DependencyResult<Self> {
            Ok(Self)
        }
    }

    let root = Container::new();
    let child = root.create_child();
    root.add(use_class::<Telemetry>())?;

    let from_child = child.resolve("Telemetry")?;
    let from_root = root.resolve("Telemetry")?;
    assert!(Arc::ptr_eq(&from_child, &from_root));
    Ok(())
}
