//! # 依赖注入具体实现
//!
//! 提供层级容器、provider 实现、内置注解、方法调用辅助和配置加载
//!
//! ## 示例
//!
//! ```
//! use di_impl::{use_static_value, Container};
//!
//! let container = Container::new();
//! container.bind("port", use_static_value(8080_u16)).unwrap();
//!
//! let child = container.create_child();
//! assert_eq!(*child.resolve_as::<u16>("port").unwrap(), 8080);
//! ```

pub mod annotations;
pub mod container;
pub mod invoke;
pub mod providers;
pub mod settings;

pub use annotations::{Usable, Use};
pub use container::Container;
pub use invoke::{invoke, InvokeArg, InvokeOptions};
pub use providers::{
    use_class, use_class_with, use_dynamic_value, use_static_value, ClassProvider, DynamicValueProvider,
    StaticValueProvider,
};
pub use settings::{load_settings, ContainerSettings, ContainerSettingsLoader};
