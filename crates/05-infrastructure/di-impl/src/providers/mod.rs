//! Provider 实现

pub mod class;
pub mod value;

pub use class::{use_class, use_class_with, ClassProvider};
pub use value::{use_dynamic_value, use_static_value, DynamicValueProvider, StaticValueProvider};
