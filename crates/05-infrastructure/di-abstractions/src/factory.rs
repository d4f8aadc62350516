//! 可注入类型
//!
//! 提供类 provider 构造实例所需的 trait 和参数列表

use crate::provider::Instance;
use infrastructure_common::{DependencyError, DependencyResult};
use std::any::Any;
use std::sync::Arc;

/// 可注入类型 trait
///
/// 容器按类元数据中的参数描述符准备 [`InjectArgs`]，再调用 `construct` 创建实例。
pub trait Injectable: Send + Sync + Sized + 'static {
    /// 创建实例
    fn construct(args: InjectArgs) -> DependencyResult<Self>;

    /// 类名，用于日志和错误信息
    fn class_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 参数位置的上限
pub const MAX_PARAMETER_INDEX: usize = 255;

/// 检查参数位置是否在上限之内
pub fn check_parameter_index(index: usize) -> DependencyResult<()> {
    if index > MAX_PARAMETER_INDEX {
        return Err(DependencyError::ParameterIndexOutOfRange {
            index,
            max: MAX_PARAMETER_INDEX,
        });
    }
    Ok(())
}

/// 按位置排列的已解析参数
///
/// 未被描述符覆盖的位置以及缺失的可选依赖为 `None`。
#[derive(Debug, Clone, Default)]
pub struct InjectArgs {
    slots: Vec<Option<Instance>>,
}

impl InjectArgs {
    /// 以给定位置创建参数列表
    pub fn new(slots: Vec<Option<Instance>>) -> Self {
        Self { slots }
    }

    /// 创建长度为 `len` 的空参数列表
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// 设置某个位置的值，必要时扩展列表
    ///
    /// 位置超过 [`MAX_PARAMETER_INDEX`] 时返回错误。
    pub fn set(&mut self, index: usize, value: Option<Instance>) -> DependencyResult<()> {
        check_parameter_index(index)?;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = value;
        Ok(())
    }

    /// 参数个数
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 某个位置的原始值
    pub fn get(&self, index: usize) -> Option<&Instance> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// 必需参数，缺失或类型不符时返回错误
    pub fn required<D: Any + Send + Sync>(&self, index: usize) -> DependencyResult<Arc<D>> {
        let value = self
            .get(index)
            .ok_or_else(|| DependencyError::lifecycle(format!("缺少第 {} 个参数", index)))?;
        downcast(value, index)
    }

    /// 可选参数，缺失时返回 `None`，类型不符时返回错误
    pub fn optional<D: Any + Send + Sync>(&self, index: usize) -> DependencyResult<Option<Arc<D>>> {
        self.get(index).map(|value| downcast(value, index)).transpose()
    }

    /// 取出全部位置
    pub fn into_inner(self) -> Vec<Option<Instance>> {
        self.slots
    }
}

fn downcast<D: Any + Send + Sync>(value: &Instance, index: usize) -> DependencyResult<Arc<D>> {
    value
        .clone()
        .downcast::<D>()
        .map_err(|_| DependencyError::type_mismatch::<D>(format!("参数 #{}", index)))
}
