//! 容器扩展
//!
//! 扩展是一组按插入顺序排列的生命周期回调，可以同时挂载到多个容器。

use crate::provider::{Instance, SharedProvider};
use crate::token::Token;
use infrastructure_common::DependencyResult;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

/// 回调种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeRegister,
    AfterRegister,
    BeforeResolve,
    AfterResolve,
    BeforeDispose,
    AfterDispose,
}

/// 容器在生命周期各阶段发出的事件
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    BeforeRegister {
        token: &'a Token,
        provider: &'a SharedProvider,
    },
    AfterRegister {
        token: &'a Token,
        provider: &'a SharedProvider,
    },
    BeforeResolve {
        token: &'a Token,
    },
    AfterResolve {
        token: &'a Token,
        value: &'a Instance,
    },
    BeforeDispose {
        token: &'a Token,
        provider: &'a SharedProvider,
    },
    AfterDispose {
        token: &'a Token,
        provider: &'a SharedProvider,
    },
}

impl HookEvent<'_> {
    /// 事件种类
    pub fn kind(&self) -> HookKind {
        match self {
            Self::BeforeRegister { .. } => HookKind::BeforeRegister,
            Self::AfterRegister { .. } => HookKind::AfterRegister,
            Self::BeforeResolve { .. } => HookKind::BeforeResolve,
            Self::AfterResolve { .. } => HookKind::AfterResolve,
            Self::BeforeDispose { .. } => HookKind::BeforeDispose,
            Self::AfterDispose { .. } => HookKind::AfterDispose,
        }
    }

    /// 事件对应的令牌
    pub fn token(&self) -> &Token {
        match self {
            Self::BeforeRegister { token, .. }
            | Self::AfterRegister { token, .. }
            | Self::BeforeResolve { token }
            | Self::AfterResolve { token, .. }
            | Self::BeforeDispose { token, .. }
            | Self::AfterDispose { token, .. } => token,
        }
    }
}

type HookCallback = Arc<dyn Fn(&HookEvent<'_>) -> DependencyResult<()> + Send + Sync>;

#[derive(Clone)]
struct HookEntry {
    id: Uuid,
    kind: HookKind,
    callback: HookCallback,
}

struct ExtensionInner {
    id: Uuid,
    entries: RwLock<Vec<HookEntry>>,
}

/// 容器扩展
///
/// 克隆得到的是同一个扩展的句柄。
#[derive(Clone)]
pub struct Extension {
    inner: Arc<ExtensionInner>,
}

impl Default for Extension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension {
    /// 创建空扩展
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ExtensionInner {
                id: Uuid::new_v4(),
                entries: RwLock::new(Vec::new()),
            }),
        }
    }

    /// 扩展 ID
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 已添加的回调数量
    pub fn hook_count(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// 注册前回调
    pub fn before_register<F>(&self, callback: F) -> HookRemover
    where
        F: Fn(&Token, &SharedProvider) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.add_hook(HookKind::BeforeRegister, move |event| match event {
            HookEvent::BeforeRegister { token, provider } => callback(token, provider),
            _ => Ok(()),
        })
    }

    /// 注册后回调
    pub fn after_register<F>(&self, callback: F) -> HookRemover
    where
        F: Fn(&Token, &SharedProvider) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.add_hook(HookKind::AfterRegister, move |event| match event {
            HookEvent::AfterRegister { token, provider } => callback(token, provider),
            _ => Ok(()),
        })
    }

    /// 解析前回调
    pub fn before_resolve<F>(&self, callback: F) -> HookRemover
    where
        F: Fn(&Token) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.add_hook(HookKind::BeforeResolve, move |event| match event {
            HookEvent::BeforeResolve { token } => callback(token),
            _ => Ok(()),
        })
    }

    /// 解析后回调
    pub fn after_resolve<F>(&self, callback: F) -> HookRemover
    where
        F: Fn(&Token, &Instance) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.add_hook(HookKind::AfterResolve, move |event| match event {
            HookEvent::AfterResolve { token, value } => callback(token, value),
            _ => Ok(()),
        })
    }

    /// 释放前回调
    pub fn before_dispose<F>(&self, callback: F) -> HookRemover
    where
        F: Fn(&Token, &SharedProvider) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.add_hook(HookKind::BeforeDispose, move |event| match event {
            HookEvent::BeforeDispose { token, provider } => callback(token, provider),
            _ => Ok(()),
        })
    }

    /// 释放后回调
    pub fn after_dispose<F>(&self, callback: F) -> HookRemover
    where
        F: Fn(&Token, &SharedProvider) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.add_hook(HookKind::AfterDispose, move |event| match event {
            HookEvent::AfterDispose { token, provider } => callback(token, provider),
            _ => Ok(()),
        })
    }

    /// 按事件种类调用回调
    ///
    /// 回调按添加顺序同步执行，第一个错误直接返回。
    pub fn emit(&self, event: &HookEvent<'_>) -> DependencyResult<()> {
        let kind = event.kind();
        let callbacks: Vec<HookCallback> = self
            .inner
            .entries
            .read()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.callback.clone())
            .collect();

        for callback in callbacks {
            callback(event)?;
        }
        Ok(())
    }

    fn add_hook<F>(&self, kind: HookKind, callback: F) -> HookRemover
    where
        F: Fn(&HookEvent<'_>) -> DependencyResult<()> + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.inner.entries.write().push(HookEntry {
            id,
            kind,
            callback: Arc::new(callback),
        });
        debug!("扩展 {} 添加回调 {:?}", self.inner.id, kind);

        HookRemover {
            extension: Arc::downgrade(&self.inner),
            id,
        }
    }
}

impl PartialEq for Extension {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Extension {}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("id", &self.inner.id)
            .field("hooks", &self.hook_count())
            .finish()
    }
}

/// 移除单个回调的句柄
#[derive(Debug, Clone)]
pub struct HookRemover {
    extension: Weak<ExtensionInner>,
    id: Uuid,
}

impl HookRemover {
    /// 移除回调，返回是否确实移除了
    pub fn remove(&self) -> bool {
        let Some(extension) = self.extension.upgrade() else {
            return false;
        };

        let mut entries = extension.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != self.id);
        before != entries.len()
    }
}

impl fmt::Debug for ExtensionInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionInner").field("id", &self.id).finish()
    }
}

/// 扩展管理器
///
/// 维护挂载到某个容器上的扩展列表。
#[derive(Debug, Clone, Default)]
pub struct ExtensionManager {
    extensions: Arc<RwLock<Vec<Extension>>>,
}

impl ExtensionManager {
    /// 创建空的管理器
    pub fn new() -> Self {
        Self::default()
    }

    /// 挂载扩展，返回可撤销该操作的开关
    pub fn add_extension(&self, extension: Extension) -> ExtensionToggle {
        self.extensions.write().push(extension.clone());
        debug!("挂载扩展 {}", extension.id());

        ExtensionToggle {
            manager: Arc::downgrade(&self.extensions),
            extension,
            action: ToggleAction::Remove,
        }
    }

    /// 卸载扩展，返回可撤销该操作的开关
    ///
    /// 未挂载的扩展不做任何处理。
    pub fn remove_extension(&self, extension: &Extension) -> ExtensionToggle {
        let removed = {
            let mut extensions = self.extensions.write();
            match extensions.iter().position(|e| e == extension) {
                Some(index) => {
                    extensions.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed {
            debug!("卸载扩展 {}", extension.id());
        }

        ExtensionToggle {
            manager: Arc::downgrade(&self.extensions),
            extension: extension.clone(),
            action: if removed {
                ToggleAction::Add
            } else {
                ToggleAction::Nothing
            },
        }
    }

    /// 已挂载的扩展数量
    pub fn len(&self) -> usize {
        self.extensions.read().len()
    }

    /// 是否没有挂载扩展
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否挂载了指定扩展
    pub fn contains(&self, extension: &Extension) -> bool {
        self.extensions.read().contains(extension)
    }

    /// 依次向每个扩展发出事件
    pub fn emit(&self, event: &HookEvent<'_>) -> DependencyResult<()> {
        let extensions = self.extensions.read().clone();

        for extension in &extensions {
            extension.emit(event)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToggleAction {
    Add,
    Remove,
    Nothing,
}

/// 挂载 / 卸载操作的逆操作
#[derive(Debug, Clone)]
pub struct ExtensionToggle {
    manager: Weak<RwLock<Vec<Extension>>>,
    extension: Extension,
    action: ToggleAction,
}

impl ExtensionToggle {
    /// 执行逆操作，返回下一次的逆操作
    ///
    /// 管理器已不存在时不做任何处理。
    pub fn apply(self) -> ExtensionToggle {
        let Some(extensions) = self.manager.upgrade() else {
            return self;
        };
        let manager = ExtensionManager { extensions };

        match self.action {
            ToggleAction::Add => manager.add_extension(self.extension),
            ToggleAction::Remove => manager.remove_extension(&self.extension),
            ToggleAction::Nothing => self,
        }
    }

    /// 该开关是否会改变管理器状态
    pub fn is_noop(&self) -> bool {
        self.action == ToggleAction::Nothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_hooks_run_in_insertion_order_and_can_be_removed() {
        let extension = Extension::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let calls = calls.clone();
            extension.before_resolve(move |token| {
                calls.lock().push(format!("first:{}", token));
                Ok(())
            })
        };
        {
            let calls = calls.clone();
            extension.before_resolve(move |token| {
                calls.lock().push(format!("second:{}", token));
                Ok(())
            });
        }

        let token = Token::name("Database");
        extension.emit(&HookEvent::BeforeResolve { token: &token }).unwrap();
        assert_eq!(*calls.lock(), vec!["first:Database", "second:Database"]);

        assert!(first.remove());
        assert!(!first.remove());
        calls.lock().clear();

        extension.emit(&HookEvent::BeforeResolve { token: &token }).unwrap();
        assert_eq!(*calls.lock(), vec!["second:Database"]);
    }

    #[test]
    fn test_other_kinds_are_not_called() {
        let extension = Extension::new();
        let called = Arc::new(Mutex::new(false));
        {
            let called = called.clone();
            extension.before_resolve(move |_| {
                *called.lock() = true;
                Ok(())
            });
        }

        let token = Token::name("Database");
        let value: Instance = Arc::new(1_u32);
        extension
            .emit(&HookEvent::AfterResolve {
                token: &token,
                value: &value,
            })
            .unwrap();

        assert!(!*called.lock());
    }

    #[test]
    fn test_toggles_are_inverse_operations() {
        let manager = ExtensionManager::new();
        let extension = Extension::new();

        let undo_add = manager.add_extension(extension.clone());
        assert!(manager.contains(&extension));

        let redo_add = undo_add.apply();
        assert!(!manager.contains(&extension));

        let undo_again = redo_add.apply();
        assert!(manager.contains(&extension));
        assert_eq!(manager.len(), 1);

        undo_again.apply();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_removing_absent_extension_is_noop() {
        let manager = ExtensionManager::new();
        let attached = Extension::new();
        manager.add_extension(attached.clone());

        let toggle = manager.remove_extension(&Extension::new());

        assert!(toggle.is_noop());
        assert!(manager.contains(&attached));
        toggle.apply();
        assert_eq!(manager.len(), 1);
    }
}
