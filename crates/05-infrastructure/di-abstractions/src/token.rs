//! 注册令牌
//!
//! 令牌是容器中注册槽位的规范标识。所有来源（字符串、符号、类型引用、
//! 已有令牌）都先经过 [`Token::canonicalize`] 规范化，之后只按规范键比较。

use infrastructure_common::{DependencyError, DependencyResult};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// 不透明的唯一符号，同描述的两个符号互不相等
#[derive(Clone)]
pub struct Symbol {
    id: Uuid,
    description: Arc<str>,
}

impl Symbol {
    /// 创建新的唯一符号
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: Arc::from(description.into()),
        }
    }

    /// 符号 ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 符号描述
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

/// 令牌的规范键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKey {
    /// 字符串键（类型引用规范化后也落在这里）
    Name(Arc<str>),
    /// 符号键
    Symbol(Symbol),
}

/// 类型引用
///
/// 相当于"类/构造器引用"：键取类型声明的名称，去掉模块路径和泛型参数。
/// 闭包等匿名类型无法作为令牌来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef {
    type_name: &'static str,
}

impl TypeRef {
    /// 获取类型的引用
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 从值推导类型引用
    pub fn of_val<T: ?Sized + 'static>(_value: &T) -> Self {
        Self::of::<T>()
    }

    /// 完整类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 声明名称，匿名类型返回 `None`
    ///
    /// 元组、数组、切片、引用、指针、函数指针和 trait 对象都没有声明名称。
    pub fn declared_name(&self) -> Option<&'static str> {
        if UNNAMED_PREFIXES.iter().any(|prefix| self.type_name.starts_with(prefix)) {
            return None;
        }

        let path = self
            .type_name
            .split('<')
            .next()
            .unwrap_or(self.type_name);
        if path.contains(|c: char| UNNAMED_CHARS.contains(&c) || c.is_whitespace()) {
            return None;
        }

        let name = path.rsplit("::").next().unwrap_or(path);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// 没有声明名称的类型名前缀
const UNNAMED_PREFIXES: &[&str] = &["(", "[", "&", "*", "fn(", "fn ", "dyn ", "impl ", "unsafe ", "extern "];

/// 声明路径中不会出现的字符
const UNNAMED_CHARS: &[char] = &['(', ')', '[', ']', ';', ',', '&', '*', '{', '}'];

/// 令牌来源
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// 已规范化的令牌
    Token(Token),
    /// 字符串
    Name(String),
    /// 符号
    Symbol(Symbol),
    /// 类型引用
    Type(TypeRef),
    /// 空值
    Absent,
    /// 不支持的值，携带其类型名
    Unsupported(&'static str),
}

impl TokenSource {
    /// 从任意值推导令牌来源
    ///
    /// 仅字符串、符号、令牌和类型引用可以作为来源，其余值为 `Unsupported`。
    pub fn from_value<V: Any>(value: &V) -> Self {
        let value = value as &dyn Any;

        if let Some(token) = value.downcast_ref::<Token>() {
            Self::Token(token.clone())
        } else if let Some(name) = value.downcast_ref::<String>() {
            Self::Name(name.clone())
        } else if let Some(name) = value.downcast_ref::<&'static str>() {
            Self::Name((*name).to_string())
        } else if let Some(symbol) = value.downcast_ref::<Symbol>() {
            Self::Symbol(symbol.clone())
        } else if let Some(type_ref) = value.downcast_ref::<TypeRef>() {
            Self::Type(*type_ref)
        } else {
            Self::Unsupported(std::any::type_name::<V>())
        }
    }
}

impl From<Token> for TokenSource {
    fn from(token: Token) -> Self {
        Self::Token(token)
    }
}

impl From<&Token> for TokenSource {
    fn from(token: &Token) -> Self {
        Self::Token(token.clone())
    }
}

impl From<&str> for TokenSource {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TokenSource {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for TokenSource {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<Symbol> for TokenSource {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

impl From<&Symbol> for TokenSource {
    fn from(symbol: &Symbol) -> Self {
        Self::Symbol(symbol.clone())
    }
}

impl From<TypeRef> for TokenSource {
    fn from(type_ref: TypeRef) -> Self {
        Self::Type(type_ref)
    }
}

impl<S: Into<TokenSource>> From<Option<S>> for TokenSource {
    fn from(source: Option<S>) -> Self {
        source.map_or(Self::Absent, Into::into)
    }
}

/// 注册令牌
///
/// 不可变值对象，相等性只取决于规范键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    key: TokenKey,
}

impl Token {
    /// 以字符串键创建令牌
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            key: TokenKey::Name(Arc::from(name.into())),
        }
    }

    /// 以新符号创建令牌
    pub fn symbol(description: impl Into<String>) -> Self {
        Self {
            key: TokenKey::Symbol(Symbol::new(description)),
        }
    }

    /// 以类型引用创建令牌
    pub fn of<T: ?Sized + 'static>() -> DependencyResult<Self> {
        Self::canonicalize(TypeRef::of::<T>())
    }

    /// 规范化令牌来源
    pub fn canonicalize(source: impl Into<TokenSource>) -> DependencyResult<Self> {
        match source.into() {
            TokenSource::Token(token) => Ok(token),
            TokenSource::Name(name) => Ok(Self::name(name)),
            TokenSource::Symbol(symbol) => Ok(Self {
                key: TokenKey::Symbol(symbol),
            }),
            TokenSource::Type(type_ref) => type_ref
                .declared_name()
                .map(Self::name)
                .ok_or_else(|| DependencyError::invalid_token(format!("匿名类型 {}", type_ref.type_name()))),
            TokenSource::Absent => Err(DependencyError::invalid_token("空值")),
            TokenSource::Unsupported(type_name) => {
                Err(DependencyError::invalid_token(format!("不支持的类型 {}", type_name)))
            }
        }
    }

    /// 规范键
    pub fn key(&self) -> &TokenKey {
        &self.key
    }

    /// 字符串键，符号令牌返回 `None`
    pub fn as_name(&self) -> Option<&str> {
        match &self.key {
            TokenKey::Name(name) => Some(name),
            TokenKey::Symbol(_) => None,
        }
    }

    /// 与另一个来源比较规范键，来源无效时返回 `false`
    pub fn matches(&self, other: impl Into<TokenSource>) -> bool {
        Self::canonicalize(other).map_or(false, |other| other == *self)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            TokenKey::Name(name) => f.write_str(name),
            TokenKey::Symbol(symbol) => write!(f, "Symbol({})", symbol.description()),
        }
    }
}
