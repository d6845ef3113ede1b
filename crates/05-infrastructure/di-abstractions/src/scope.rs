//! 作用域标记与作用域存储接口

use crate::definition::DefinitionKey;
use crate::instance::Instance;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 作用域种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// 每次解析创建新实例，归属于当前创建上下文
    Dependent,
    /// 进程内唯一实例
    Singleton,
    /// 由外部存储管理的实例，通过客户端代理访问
    Normal,
}

impl ScopeKind {
    /// 是否通过代理交付
    pub fn is_proxied(self) -> bool {
        matches!(self, Self::Normal)
    }
}

/// 作用域标记
///
/// 按名称比较；种类决定容器如何管理实例。
#[derive(Debug, Clone)]
pub struct ScopeMarker {
    name: Arc<str>,
    kind: ScopeKind,
}

impl ScopeMarker {
    /// 自定义作用域标记
    pub fn new(name: impl Into<Arc<str>>, kind: ScopeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// 内置 `Dependent` 作用域
    pub fn dependent() -> Self {
        Self::new("Dependent", ScopeKind::Dependent)
    }

    /// 内置 `Singleton` 作用域
    pub fn singleton() -> Self {
        Self::new("Singleton", ScopeKind::Singleton)
    }

    /// 内置 `Application` 作用域，行为同单例
    pub fn application() -> Self {
        Self::new("Application", ScopeKind::Singleton)
    }

    /// 自定义的普通作用域（例如请求、会话）
    pub fn normal(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, ScopeKind::Normal)
    }

    /// 作用域名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 作用域类别
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// 是否为依赖作用域
    pub fn is_dependent(&self) -> bool {
        self.kind == ScopeKind::Dependent
    }

    /// 是否为普通作用域
    pub fn is_normal(&self) -> bool {
        self.kind == ScopeKind::Normal
    }
}

impl Default for ScopeMarker {
    fn default() -> Self {
        Self::dependent()
    }
}

impl PartialEq for ScopeMarker {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ScopeMarker {}

impl Hash for ScopeMarker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ScopeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}

/// 作用域存储中的一个键（例如一次请求）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(Arc<str>);

impl StoreKey {
    /// 随机生成的键
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StoreKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for StoreKey {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for StoreKey {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 普通作用域的外部存储
///
/// 存储自行保证线程安全。`current_key` 返回 `None` 表示作用域未激活。
pub trait ScopeStore: Send + Sync {
    /// 当前线程/请求对应的键
    fn current_key(&self) -> Option<StoreKey>;

    /// 查找已存储的实例
    fn get(&self, definition: &DefinitionKey, key: &StoreKey) -> Option<Instance>;

    /// 存储实例
    fn put(&self, definition: &DefinitionKey, key: &StoreKey, instance: Instance);

    /// 作用域结束时移除该键下的全部实例
    fn remove(&self, _key: &StoreKey) -> Vec<(DefinitionKey, Instance)> {
        Vec::new()
    }
}
