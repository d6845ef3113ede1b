//! 组件引用与客户端代理

use crate::definition::ComponentDefinition;
use crate::instance::Instance;
use crate::resolver::{type_mismatch, ReferenceResolver};
use infrastructure_common::{DependencyError, DependencyResult};
use std::fmt;
use std::sync::{Arc, Weak};

/// 客户端代理
///
/// 绑定到一个普通作用域定义，每次访问都重新查找当前活动的实例。
/// 容器释放后访问返回 [`DependencyError::ContainerClosed`]。
#[derive(Clone)]
pub struct ClientProxy {
    definition: Arc<ComponentDefinition>,
    resolver: Weak<dyn ReferenceResolver>,
}

impl ClientProxy {
    /// 绑定到定义与容器弱引用的代理
    pub fn new(
        definition: Arc<ComponentDefinition>,
        resolver: Weak<dyn ReferenceResolver>,
    ) -> Self {
        Self {
            definition,
            resolver,
        }
    }

    /// 被代理的组件定义
    pub fn definition(&self) -> &Arc<ComponentDefinition> {
        &self.definition
    }

    /// 当前活动的实例
    pub fn current(&self) -> DependencyResult<Instance> {
        let resolver = self
            .resolver
            .upgrade()
            .ok_or(DependencyError::ContainerClosed)?;
        resolver.instance_for_proxy(&self.definition)
    }

    /// 每次调用都从当前活动的上下文取实例
    pub fn get<U: ?Sized + 'static>(&self) -> DependencyResult<Arc<U>> {
        self.current()?
            .get::<U>()
            .ok_or_else(|| type_mismatch::<U>(&self.definition))
    }
}

impl fmt::Debug for ClientProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProxy")
            .field("definition", &self.definition.key())
            .finish()
    }
}

/// 引用目标
#[derive(Debug, Clone)]
pub enum ReferenceTarget {
    /// 直接持有实例
    Direct(Instance),
    /// 通过代理访问
    Proxy(ClientProxy),
}

/// 解析结果：定义加上实例或代理
#[derive(Debug, Clone)]
pub struct Reference {
    definition: Arc<ComponentDefinition>,
    target: ReferenceTarget,
}

impl Reference {
    /// 直接持有实例的引用
    pub fn direct(definition: Arc<ComponentDefinition>, instance: Instance) -> Self {
        Self {
            definition,
            target: ReferenceTarget::Direct(instance),
        }
    }

    /// 代理引用
    pub fn proxy(proxy: ClientProxy) -> Self {
        Self {
            definition: proxy.definition.clone(),
            target: ReferenceTarget::Proxy(proxy),
        }
    }

    /// 组件定义
    pub fn definition(&self) -> &Arc<ComponentDefinition> {
        &self.definition
    }

    /// 引用目标
    pub fn target(&self) -> &ReferenceTarget {
        &self.target
    }

    /// 是否为代理
    pub fn is_proxy(&self) -> bool {
        matches!(self.target, ReferenceTarget::Proxy(_))
    }

    /// 实例：直接引用返回持有的实例，代理返回当前活动的实例
    pub fn instance(&self) -> DependencyResult<Instance> {
        match &self.target {
            ReferenceTarget::Direct(instance) => Ok(instance.clone()),
            ReferenceTarget::Proxy(proxy) => proxy.current(),
        }
    }

    /// 取出为 `U` 的视图
    pub fn get<U: ?Sized + 'static>(&self) -> DependencyResult<Arc<U>> {
        self.instance()?
            .get::<U>()
            .ok_or_else(|| type_mismatch::<U>(&self.definition))
    }
}
