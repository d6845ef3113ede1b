//! 容器构建器
//!
//! 收集组件定义、观察者、作用域存储与类型声明，构建时注册到新的注册表，
//! 可选地验证注入点与构造期循环依赖，然后触发 [`ContainerInitialized`]。

use crate::config::ContainerConfig;
use crate::container::{ContainerCore, CoreParts, DiContainer};
use crate::event::EventDispatcher;
use crate::registry::{ComponentRegistry, PriorityPolicy};
use crate::scope::ScopeManager;
use di_abstractions::{
    ComponentDefinition, ComponentDiscovery, ContainerInitialized, DefinitionKey, DiscoverySink,
    Instance, ObserverEntry, RawType, ScopeMarker, ScopeStore, TypeCatalog,
};
use infrastructure_common::{InfrastructureResult, RegistrationError, RegistrationResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// 容器构建器
#[derive(Default)]
pub struct DiContainerBuilder {
    config: Option<ContainerConfig>,
    parent: Option<DiContainer>,
    definitions: Vec<Arc<ComponentDefinition>>,
    observers: Vec<ObserverEntry>,
    scopes: Vec<(ScopeMarker, Arc<dyn ScopeStore>)>,
    types: Vec<RawType>,
}

impl DiContainerBuilder {
    /// 使用默认配置的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换容器配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 设置父容器；未指定配置时沿用父容器的配置
    pub fn with_parent(mut self, parent: DiContainer) -> Self {
        self.parent = Some(parent);
        self
    }

    /// 注册组件定义
    pub fn register(mut self, definition: Arc<ComponentDefinition>) -> Self {
        self.definitions.push(definition);
        self
    }

    /// 注册观察者
    pub fn observer(mut self, entry: ObserverEntry) -> Self {
        self.observers.push(entry);
        self
    }

    /// 注册普通作用域及其存储
    pub fn scope(mut self, marker: ScopeMarker, store: Arc<dyn ScopeStore>) -> Self {
        self.scopes.push((marker, store));
        self
    }

    /// 声明 Rust 类型的父类型
    pub fn declare_type(mut self, raw: RawType) -> Self {
        self.types.push(raw);
        self
    }

    /// 运行发现器，把结果收集到构建器
    pub async fn discover(
        mut self,
        discovery: &dyn ComponentDiscovery,
    ) -> RegistrationResult<Self> {
        info!("运行组件发现器: {}", discovery.name());
        let before = self.definitions.len();
        discovery.discover(&mut self).await.map_err(|e| {
            warn!("组件发现失败: {}: {}", discovery.name(), e);
            e
        })?;
        info!(
            "发现器 {} 提供了 {} 个组件定义",
            discovery.name(),
            self.definitions.len() - before
        );
        Ok(self)
    }

    /// 构建容器
    pub fn build(self) -> InfrastructureResult<DiContainer> {
        let config = match (&self.config, &self.parent) {
            (Some(config), _) => config.clone(),
            (None, Some(parent)) => parent.config().clone(),
            (None, None) => ContainerConfig::default(),
        };
        config.validate()?;

        let policy = PriorityPolicy::from_config(&config);
        let parent_core = self.parent.as_ref().map(|p| p.core().clone());

        let (registry, scopes, catalog, events) = match &self.parent {
            Some(parent) => {
                let catalog = parent.catalog().clone();
                (
                    ComponentRegistry::with_parent(parent.registry().clone(), policy),
                    parent.scopes().child(),
                    catalog.clone(),
                    EventDispatcher::with_parent(parent.events().clone(), catalog),
                )
            }
            None => {
                let catalog = Arc::new(TypeCatalog::new());
                (
                    ComponentRegistry::new(policy),
                    ScopeManager::new(),
                    catalog.clone(),
                    EventDispatcher::new(catalog),
                )
            }
        };

        for raw in self.types {
            catalog.declare(raw);
        }
        for (marker, store) in self.scopes {
            scopes.register_scope(marker, store)?;
        }
        for definition in self.definitions {
            registry.register(definition)?;
        }
        for entry in self.observers {
            events.register_observer(entry)?;
        }

        if config.validate_on_build {
            validate(&registry, &scopes, &config)?;
        }

        let core = ContainerCore::create(CoreParts {
            config: config.clone(),
            registry: Arc::new(registry),
            scopes: Arc::new(scopes),
            events: Arc::new(events),
            catalog,
            parent: parent_core,
        });
        let container = DiContainer::from_core(core);
        info!(
            "容器构建完成: {} ({} 个组件定义, {} 个观察者)",
            container.id(),
            container.registry().len(),
            container.events().len()
        );

        if config.fire_lifecycle_events {
            let event = Instance::new(ContainerInitialized {
                container_id: container.id(),
                definitions: container.registry().len(),
            });
            container.fire_instance(&event, &[])?;
        }
        Ok(container)
    }
}

impl DiscoverySink for DiContainerBuilder {
    fn register_definition(
        &mut self,
        definition: Arc<ComponentDefinition>,
    ) -> RegistrationResult<()> {
        if self.definitions.iter().any(|d| d.key() == definition.key()) {
            return Err(RegistrationError::DuplicateDefinition {
                id: definition.key().to_string(),
            });
        }
        self.definitions.push(definition);
        Ok(())
    }

    fn register_observer(&mut self, entry: ObserverEntry) -> RegistrationResult<()> {
        if entry.event_type().index_key().is_none() {
            return Err(RegistrationError::UnsupportedType {
                id: entry.name().to_string(),
                type_name: entry.event_type().to_string(),
            });
        }
        self.observers.push(entry);
        Ok(())
    }

    fn declare_type(&mut self, raw: RawType) {
        self.types.push(raw);
    }
}

/// 验证作用域、注入点与构造期循环依赖
fn validate(
    registry: &ComponentRegistry,
    scopes: &ScopeManager,
    config: &ContainerConfig,
) -> RegistrationResult<()> {
    let mut problems = Vec::new();
    let mut graph: HashMap<DefinitionKey, Vec<Arc<ComponentDefinition>>> = HashMap::new();
    let definitions = registry.definitions();

    for definition in &definitions {
        if !scopes.is_registered(definition.scope()) {
            problems.push(format!(
                "组件 {} 使用了未注册的作用域 {}",
                definition.key(),
                definition.scope()
            ));
        }
        for point in definition.injection_points() {
            match registry.resolve(&point.descriptor, &point.qualifiers) {
                Ok(target) => graph
                    .entry(definition.key().clone())
                    .or_default()
                    .push(target),
                Err(e) => problems.push(format!(
                    "组件 {} 的注入点 {}: {}",
                    definition.key(),
                    point,
                    e
                )),
            }
        }
    }

    if config.enable_circular_dependency_detection {
        let mut detector = CycleDetector::new(&graph);
        for definition in &definitions {
            if let Some(chain) = detector.check(definition) {
                problems.push(format!("循环依赖检测到: {}", chain));
            }
        }
    }

    if problems.is_empty() {
        return Ok(());
    }
    for problem in &problems {
        warn!("组件验证失败: {}", problem);
    }
    Err(RegistrationError::ValidationFailed { problems })
}

/// 深度优先搜索构造期依赖图中的环，普通作用域组件经代理注入，不构成环
struct CycleDetector<'a> {
    graph: &'a HashMap<DefinitionKey, Vec<Arc<ComponentDefinition>>>,
    visited: HashSet<DefinitionKey>,
    visiting: Vec<DefinitionKey>,
}

impl<'a> CycleDetector<'a> {
    fn new(graph: &'a HashMap<DefinitionKey, Vec<Arc<ComponentDefinition>>>) -> Self {
        Self {
            graph,
            visited: HashSet::new(),
            visiting: Vec::new(),
        }
    }

    fn check(&mut self, definition: &ComponentDefinition) -> Option<String> {
        if definition.scope().kind().is_proxied() {
            return None;
        }
        let key = definition.key();
        if let Some(start) = self.visiting.iter().position(|k| k == key) {
            let mut chain: Vec<String> = self.visiting[start..]
                .iter()
                .map(ToString::to_string)
                .collect();
            chain.push(key.to_string());
            return Some(chain.join(" -> "));
        }
        if self.visited.contains(key) {
            return None;
        }

        self.visiting.push(key.clone());
        let mut found = None;
        if let Some(dependencies) = self.graph.get(key) {
            for dependency in dependencies {
                found = self.check(dependency);
                if found.is_some() {
                    break;
                }
            }
        }
        self.visiting.pop();
        self.visited.insert(key.clone());
        found
    }
}
