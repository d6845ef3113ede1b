//! 依赖注入容器
//!
//! [`DiContainer`] 是可克隆的句柄，内部的 [`ContainerCore`] 实现
//! [`ReferenceResolver`]，客户端代理通过它的弱引用在每次访问时查找实例。
//!
//! 构建分两个阶段：工厂创建实例后立即登记到创建上下文，然后执行注入与
//! 初始化回调。注入阶段再次请求同一定义会拿到已登记的实例，构建阶段
//! 再次请求则报告循环依赖。第二阶段失败时撤回已登记的实例，不调用销毁器。
//!
//! 没有调用方上下文的解析各自使用新的顶层创建上下文；只有其中留下带销毁器的
//! 依赖实例时，容器才保留该上下文直到关闭。

use crate::config::ContainerConfig;
use crate::event::EventDispatcher;
use crate::provider::ComponentProvider;
use crate::registry::ComponentRegistry;
use crate::scope::ScopeManager;
use crate::builder::DiContainerBuilder;
use chrono::{DateTime, Utc};
use di_abstractions::{
    ClientProxy, ComponentDefinition, ContainerShutdown, CreationalContext, Instance, Lookup,
    ObserverEntry, Qualifier, Reference, ReferenceResolver, ResolutionContext, ScopeKind,
    ScopeMarker, StoreKey, TypeCatalog, TypeDescriptor,
};
use infrastructure_common::{
    DependencyError, DependencyResult, LifecycleResult, RegistrationResult,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 容器运行统计
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStats {
    pub container_id: Uuid,
    pub definitions: usize,
    pub observers: usize,
    pub resolutions: u64,
    pub failed_resolutions: u64,
    pub live_singletons: usize,
    pub retained_contexts: usize,
    pub registry_generation: u64,
    pub created_at: DateTime<Utc>,
    pub oldest_singleton: Option<DateTime<Utc>>,
    pub closed: bool,
}

/// 容器内部状态
pub struct ContainerCore {
    id: Uuid,
    config: ContainerConfig,
    registry: Arc<ComponentRegistry>,
    scopes: Arc<ScopeManager>,
    events: Arc<EventDispatcher>,
    catalog: Arc<TypeCatalog>,
    parent: Option<Arc<ContainerCore>>,
    retained: Mutex<Vec<CreationalContext>>,
    self_ref: Weak<ContainerCore>,
    closed: AtomicBool,
    resolutions: AtomicU64,
    failed_resolutions: AtomicU64,
    created_at: DateTime<Utc>,
}

pub(crate) struct CoreParts {
    pub config: ContainerConfig,
    pub registry: Arc<ComponentRegistry>,
    pub scopes: Arc<ScopeManager>,
    pub events: Arc<EventDispatcher>,
    pub catalog: Arc<TypeCatalog>,
    pub parent: Option<Arc<ContainerCore>>,
}

impl ContainerCore {
    pub(crate) fn create(parts: CoreParts) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            id: Uuid::new_v4(),
            config: parts.config,
            registry: parts.registry,
            scopes: parts.scopes,
            events: parts.events,
            catalog: parts.catalog,
            parent: parts.parent,
            retained: Mutex::new(Vec::new()),
            self_ref: self_ref.clone(),
            closed: AtomicBool::new(false),
            resolutions: AtomicU64::new(0),
            failed_resolutions: AtomicU64::new(0),
            created_at: Utc::now(),
        })
    }

    /// 在新的顶层创建上下文中解析
    ///
    /// 失败时立即释放上下文；成功且留下带销毁器的依赖实例时保留到容器关闭。
    pub(crate) fn top_level<T>(
        &self,
        resolve: impl FnOnce(&CreationalContext) -> DependencyResult<T>,
    ) -> DependencyResult<T> {
        let ctx = CreationalContext::new();
        let result = resolve(&ctx);
        if result.is_err() {
            ctx.release();
        } else if ctx.needs_release() {
            self.retained.lock().push(ctx);
        }
        result
    }

    fn retained_count(&self) -> usize {
        self.retained.lock().len()
    }

    fn ensure_open(&self) -> DependencyResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DependencyError::ContainerClosed);
        }
        Ok(())
    }

    fn weak_resolver(&self) -> Weak<dyn ReferenceResolver> {
        let weak: Weak<dyn ReferenceResolver> = self.self_ref.clone();
        weak
    }

    /// 第一阶段：创建实例并登记到帧
    fn instantiate(
        &self,
        definition: &Arc<ComponentDefinition>,
        frame: &CreationalContext,
    ) -> DependencyResult<Instance> {
        let ctx = ResolutionContext::new(self, frame.clone());
        let instance = definition.wrap(definition.factory().create(&ctx)?);
        frame.push(instance.clone());
        Ok(instance)
    }

    /// 第二阶段：注入与初始化回调，失败时从帧中撤回实例
    fn complete(
        &self,
        definition: &Arc<ComponentDefinition>,
        instance: &Instance,
        frame: &CreationalContext,
    ) -> DependencyResult<()> {
        let ctx = ResolutionContext::new(self, frame.clone());
        let factory = definition.factory();
        let result = factory
            .inject(instance, &ctx)
            .and_then(|()| factory.post_construct(instance));
        if let Err(e) = result {
            frame.discard(instance);
            warn!("组件初始化失败: {}: {}", definition.key(), e);
            return Err(e);
        }
        debug!("构建组件: {} ({})", definition.key(), definition.scope());
        Ok(())
    }

    fn construct(
        &self,
        definition: &Arc<ComponentDefinition>,
        frame: &CreationalContext,
    ) -> DependencyResult<Instance> {
        let instance = self.instantiate(definition, frame)?;
        self.complete(definition, &instance, frame)?;
        Ok(instance)
    }

    /// 在实例自己的创建上下文中构建，失败时释放该上下文中已构建的依赖
    fn construct_owned(
        &self,
        definition: &Arc<ComponentDefinition>,
        own: CreationalContext,
    ) -> DependencyResult<(Instance, CreationalContext)> {
        match self.construct(definition, &own) {
            Ok(instance) => Ok((instance, own)),
            Err(e) => {
                own.release();
                Err(e)
            }
        }
    }

    fn check_depth(
        &self,
        definition: &ComponentDefinition,
        ctx: &CreationalContext,
    ) -> DependencyResult<()> {
        let depth = ctx.depth();
        if depth >= self.config.max_resolution_depth {
            return Err(DependencyError::creation_failed(
                definition.key().to_string(),
                format!(
                    "超过最大解析深度 {}: {}",
                    self.config.max_resolution_depth,
                    ctx.describe_chain(definition)
                ),
            ));
        }
        Ok(())
    }

    /// 查找创建链上已存在的实例；正在构建中说明存在循环
    fn in_flight(
        &self,
        definition: &ComponentDefinition,
        ctx: &CreationalContext,
    ) -> DependencyResult<Option<Instance>> {
        match ctx.lookup(definition) {
            Lookup::Absent => Ok(None),
            Lookup::Produced(instance) => Ok(Some(instance)),
            Lookup::InProgress => {
                let chain = ctx.describe_chain(definition);
                warn!("检测到循环依赖: {}", chain);
                Err(DependencyError::circular(chain))
            }
        }
    }

    fn reference_for(
        &self,
        definition: &Arc<ComponentDefinition>,
        ctx: &CreationalContext,
    ) -> DependencyResult<Reference> {
        self.ensure_open()?;

        if !self.registry.owns(definition) {
            if let Some(parent) = &self.parent {
                return parent.reference_in(definition, ctx);
            }
        }

        let scope = definition.scope();
        match scope.kind() {
            ScopeKind::Normal => {
                let context = self.scopes.normal(scope)?;
                if !context.is_active() {
                    return Err(DependencyError::scope_not_active(scope.to_string()));
                }
                Ok(Reference::proxy(ClientProxy::new(
                    definition.clone(),
                    self.weak_resolver(),
                )))
            }
            ScopeKind::Dependent => {
                if !self.scopes.is_registered(scope) {
                    return Err(DependencyError::scope_not_active(scope.to_string()));
                }
                if let Some(instance) = self.in_flight(definition, ctx)? {
                    return Ok(Reference::direct(definition.clone(), instance));
                }
                self.check_depth(definition, ctx)?;
                let frame = ctx.child(definition.clone());
                let instance = self.construct(definition, &frame)?;
                Ok(Reference::direct(definition.clone(), instance))
            }
            ScopeKind::Singleton => {
                if !self.scopes.is_registered(scope) {
                    return Err(DependencyError::scope_not_active(scope.to_string()));
                }
                // 必须在锁定单例槽位之前查找，否则同一线程上的循环会死锁
                if let Some(instance) = self.in_flight(definition, ctx)? {
                    return Ok(Reference::direct(definition.clone(), instance));
                }
                self.check_depth(definition, ctx)?;
                let instance = self.scopes.singletons().get_or_create(
                    definition,
                    || {
                        let own = CreationalContext::nested(definition.clone(), ctx);
                        match self.instantiate(definition, &own) {
                            Ok(instance) => Ok((instance, own)),
                            Err(e) => {
                                own.release();
                                Err(e)
                            }
                        }
                    },
                    |instance, own| self.complete(definition, instance, own),
                )?;
                Ok(Reference::direct(definition.clone(), instance))
            }
        }
    }

    fn record<T>(&self, result: DependencyResult<T>) -> DependencyResult<T> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            self.failed_resolutions.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl ReferenceResolver for ContainerCore {
    fn resolve_in(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
        ctx: &CreationalContext,
    ) -> DependencyResult<Reference> {
        let result = self
            .registry
            .resolve(query, qualifiers)
            .and_then(|definition| self.reference_for(&definition, ctx));
        self.record(result)
    }

    fn reference_in(
        &self,
        definition: &Arc<ComponentDefinition>,
        ctx: &CreationalContext,
    ) -> DependencyResult<Reference> {
        self.reference_for(definition, ctx)
    }

    fn instance_for_proxy(
        &self,
        definition: &Arc<ComponentDefinition>,
    ) -> DependencyResult<Instance> {
        self.ensure_open()?;
        let context = self.scopes.normal(definition.scope())?;
        context.get_or_create(definition, || {
            self.construct_owned(
                definition,
                CreationalContext::for_definition(definition.clone()),
            )
        })
    }
}

/// 依赖注入容器句柄
#[derive(Clone)]
pub struct DiContainer {
    core: Arc<ContainerCore>,
}

impl DiContainer {
    pub(crate) fn from_core(core: Arc<ContainerCore>) -> Self {
        Self { core }
    }

    /// 创建容器构建器
    pub fn builder() -> DiContainerBuilder {
        DiContainerBuilder::new()
    }

    /// 以当前容器为父容器的构建器
    pub fn child(&self) -> DiContainerBuilder {
        DiContainerBuilder::new().with_parent(self.clone())
    }

    pub(crate) fn core(&self) -> &Arc<ContainerCore> {
        &self.core
    }

    /// 容器实例 ID
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// 构建时生效的配置
    pub fn config(&self) -> &ContainerConfig {
        &self.core.config
    }

    /// 组件注册表
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.core.registry
    }

    /// 作用域管理器
    pub fn scopes(&self) -> &Arc<ScopeManager> {
        &self.core.scopes
    }

    /// 事件分发器
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.core.events
    }

    /// 类型目录
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.core.catalog
    }

    /// 父容器
    pub fn parent(&self) -> Option<DiContainer> {
        self.core.parent.clone().map(Self::from_core)
    }

    /// 容器是否已关闭
    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    /// 解析 (类型, 限定符) 查询
    ///
    /// 每次调用使用新的顶层创建上下文。留下带销毁器的依赖实例时，容器持有该上下文
    /// 直到关闭；需要提前释放时使用 [`Self::resolve_in`]。
    pub fn resolve(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Reference> {
        self.core
            .top_level(|ctx| self.core.resolve_in(query, qualifiers, ctx))
    }

    /// 在调用方提供的创建上下文中解析
    pub fn resolve_in(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
        ctx: &CreationalContext,
    ) -> DependencyResult<Reference> {
        self.core.resolve_in(query, qualifiers, ctx)
    }

    /// 解析并取出为 `U` 的视图
    pub fn resolve_as<U: ?Sized + 'static>(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Arc<U>> {
        self.resolve(query, qualifiers)?.get::<U>()
    }

    /// 按具体类型解析默认组件
    pub fn get<T: Send + Sync + 'static>(&self) -> DependencyResult<Arc<T>> {
        self.resolve_as::<T>(&TypeDescriptor::of::<T>(), &[])
    }

    /// 按具体类型与限定符解析
    pub fn get_qualified<T: Send + Sync + 'static>(
        &self,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Arc<T>> {
        self.resolve_as::<T>(&TypeDescriptor::of::<T>(), qualifiers)
    }

    /// 按名称解析
    pub fn resolve_by_name(&self, name: &str) -> DependencyResult<Reference> {
        let result = self.core.registry.resolve_by_name(name).and_then(|definition| {
            self.core
                .top_level(|ctx| self.core.reference_for(&definition, ctx))
        });
        self.core.record(result)
    }

    /// 全部匹配组件的引用，按优先级降序
    pub fn resolve_all(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Vec<Reference>> {
        let definitions = self.core.registry.resolve_all(query, qualifiers);
        self.references(&definitions)
    }

    /// 在同一个顶层创建上下文中获取多个定义的引用
    pub(crate) fn references(
        &self,
        definitions: &[Arc<ComponentDefinition>],
    ) -> DependencyResult<Vec<Reference>> {
        self.core.top_level(|ctx| {
            definitions
                .iter()
                .map(|definition| self.core.reference_for(definition, ctx))
                .collect()
        })
    }

    /// 在新的顶层创建上下文中获取定义的引用
    pub(crate) fn reference_top_level(
        &self,
        definition: &Arc<ComponentDefinition>,
    ) -> DependencyResult<Reference> {
        self.core
            .top_level(|ctx| self.core.reference_for(definition, ctx))
    }

    /// 只做定义解析，不创建实例
    pub fn definition_for(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Arc<ComponentDefinition>> {
        self.core.registry.resolve(query, qualifiers)
    }

    /// 在给定创建上下文中获取定义的引用
    pub fn reference(
        &self,
        definition: &Arc<ComponentDefinition>,
        ctx: &CreationalContext,
    ) -> DependencyResult<Reference> {
        self.core.reference_for(definition, ctx)
    }

    /// 为定义创建新的创建上下文
    pub fn create_creational_context(
        &self,
        definition: Option<Arc<ComponentDefinition>>,
    ) -> CreationalContext {
        match definition {
            Some(definition) => CreationalContext::for_definition(definition),
            None => CreationalContext::new(),
        }
    }

    /// 释放创建上下文中的依赖实例
    pub fn release(&self, ctx: &CreationalContext) {
        ctx.release();
    }

    /// 长期持有的解析句柄
    pub fn provider(&self, query: TypeDescriptor, qualifiers: Vec<Qualifier>) -> ComponentProvider {
        ComponentProvider::new(self.clone(), query, qualifiers)
    }

    /// 按具体类型的解析句柄
    pub fn provider_of<T: Send + Sync + 'static>(&self) -> ComponentProvider {
        self.provider(TypeDescriptor::of::<T>(), Vec::new())
    }

    /// 构建后注册组件定义
    pub fn register_definition(
        &self,
        definition: Arc<ComponentDefinition>,
    ) -> RegistrationResult<()> {
        self.core.registry.register(definition)
    }

    /// 构建后注册观察者
    pub fn register_observer(&self, entry: ObserverEntry) -> RegistrationResult<()> {
        self.core.events.register_observer(entry)
    }

    /// 触发事件，按值的运行时类型与类型目录中的声明计算层次
    pub fn fire_event<E: Send + Sync + 'static>(
        &self,
        event: E,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<usize> {
        self.fire_instance(&Instance::new(event), qualifiers)
    }

    /// 触发已包装的事件实例
    pub fn fire_instance(
        &self,
        event: &Instance,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<usize> {
        self.core.ensure_open()?;
        self.core.events.fire_instance(event, qualifiers)
    }

    /// 以显式类型描述符触发事件
    pub fn fire_event_as(
        &self,
        event: &Instance,
        descriptor: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<usize> {
        self.core.ensure_open()?;
        self.core.events.fire(event, descriptor, qualifiers)
    }

    /// 匹配事件类型与限定符的观察者，不调用
    pub fn resolve_observers(
        &self,
        descriptor: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> Vec<Arc<ObserverEntry>> {
        self.core.events.resolve_observers(descriptor, qualifiers)
    }

    /// 结束普通作用域中的一个键，返回销毁的实例数量
    pub fn end_scope(&self, marker: &ScopeMarker, key: &StoreKey) -> LifecycleResult<usize> {
        self.core.scopes.end_scope(marker, key)
    }

    /// 关闭容器
    ///
    /// 先触发 [`ContainerShutdown`]，再按创建顺序的逆序销毁单例，最后按保留顺序的
    /// 逆序释放顶层创建上下文。根容器同时结束全部普通作用域。重复调用不做任何事。
    pub fn shutdown(&self) -> usize {
        let core = &self.core;
        if core.closed.load(Ordering::Acquire) {
            return 0;
        }

        if core.config.fire_lifecycle_events {
            let event = Instance::new(ContainerShutdown { container_id: core.id });
            if let Err(e) = core.events.fire_instance(&event, &[]) {
                warn!("容器关闭事件处理失败: {}", e);
            }
        }

        if core.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let destroyed = core.scopes.shutdown(core.parent.is_none());
        let retained = std::mem::take(&mut *core.retained.lock());
        for ctx in retained.iter().rev() {
            ctx.release();
        }
        info!(
            "容器已关闭: {} (销毁 {} 个实例, 释放 {} 个创建上下文)",
            core.id,
            destroyed,
            retained.len()
        );
        destroyed
    }

    /// 运行统计快照
    pub fn stats(&self) -> ContainerStats {
        let core = &self.core;
        ContainerStats {
            container_id: core.id,
            definitions: core.registry.len(),
            observers: core.events.len(),
            resolutions: core.resolutions.load(Ordering::Relaxed),
            failed_resolutions: core.failed_resolutions.load(Ordering::Relaxed),
            live_singletons: core.scopes.singletons().len(),
            retained_contexts: core.retained_count(),
            registry_generation: core.registry.generation(),
            created_at: core.created_at,
            oldest_singleton: core.scopes.singletons().oldest(),
            closed: self.is_closed(),
        }
    }
}

impl std::fmt::Debug for DiContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiContainer")
            .field("id", &self.core.id)
            .field("definitions", &self.core.registry.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
