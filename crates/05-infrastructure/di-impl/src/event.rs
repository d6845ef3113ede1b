//! 事件分发
//!
//! 观察者按事件类型的原始类型索引。触发时沿事件类型层次逐个节点收集观察者，
//! 每个观察者在一次分发中最多调用一次；父分发器的观察者先于本地观察者调用。
//! 按事件类型缓存层次匹配结果。观察者索引与缓存各自记录代数，注册时递增代数并
//! 清空缓存，只有与缓存同一代计算出的结果才会写入缓存。

use di_abstractions::qualifier::{
    all_bindings_match, any_qualifier, default_qualifier, describe_qualifiers,
};
use di_abstractions::{
    EventContext, Instance, ObserverEntry, Qualifier, RawType, TypeCatalog, TypeDescriptor,
};
use infrastructure_common::{
    DependencyError, DependencyResult, RegistrationError, RegistrationResult,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

type ObserverList = Arc<Vec<Arc<ObserverEntry>>>;

#[derive(Default)]
struct ObserverIndex {
    by_raw: HashMap<RawType, Vec<Arc<ObserverEntry>>>,
    generation: u64,
}

#[derive(Default)]
struct ObserverCache {
    entries: HashMap<TypeDescriptor, ObserverList>,
    generation: u64,
}

/// 事件分发器
pub struct EventDispatcher {
    observers: RwLock<ObserverIndex>,
    cache: Mutex<ObserverCache>,
    parent: Option<Arc<EventDispatcher>>,
    catalog: Arc<TypeCatalog>,
}

impl EventDispatcher {
    /// 创建根分发器
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self {
            observers: RwLock::new(ObserverIndex::default()),
            cache: Mutex::new(ObserverCache::default()),
            parent: None,
            catalog,
        }
    }

    /// 创建子分发器，触发时先通知父分发器的观察者
    pub fn with_parent(parent: Arc<EventDispatcher>, catalog: Arc<TypeCatalog>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(catalog)
        }
    }

    /// 事件值类型层次所依据的类型目录
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// 注册观察者
    pub fn register_observer(&self, entry: ObserverEntry) -> RegistrationResult<()> {
        let Some(raw) = entry.event_type().index_key().cloned() else {
            return Err(RegistrationError::UnsupportedType {
                id: entry.name().to_string(),
                type_name: entry.event_type().to_string(),
            });
        };
        info!(
            "注册观察者: {} ({} {})",
            entry.name(),
            entry.event_type(),
            describe_qualifiers(entry.qualifiers())
        );
        let generation = {
            let mut observers = self.observers.write();
            observers.by_raw.entry(raw).or_default().push(Arc::new(entry));
            observers.generation += 1;
            observers.generation
        };

        let mut cache = self.cache.lock();
        cache.entries.clear();
        cache.generation = cache.generation.max(generation);
        Ok(())
    }

    /// 本地注册的观察者数量
    pub fn len(&self) -> usize {
        self.observers.read().by_raw.values().map(Vec::len).sum()
    }

    /// 是否没有本地观察者
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 类型层次上匹配的本地观察者（不考虑限定符）
    fn type_matched(&self, descriptor: &TypeDescriptor) -> ObserverList {
        if let Some(cached) = self.cache.lock().entries.get(descriptor) {
            return cached.clone();
        }
        let (generation, matched) = self.collect(descriptor);
        self.publish(descriptor, generation, matched)
    }

    /// 在观察者索引的读锁内计算匹配结果，并返回所依据的代数
    fn collect(&self, descriptor: &TypeDescriptor) -> (u64, ObserverList) {
        let observers = self.observers.read();
        let mut matched: Vec<Arc<ObserverEntry>> = Vec::new();
        for node in descriptor.hierarchy() {
            let Some(raw) = node.index_key() else {
                continue;
            };
            let Some(entries) = observers.by_raw.get(raw) else {
                continue;
            };
            for entry in entries {
                if entry.event_type().is_assignable_from(&node)
                    && !matched.iter().any(|m| Arc::ptr_eq(m, entry))
                {
                    matched.push(entry.clone());
                }
            }
        }
        (observers.generation, Arc::new(matched))
    }

    /// 结果与缓存同一代时写入缓存；期间有新注册则只返回不缓存
    fn publish(
        &self,
        descriptor: &TypeDescriptor,
        generation: u64,
        matched: ObserverList,
    ) -> ObserverList {
        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.entries.insert(descriptor.clone(), matched.clone());
        }
        matched
    }

    /// 解析事件的观察者：父分发器在前，本地在后
    pub fn resolve_observers(
        &self,
        descriptor: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> Vec<Arc<ObserverEntry>> {
        let firing = firing_qualifiers(qualifiers);
        self.resolve_with(descriptor, &firing)
    }

    fn resolve_with(
        &self,
        descriptor: &TypeDescriptor,
        firing: &[Qualifier],
    ) -> Vec<Arc<ObserverEntry>> {
        let mut resolved = self
            .parent
            .as_ref()
            .map(|p| p.resolve_with(descriptor, firing))
            .unwrap_or_default();
        resolved.extend(
            self.type_matched(descriptor)
                .iter()
                .filter(|entry| all_bindings_match(entry.bindings(), firing))
                .cloned(),
        );
        resolved
    }

    /// 以给定类型描述符触发事件，返回调用的观察者数量
    ///
    /// 观察者返回错误时中止分发。
    pub fn fire(
        &self,
        event: &Instance,
        descriptor: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<usize> {
        let firing = firing_qualifiers(qualifiers);
        let observers = self.resolve_with(descriptor, &firing);
        debug!(
            "触发事件 {} {}: {} 个观察者",
            descriptor,
            describe_qualifiers(&firing),
            observers.len()
        );

        let ctx = EventContext::new(event, descriptor, &firing);
        for observer in &observers {
            if let Err(source) = observer.notify(&ctx) {
                error!("观察者执行失败: {} ({}): {}", observer.name(), descriptor, source);
                return Err(DependencyError::ObserverFailed {
                    observer: observer.name().to_string(),
                    event_type: descriptor.to_string(),
                    source,
                });
            }
        }
        Ok(observers.len())
    }

    /// 按事件值的运行时类型触发，父类型取自类型目录
    pub fn fire_instance(
        &self,
        event: &Instance,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<usize> {
        let descriptor = self.catalog.describe(event.type_id(), event.type_name());
        self.fire(event, &descriptor, qualifiers)
    }
}

/// 触发限定符总是包含 `Any`；未指定时再加上 `Default`
fn firing_qualifiers(qualifiers: &[Qualifier]) -> Vec<Qualifier> {
    let mut firing = qualifiers.to_vec();
    if firing.iter().all(Qualifier::is_any) {
        firing.push(default_qualifier());
    }
    if !firing.iter().any(Qualifier::is_any) {
        firing.push(any_qualifier());
    }
    firing
}
