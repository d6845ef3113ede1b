//! 作用域管理
//!
//! - 单例：每个定义一个槽位，槽位互斥保证只构建一次，按创建顺序的逆序销毁
//! - 普通作用域：实例保存在外部 [`ScopeStore`] 中，容器记录自己创建的实例
//!   及其创建上下文，作用域结束时负责销毁

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use di_abstractions::{
    ComponentDefinition, CreationalContext, DefinitionKey, Instance, ScopeKind, ScopeMarker,
    ScopeStore, StoreKey,
};
use infrastructure_common::{
    DependencyError, DependencyResult, LifecycleError, LifecycleResult, RegistrationError,
    RegistrationResult,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 容器创建并拥有的实例
struct OwnedEntry {
    definition: Arc<ComponentDefinition>,
    instance: Instance,
    context: CreationalContext,
    created_at: DateTime<Utc>,
}

impl OwnedEntry {
    fn destroy(self) {
        if let Err(e) = self.definition.destroy(&self.instance) {
            warn!("组件销毁失败: {}: {}", self.definition.key(), e);
        }
        self.context.release();
    }
}

type Slot = Arc<Mutex<Option<OwnedEntry>>>;

/// 单例上下文
#[derive(Default)]
pub struct SingletonContext {
    slots: DashMap<DefinitionKey, Slot>,
    order: Mutex<Vec<DefinitionKey>>,
}

impl SingletonContext {
    /// 空的单例上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取单例，不存在时构建
    ///
    /// `create` 在槽位锁内执行，返回实例及其所属的创建上下文，保证只有一个构建者。
    /// 实例随即发布到槽位并释放槽位锁，`complete` (注入与初始化回调) 在锁外执行，
    /// 因此不同线程上的注入期循环不会互相等待。`complete` 失败时撤回槽位中的实例
    /// 并释放其创建上下文，之后的请求会重新构建。
    pub fn get_or_create<F, C>(
        &self,
        definition: &Arc<ComponentDefinition>,
        create: F,
        complete: C,
    ) -> DependencyResult<Instance>
    where
        F: FnOnce() -> DependencyResult<(Instance, CreationalContext)>,
        C: FnOnce(&Instance, &CreationalContext) -> DependencyResult<()>,
    {
        let slot = self
            .slots
            .entry(definition.key().clone())
            .or_default()
            .clone();

        let (instance, context) = {
            let mut guard = slot.lock();
            if let Some(entry) = guard.as_ref() {
                return Ok(entry.instance.clone());
            }

            let (instance, context) = create()?;
            *guard = Some(OwnedEntry {
                definition: definition.clone(),
                instance: instance.clone(),
                context: context.clone(),
                created_at: Utc::now(),
            });
            self.order.lock().push(definition.key().clone());
            (instance, context)
        };

        if let Err(e) = complete(&instance, &context) {
            self.retract(definition.key(), &slot, &instance);
            return Err(e);
        }
        info!("创建单例: {}", definition.key());
        Ok(instance)
    }

    /// 撤回初始化失败的单例，不调用销毁器
    fn retract(&self, key: &DefinitionKey, slot: &Slot, instance: &Instance) {
        let entry = {
            let mut guard = slot.lock();
            let current = guard
                .as_ref()
                .map_or(false, |entry| entry.instance.ptr_eq(instance));
            if current {
                guard.take()
            } else {
                None
            }
        };
        if let Some(entry) = entry {
            self.order.lock().retain(|k| k != key);
            entry.context.release();
            warn!("单例初始化失败，已撤回: {}", key);
        }
    }

    /// 已存在的单例
    pub fn get(&self, key: &str) -> Option<Instance> {
        let slot = self.slots.get(key).map(|s| s.value().clone())?;
        let guard = slot.lock();
        guard.as_ref().map(|e| e.instance.clone())
    }

    /// 单例的创建时间
    pub fn created_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let slot = self.slots.get(key).map(|s| s.value().clone())?;
        let guard = slot.lock();
        guard.as_ref().map(|e| e.created_at)
    }

    /// 最早创建的单例时间
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        let first = self.order.lock().first().cloned()?;
        self.created_at(&first)
    }

    /// 已创建的单例数量
    pub fn len(&self) -> usize {
        self.order.lock().len()
    }

    /// 是否没有单例
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按创建顺序的逆序销毁全部单例，返回销毁数量
    pub fn destroy_all(&self) -> usize {
        let order: Vec<DefinitionKey> = std::mem::take(&mut *self.order.lock());
        let mut destroyed = 0;
        for key in order.into_iter().rev() {
            let Some((_, slot)) = self.slots.remove(&key) else {
                continue;
            };
            let entry = slot.lock().take();
            if let Some(entry) = entry {
                debug!("销毁单例: {}", key);
                entry.destroy();
                destroyed += 1;
            }
        }
        destroyed
    }
}

/// 普通作用域上下文
pub struct NormalScopeContext {
    marker: ScopeMarker,
    store: Arc<dyn ScopeStore>,
    owned: DashMap<(DefinitionKey, StoreKey), Slot>,
}

impl NormalScopeContext {
    /// 绑定存储的普通作用域上下文
    pub fn new(marker: ScopeMarker, store: Arc<dyn ScopeStore>) -> Self {
        Self {
            marker,
            store,
            owned: DashMap::new(),
        }
    }

    /// 作用域标记
    pub fn marker(&self) -> &ScopeMarker {
        &self.marker
    }

    /// 作用域存储
    pub fn store(&self) -> &Arc<dyn ScopeStore> {
        &self.store
    }

    /// 存储是否有当前键
    pub fn is_active(&self) -> bool {
        self.store.current_key().is_some()
    }

    /// 当前活动的键，未激活时返回 [`DependencyError::ScopeNotActive`]
    pub fn current_key(&self) -> DependencyResult<StoreKey> {
        self.store
            .current_key()
            .ok_or_else(|| DependencyError::scope_not_active(self.marker.to_string()))
    }

    /// 当前键下的实例，不存在时构建并存入存储
    pub fn get_or_create<F>(
        &self,
        definition: &Arc<ComponentDefinition>,
        create: F,
    ) -> DependencyResult<Instance>
    where
        F: FnOnce() -> DependencyResult<(Instance, CreationalContext)>,
    {
        let key = self.current_key()?;
        if let Some(instance) = self.store.get(definition.key(), &key) {
            return Ok(instance);
        }

        let slot = self
            .owned
            .entry((definition.key().clone(), key.clone()))
            .or_default()
            .clone();
        let mut guard = slot.lock();
        if let Some(instance) = self.store.get(definition.key(), &key) {
            return Ok(instance);
        }

        let (instance, context) = create()?;
        self.store.put(definition.key(), &key, instance.clone());
        *guard = Some(OwnedEntry {
            definition: definition.clone(),
            instance: instance.clone(),
            context,
            created_at: Utc::now(),
        });
        debug!("创建 {} 实例: {} [{}]", self.marker, definition.key(), key);
        Ok(instance)
    }

    /// 结束一个键：清空存储并销毁容器创建的实例，返回销毁数量
    pub fn end(&self, key: &StoreKey) -> usize {
        let removed = self.store.remove(key);
        let doomed: Vec<(DefinitionKey, StoreKey)> = self
            .owned
            .iter()
            .filter(|entry| &entry.key().1 == key)
            .map(|entry| entry.key().clone())
            .collect();

        let mut entries: Vec<OwnedEntry> = doomed
            .into_iter()
            .filter_map(|k| self.owned.remove(&k))
            .filter_map(|(_, slot)| {
                let entry = slot.lock().take();
                entry
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let destroyed = entries.len();
        for entry in entries {
            entry.destroy();
        }
        info!(
            "结束作用域 {} [{}]: 存储移除 {} 个，销毁 {} 个",
            self.marker,
            key,
            removed.len(),
            destroyed
        );
        destroyed
    }

    /// 结束全部键
    pub fn end_all(&self) -> usize {
        let mut keys: Vec<StoreKey> = self.owned.iter().map(|e| e.key().1.clone()).collect();
        keys.sort();
        keys.dedup();
        keys.iter().map(|key| self.end(key)).sum()
    }
}

/// 作用域管理器
///
/// 依赖与单例作用域内建；普通作用域需要先注册存储。
/// 子容器拥有自己的单例上下文，普通作用域与父容器共享。
pub struct ScopeManager {
    singletons: SingletonContext,
    normal: Arc<DashMap<ScopeMarker, Arc<NormalScopeContext>>>,
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeManager {
    /// 只含内建作用域的管理器
    pub fn new() -> Self {
        Self {
            singletons: SingletonContext::new(),
            normal: Arc::new(DashMap::new()),
        }
    }

    /// 子容器使用的管理器
    pub fn child(&self) -> Self {
        Self {
            singletons: SingletonContext::new(),
            normal: self.normal.clone(),
        }
    }

    /// 单例上下文
    pub fn singletons(&self) -> &SingletonContext {
        &self.singletons
    }

    fn is_builtin(marker: &ScopeMarker) -> bool {
        *marker == ScopeMarker::dependent()
            || *marker == ScopeMarker::singleton()
            || *marker == ScopeMarker::application()
    }

    /// 注册普通作用域
    pub fn register_scope(
        &self,
        marker: ScopeMarker,
        store: Arc<dyn ScopeStore>,
    ) -> RegistrationResult<()> {
        if Self::is_builtin(&marker) || marker.kind() != ScopeKind::Normal {
            return Err(RegistrationError::DuplicateScope {
                scope: marker.to_string(),
            });
        }
        match self.normal.entry(marker.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RegistrationError::DuplicateScope {
                scope: marker.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(NormalScopeContext::new(marker.clone(), store)));
                info!("注册作用域: {}", marker);
                Ok(())
            }
        }
    }

    /// 作用域是否已注册
    pub fn is_registered(&self, marker: &ScopeMarker) -> bool {
        Self::is_builtin(marker) || self.normal.contains_key(marker)
    }

    /// 内建作用域总是活动的；普通作用域看存储是否有当前键
    pub fn is_active(&self, marker: &ScopeMarker) -> bool {
        if Self::is_builtin(marker) {
            return true;
        }
        self.normal
            .get(marker)
            .map_or(false, |context| context.is_active())
    }

    /// 普通作用域上下文，未注册时返回 [`DependencyError::ScopeNotActive`]
    pub fn normal(&self, marker: &ScopeMarker) -> DependencyResult<Arc<NormalScopeContext>> {
        self.normal
            .get(marker)
            .map(|context| context.value().clone())
            .ok_or_else(|| DependencyError::scope_not_active(marker.to_string()))
    }

    /// 结束普通作用域中的一个键
    pub fn end_scope(&self, marker: &ScopeMarker, key: &StoreKey) -> LifecycleResult<usize> {
        let context = self
            .normal
            .get(marker)
            .map(|context| context.value().clone())
            .ok_or_else(|| LifecycleError::ScopeNotFound {
                scope: marker.to_string(),
            })?;
        Ok(context.end(key))
    }

    /// 销毁单例；`end_normal` 为真时同时结束全部普通作用域
    pub fn shutdown(&self, end_normal: bool) -> usize {
        let mut destroyed = self.singletons.destroy_all();
        if end_normal {
            let contexts: Vec<Arc<NormalScopeContext>> =
                self.normal.iter().map(|c| c.value().clone()).collect();
            destroyed += contexts.iter().map(|c| c.end_all()).sum::<usize>();
        }
        destroyed
    }
}

/// 基于内存映射的作用域存储
///
/// 通过 `begin`/`end` 显式切换当前键，当前键对所有线程可见。
#[derive(Default)]
pub struct MapScopeStore {
    current: RwLock<Option<StoreKey>>,
    instances: DashMap<StoreKey, HashMap<DefinitionKey, Instance>>,
}

impl MapScopeStore {
    /// 空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 激活指定键
    pub fn begin(&self, key: impl Into<StoreKey>) -> StoreKey {
        let key = key.into();
        *self.current.write() = Some(key.clone());
        key
    }

    /// 以随机键激活
    pub fn begin_new(&self) -> StoreKey {
        self.begin(StoreKey::new())
    }

    /// 取消激活，返回之前的键
    pub fn end(&self) -> Option<StoreKey> {
        self.current.write().take()
    }

    /// 键下已存储的实例数量
    pub fn count(&self, key: &StoreKey) -> usize {
        self.instances.get(key).map_or(0, |m| m.len())
    }
}

impl ScopeStore for MapScopeStore {
    fn current_key(&self) -> Option<StoreKey> {
        self.current.read().clone()
    }

    fn get(&self, definition: &DefinitionKey, key: &StoreKey) -> Option<Instance> {
        self.instances
            .get(key)
            .and_then(|m| m.get(definition).cloned())
    }

    fn put(&self, definition: &DefinitionKey, key: &StoreKey, instance: Instance) {
        self.instances
            .entry(key.clone())
            .or_default()
            .insert(definition.clone(), instance);
    }

    fn remove(&self, key: &StoreKey) -> Vec<(DefinitionKey, Instance)> {
        self.instances
            .remove(key)
            .map(|(_, m)| m.into_iter().collect())
            .unwrap_or_default()
    }
}
