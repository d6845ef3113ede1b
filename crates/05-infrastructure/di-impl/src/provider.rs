//! 组件提供者
//!
//! 长期持有的 (类型, 限定符) 解析句柄。定义解析结果按注册表代数缓存，
//! 代数变化后重新解析；实例仍在每次 `get` 时按作用域获取。

use crate::container::DiContainer;
use di_abstractions::{ComponentDefinition, Qualifier, Reference, TypeDescriptor};
use infrastructure_common::DependencyResult;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
struct CachedResolution {
    generation: u64,
    all: Arc<Vec<Arc<ComponentDefinition>>>,
    selected: Option<Arc<ComponentDefinition>>,
    ambiguous: bool,
}

/// 组件提供者
pub struct ComponentProvider {
    container: DiContainer,
    query: TypeDescriptor,
    qualifiers: Vec<Qualifier>,
    cache: Mutex<Option<CachedResolution>>,
}

impl ComponentProvider {
    /// 创建解析句柄
    pub fn new(container: DiContainer, query: TypeDescriptor, qualifiers: Vec<Qualifier>) -> Self {
        Self {
            container,
            query,
            qualifiers,
            cache: Mutex::new(None),
        }
    }

    /// 查询类型
    pub fn query(&self) -> &TypeDescriptor {
        &self.query
    }

    /// 查询限定符
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    fn resolution(&self) -> CachedResolution {
        let registry = self.container.registry();
        let generation = registry.generation();
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.generation == generation {
                return cached.clone();
            }
        }

        let all = registry.resolve_all(&self.query, &self.qualifiers);
        let (selected, ambiguous) = match registry.resolve(&self.query, &self.qualifiers) {
            Ok(definition) => (Some(definition), false),
            Err(e) => (None, e.is_ambiguous()),
        };
        debug!(
            "提供者重新解析 {} (代数 {}): {} 个候选",
            self.query,
            generation,
            all.len()
        );
        let fresh = CachedResolution {
            generation,
            all: Arc::new(all),
            selected,
            ambiguous,
        };
        *cache = Some(fresh.clone());
        fresh
    }

    /// 唯一胜出组件的引用
    pub fn get(&self) -> DependencyResult<Reference> {
        match self.resolution().selected {
            Some(definition) => self.container.reference_top_level(&definition),
            // 重新解析以得到准确的错误
            None => self.container.resolve(&self.query, &self.qualifiers),
        }
    }

    /// 解析并取出为 `U` 的视图
    pub fn get_as<U: ?Sized + 'static>(&self) -> DependencyResult<Arc<U>> {
        self.get()?.get::<U>()
    }

    /// 全部匹配组件的引用，按优先级降序
    pub fn iter_all(&self) -> DependencyResult<Vec<Reference>> {
        self.container.references(&self.resolution().all)
    }

    /// 没有任何候选
    pub fn is_unsatisfied(&self) -> bool {
        let resolution = self.resolution();
        resolution.selected.is_none() && !resolution.ambiguous
    }

    /// 存在多个同等优先级的候选
    pub fn is_ambiguous(&self) -> bool {
        self.resolution().ambiguous
    }

    /// 追加限定符后的子提供者
    pub fn select(&self, qualifiers: &[Qualifier]) -> ComponentProvider {
        let mut combined = self.qualifiers.clone();
        for qualifier in qualifiers {
            if !combined.contains(qualifier) {
                combined.push(qualifier.clone());
            }
        }
        ComponentProvider::new(self.container.clone(), self.query.clone(), combined)
    }
}
