//! 组件注册表与解析器
//!
//! 按原始类型索引候选组件 (定义, 声明类型)。解析时过滤类型与限定符，
//! 计算部署优先级，唯一最高者胜出；并列最高报告歧义，没有幸存者报告无法满足。
//!
//! 索引采用“复制后发布”：写入方克隆当前索引、修改后整体替换，并递增代数；
//! 读取方只持有某一代的快照，解析过程中不持有任何锁。
//! 子注册表在本地没有某原始类型的候选时委托给父注册表。

use crate::config::ContainerConfig;
use di_abstractions::qualifier::{default_qualifier, describe_qualifiers};
use di_abstractions::{ComponentDefinition, DefinitionKey, Qualifier, RawType, TypeDescriptor};
use infrastructure_common::{
    DependencyError, DependencyResult, RegistrationError, RegistrationResult,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 部署优先级策略
#[derive(Debug, Clone)]
pub struct PriorityPolicy {
    local_bonus: i64,
    default_priority: i32,
    enabled_alternatives: HashMap<String, i32>,
    stereotype_priorities: HashMap<String, i32>,
    alternative_stereotypes: HashSet<String>,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::from_config(&ContainerConfig::default())
    }
}

impl PriorityPolicy {
    /// 从容器配置构造策略
    pub fn from_config(config: &ContainerConfig) -> Self {
        Self {
            local_bonus: i64::from(config.local_priority_bonus),
            default_priority: config.default_priority,
            enabled_alternatives: config.enabled_alternatives.clone(),
            stereotype_priorities: config.stereotype_priorities.clone(),
            alternative_stereotypes: config.alternative_stereotypes.iter().cloned().collect(),
        }
    }

    /// 本地优先级加成
    pub fn local_bonus(&self) -> i64 {
        self.local_bonus
    }

    /// 定义的部署优先级，负数表示不参与解析
    ///
    /// - 未声明优先级时使用默认优先级
    /// - 备选组件只有在策略中启用时才参与，优先级为启用优先级 + 1
    /// - 构造型配置了优先级时取较大值
    /// - 未配置优先级的备选构造型会禁用默认优先级的定义
    pub fn deployment_priority(&self, definition: &ComponentDefinition) -> i32 {
        let mut priority = definition.priority().unwrap_or(self.default_priority);

        if definition.is_alternative() {
            match self.enabled_alternatives.get(definition.key().as_ref()) {
                Some(enabled) => priority = enabled.saturating_add(1),
                None => return -1,
            }
        }

        for stereotype in definition.stereotypes() {
            if let Some(configured) = self.stereotype_priorities.get(stereotype.as_ref()) {
                priority = priority.max(*configured);
            } else if self.alternative_stereotypes.contains(stereotype.as_ref())
                && priority == self.default_priority
            {
                return -1;
            }
        }

        priority
    }
}

/// 候选项：定义及其在该原始类型下声明的类型
#[derive(Debug, Clone)]
pub struct Candidate {
    pub definition: Arc<ComponentDefinition>,
    pub declared: TypeDescriptor,
}

/// 带有效优先级的解析结果
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub definition: Arc<ComponentDefinition>,
    pub priority: i64,
}

#[derive(Debug, Clone, Default)]
struct RegistryIndex {
    definitions: Vec<Arc<ComponentDefinition>>,
    by_key: HashMap<DefinitionKey, Arc<ComponentDefinition>>,
    by_raw: HashMap<RawType, Vec<Candidate>>,
    by_name: HashMap<Arc<str>, Vec<Arc<ComponentDefinition>>>,
}

/// 组件注册表
#[derive(Debug)]
pub struct ComponentRegistry {
    index: RwLock<Arc<RegistryIndex>>,
    generation: AtomicU64,
    parent: Option<Arc<ComponentRegistry>>,
    policy: PriorityPolicy,
}

impl ComponentRegistry {
    /// 根注册表
    pub fn new(policy: PriorityPolicy) -> Self {
        Self {
            index: RwLock::new(Arc::new(RegistryIndex::default())),
            generation: AtomicU64::new(0),
            parent: None,
            policy,
        }
    }

    /// 创建子注册表
    pub fn with_parent(parent: Arc<ComponentRegistry>, policy: PriorityPolicy) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(policy)
        }
    }

    /// 父注册表
    pub fn parent(&self) -> Option<&Arc<ComponentRegistry>> {
        self.parent.as_ref()
    }

    /// 优先级策略
    pub fn policy(&self) -> &PriorityPolicy {
        &self.policy
    }

    /// 注册表代数，包含父注册表的代数
    pub fn generation(&self) -> u64 {
        let local = self.generation.load(Ordering::Acquire);
        match &self.parent {
            Some(parent) => local + parent.generation(),
            None => local,
        }
    }

    fn snapshot(&self) -> Arc<RegistryIndex> {
        self.index.read().clone()
    }

    /// 注册组件定义
    ///
    /// 重复的定义键、非备选定义之间重复的名称，以及无法索引的声明类型都会被拒绝。
    pub fn register(&self, definition: Arc<ComponentDefinition>) -> RegistrationResult<()> {
        if let Some(parent) = &self.parent {
            if parent.get(definition.key()).is_some() {
                return Err(RegistrationError::DuplicateDefinition {
                    id: definition.key().to_string(),
                });
            }
        }

        let mut keys = Vec::with_capacity(definition.types().len());
        for declared in definition.types() {
            match declared.index_key() {
                Some(raw) => keys.push((raw.clone(), declared.clone())),
                None => {
                    return Err(RegistrationError::UnsupportedType {
                        id: definition.key().to_string(),
                        type_name: declared.to_string(),
                    })
                }
            }
        }

        let mut guard = self.index.write();
        if guard.by_key.contains_key(definition.key()) {
            return Err(RegistrationError::DuplicateDefinition {
                id: definition.key().to_string(),
            });
        }
        if let Some(name) = definition.name() {
            if !definition.is_alternative() {
                let existing = guard.by_name.get(name).and_then(|defs| {
                    defs.iter().find(|d| !d.is_alternative())
                });
                if let Some(existing) = existing {
                    return Err(RegistrationError::DuplicateName {
                        name: name.to_string(),
                        existing: existing.key().to_string(),
                        duplicate: definition.key().to_string(),
                    });
                }
            }
        }

        let index = Arc::make_mut(&mut *guard);
        index.definitions.push(definition.clone());
        index
            .by_key
            .insert(definition.key().clone(), definition.clone());
        for (raw, declared) in keys {
            index.by_raw.entry(raw).or_default().push(Candidate {
                definition: definition.clone(),
                declared,
            });
        }
        if let Some(name) = definition.name() {
            index
                .by_name
                .entry(Arc::from(name))
                .or_default()
                .push(definition.clone());
        }
        drop(guard);

        self.generation.fetch_add(1, Ordering::AcqRel);
        info!(
            "注册组件: {} ({}, 作用域 {})",
            definition.key(),
            definition.type_name(),
            definition.scope()
        );
        Ok(())
    }

    /// 按键查找定义（含父注册表）
    pub fn get(&self, key: &str) -> Option<Arc<ComponentDefinition>> {
        self.snapshot()
            .by_key
            .get(key)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.get(key)))
    }

    /// 定义是否由本注册表注册
    pub fn owns(&self, definition: &ComponentDefinition) -> bool {
        self.snapshot()
            .by_key
            .get(definition.key())
            .map_or(false, |d| std::ptr::eq(Arc::as_ptr(d), definition))
    }

    /// 本地注册的定义，按注册顺序
    pub fn definitions(&self) -> Vec<Arc<ComponentDefinition>> {
        self.snapshot().definitions.clone()
    }

    /// 本注册表及父注册表中的全部定义
    pub fn all_definitions(&self) -> Vec<Arc<ComponentDefinition>> {
        let mut all = self
            .parent
            .as_ref()
            .map(|p| p.all_definitions())
            .unwrap_or_default();
        all.extend(self.definitions());
        all
    }

    /// 本注册表中的定义数量
    pub fn len(&self) -> usize {
        self.snapshot().definitions.len()
    }

    /// 是否没有定义
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 部署优先级
    pub fn deployment_priority(&self, definition: &ComponentDefinition) -> i32 {
        self.policy.deployment_priority(definition)
    }

    /// 解析 (类型, 限定符) 查询，返回唯一胜出的定义
    pub fn resolve(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Arc<ComponentDefinition>> {
        let qualifiers = normalize_query(qualifiers);
        let ranked = self.ranked_candidates(query, &qualifiers);

        if ranked.is_empty() {
            debug!("无法满足的依赖: {} {}", query, describe_qualifiers(&qualifiers));
            return Err(DependencyError::UnsatisfiedResolution {
                type_name: query.to_string(),
                qualifiers: describe_qualifiers(&qualifiers),
                available: self.available_for(query),
            });
        }

        select_winner(ranked, || query.to_string(), &qualifiers).map(|winner| {
            debug!(
                "解析 {} {} → {}",
                query,
                describe_qualifiers(&qualifiers),
                winner.key()
            );
            winner
        })
    }

    /// 全部匹配的已启用定义，跨层级合并，按优先级降序、注册顺序排列
    pub fn resolve_all(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> Vec<Arc<ComponentDefinition>> {
        let qualifiers = normalize_query(qualifiers);
        let mut ranked = self.ranked_all(query, &qualifiers, true);
        // 稳定排序，保持注册顺序
        ranked.sort_by(|a, b| b.priority.cmp(&a.priority));
        ranked.into_iter().map(|r| r.definition).collect()
    }

    /// 按名称解析
    pub fn resolve_by_name(&self, name: &str) -> DependencyResult<Arc<ComponentDefinition>> {
        let snapshot = self.snapshot();
        let local = snapshot.by_name.get(name).filter(|defs| !defs.is_empty());
        let Some(defs) = local else {
            return match &self.parent {
                Some(parent) => parent.resolve_by_name(name),
                None => Err(DependencyError::NameNotFound {
                    name: name.to_string(),
                }),
            };
        };

        let ranked = self.rank(defs.iter().cloned(), true);
        if ranked.is_empty() {
            return Err(DependencyError::NameNotFound {
                name: name.to_string(),
            });
        }
        select_winner(ranked, || format!("name={}", name), &[])
    }

    /// 本层（或委托父层）的已排序候选，用于单一解析
    fn ranked_candidates(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> Vec<RankedCandidate> {
        let Some(raw) = query.index_key() else {
            return Vec::new();
        };
        let snapshot = self.snapshot();
        match snapshot.by_raw.get(raw).filter(|c| !c.is_empty()) {
            Some(candidates) => self.rank(matching(candidates, query, qualifiers), true),
            None => match &self.parent {
                Some(parent) => parent.ranked_candidates(query, qualifiers),
                None => Vec::new(),
            },
        }
    }

    /// 跨层级的全部候选，只有发起解析的一层获得本地加成
    fn ranked_all(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
        local: bool,
    ) -> Vec<RankedCandidate> {
        let mut ranked = match query.index_key() {
            Some(raw) => {
                let snapshot = self.snapshot();
                match snapshot.by_raw.get(raw) {
                    Some(candidates) => self.rank(matching(candidates, query, qualifiers), local),
                    None => Vec::new(),
                }
            }
            None => Vec::new(),
        };
        if let Some(parent) = &self.parent {
            for candidate in parent.ranked_all(query, qualifiers, false) {
                if !ranked
                    .iter()
                    .any(|r| r.definition.key() == candidate.definition.key())
                {
                    ranked.push(candidate);
                }
            }
        }
        ranked
    }

    /// 计算有效优先级，去重并排除负优先级
    fn rank(
        &self,
        definitions: impl Iterator<Item = Arc<ComponentDefinition>>,
        local: bool,
    ) -> Vec<RankedCandidate> {
        let bonus = if local { self.policy.local_bonus } else { 0 };
        let mut seen = HashSet::new();
        definitions
            .filter(|d| seen.insert(d.key().clone()))
            .filter_map(|definition| {
                let priority = self.policy.deployment_priority(&definition);
                if priority < 0 {
                    return None;
                }
                Some(RankedCandidate {
                    priority: i64::from(priority) + bonus,
                    definition,
                })
            })
            .collect()
    }

    /// 同一原始类型下的已注册定义，用于诊断
    fn available_for(&self, query: &TypeDescriptor) -> Vec<String> {
        let Some(raw) = query.index_key() else {
            return Vec::new();
        };
        let snapshot = self.snapshot();
        match snapshot.by_raw.get(raw) {
            Some(candidates) => {
                let mut seen = HashSet::new();
                candidates
                    .iter()
                    .filter(|c| seen.insert(c.definition.key().clone()))
                    .map(|c| {
                        format!(
                            "{}{}",
                            c.definition.key(),
                            describe_qualifiers(c.definition.qualifiers())
                        )
                    })
                    .collect()
            }
            None => self
                .parent
                .as_ref()
                .map(|p| p.available_for(query))
                .unwrap_or_default(),
        }
    }
}

/// 空查询等价于 `{Default}`
fn normalize_query(qualifiers: &[Qualifier]) -> Vec<Qualifier> {
    if qualifiers.is_empty() {
        vec![default_qualifier()]
    } else {
        qualifiers.to_vec()
    }
}

/// 定义的限定符是否满足查询
///
/// 查询含 `Any` 时，其余查询限定符都必须出现在定义上；
/// 否则定义的每个限定符都必须在查询中找到匹配。
pub fn qualifiers_satisfied(definition: &ComponentDefinition, qualifiers: &[Qualifier]) -> bool {
    if qualifiers.iter().any(Qualifier::is_any) {
        qualifiers
            .iter()
            .filter(|q| !q.is_any())
            .all(|q| {
                let binding = q.binding();
                definition.qualifiers().iter().any(|own| binding.is_match(own))
            })
    } else {
        definition.matches_qualifiers(qualifiers)
    }
}

fn matching<'a>(
    candidates: &'a [Candidate],
    query: &'a TypeDescriptor,
    qualifiers: &'a [Qualifier],
) -> impl Iterator<Item = Arc<ComponentDefinition>> + 'a {
    candidates
        .iter()
        .filter(move |c| query.is_assignable_from(&c.declared))
        .filter(move |c| qualifiers_satisfied(&c.definition, qualifiers))
        .map(|c| c.definition.clone())
}

fn select_winner(
    ranked: Vec<RankedCandidate>,
    describe: impl FnOnce() -> String,
    qualifiers: &[Qualifier],
) -> DependencyResult<Arc<ComponentDefinition>> {
    let max = ranked.iter().map(|r| r.priority).max().unwrap_or(i64::MIN);
    let mut tied: Vec<Arc<ComponentDefinition>> = ranked
        .into_iter()
        .filter(|r| r.priority == max)
        .map(|r| r.definition)
        .collect();

    if tied.len() == 1 {
        return Ok(tied.remove(0));
    }
    Err(DependencyError::AmbiguousResolution {
        type_name: describe(),
        qualifiers: describe_qualifiers(qualifiers),
        candidates: tied.iter().map(|d| d.key().to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::qualifier::{any_qualifier, named};
    use di_abstractions::ScopeMarker;

    struct Foo;
    struct Bar;

    fn foo(id: &str) -> di_abstractions::DefinitionBuilder<Foo> {
        ComponentDefinition::builder::<Foo>(id).factory(|_| Ok(Foo))
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(PriorityPolicy::default())
    }

    fn foo_type() -> TypeDescriptor {
        TypeDescriptor::of::<Foo>()
    }

    #[test]
    fn test_default_and_named_resolution() {
        let registry = registry();
        registry.register(foo("a").build().unwrap()).unwrap();
        registry
            .register(foo("b").named("x").build().unwrap())
            .unwrap();

        let a = registry.resolve(&foo_type(), &[default_qualifier()]).unwrap();
        assert_eq!(a.key().as_ref(), "a");
        let b = registry.resolve(&foo_type(), &[named("x")]).unwrap();
        assert_eq!(b.key().as_ref(), "b");
        let fallback = registry.resolve(&foo_type(), &[]).unwrap();
        assert_eq!(fallback.key().as_ref(), "a");
    }

    #[test]
    fn test_union_of_qualifiers_is_ambiguous() {
        let registry = registry();
        registry.register(foo("a").build().unwrap()).unwrap();
        registry
            .register(foo("b").named("x").build().unwrap())
            .unwrap();
        let err = registry
            .resolve(&foo_type(), &[default_qualifier(), named("x")])
            .unwrap_err();
        assert!(err.is_ambiguous());
    }

    #[test]
    fn test_equal_priority_is_ambiguous_naming_all() {
        let registry = registry();
        for id in ["c", "d"] {
            registry
                .register(
                    ComponentDefinition::builder::<Bar>(id)
                        .priority(1)
                        .factory(|_| Ok(Bar))
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        match registry.resolve(&TypeDescriptor::of::<Bar>(), &[default_qualifier()]) {
            Err(DependencyError::AmbiguousResolution { candidates, .. }) => {
                assert_eq!(candidates, vec!["c".to_string(), "d".to_string()]);
            }
            other => panic!("unexpected: {:?}", other.map(|d| d.key().to_string())),
        }
    }

    #[test]
    fn test_higher_priority_wins() {
        let registry = registry();
        registry.register(foo("low").build().unwrap()).unwrap();
        registry
            .register(foo("high").priority(5).build().unwrap())
            .unwrap();
        let winner = registry.resolve(&foo_type(), &[]).unwrap();
        assert_eq!(winner.key().as_ref(), "high");
    }

    #[test]
    fn test_unsatisfied_lists_available() {
        let registry = registry();
        registry
            .register(foo("b").named("x").build().unwrap())
            .unwrap();
        match registry.resolve(&foo_type(), &[]) {
            Err(DependencyError::UnsatisfiedResolution { available, .. }) => {
                assert_eq!(available.len(), 1);
                assert!(available[0].starts_with('b'));
            }
            other => panic!("unexpected: {:?}", other.map(|d| d.key().to_string())),
        }
        assert!(registry
            .resolve(&TypeDescriptor::of::<Bar>(), &[])
            .unwrap_err()
            .is_unsatisfied());
    }

    #[test]
    fn test_any_matches_every_definition() {
        let registry = registry();
        registry.register(foo("a").build().unwrap()).unwrap();
        registry
            .register(foo("b").named("x").build().unwrap())
            .unwrap();
        let all = registry.resolve_all(&foo_type(), &[any_qualifier()]);
        assert_eq!(all.len(), 2);
        let only_b = registry.resolve(&foo_type(), &[any_qualifier(), named("x")]).unwrap();
        assert_eq!(only_b.key().as_ref(), "b");
    }

    #[test]
    fn test_alternatives_and_stereotypes() {
        let config = ContainerConfig::default()
            .enable_alternative("mock", 0)
            .with_stereotype_priority("Preferred", 7)
            .with_alternative_stereotype("Test");
        let policy = PriorityPolicy::from_config(&config);

        let real = foo("real").build().unwrap();
        let mock = foo("mock").alternative().build().unwrap();
        let disabled = foo("other_mock").alternative().build().unwrap();
        let preferred = foo("preferred").stereotype("Preferred").build().unwrap();
        let test_only = foo("test_only").stereotype("Test").build().unwrap();

        assert_eq!(policy.deployment_priority(&real), 0);
        assert_eq!(policy.deployment_priority(&mock), 1);
        assert_eq!(policy.deployment_priority(&disabled), -1);
        assert_eq!(policy.deployment_priority(&preferred), 7);
        assert_eq!(policy.deployment_priority(&test_only), -1);

        let registry = ComponentRegistry::new(policy);
        registry.register(real).unwrap();
        registry.register(mock).unwrap();
        registry.register(disabled).unwrap();
        let winner = registry.resolve(&foo_type(), &[]).unwrap();
        assert_eq!(winner.key().as_ref(), "mock");
        let all: Vec<String> = registry
            .resolve_all(&foo_type(), &[])
            .iter()
            .map(|d| d.key().to_string())
            .collect();
        assert_eq!(all, vec!["mock", "real"]);
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let registry = registry();
        registry.register(foo("a").named("x").build().unwrap()).unwrap();
        assert!(matches!(
            registry.register(foo("a").build().unwrap()),
            Err(RegistrationError::DuplicateDefinition { .. })
        ));
        assert!(matches!(
            registry.register(foo("b").named("x").build().unwrap()),
            Err(RegistrationError::DuplicateName { .. })
        ));
        // 备选组件可以与普通组件同名
        registry
            .register(foo("c").named("x").alternative().build().unwrap())
            .unwrap();
    }

    #[test]
    fn test_unindexable_type_is_rejected() {
        let registry = registry();
        let definition = foo("wild")
            .exposes_type(TypeDescriptor::variable("T"))
            .build()
            .unwrap();
        assert!(matches!(
            registry.register(definition),
            Err(RegistrationError::UnsupportedType { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_child_defers_to_parent() {
        let parent = Arc::new(registry());
        parent.register(foo("parent_foo").build().unwrap()).unwrap();
        parent
            .register(
                ComponentDefinition::builder::<Bar>("parent_bar")
                    .named("bar")
                    .factory(|_| Ok(Bar))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let child = ComponentRegistry::with_parent(parent.clone(), PriorityPolicy::default());
        let g0 = child.generation();
        child
            .register(
                ComponentDefinition::builder::<Bar>("child_bar")
                    .scope(ScopeMarker::singleton())
                    .factory(|_| Ok(Bar))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert!(child.generation() > g0);

        // 本地没有 Foo，委托给父注册表
        assert_eq!(
            child.resolve(&foo_type(), &[]).unwrap().key().as_ref(),
            "parent_foo"
        );
        // 本地有 Bar，不再查看父注册表
        assert_eq!(
            child
                .resolve(&TypeDescriptor::of::<Bar>(), &[])
                .unwrap()
                .key()
                .as_ref(),
            "child_bar"
        );
        // resolve_all 跨层级合并
        let all = child.resolve_all(&TypeDescriptor::of::<Bar>(), &[any_qualifier()]);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key().as_ref(), "child_bar");
        // 名称委托
        assert_eq!(
            child.resolve_by_name("bar").unwrap().key().as_ref(),
            "parent_bar"
        );
        assert!(matches!(
            child.resolve_by_name("missing"),
            Err(DependencyError::NameNotFound { .. })
        ));
        // 父注册表中已存在的键不能在子注册表重复注册
        assert!(matches!(
            child.register(foo("parent_foo").build().unwrap()),
            Err(RegistrationError::DuplicateDefinition { .. })
        ));
        assert!(parent.generation() < child.generation());
    }

    #[test]
    fn test_generic_candidates_use_argument_invariance() {
        let list = RawType::builder("List").param("E").build();
        let string = TypeDescriptor::class(RawType::named("String"));
        let int = TypeDescriptor::class(RawType::named("Integer"));
        let registry = registry();
        registry
            .register(
                foo("strings")
                    .exposes_type(
                        TypeDescriptor::parameterized(list.clone(), vec![string.clone()]).unwrap(),
                    )
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                foo("ints")
                    .exposes_type(TypeDescriptor::parameterized(list.clone(), vec![int]).unwrap())
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let query = TypeDescriptor::parameterized(list.clone(), vec![string]).unwrap();
        assert_eq!(
            registry.resolve(&query, &[]).unwrap().key().as_ref(),
            "strings"
        );
        let wildcard =
            TypeDescriptor::parameterized(list, vec![TypeDescriptor::wildcard()]).unwrap();
        assert_eq!(registry.resolve_all(&wildcard, &[]).len(), 2);
    }
}
