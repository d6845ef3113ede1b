//! 组件定义
//!
//! 组件定义描述如何产生和销毁某个类型的实例：声明的类型集合、限定符、
//! 作用域、可选名称、优先级，以及工厂与销毁器。注册后不可变。

use crate::instance::{Instance, ViewTable};
use crate::qualifier::{all_bindings_match, default_qualifier, named, Qualifier, QualifierBinding};
use crate::resolver::ResolutionContext;
use crate::scope::ScopeMarker;
use crate::types::TypeDescriptor;
use infrastructure_common::{DependencyError, DependencyResult, RegistrationError};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 组件定义的唯一键
pub type DefinitionKey = Arc<str>;

/// 工厂与销毁器返回的装箱错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 组件工厂 trait
///
/// 构建分两个阶段：`create` 产生实例，实例登记到创建上下文后再执行 `inject`，
/// 因此字段式的循环引用可以拿到已登记的实例。
pub trait ComponentFactory: Send + Sync {
    /// 创建组件实例
    fn create(&self, ctx: &ResolutionContext<'_>) -> DependencyResult<Instance>;

    /// 注入阶段
    fn inject(&self, _instance: &Instance, _ctx: &ResolutionContext<'_>) -> DependencyResult<()> {
        Ok(())
    }

    /// 构建完成回调
    fn post_construct(&self, _instance: &Instance) -> DependencyResult<()> {
        Ok(())
    }
}

/// 组件销毁器 trait
pub trait ComponentDestroyer: Send + Sync {
    /// 销毁组件实例
    fn destroy(&self, instance: &Instance) -> Result<(), BoxError>;
}

/// 声明的注入点，用于构建期验证
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    pub descriptor: TypeDescriptor,
    pub qualifiers: Vec<Qualifier>,
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.descriptor,
            crate::qualifier::describe_qualifiers(&self.qualifiers)
        )
    }
}

/// 组件定义
pub struct ComponentDefinition {
    key: DefinitionKey,
    type_name: &'static str,
    types: Vec<TypeDescriptor>,
    qualifiers: Vec<Qualifier>,
    bindings: Vec<QualifierBinding>,
    scope: ScopeMarker,
    name: Option<Arc<str>>,
    priority: Option<i32>,
    alternative: bool,
    stereotypes: Vec<Arc<str>>,
    injection_points: Vec<InjectionPoint>,
    views: Arc<ViewTable>,
    factory: Arc<dyn ComponentFactory>,
    destroyer: Option<Arc<dyn ComponentDestroyer>>,
}

impl ComponentDefinition {
    /// 为具体类型 `T` 创建定义构建器，类型集合初始包含 `T` 自身
    pub fn builder<T: Send + Sync + 'static>(id: impl Into<DefinitionKey>) -> DefinitionBuilder<T> {
        DefinitionBuilder::new(id.into())
    }

    /// 定义键
    pub fn key(&self) -> &DefinitionKey {
        &self.key
    }

    /// 实现类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 声明的类型集合
    pub fn types(&self) -> &[TypeDescriptor] {
        &self.types
    }

    /// 声明的限定符
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    /// 限定符的比较视图
    pub fn bindings(&self) -> &[QualifierBinding] {
        &self.bindings
    }

    /// 作用域标记
    pub fn scope(&self) -> &ScopeMarker {
        &self.scope
    }

    /// 组件名称
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// 显式声明的优先级
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// 是否为备选组件
    pub fn is_alternative(&self) -> bool {
        self.alternative
    }

    /// 构造型
    pub fn stereotypes(&self) -> &[Arc<str>] {
        &self.stereotypes
    }

    /// 声明的注入点
    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }

    /// 暴露的视图表
    pub fn views(&self) -> &Arc<ViewTable> {
        &self.views
    }

    /// 实例工厂
    pub fn factory(&self) -> &Arc<dyn ComponentFactory> {
        &self.factory
    }

    /// 每个绑定的限定符都在查询限定符中有匹配
    pub fn matches_qualifiers(&self, qualifiers: &[Qualifier]) -> bool {
        all_bindings_match(&self.bindings, qualifiers)
    }

    /// 查询类型能否接受声明类型集合中的某个类型
    pub fn has_type(&self, query: &TypeDescriptor) -> bool {
        self.types.iter().any(|t| query.is_assignable_from(t))
    }

    /// 为工厂产出的实例附加本定义的视图表
    pub fn wrap(&self, instance: Instance) -> Instance {
        instance.with_views(self.views.clone())
    }

    /// 调用销毁器，没有销毁器时直接成功
    pub fn destroy(&self, instance: &Instance) -> Result<(), BoxError> {
        match &self.destroyer {
            Some(destroyer) => destroyer.destroy(instance),
            None => Ok(()),
        }
    }

    /// 是否带有销毁器
    pub fn has_destroyer(&self) -> bool {
        self.destroyer.is_some()
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("key", &self.key)
            .field("type_name", &self.type_name)
            .field("types", &self.types)
            .field("qualifiers", &self.qualifiers)
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("alternative", &self.alternative)
            .finish()
    }
}

impl fmt::Display for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

type CreateFn<T> = Box<dyn Fn(&ResolutionContext<'_>) -> DependencyResult<T> + Send + Sync>;
type InjectFn<T> =
    Box<dyn Fn(&Arc<T>, &ResolutionContext<'_>) -> DependencyResult<()> + Send + Sync>;
type CallbackFn<T> = Box<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>;

/// 闭包工厂
struct FnFactory<T> {
    create: CreateFn<T>,
    inject: Option<InjectFn<T>>,
    post_construct: Option<CallbackFn<T>>,
    type_name: &'static str,
}

impl<T: Send + Sync + 'static> FnFactory<T> {
    fn concrete(&self, instance: &Instance) -> DependencyResult<Arc<T>> {
        instance
            .downcast::<T>()
            .ok_or_else(|| DependencyError::TypeMismatch {
                component: instance.type_name().to_string(),
                expected: self.type_name.to_string(),
            })
    }
}

impl<T: Send + Sync + 'static> ComponentFactory for FnFactory<T> {
    fn create(&self, ctx: &ResolutionContext<'_>) -> DependencyResult<Instance> {
        (self.create)(ctx).map(Instance::new)
    }

    fn inject(&self, instance: &Instance, ctx: &ResolutionContext<'_>) -> DependencyResult<()> {
        match &self.inject {
            Some(inject) => inject(&self.concrete(instance)?, ctx),
            None => Ok(()),
        }
    }

    fn post_construct(&self, instance: &Instance) -> DependencyResult<()> {
        match &self.post_construct {
            Some(callback) => callback(self.concrete(instance)?.as_ref())
                .map_err(|e| DependencyError::creation_failed(self.type_name, e)),
            None => Ok(()),
        }
    }
}

/// 闭包销毁器
struct FnDestroyer<T> {
    destroy: CallbackFn<T>,
}

impl<T: Send + Sync + 'static> ComponentDestroyer for FnDestroyer<T> {
    fn destroy(&self, instance: &Instance) -> Result<(), BoxError> {
        match instance.downcast::<T>() {
            Some(concrete) => (self.destroy)(concrete.as_ref()),
            None => Err(format!("实例类型不匹配: {}", instance.type_name()).into()),
        }
    }
}

/// 组件定义构建器
pub struct DefinitionBuilder<T> {
    key: DefinitionKey,
    types: Vec<TypeDescriptor>,
    qualifiers: Vec<Qualifier>,
    scope: ScopeMarker,
    name: Option<Arc<str>>,
    priority: Option<i32>,
    alternative: bool,
    stereotypes: Vec<Arc<str>>,
    injection_points: Vec<InjectionPoint>,
    views: ViewTable,
    create: Option<CreateFn<T>>,
    inject: Option<InjectFn<T>>,
    post_construct: Option<CallbackFn<T>>,
    pre_destroy: Option<CallbackFn<T>>,
    factory: Option<Arc<dyn ComponentFactory>>,
    destroyer: Option<Arc<dyn ComponentDestroyer>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DefinitionBuilder<T> {
    fn new(key: DefinitionKey) -> Self {
        Self {
            key,
            types: vec![TypeDescriptor::of::<T>()],
            qualifiers: Vec::new(),
            scope: ScopeMarker::dependent(),
            name: None,
            priority: None,
            alternative: false,
            stereotypes: Vec::new(),
            injection_points: Vec::new(),
            views: ViewTable::identity::<T>(),
            create: None,
            inject: None,
            post_construct: None,
            pre_destroy: None,
            factory: None,
            destroyer: None,
            _marker: PhantomData,
        }
    }

    /// 暴露为类型 `U`（通常是 trait 对象），同时登记对应的视图
    pub fn exposes<U: ?Sized + 'static>(
        mut self,
        descriptor: TypeDescriptor,
        cast: fn(Arc<T>) -> Arc<U>,
    ) -> Self {
        self.views.insert::<T, U>(cast);
        self.push_type(descriptor);
        self
    }

    /// 只声明类型，不登记视图
    pub fn exposes_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.push_type(descriptor);
        self
    }

    /// 声明类型及其全部祖先
    pub fn exposes_hierarchy(mut self, descriptor: &TypeDescriptor) -> Self {
        for node in descriptor.hierarchy() {
            self.push_type(node);
        }
        self
    }

    /// 用给定集合替换类型集合
    pub fn typed(mut self, types: Vec<TypeDescriptor>) -> Self {
        self.types = types;
        self
    }

    fn push_type(&mut self, descriptor: TypeDescriptor) {
        if !self.types.contains(&descriptor) {
            self.types.push(descriptor);
        }
    }

    /// 追加限定符
    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// 设置作用域，默认为依赖作用域
    pub fn scope(mut self, scope: ScopeMarker) -> Self {
        self.scope = scope;
        self
    }

    /// 设置名称，同时添加 `Named` 限定符
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.qualifiers.push(named(name.clone()));
        self.name = Some(name.into());
        self
    }

    /// 设置优先级
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// 标记为备选组件，未启用时不参与解析
    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    /// 追加构造型
    pub fn stereotype(mut self, stereotype: impl Into<Arc<str>>) -> Self {
        self.stereotypes.push(stereotype.into());
        self
    }

    /// 声明注入点
    pub fn depends_on(mut self, descriptor: TypeDescriptor, qualifiers: Vec<Qualifier>) -> Self {
        self.injection_points.push(InjectionPoint {
            descriptor,
            qualifiers,
        });
        self
    }

    /// 创建闭包
    pub fn factory<F>(mut self, create: F) -> Self
    where
        F: Fn(&ResolutionContext<'_>) -> DependencyResult<T> + Send + Sync + 'static,
    {
        self.create = Some(Box::new(create));
        self
    }

    /// 注入闭包，在实例登记后执行
    pub fn inject<F>(mut self, inject: F) -> Self
    where
        F: Fn(&Arc<T>, &ResolutionContext<'_>) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.inject = Some(Box::new(inject));
        self
    }

    /// 初始化回调，注入完成后执行
    pub fn post_construct<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.post_construct = Some(Box::new(callback));
        self
    }

    /// 销毁前回调
    pub fn pre_destroy<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.pre_destroy = Some(Box::new(callback));
        self
    }

    /// 使用外部提供的工厂，优先于闭包
    pub fn factory_impl(mut self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// 使用外部提供的销毁器，优先于闭包
    pub fn destroyer(mut self, destroyer: Arc<dyn ComponentDestroyer>) -> Self {
        self.destroyer = Some(destroyer);
        self
    }

    /// 构建组件定义
    pub fn build(self) -> Result<Arc<ComponentDefinition>, RegistrationError> {
        if self.types.is_empty() {
            return Err(RegistrationError::EmptyTypeSet {
                id: self.key.to_string(),
            });
        }

        let type_name = std::any::type_name::<T>();
        let factory: Arc<dyn ComponentFactory> = match (self.factory, self.create) {
            (Some(factory), _) => factory,
            (None, Some(create)) => Arc::new(FnFactory {
                create,
                inject: self.inject,
                post_construct: self.post_construct,
                type_name,
            }),
            (None, None) => {
                return Err(RegistrationError::MissingFactory {
                    id: self.key.to_string(),
                })
            }
        };

        let destroyer = match (self.destroyer, self.pre_destroy) {
            (Some(destroyer), _) => Some(destroyer),
            (None, Some(destroy)) => {
                Some(Arc::new(FnDestroyer { destroy }) as Arc<dyn ComponentDestroyer>)
            }
            (None, None) => None,
        };

        let mut qualifiers = self.qualifiers;
        if qualifiers.is_empty() {
            qualifiers.push(default_qualifier());
        }
        let bindings = qualifiers.iter().map(Qualifier::binding).collect();

        Ok(Arc::new(ComponentDefinition {
            key: self.key,
            type_name,
            types: self.types,
            qualifiers,
            bindings,
            scope: self.scope,
            name: self.name,
            priority: self.priority,
            alternative: self.alternative,
            stereotypes: self.stereotypes,
            injection_points: self.injection_points,
            views: Arc::new(self.views),
            factory,
            destroyer,
        }))
    }
}
