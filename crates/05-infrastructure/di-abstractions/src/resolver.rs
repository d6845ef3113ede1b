//! 引用解析接口
//!
//! 工厂通过 [`ResolutionContext`] 解析自身的依赖，解析在当前创建上下文中进行，
//! 从而参与循环检测与依赖链销毁。

use crate::creational::CreationalContext;
use crate::definition::ComponentDefinition;
use crate::instance::Instance;
use crate::qualifier::Qualifier;
use crate::reference::Reference;
use crate::types::TypeDescriptor;
use infrastructure_common::{DependencyError, DependencyResult};
use std::sync::Arc;

/// 引用解析器 trait
///
/// 由容器实现。代理持有它的弱引用，在每次访问时重新解析实例。
pub trait ReferenceResolver: Send + Sync {
    /// 在给定创建上下文中解析 (类型, 限定符) 查询
    fn resolve_in(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
        ctx: &CreationalContext,
    ) -> DependencyResult<Reference>;

    /// 在给定创建上下文中获取指定定义的引用
    fn reference_in(
        &self,
        definition: &Arc<ComponentDefinition>,
        ctx: &CreationalContext,
    ) -> DependencyResult<Reference>;

    /// 为客户端代理查找当前活动的实例
    fn instance_for_proxy(
        &self,
        definition: &Arc<ComponentDefinition>,
    ) -> DependencyResult<Instance>;
}

/// 工厂可见的解析上下文
pub struct ResolutionContext<'a> {
    resolver: &'a dyn ReferenceResolver,
    creational: CreationalContext,
}

impl<'a> ResolutionContext<'a> {
    /// 构造解析上下文
    pub fn new(resolver: &'a dyn ReferenceResolver, creational: CreationalContext) -> Self {
        Self {
            resolver,
            creational,
        }
    }

    /// 当前的创建上下文
    pub fn creational(&self) -> &CreationalContext {
        &self.creational
    }

    /// 底层解析器
    pub fn resolver(&self) -> &'a dyn ReferenceResolver {
        self.resolver
    }

    /// 解析依赖的引用，普通作用域依赖得到代理
    pub fn resolve(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Reference> {
        self.resolver.resolve_in(query, qualifiers, &self.creational)
    }

    /// 解析依赖并取出为 `U` 的视图
    pub fn resolve_as<U: ?Sized + 'static>(
        &self,
        query: &TypeDescriptor,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Arc<U>> {
        self.resolve(query, qualifiers)?.get::<U>()
    }

    /// 按具体类型解析依赖
    pub fn resolve_instance<T: Send + Sync + 'static>(
        &self,
        qualifiers: &[Qualifier],
    ) -> DependencyResult<Arc<T>> {
        self.resolve_as::<T>(&TypeDescriptor::of::<T>(), qualifiers)
    }

    /// 获取指定定义的引用
    pub fn reference(&self, definition: &Arc<ComponentDefinition>) -> DependencyResult<Reference> {
        self.resolver.reference_in(definition, &self.creational)
    }
}

/// 构造类型不匹配错误
pub fn type_mismatch<U: ?Sized>(definition: &ComponentDefinition) -> DependencyError {
    DependencyError::TypeMismatch {
        component: definition.key().to_string(),
        expected: std::any::type_name::<U>().to_string(),
    }
}
