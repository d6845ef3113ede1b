//! 类型擦除的组件实例
//!
//! [`Instance`] 包装 `Arc<dyn Any + Send + Sync>`，并携带一张视图表，
//! 使同一个实例既能按具体类型取出，也能按声明暴露的 trait 对象取出。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type CastFn = Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> Option<Box<dyn Any>> + Send + Sync>;

/// 视图表：目标类型 → 转换函数
#[derive(Clone, Default)]
pub struct ViewTable {
    casts: HashMap<TypeId, CastFn>,
}

impl ViewTable {
    /// 空视图表
    pub fn new() -> Self {
        Self::default()
    }

    /// 具体类型自身的视图
    pub fn identity<T: Send + Sync + 'static>() -> Self {
        let mut table = Self::new();
        table.insert::<T, T>(|value| value);
        table
    }

    /// 注册 `T` 到 `U` 的视图，通常 `U` 是 trait 对象
    pub fn insert<T, U>(&mut self, cast: fn(Arc<T>) -> Arc<U>)
    where
        T: Send + Sync + 'static,
        U: ?Sized + 'static,
    {
        let cast: CastFn = Arc::new(move |value: Arc<dyn Any + Send + Sync>| {
            value
                .downcast::<T>()
                .ok()
                .map(|concrete| Box::new(cast(concrete)) as Box<dyn Any>)
        });
        self.casts.insert(TypeId::of::<U>(), cast);
    }

    /// 是否暴露 `U` 视图
    pub fn contains<U: ?Sized + 'static>(&self) -> bool {
        self.casts.contains_key(&TypeId::of::<U>())
    }

    /// 视图数量
    pub fn len(&self) -> usize {
        self.casts.len()
    }

    /// 是否没有视图
    pub fn is_empty(&self) -> bool {
        self.casts.is_empty()
    }
}

impl fmt::Debug for ViewTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewTable")
            .field("views", &self.casts.len())
            .finish()
    }
}

/// 组件实例
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    views: Arc<ViewTable>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Instance {
    /// 包装值
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// 包装已共享的值
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value,
            views: Arc::new(ViewTable::identity::<T>()),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 替换视图表（组件定义在交付实例前附加自己的视图）
    pub fn with_views(mut self, views: Arc<ViewTable>) -> Self {
        self.views = views;
        self
    }

    /// 按具体类型或已暴露的视图取出
    pub fn get<U: ?Sized + 'static>(&self) -> Option<Arc<U>> {
        let cast = self.views.casts.get(&TypeId::of::<U>())?;
        cast(self.value.clone())?
            .downcast::<Arc<U>>()
            .ok()
            .map(|boxed| *boxed)
    }

    /// 按具体类型取出，不经过视图表
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// 具体类型是否为 `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// 底层值
    pub fn value(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.value
    }

    /// 具体类型的 `TypeId`
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 具体类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 实例地址，用作身份
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.value) as *const () as usize
    }

    /// 是否为同一个实例
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        self.addr() == other.addr()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_concrete_access() {
        let instance = Instance::new(English);
        assert!(instance.get::<English>().is_some());
        assert!(instance.downcast::<English>().is_some());
        assert!(instance.get::<String>().is_none());
        assert!(instance.is::<English>());
    }

    #[test]
    fn test_trait_view_requires_registration() {
        let instance = Instance::new(English);
        assert!(instance.get::<dyn Greeter>().is_none());

        let mut views = ViewTable::identity::<English>();
        views.insert::<English, dyn Greeter>(|value| value);
        let instance = instance.with_views(Arc::new(views));
        let greeter = instance.get::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(instance.get::<English>().is_some());
    }

    #[test]
    fn test_identity() {
        let a = Instance::new(1_u64);
        let b = a.clone();
        let c = Instance::new(1_u64);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
