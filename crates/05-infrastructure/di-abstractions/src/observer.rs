//! 观察者条目
//!
//! 观察者声明一个事件类型与一组限定符；事件触发时，事件类型可接受层次节点
//! 且限定符全部匹配的观察者会被调用。

use crate::definition::BoxError;
use crate::instance::Instance;
use crate::qualifier::{all_bindings_match, Qualifier, QualifierBinding};
use crate::types::TypeDescriptor;
use std::fmt;
use std::sync::Arc;

/// 观察者回调
pub type ObserverFn = Arc<dyn Fn(&EventContext<'_>) -> Result<(), BoxError> + Send + Sync>;

/// 传给观察者的事件
pub struct EventContext<'a> {
    event: &'a Instance,
    descriptor: &'a TypeDescriptor,
    qualifiers: &'a [Qualifier],
}

impl<'a> EventContext<'a> {
    /// 构造事件上下文
    pub fn new(
        event: &'a Instance,
        descriptor: &'a TypeDescriptor,
        qualifiers: &'a [Qualifier],
    ) -> Self {
        Self {
            event,
            descriptor,
            qualifiers,
        }
    }

    /// 事件值
    pub fn event(&self) -> &Instance {
        self.event
    }

    /// 事件的具体类型描述符
    pub fn descriptor(&self) -> &TypeDescriptor {
        self.descriptor
    }

    /// 触发限定符
    pub fn qualifiers(&self) -> &[Qualifier] {
        self.qualifiers
    }

    /// 按具体类型或视图取出事件值
    pub fn get<E: ?Sized + 'static>(&self) -> Option<Arc<E>> {
        self.event.get::<E>()
    }
}

/// 观察者条目，注册后不可变
#[derive(Clone)]
pub struct ObserverEntry {
    name: Arc<str>,
    event_type: TypeDescriptor,
    qualifiers: Vec<Qualifier>,
    bindings: Vec<QualifierBinding>,
    target: ObserverFn,
}

impl ObserverEntry {
    /// 使用类型擦除的回调创建观察者
    pub fn new<F>(
        name: impl Into<Arc<str>>,
        event_type: TypeDescriptor,
        qualifiers: Vec<Qualifier>,
        target: F,
    ) -> Self
    where
        F: Fn(&EventContext<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let bindings = qualifiers.iter().map(Qualifier::binding).collect();
        Self {
            name: name.into(),
            event_type,
            qualifiers,
            bindings,
            target: Arc::new(target),
        }
    }

    /// 按具体事件类型 `E` 观察
    ///
    /// 事件值无法取出为 `E` 时返回错误。
    pub fn typed<E, F>(name: impl Into<Arc<str>>, qualifiers: Vec<Qualifier>, target: F) -> Self
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::new(name, TypeDescriptor::of::<E>(), qualifiers, move |ctx| {
            match ctx.get::<E>() {
                Some(event) => target(&event),
                None => Err(format!(
                    "事件 {} 不是 {}",
                    ctx.event().type_name(),
                    std::any::type_name::<E>()
                )
                .into()),
            }
        })
    }

    /// 观察者名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 观察的事件类型
    pub fn event_type(&self) -> &TypeDescriptor {
        &self.event_type
    }

    /// 声明的限定符
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    /// 限定符的比较视图
    pub fn bindings(&self) -> &[QualifierBinding] {
        &self.bindings
    }

    /// 事件类型可接受层次节点，且每个绑定都能在触发限定符中找到匹配
    pub fn is_match(&self, node: &TypeDescriptor, qualifiers: &[Qualifier]) -> bool {
        self.event_type.is_assignable_from(node) && all_bindings_match(&self.bindings, qualifiers)
    }

    /// 通知观察者
    pub fn notify(&self, ctx: &EventContext<'_>) -> Result<(), BoxError> {
        (self.target)(ctx)
    }
}

impl fmt::Debug for ObserverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverEntry")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .field("qualifiers", &self.qualifiers)
            .finish()
    }
}

/// 容器构建完成后触发的事件
#[derive(Debug, Clone)]
pub struct ContainerInitialized {
    pub container_id: uuid::Uuid,
    pub definitions: usize,
}

/// 容器关闭、销毁单例之前触发的事件
#[derive(Debug, Clone)]
pub struct ContainerShutdown {
    pub container_id: uuid::Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualifier::{any_qualifier, default_qualifier, named};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping(u32);

    #[test]
    fn test_typed_observer_receives_value() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let entry = ObserverEntry::typed::<Ping, _>("on_ping", Vec::new(), move |ping| {
            counter.fetch_add(ping.0 as usize, Ordering::SeqCst);
            Ok(())
        });

        let event = Instance::new(Ping(5));
        let descriptor = TypeDescriptor::of::<Ping>();
        let firing = [any_qualifier()];
        assert!(entry.is_match(&descriptor, &firing));
        entry
            .notify(&EventContext::new(&event, &descriptor, &firing))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);

        let wrong = Instance::new(1_u8);
        assert!(entry
            .notify(&EventContext::new(&wrong, &descriptor, &firing))
            .is_err());
    }

    #[test]
    fn test_qualifier_bindings_filter() {
        let entry = ObserverEntry::new(
            "named_only",
            TypeDescriptor::of::<Ping>(),
            vec![named("x")],
            |_| Ok(()),
        );
        let descriptor = TypeDescriptor::of::<Ping>();
        assert!(entry.is_match(&descriptor, &[any_qualifier(), named("x")]));
        assert!(!entry.is_match(&descriptor, &[any_qualifier(), default_qualifier()]));
        assert!(!entry.is_match(&TypeDescriptor::of::<u8>(), &[named("x")]));
    }
}
