//! # Dependency Injection Abstractions
//!
//! 组件容器的抽象层，定义类型匹配、限定符、作用域、组件定义与创建上下文等核心概念。
//!
//! ## 核心概念
//!
//! - [`TypeDescriptor`] - 泛型类型形态及其可赋值判断
//! - [`QualifierBinding`] - 限定符的比较视图
//! - [`ComponentDefinition`] - 组件定义（类型集合、限定符、作用域、工厂、销毁器）
//! - [`CreationalContext`] - 构建过程跟踪，负责循环检测与有序销毁
//! - [`Reference`] / [`ClientProxy`] - 解析结果与普通作用域代理
//! - [`ScopeStore`] - 普通作用域的外部存储接口
//! - [`ObserverEntry`] - 事件观察者
//! - [`ComponentDiscovery`] - 外部发现器接口

pub mod creational;
pub mod definition;
pub mod discovery;
pub mod instance;
pub mod observer;
pub mod qualifier;
pub mod reference;
pub mod resolver;
pub mod scope;
pub mod types;

pub use creational::{CreationalContext, FrameId, Lookup};
pub use definition::{
    BoxError, ComponentDefinition, ComponentDestroyer, ComponentFactory, DefinitionBuilder,
    DefinitionKey, InjectionPoint,
};
pub use discovery::{ComponentDiscovery, DiscoverySink};
pub use instance::{Instance, ViewTable};
pub use observer::{
    ContainerInitialized, ContainerShutdown, EventContext, ObserverEntry, ObserverFn,
};
pub use qualifier::{
    any_qualifier, default_qualifier, named, Qualifier, QualifierBinding, QualifierMarker,
    QualifierValue,
};
pub use reference::{ClientProxy, Reference, ReferenceTarget};
pub use resolver::{ReferenceResolver, ResolutionContext};
pub use scope::{ScopeKind, ScopeMarker, ScopeStore, StoreKey};
pub use types::{RawType, TypeBindings, TypeCatalog, TypeDescriptor, TypeShape};
