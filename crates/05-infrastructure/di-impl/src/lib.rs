//! # 依赖注入具体实现
//!
//! 提供组件注册表与解析器、作用域管理、事件分发、容器与提供者句柄，
//! 以及基于 `config` crate 的容器配置。
//!
//! ```no_run
//! use di_abstractions::{ComponentDefinition, ScopeMarker};
//! use di_impl::DiContainer;
//!
//! struct Clock;
//!
//! let container = DiContainer::builder()
//!     .register(
//!         ComponentDefinition::builder::<Clock>("clock")
//!             .scope(ScopeMarker::singleton())
//!             .factory(|_| Ok(Clock))
//!             .build()?,
//!     )
//!     .build()?;
//! let clock = container.get::<Clock>()?;
//! # let _ = clock;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod config;
pub mod container;
pub mod event;
pub mod provider;
pub mod registry;
pub mod scope;

pub use builder::DiContainerBuilder;
pub use config::ContainerConfig;
pub use container::{ContainerStats, DiContainer};
pub use event::EventDispatcher;
pub use provider::ComponentProvider;
pub use registry::{ComponentRegistry, PriorityPolicy};
pub use scope::{MapScopeStore, NormalScopeContext, ScopeManager, SingletonContext};
