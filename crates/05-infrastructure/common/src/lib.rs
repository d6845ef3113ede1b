//! # Infrastructure Common
//!
//! 这个 crate 提供了组件容器各层共用的基础设施：
//!
//! - [`errors`] - 依赖解析、注册、生命周期与配置的错误类型
//! - [`logging`] - 基于 `tracing-subscriber` 的日志系统初始化
//!
//! ## 错误分类
//!
//! 稳态解析只会产生 [`DependencyError`]；结构性冲突（重复名称、空类型集合等）
//! 在注册阶段以 [`RegistrationError`] 报告。

pub mod errors;
pub mod logging;

pub use errors::*;
pub use logging::{init_logging, LoggingConfig};
