//! 组件发现接口
//!
//! 源码扫描、配置解析等发现器不在本 crate 内实现，它们通过 [`DiscoverySink`]
//! 把组件定义和观察者送入容器构建器。

use crate::definition::ComponentDefinition;
use crate::observer::ObserverEntry;
use crate::types::RawType;
use async_trait::async_trait;
use infrastructure_common::RegistrationResult;
use std::sync::Arc;

/// 发现结果的接收方
pub trait DiscoverySink: Send {
    /// 注册组件定义
    fn register_definition(
        &mut self,
        definition: Arc<ComponentDefinition>,
    ) -> RegistrationResult<()>;

    /// 注册观察者
    fn register_observer(&mut self, entry: ObserverEntry) -> RegistrationResult<()>;

    /// 声明 Rust 类型的父类型，供事件分发计算类型层次
    fn declare_type(&mut self, _raw: RawType) {}
}

/// 组件发现器 trait
#[async_trait]
pub trait ComponentDiscovery: Send + Sync {
    /// 获取发现器名称
    fn name(&self) -> &str;

    /// 发现组件并送入接收方
    async fn discover(&self, sink: &mut dyn DiscoverySink) -> RegistrationResult<()>;
}
