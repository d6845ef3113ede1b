//! 创建上下文
//!
//! 跟踪一次构建过程中产生的对象图：每个正在构建的组件占一个帧，帧记录父帧，
//! 完成的帧按完成顺序串成依赖链。循环查找沿父链向上进行（不跨分支），
//! 释放时按完成顺序的逆序销毁依赖作用域的实例。
//!
//! 为单例或普通作用域实例创建的上下文拥有自己的依赖链，同时保留一个指向
//! 请求方上下文的外部链接，使跨上下文的循环仍能被检测到。

use crate::definition::{ComponentDefinition, DefinitionKey};
use crate::instance::Instance;
use infrastructure_common::LifecycleError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// 帧在上下文内的编号
pub type FrameId = usize;

struct Frame {
    definition: Arc<ComponentDefinition>,
    parent: Option<FrameId>,
    value: Option<Instance>,
    destroyed: bool,
}

#[derive(Default)]
struct FrameArena {
    frames: Vec<Frame>,
    /// 完成顺序
    completed: Vec<FrameId>,
}

struct OuterLink {
    context: Weak<ContextInner>,
    frame: Option<FrameId>,
}

struct ContextInner {
    id: Uuid,
    arena: Mutex<FrameArena>,
    released: AtomicBool,
    outer: Option<OuterLink>,
}

/// 查找结果
#[derive(Debug, Clone)]
pub enum Lookup {
    /// 父链上没有该定义
    Absent,
    /// 该定义正在构建，尚未登记实例
    InProgress,
    /// 该定义已登记实例
    Produced(Instance),
}

/// 创建上下文句柄
///
/// 句柄指向上下文中的一个帧，克隆句柄共享同一个上下文。
#[derive(Clone)]
pub struct CreationalContext {
    inner: Arc<ContextInner>,
    frame: Option<FrameId>,
}

impl CreationalContext {
    /// 不属于任何组件的根上下文
    pub fn new() -> Self {
        Self::with_outer(None, None)
    }

    /// 以指定定义为根帧的上下文
    pub fn for_definition(definition: Arc<ComponentDefinition>) -> Self {
        Self::with_outer(Some(definition), None)
    }

    /// 为单例或普通作用域实例创建的独立上下文，链接到请求方上下文
    pub fn nested(definition: Arc<ComponentDefinition>, outer: &CreationalContext) -> Self {
        let link = OuterLink {
            context: Arc::downgrade(&outer.inner),
            frame: outer.frame,
        };
        Self::with_outer(Some(definition), Some(link))
    }

    fn with_outer(definition: Option<Arc<ComponentDefinition>>, outer: Option<OuterLink>) -> Self {
        let mut arena = FrameArena::default();
        let frame = definition.map(|definition| {
            arena.frames.push(Frame {
                definition,
                parent: None,
                value: None,
                destroyed: false,
            });
            0
        });
        Self {
            inner: Arc::new(ContextInner {
                id: Uuid::new_v4(),
                arena: Mutex::new(arena),
                released: AtomicBool::new(false),
                outer,
            }),
            frame,
        }
    }

    /// 上下文 id
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 当前帧，根上下文没有帧
    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    /// 当前帧的定义
    pub fn definition(&self) -> Option<Arc<ComponentDefinition>> {
        let frame = self.frame?;
        let arena = self.inner.arena.lock();
        arena.frames.get(frame).map(|f| f.definition.clone())
    }

    /// 当前帧登记的实例
    pub fn value(&self) -> Option<Instance> {
        let frame = self.frame?;
        let arena = self.inner.arena.lock();
        arena.frames.get(frame).and_then(|f| f.value.clone())
    }

    /// 在当前帧下为依赖创建子帧
    pub fn child(&self, definition: Arc<ComponentDefinition>) -> CreationalContext {
        let mut arena = self.inner.arena.lock();
        let id = arena.frames.len();
        arena.frames.push(Frame {
            definition,
            parent: self.frame,
            value: None,
            destroyed: false,
        });
        CreationalContext {
            inner: self.inner.clone(),
            frame: Some(id),
        }
    }

    /// 为当前帧登记刚产生的实例
    ///
    /// 依赖链中已存在同一定义的同一实例时不再链接，返回 `false`。
    pub fn push(&self, instance: Instance) -> bool {
        let Some(frame) = self.frame else {
            return false;
        };
        let mut arena = self.inner.arena.lock();
        let Some(key) = arena.frames.get(frame).map(|f| f.definition.key().clone()) else {
            return false;
        };
        let duplicate = arena.completed.iter().any(|&id| {
            let done = &arena.frames[id];
            done.definition.key() == &key
                && done.value.as_ref().map_or(false, |v| v.ptr_eq(&instance))
        });
        let current = &mut arena.frames[frame];
        if duplicate || current.value.is_some() {
            return false;
        }
        current.value = Some(instance);
        arena.completed.push(frame);
        true
    }

    /// 沿父链（及外部链接）查找定义已登记的实例
    pub fn get(&self, definition: &ComponentDefinition) -> Option<Instance> {
        match self.lookup(definition) {
            Lookup::Produced(instance) => Some(instance),
            _ => None,
        }
    }

    /// 沿父链（及外部链接）查找定义的构建状态
    pub fn lookup(&self, definition: &ComponentDefinition) -> Lookup {
        lookup_from(&self.inner, self.frame, definition.key())
    }

    /// 当前帧到最外层根的帧数
    pub fn depth(&self) -> usize {
        self.chain().len()
    }

    /// 从最外层根到当前帧的定义键
    pub fn chain(&self) -> Vec<DefinitionKey> {
        let mut keys = Vec::new();
        collect_chain(&self.inner, self.frame, &mut keys);
        keys.reverse();
        keys
    }

    /// 格式化的构建链，末尾附加目标定义
    pub fn describe_chain(&self, target: &ComponentDefinition) -> String {
        let mut keys: Vec<String> = self.chain().iter().map(ToString::to_string).collect();
        keys.push(target.key().to_string());
        keys.join(" -> ")
    }

    /// 单独销毁一个已登记的实例
    ///
    /// 先清除帧中的值再调用销毁器，之后的 `release` 不会重复销毁。
    pub fn remove(&self, instance: &Instance) -> Result<bool, LifecycleError> {
        let taken = {
            let mut arena = self.inner.arena.lock();
            arena
                .frames
                .iter_mut()
                .find(|f| f.value.as_ref().map_or(false, |v| v.ptr_eq(instance)))
                .and_then(|f| {
                    f.destroyed = true;
                    f.value.take().map(|v| (f.definition.clone(), v))
                })
        };
        match taken {
            Some((definition, value)) => {
                definition
                    .destroy(&value)
                    .map_err(|source| LifecycleError::DestructionFailed {
                        component: definition.key().to_string(),
                        source,
                    })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 撤回一个已登记但未完成初始化的实例，不调用销毁器
    pub fn discard(&self, instance: &Instance) -> bool {
        let mut arena = self.inner.arena.lock();
        let frame = arena
            .frames
            .iter_mut()
            .find(|f| f.value.as_ref().map_or(false, |v| v.ptr_eq(instance)));
        match frame {
            Some(frame) => {
                frame.value = None;
                frame.destroyed = true;
                true
            }
            None => false,
        }
    }

    /// 是否还有带销毁器、尚未销毁的依赖实例
    pub fn needs_release(&self) -> bool {
        let arena = self.inner.arena.lock();
        arena.completed.iter().any(|&id| {
            let frame = &arena.frames[id];
            frame.value.is_some()
                && frame.definition.scope().is_dependent()
                && frame.definition.has_destroyer()
        })
    }

    /// 释放上下文：按完成顺序的逆序销毁依赖作用域的实例
    ///
    /// 重复释放不做任何事。单个销毁器失败只记录警告，不影响其余实例。
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }

        let doomed: Vec<(Arc<ComponentDefinition>, Instance)> = {
            let mut arena = self.inner.arena.lock();
            let order: Vec<FrameId> = arena.completed.iter().rev().copied().collect();
            order
                .into_iter()
                .filter_map(|id| {
                    let frame = &mut arena.frames[id];
                    if frame.destroyed || !frame.definition.scope().is_dependent() {
                        return None;
                    }
                    frame.destroyed = true;
                    frame.value.take().map(|v| (frame.definition.clone(), v))
                })
                .collect()
        };

        debug!("释放创建上下文 {}: 销毁 {} 个依赖实例", self.inner.id, doomed.len());
        for (definition, instance) in doomed {
            if let Err(e) = definition.destroy(&instance) {
                warn!("组件销毁失败: {} ({}): {}", definition.key(), self.inner.id, e);
            }
        }
    }

    /// 是否已释放
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// 尚未销毁的已登记实例数量
    pub fn live_count(&self) -> usize {
        let arena = self.inner.arena.lock();
        arena
            .completed
            .iter()
            .filter(|&&id| arena.frames[id].value.is_some())
            .count()
    }
}

impl Default for CreationalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CreationalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationalContext")
            .field("id", &self.inner.id)
            .field("frame", &self.frame)
            .field("released", &self.is_released())
            .finish()
    }
}

fn lookup_from(inner: &Arc<ContextInner>, frame: Option<FrameId>, key: &DefinitionKey) -> Lookup {
    {
        let arena = inner.arena.lock();
        let mut cursor = frame;
        while let Some(id) = cursor {
            let Some(current) = arena.frames.get(id) else {
                break;
            };
            if current.definition.key() == key {
                return match &current.value {
                    Some(instance) => Lookup::Produced(instance.clone()),
                    None if current.destroyed => Lookup::Absent,
                    None => Lookup::InProgress,
                };
            }
            cursor = current.parent;
        }
    }

    match &inner.outer {
        Some(link) => match link.context.upgrade() {
            Some(outer) => lookup_from(&outer, link.frame, key),
            None => Lookup::Absent,
        },
        None => Lookup::Absent,
    }
}

/// 从当前帧向外收集定义键（由内向外）
fn collect_chain(inner: &Arc<ContextInner>, frame: Option<FrameId>, keys: &mut Vec<DefinitionKey>) {
    {
        let arena = inner.arena.lock();
        let mut cursor = frame;
        while let Some(id) = cursor {
            let Some(current) = arena.frames.get(id) else {
                break;
            };
            keys.push(current.definition.key().clone());
            cursor = current.parent;
        }
    }
    if let Some(link) = &inner.outer {
        if let Some(outer) = link.context.upgrade() {
            collect_chain(&outer, link.frame, keys);
        }
    }
}
