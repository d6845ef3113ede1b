//! 类型形态代数
//!
//! 用运行时值描述泛型类型形态（普通类型、参数化类型、数组、通配符、类型变量），
//! 并回答“A 是否可由 B 赋值”之类的匹配问题。组件注册表用它匹配查询类型，
//! 事件分发器用它遍历事件类型的祖先层次。
//!
//! Rust 没有继承，祖先关系由 [`RawType`] 在构建时显式声明：
//!
//! ```
//! use di_abstractions::types::{RawType, TypeDescriptor};
//!
//! let list = RawType::builder("List").param("E").build();
//! let array_list = RawType::builder("ArrayList")
//!     .param("E")
//!     .extends(TypeDescriptor::generic(list.clone(), vec![TypeDescriptor::variable("E")]))
//!     .build();
//! let string = TypeDescriptor::class(RawType::named("String"));
//!
//! let concrete = TypeDescriptor::parameterized(array_list, vec![string.clone()]).unwrap();
//! let wanted = TypeDescriptor::parameterized(list, vec![string]).unwrap();
//! assert!(concrete.is_subtype_of(&wanted));
//! ```

use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 祖先层次遍历的最大深度，防止循环声明导致无限递归
const MAX_HIERARCHY_DEPTH: usize = 64;

/// 原始类型的身份
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// Rust 类型
    Rust(TypeId),
    /// 按名称标识的类型（例如由外部发现器描述的类型）
    Named(Arc<str>),
}

struct RawTypeInner {
    key: TypeKey,
    name: Arc<str>,
    params: Vec<Arc<str>>,
    supertypes: Vec<TypeDescriptor>,
}

/// 原始类型
///
/// 相等性与哈希只看 [`TypeKey`]；类型参数名与声明的直接父类型随身携带，
/// 使得描述符自包含。
#[derive(Clone)]
pub struct RawType(Arc<RawTypeInner>);

impl RawType {
    /// 为 Rust 类型创建原始类型（无父类型声明）
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::for_type_id(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// 按 `TypeId` 与类型名创建原始类型
    pub fn for_type_id(type_id: TypeId, type_name: &str) -> Self {
        Self(Arc::new(RawTypeInner {
            key: TypeKey::Rust(type_id),
            name: short_type_name(type_name).into(),
            params: Vec::new(),
            supertypes: Vec::new(),
        }))
    }

    /// 创建按名称标识的原始类型
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::builder(name).build()
    }

    /// 创建按名称标识的原始类型构建器
    pub fn builder(name: impl Into<Arc<str>>) -> RawTypeBuilder {
        let name = name.into();
        RawTypeBuilder {
            key: TypeKey::Named(name.clone()),
            name,
            params: Vec::new(),
            supertypes: Vec::new(),
        }
    }

    /// 为 Rust 类型创建原始类型构建器
    pub fn builder_of<T: ?Sized + 'static>() -> RawTypeBuilder {
        RawTypeBuilder {
            key: TypeKey::Rust(TypeId::of::<T>()),
            name: short_type_name(std::any::type_name::<T>()).into(),
            params: Vec::new(),
            supertypes: Vec::new(),
        }
    }

    /// 类型键
    pub fn key(&self) -> &TypeKey {
        &self.0.key
    }

    /// 类型名
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// 类型参数名
    pub fn params(&self) -> &[Arc<str>] {
        &self.0.params
    }

    /// 声明的直接父类型（可能包含本类型的类型变量）
    pub fn supertypes(&self) -> &[TypeDescriptor] {
        &self.0.supertypes
    }

    /// 对应的 Rust `TypeId`
    pub fn type_id(&self) -> Option<TypeId> {
        match &self.0.key {
            TypeKey::Rust(id) => Some(*id),
            TypeKey::Named(_) => None,
        }
    }

    /// 是否声明了类型参数
    pub fn is_generic(&self) -> bool {
        !self.0.params.is_empty()
    }

    /// 将类型参数绑定到实参
    pub fn bind(&self, args: &[TypeDescriptor]) -> TypeBindings {
        let mut bindings = TypeBindings::new();
        for (param, arg) in self.0.params.iter().zip(args) {
            bindings.insert(param.clone(), arg.clone());
        }
        bindings
    }

    /// 以给定实参填充后的直接父类型
    pub fn supertypes_with(&self, args: &[TypeDescriptor]) -> Vec<TypeDescriptor> {
        let bindings = self.bind(args);
        self.0
            .supertypes
            .iter()
            .map(|supertype| supertype.fill(&bindings))
            .collect()
    }
}

impl PartialEq for RawType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.key == other.0.key
    }
}

impl Eq for RawType {}

impl Hash for RawType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl fmt::Debug for RawType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawType({})", self.0.name)
    }
}

impl fmt::Display for RawType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// 原始类型构建器
#[derive(Debug)]
pub struct RawTypeBuilder {
    key: TypeKey,
    name: Arc<str>,
    params: Vec<Arc<str>>,
    supertypes: Vec<TypeDescriptor>,
}

impl RawTypeBuilder {
    /// 添加类型参数
    pub fn param(mut self, name: impl Into<Arc<str>>) -> Self {
        self.params.push(name.into());
        self
    }

    /// 声明直接父类型（父类或实现的接口），按声明顺序遍历
    pub fn extends(mut self, supertype: TypeDescriptor) -> Self {
        self.supertypes.push(supertype);
        self
    }

    /// 完成构建
    pub fn build(self) -> RawType {
        RawType(Arc::new(RawTypeInner {
            key: self.key,
            name: self.name,
            params: self.params,
            supertypes: self.supertypes,
        }))
    }
}

/// 类型变量绑定
#[derive(Debug, Clone, Default)]
pub struct TypeBindings {
    bindings: HashMap<Arc<str>, TypeDescriptor>,
}

impl TypeBindings {
    /// 空绑定
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定类型变量
    pub fn insert(&mut self, name: impl Into<Arc<str>>, descriptor: TypeDescriptor) {
        self.bindings.insert(name.into(), descriptor);
    }

    /// 查找类型变量的绑定
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.bindings.get(name)
    }

    /// 是否没有绑定
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// 外部提供的原始类型形态输入
///
/// 由发现器产生，经 [`TypeDescriptor::build`] 校验后成为描述符。
#[derive(Debug, Clone)]
pub enum TypeShape {
    Class(RawType),
    Parameterized(RawType, Vec<TypeShape>),
    Array(Box<TypeShape>),
    Wildcard {
        upper: Vec<TypeShape>,
        lower: Vec<TypeShape>,
    },
    Variable(String, Vec<TypeShape>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapePosition {
    TopLevel,
    Argument,
    Element,
    Bound,
}

/// 规范化的类型描述符
///
/// 不可变，按结构比较与哈希。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// 普通类型（或泛型类型的原始用法）
    Class(RawType),
    /// 参数化类型
    Parameterized {
        raw: RawType,
        args: Vec<TypeDescriptor>,
    },
    /// 数组类型
    Array(Box<TypeDescriptor>),
    /// 通配符，只能出现在类型实参位置
    Wildcard {
        upper: Vec<TypeDescriptor>,
        lower: Vec<TypeDescriptor>,
    },
    /// 类型变量
    Variable {
        name: Arc<str>,
        bounds: Vec<TypeDescriptor>,
    },
}

impl TypeDescriptor {
    /// 从外部形态输入构建描述符，不支持的形态返回 `None`
    pub fn build(shape: &TypeShape) -> Option<Self> {
        Self::build_at(shape, ShapePosition::TopLevel)
    }

    fn build_at(shape: &TypeShape, position: ShapePosition) -> Option<Self> {
        match shape {
            TypeShape::Class(raw) => Some(Self::Class(raw.clone())),
            TypeShape::Parameterized(raw, args) => {
                if args.is_empty() || args.len() != raw.params().len() {
                    return None;
                }
                let args = args
                    .iter()
                    .map(|arg| Self::build_at(arg, ShapePosition::Argument))
                    .collect::<Option<Vec<_>>>()?;
                Some(Self::Parameterized {
                    raw: raw.clone(),
                    args,
                })
            }
            TypeShape::Array(element) => {
                let element = Self::build_at(element, ShapePosition::Element)?;
                Some(Self::Array(Box::new(element)))
            }
            TypeShape::Wildcard { upper, lower } => {
                if position != ShapePosition::Argument || (!upper.is_empty() && !lower.is_empty()) {
                    return None;
                }
                Some(Self::Wildcard {
                    upper: Self::build_bounds(upper)?,
                    lower: Self::build_bounds(lower)?,
                })
            }
            TypeShape::Variable(name, bounds) => Some(Self::Variable {
                name: name.as_str().into(),
                bounds: Self::build_bounds(bounds)?,
            }),
        }
    }

    fn build_bounds(bounds: &[TypeShape]) -> Option<Vec<Self>> {
        bounds
            .iter()
            .map(|bound| Self::build_at(bound, ShapePosition::Bound))
            .collect()
    }

    /// 普通类型描述符
    pub fn class(raw: RawType) -> Self {
        Self::Class(raw)
    }

    /// Rust 类型的普通类型描述符
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Class(RawType::of::<T>())
    }

    /// 参数化类型描述符，实参数量与类型参数不符或含非法形态时返回 `None`
    pub fn parameterized(raw: RawType, args: Vec<TypeDescriptor>) -> Option<Self> {
        if args.is_empty() || args.len() != raw.params().len() {
            return None;
        }
        if args.iter().any(|arg| !arg.is_valid_argument()) {
            return None;
        }
        Some(Self::Parameterized { raw, args })
    }

    /// 不校验实参数量的参数化描述符，用于声明父类型模板
    pub fn generic(raw: RawType, args: Vec<TypeDescriptor>) -> Self {
        Self::Parameterized { raw, args }
    }

    /// 数组类型
    pub fn array(element: TypeDescriptor) -> Self {
        Self::Array(Box::new(element))
    }

    /// 无界通配符 `?`
    pub fn wildcard() -> Self {
        Self::Wildcard {
            upper: Vec::new(),
            lower: Vec::new(),
        }
    }

    /// 上界通配符 `? extends bound`
    pub fn wildcard_extends(bound: TypeDescriptor) -> Self {
        Self::Wildcard {
            upper: vec![bound],
            lower: Vec::new(),
        }
    }

    /// 下界通配符 `? super bound`
    pub fn wildcard_super(bound: TypeDescriptor) -> Self {
        Self::Wildcard {
            upper: Vec::new(),
            lower: vec![bound],
        }
    }

    /// 无界类型变量
    pub fn variable(name: impl Into<Arc<str>>) -> Self {
        Self::Variable {
            name: name.into(),
            bounds: Vec::new(),
        }
    }

    /// 带上界的类型变量
    pub fn bounded_variable(name: impl Into<Arc<str>>, bounds: Vec<TypeDescriptor>) -> Self {
        Self::Variable {
            name: name.into(),
            bounds,
        }
    }

    fn is_valid_argument(&self) -> bool {
        match self {
            Self::Wildcard { upper, lower } => upper.is_empty() || lower.is_empty(),
            _ => true,
        }
    }

    /// 原始类型（普通类型与参数化类型）
    pub fn raw(&self) -> Option<&RawType> {
        match self {
            Self::Class(raw) | Self::Parameterized { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// 注册表索引用的原始类型，数组按元素类型索引
    pub fn index_key(&self) -> Option<&RawType> {
        match self {
            Self::Array(element) => element.index_key(),
            other => other.raw(),
        }
    }

    /// 类型实参
    pub fn args(&self) -> &[TypeDescriptor] {
        match self {
            Self::Parameterized { args, .. } => args,
            _ => &[],
        }
    }

    /// 是否为无界的变量或通配符
    pub fn is_unbounded(&self) -> bool {
        match self {
            Self::Variable { bounds, .. } => bounds.is_empty(),
            Self::Wildcard { upper, lower } => upper.is_empty() && lower.is_empty(),
            _ => false,
        }
    }

    /// 是否仍含未填充的类型变量
    pub fn has_variables(&self) -> bool {
        match self {
            Self::Variable { .. } => true,
            Self::Class(_) => false,
            Self::Parameterized { args, .. } => args.iter().any(Self::has_variables),
            Self::Array(element) => element.has_variables(),
            Self::Wildcard { upper, lower } => {
                upper.iter().any(Self::has_variables) || lower.iter().any(Self::has_variables)
            }
        }
    }

    /// `self` 作为声明类型时能否接受 `other`
    ///
    /// 原始类型必须相同；参数化类型逐个比较实参，默认不变，通配符与类型变量按边界放宽。
    pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
        match (self, other) {
            (Self::Class(a), Self::Class(b)) => a == b,
            (Self::Class(a), Self::Parameterized { raw: b, .. }) => a == b,
            (Self::Parameterized { raw: a, args }, Self::Class(b)) => {
                a == b && args.iter().all(Self::is_unbounded)
            }
            (
                Self::Parameterized { raw: a, args: xs },
                Self::Parameterized { raw: b, args: ys },
            ) => {
                a == b
                    && xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(x, y)| x.is_param_assignable_from(y))
            }
            (Self::Array(e), Self::Array(f)) => e.is_assignable_from(f),
            (Self::Variable { bounds, .. }, other) => {
                bounds.iter().all(|bound| other.is_subtype_of(bound))
            }
            _ => false,
        }
    }

    fn is_param_assignable_from(&self, arg: &TypeDescriptor) -> bool {
        match (self, arg) {
            (
                Self::Wildcard { upper, lower },
                Self::Wildcard {
                    upper: arg_upper,
                    lower: arg_lower,
                },
            ) => {
                upper
                    .iter()
                    .all(|u| arg_upper.iter().any(|a| a.is_subtype_of(u)))
                    && lower
                        .iter()
                        .all(|l| arg_lower.iter().any(|a| l.is_subtype_of(a)))
            }
            (Self::Wildcard { upper, lower }, arg) => {
                upper.iter().all(|u| arg.is_subtype_of(u))
                    && lower.iter().all(|l| l.is_subtype_of(arg))
            }
            (Self::Variable { bounds, .. }, arg) => {
                bounds.iter().all(|bound| arg.is_subtype_of(bound))
            }
            (_, Self::Variable { bounds, .. }) => {
                bounds.iter().all(|bound| self.is_subtype_of(bound))
            }
            _ => self == arg,
        }
    }

    /// `self` 是否为 `supertype` 的子类型（自反、传递）
    pub fn is_subtype_of(&self, supertype: &TypeDescriptor) -> bool {
        self.is_subtype_of_depth(supertype, 0)
    }

    fn is_subtype_of_depth(&self, supertype: &TypeDescriptor, depth: usize) -> bool {
        if depth > MAX_HIERARCHY_DEPTH {
            return false;
        }
        if supertype.is_assignable_from(self) {
            return true;
        }
        match self {
            Self::Variable { bounds, .. } => bounds
                .iter()
                .any(|bound| bound.is_subtype_of_depth(supertype, depth + 1)),
            Self::Wildcard { upper, .. } => upper
                .iter()
                .any(|bound| bound.is_subtype_of_depth(supertype, depth + 1)),
            Self::Array(element) => match supertype {
                Self::Array(target) => element.is_subtype_of_depth(target, depth + 1),
                _ => false,
            },
            Self::Class(_) | Self::Parameterized { .. } => self
                .direct_supertypes()
                .iter()
                .any(|parent| parent.is_subtype_of_depth(supertype, depth + 1)),
        }
    }

    /// 直接父类型，参数化类型会用自身实参填充
    pub fn direct_supertypes(&self) -> Vec<TypeDescriptor> {
        match self {
            Self::Class(raw) => raw.supertypes().to_vec(),
            Self::Parameterized { raw, args } => raw.supertypes_with(args),
            _ => Vec::new(),
        }
    }

    /// 用绑定替换开放的类型变量
    pub fn fill(&self, bindings: &TypeBindings) -> TypeDescriptor {
        if bindings.is_empty() {
            return self.clone();
        }
        match self {
            Self::Variable { name, .. } => bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Self::Class(_) => self.clone(),
            Self::Parameterized { raw, args } => Self::Parameterized {
                raw: raw.clone(),
                args: args.iter().map(|arg| arg.fill(bindings)).collect(),
            },
            Self::Array(element) => Self::Array(Box::new(element.fill(bindings))),
            Self::Wildcard { upper, lower } => Self::Wildcard {
                upper: upper.iter().map(|bound| bound.fill(bindings)).collect(),
                lower: lower.iter().map(|bound| bound.fill(bindings)).collect(),
            },
        }
    }

    /// 类型层次：自身在前，随后按声明顺序深度优先遍历祖先，去重
    pub fn hierarchy(&self) -> Vec<TypeDescriptor> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        self.collect_hierarchy(&mut seen, &mut nodes, 0);
        nodes
    }

    fn collect_hierarchy(
        &self,
        seen: &mut HashSet<TypeDescriptor>,
        nodes: &mut Vec<TypeDescriptor>,
        depth: usize,
    ) {
        if depth > MAX_HIERARCHY_DEPTH || !seen.insert(self.clone()) {
            return;
        }
        nodes.push(self.clone());
        for parent in self.direct_supertypes() {
            parent.collect_hierarchy(seen, nodes, depth + 1);
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(raw) => write!(f, "{}", raw),
            Self::Parameterized { raw, args } => {
                write!(f, "{}<", raw)?;
                write_list(f, args, ", ")?;
                f.write_str(">")
            }
            Self::Array(element) => write!(f, "{}[]", element),
            Self::Wildcard { upper, lower } => {
                f.write_str("?")?;
                if !upper.is_empty() {
                    f.write_str(" extends ")?;
                    write_list(f, upper, " & ")?;
                }
                if !lower.is_empty() {
                    f.write_str(" super ")?;
                    write_list(f, lower, " & ")?;
                }
                Ok(())
            }
            Self::Variable { name, bounds } => {
                f.write_str(name)?;
                if !bounds.is_empty() {
                    f.write_str(" extends ")?;
                    write_list(f, bounds, " & ")?;
                }
                Ok(())
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeDescriptor], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// 去掉模块路径：`alloc::vec::Vec<my::Foo>` → `Vec<Foo>`
fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    let mut chars = full.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            segment.clear();
        } else if c.is_alphanumeric() || c == '_' {
            segment.push(c);
        } else {
            out.push_str(&segment);
            segment.clear();
            out.push(c);
        }
    }
    out.push_str(&segment);
    out
}

/// Rust 类型目录
///
/// 记录 Rust 类型声明的父类型，使一个具体值能够得到带祖先信息的描述符。
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: RwLock<HashMap<TypeId, RawType>>,
}

impl TypeCatalog {
    /// 空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明类型，返回被替换的旧声明
    ///
    /// 只接受 Rust 类型；按名称标识的类型直接返回 `None` 且不记录。
    pub fn declare(&self, raw: RawType) -> Option<RawType> {
        let type_id = raw.type_id()?;
        self.types.write().insert(type_id, raw)
    }

    /// 按 `TypeId` 查找原始类型
    pub fn get(&self, type_id: TypeId) -> Option<RawType> {
        self.types.read().get(&type_id).cloned()
    }

    /// 具体值的描述符：优先使用声明，否则退化为无父类型的普通类型
    pub fn describe(&self, type_id: TypeId, type_name: &str) -> TypeDescriptor {
        match self.get(type_id) {
            Some(raw) => TypeDescriptor::Class(raw),
            None => TypeDescriptor::Class(RawType::for_type_id(type_id, type_name)),
        }
    }

    /// 已登记的类型数量
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
