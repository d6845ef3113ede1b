//! 限定符
//!
//! 限定符是带标签的值对象：一个标记类型加上若干成员值。
//! [`QualifierBinding`] 是限定符的比较视图，只保留判别成员。

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 限定符成员值
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QualifierValue {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    List(Vec<QualifierValue>),
}

impl fmt::Display for QualifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Str(value) => write!(f, "\"{}\"", value),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for QualifierValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QualifierValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for QualifierValue {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for QualifierValue {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

/// 限定符成员声明
#[derive(Debug, Clone)]
pub struct MemberSpec {
    name: Arc<str>,
    default: Option<Arc<QualifierValue>>,
    discriminating: bool,
}

impl MemberSpec {
    /// 成员名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 成员默认值
    pub fn default_value(&self) -> Option<&Arc<QualifierValue>> {
        self.default.as_ref()
    }

    /// 是否参与比较
    pub fn is_discriminating(&self) -> bool {
        self.discriminating
    }
}

#[derive(Debug)]
struct MarkerInner {
    name: Arc<str>,
    members: Vec<MemberSpec>,
}

/// 限定符标记类型
///
/// 按名称比较，成员声明随标记携带。
#[derive(Debug, Clone)]
pub struct QualifierMarker(Arc<MarkerInner>);

impl QualifierMarker {
    /// 无成员的标记
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::builder(name).build()
    }

    /// 带成员声明的标记构建器
    pub fn builder(name: impl Into<Arc<str>>) -> QualifierMarkerBuilder {
        QualifierMarkerBuilder {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// 标记名称
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// 成员声明
    pub fn members(&self) -> &[MemberSpec] {
        &self.0.members
    }

    /// 按名称查找成员声明
    pub fn member(&self, name: &str) -> Option<&MemberSpec> {
        self.0.members.iter().find(|m| &*m.name == name)
    }

    /// 用成员默认值创建限定符实例
    pub fn instance(&self) -> Qualifier {
        Qualifier::new(self.clone())
    }
}

impl PartialEq for QualifierMarker {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.name == other.0.name
    }
}

impl Eq for QualifierMarker {}

impl Hash for QualifierMarker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Display for QualifierMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0.name)
    }
}

/// 限定符标记构建器
#[derive(Debug)]
pub struct QualifierMarkerBuilder {
    name: Arc<str>,
    members: Vec<MemberSpec>,
}

impl QualifierMarkerBuilder {
    /// 添加判别成员
    pub fn member(mut self, name: impl Into<Arc<str>>, default: Option<QualifierValue>) -> Self {
        self.members.push(MemberSpec {
            name: name.into(),
            default: default.map(Arc::new),
            discriminating: true,
        });
        self
    }

    /// 添加不参与比较的成员
    pub fn non_discriminating(
        mut self,
        name: impl Into<Arc<str>>,
        default: Option<QualifierValue>,
    ) -> Self {
        self.members.push(MemberSpec {
            name: name.into(),
            default: default.map(Arc::new),
            discriminating: false,
        });
        self
    }

    /// 完成构建
    pub fn build(self) -> QualifierMarker {
        QualifierMarker(Arc::new(MarkerInner {
            name: self.name,
            members: self.members,
        }))
    }
}

/// 限定符实例
#[derive(Debug, Clone)]
pub struct Qualifier {
    marker: QualifierMarker,
    values: BTreeMap<Arc<str>, Arc<QualifierValue>>,
}

impl Qualifier {
    /// 不带显式成员值的限定符
    pub fn new(marker: QualifierMarker) -> Self {
        Self {
            marker,
            values: BTreeMap::new(),
        }
    }

    /// 设置成员值
    pub fn with(mut self, member: impl Into<Arc<str>>, value: impl Into<QualifierValue>) -> Self {
        self.values.insert(member.into(), Arc::new(value.into()));
        self
    }

    /// 设置共享的成员值
    pub fn with_shared(mut self, member: impl Into<Arc<str>>, value: Arc<QualifierValue>) -> Self {
        self.values.insert(member.into(), value);
        self
    }

    /// 标记类型
    pub fn marker(&self) -> &QualifierMarker {
        &self.marker
    }

    /// 显式设置的成员值
    pub fn explicit_value(&self, member: &str) -> Option<&Arc<QualifierValue>> {
        self.values.get(member)
    }

    /// 成员的有效值：显式值优先，否则为声明的默认值
    pub fn value(&self, member: &str) -> Option<&Arc<QualifierValue>> {
        self.values
            .get(member)
            .or_else(|| self.marker.member(member).and_then(MemberSpec::default_value))
    }

    /// 是否为内建 `Default`
    pub fn is_default(&self) -> bool {
        self.marker == *DEFAULT_MARKER
    }

    /// 是否为内建 `Any`
    pub fn is_any(&self) -> bool {
        self.marker == *ANY_MARKER
    }

    /// `Named` 限定符携带的名称
    pub fn named_value(&self) -> Option<&str> {
        if self.marker != *NAMED_MARKER {
            return None;
        }
        match self.value("value").map(|value| &**value) {
            Some(QualifierValue::Str(name)) => Some(&**name),
            _ => None,
        }
    }

    /// 编译为比较视图
    pub fn binding(&self) -> QualifierBinding {
        QualifierBinding::new(self)
    }
}

impl PartialEq for Qualifier {
    fn eq(&self, other: &Self) -> bool {
        self.binding().is_match(other) && other.binding().is_match(self)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker)?;
        if !self.values.is_empty() {
            f.write_str("(")?;
            for (i, (name, value)) in self.values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}={}", name, value)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// 限定符比较视图：标记类型加上判别成员的有效值
#[derive(Debug, Clone)]
pub struct QualifierBinding {
    marker: QualifierMarker,
    members: Vec<(Arc<str>, Option<Arc<QualifierValue>>)>,
}

impl QualifierBinding {
    /// 从限定符编译
    pub fn new(qualifier: &Qualifier) -> Self {
        let members = qualifier
            .marker
            .members()
            .iter()
            .filter(|spec| spec.is_discriminating())
            .map(|spec| (spec.name.clone(), qualifier.value(&spec.name).cloned()))
            .collect();
        Self {
            marker: qualifier.marker.clone(),
            members,
        }
    }

    /// 标记类型
    pub fn marker(&self) -> &QualifierMarker {
        &self.marker
    }

    /// 判别成员数量为零时匹配该标记的任意实例
    pub fn is_wildcard(&self) -> bool {
        self.members.is_empty()
    }

    /// 候选限定符是否与本绑定语义相等
    ///
    /// 候选缺少成员值时取成员默认值；先比较引用再比较值。
    pub fn is_match(&self, candidate: &Qualifier) -> bool {
        if self.marker != candidate.marker {
            return false;
        }
        self.members.iter().all(|(name, own)| {
            match (own, candidate.value(name)) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
                (None, None) => true,
                _ => false,
            }
        })
    }
}

impl fmt::Display for QualifierBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker)?;
        if !self.members.is_empty() {
            f.write_str("(")?;
            for (i, (name, value)) in self.members.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match value {
                    Some(value) => write!(f, "{}={}", name, value)?,
                    None => write!(f, "{}=?", name)?,
                }
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// 每个绑定都能在给定限定符中找到匹配
pub fn all_bindings_match(bindings: &[QualifierBinding], qualifiers: &[Qualifier]) -> bool {
    bindings
        .iter()
        .all(|binding| qualifiers.iter().any(|q| binding.is_match(q)))
}

/// 格式化限定符集合，用于错误信息与日志
pub fn describe_qualifiers(qualifiers: &[Qualifier]) -> String {
    let items: Vec<String> = qualifiers.iter().map(ToString::to_string).collect();
    format!("{{{}}}", items.join(", "))
}

/// 内置 `Default` 标记
pub static DEFAULT_MARKER: Lazy<QualifierMarker> = Lazy::new(|| QualifierMarker::new("Default"));

/// 内置 `Any` 标记
pub static ANY_MARKER: Lazy<QualifierMarker> = Lazy::new(|| QualifierMarker::new("Any"));

/// 内置 `Named` 标记
pub static NAMED_MARKER: Lazy<QualifierMarker> = Lazy::new(|| {
    QualifierMarker::builder("Named")
        .member("value", Some(QualifierValue::from("")))
        .build()
});

/// `@Default`
pub fn default_qualifier() -> Qualifier {
    DEFAULT_MARKER.instance()
}

/// `@Any`
pub fn any_qualifier() -> Qualifier {
    ANY_MARKER.instance()
}

/// `@Named(value)`
pub fn named(value: impl Into<String>) -> Qualifier {
    NAMED_MARKER.instance().with("value", value.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced() -> QualifierMarker {
        QualifierMarker::builder("Priced")
            .member("currency", Some(QualifierValue::from("EUR")))
            .non_discriminating("comment", None)
            .build()
    }

    #[test]
    fn test_marker_type_must_match() {
        assert!(!default_qualifier().binding().is_match(&any_qualifier()));
        assert!(default_qualifier()
            .binding()
            .is_match(&QualifierMarker::new("Default").instance()));
    }

    #[test]
    fn test_named_values_discriminate() {
        let x = named("x");
        assert!(x.binding().is_match(&named("x")));
        assert!(!x.binding().is_match(&named("y")));
        assert_eq!(x.named_value(), Some("x"));
        assert_eq!(default_qualifier().named_value(), None);
    }

    #[test]
    fn test_missing_candidate_value_falls_back_to_default() {
        let marker = priced();
        let explicit_eur = marker.instance().with("currency", "EUR");
        assert!(explicit_eur.binding().is_match(&marker.instance()));
        let usd = marker.instance().with("currency", "USD");
        assert!(!usd.binding().is_match(&marker.instance()));
    }

    #[test]
    fn test_non_discriminating_members_are_ignored() {
        let marker = priced();
        let a = marker.instance().with("comment", "first");
        let b = marker.instance().with("comment", "second");
        assert!(a.binding().is_match(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_values_short_circuit() {
        let marker = priced();
        let list = || QualifierValue::List(vec![QualifierValue::Int(1), QualifierValue::Int(2)]);
        let shared = Arc::new(list());
        let a = marker.instance().with_shared("currency", shared.clone());
        let b = marker.instance().with_shared("currency", shared);
        assert!(a.binding().is_match(&b));
        let c = marker.instance().with("currency", list());
        assert!(a.binding().is_match(&c));
    }

    #[test]
    fn test_wildcard_binding_matches_any_instance() {
        let marker = QualifierMarker::builder("Tagged")
            .non_discriminating("tag", None)
            .build();
        let binding = marker.instance().with("tag", "a").binding();
        assert!(binding.is_wildcard());
        assert!(binding.is_match(&marker.instance().with("tag", "b")));
    }

    #[test]
    fn test_all_bindings_match() {
        let bindings = vec![default_qualifier().binding()];
        assert!(all_bindings_match(&bindings, &[named("x"), default_qualifier()]));
        assert!(!all_bindings_match(&bindings, &[named("x")]));
        assert!(all_bindings_match(&[], &[named("x")]));
    }

    #[test]
    fn test_describe_qualifiers() {
        let text = describe_qualifiers(&[default_qualifier(), named("x")]);
        assert_eq!(text, "{@Default, @Named(value=\"x\")}");
    }
}
