//! 错误类型定义

use thiserror::Error;

/// 依赖解析错误类型
///
/// 稳态解析阶段只会产生这些运行时错误，结构性问题在注册阶段通过
/// [`RegistrationError`] 报告。
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("无法满足的依赖: {type_name} {qualifiers}{}", format_available(.available))]
    UnsatisfiedResolution {
        type_name: String,
        qualifiers: String,
        /// 同一原始类型下已注册但未匹配的组件，用于诊断
        available: Vec<String>,
    },

    #[error("依赖解析存在歧义: {type_name} {qualifiers}, 候选组件: [{}]", .candidates.join(", "))]
    AmbiguousResolution {
        type_name: String,
        qualifiers: String,
        candidates: Vec<String>,
    },

    #[error("作用域未激活: {scope}")]
    ScopeNotActive { scope: String },

    #[error("循环依赖检测到: {dependency_chain}")]
    CircularConstruction { dependency_chain: String },

    #[error("未找到名称为 '{name}' 的组件")]
    NameNotFound { name: String },

    #[error("组件创建失败: {type_name}, 原因: {source}")]
    ComponentCreationFailed {
        type_name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("观察者执行失败: {observer} ({event_type}), 原因: {source}")]
    ObserverFailed {
        observer: String,
        event_type: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("类型转换失败: 组件 {component} 无法作为 {expected} 使用")]
    TypeMismatch { component: String, expected: String },

    #[error("容器已关闭")]
    ContainerClosed,
}

impl DependencyError {
    /// 创建组件创建失败错误
    pub fn creation_failed(
        type_name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ComponentCreationFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// 创建循环依赖错误
    pub fn circular(dependency_chain: impl Into<String>) -> Self {
        Self::CircularConstruction {
            dependency_chain: dependency_chain.into(),
        }
    }

    /// 创建作用域未激活错误
    pub fn scope_not_active(scope: impl Into<String>) -> Self {
        Self::ScopeNotActive {
            scope: scope.into(),
        }
    }

    /// 是否为歧义错误
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousResolution { .. })
    }

    /// 是否为无法满足错误
    pub fn is_unsatisfied(&self) -> bool {
        matches!(self, Self::UnsatisfiedResolution { .. })
    }
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(", 已注册组件: [{}]", available.join(", "))
    }
}

/// 组件注册错误类型
///
/// 在发现/注册阶段报告，不会延迟到解析阶段。
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("组件定义缺少类型集合: {id}")]
    EmptyTypeSet { id: String },

    #[error("组件定义缺少工厂: {id}")]
    MissingFactory { id: String },

    #[error("重复的组件定义: {id}")]
    DuplicateDefinition { id: String },

    #[error("重复的组件名称 '{name}': {existing} 与 {duplicate}")]
    DuplicateName {
        name: String,
        existing: String,
        duplicate: String,
    },

    #[error("不支持的类型形态: {id}, 类型: {type_name}")]
    UnsupportedType { id: String, type_name: String },

    #[error("重复注册的作用域: {scope}")]
    DuplicateScope { scope: String },

    #[error("组件验证失败: {}", .problems.join("; "))]
    ValidationFailed { problems: Vec<String> },

    #[error("组件发现失败: {message}")]
    DiscoveryFailed { message: String },
}

/// 生命周期管理错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("组件销毁失败: {component}, 原因: {source}")]
    DestructionFailed {
        component: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("作用域销毁失败: {scope}, 原因: {message}")]
    ScopeDestructionFailed { scope: String, message: String },

    #[error("作用域不存在: {scope}")]
    ScopeNotFound { scope: String },
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("依赖注入错误: {source}")]
    DependencyError {
        #[from]
        source: DependencyError,
    },

    #[error("组件注册错误: {source}")]
    RegistrationError {
        #[from]
        source: RegistrationError,
    },

    #[error("生命周期错误: {source}")]
    LifecycleError {
        #[from]
        source: LifecycleError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },
}

/// 结果类型别名
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type RegistrationResult<T> = Result<T, RegistrationError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
