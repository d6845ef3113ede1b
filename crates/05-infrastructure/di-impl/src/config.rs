//! 容器配置
//!
//! 可以在代码中构建，也可以用 `config` crate 从文件和 `LORN_DI_` 前缀的环境变量加载。

use infrastructure_common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "LORN_DI";

/// 容器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 构建期是否检测声明注入点上的循环依赖
    pub enable_circular_dependency_detection: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 构建时是否验证注入点
    pub validate_on_build: bool,
    /// 本地注册的组件相对父容器组件的优先级加成
    pub local_priority_bonus: i32,
    /// 未声明优先级的组件使用的优先级
    pub default_priority: i32,
    /// 启用的备选组件：定义 id → 优先级
    pub enabled_alternatives: HashMap<String, i32>,
    /// 构造型优先级
    pub stereotype_priorities: HashMap<String, i32>,
    /// 备选构造型
    pub alternative_stereotypes: Vec<String>,
    /// 是否触发容器生命周期事件
    pub fire_lifecycle_events: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enable_circular_dependency_detection: true,
            max_resolution_depth: 64,
            validate_on_build: true,
            local_priority_bonus: 1_000_000,
            default_priority: 0,
            enabled_alternatives: HashMap::new(),
            stereotype_priorities: HashMap::new(),
            alternative_stereotypes: Vec::new(),
            fire_lifecycle_events: true,
        }
    }
}

impl ContainerConfig {
    /// 默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置文件加载，环境变量覆盖文件中的值
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        debug!("加载容器配置: {}", path.display());
        Self::from_builder(::config::Config::builder().add_source(::config::File::from(path)))
    }

    /// 只从环境变量加载
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_builder(::config::Config::builder())
    }

    fn from_builder(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> ConfigResult<Self> {
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                error!("配置构建失败: {}", e);
                ConfigError::ParseError {
                    source: Box::new(e),
                }
            })?;

        let config: Self = settings.try_deserialize().map_err(|e| {
            error!("配置绑定失败: {}", e);
            ConfigError::ParseError {
                source: Box::new(e),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置取值
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_resolution_depth 必须大于 0".to_string(),
            });
        }
        if self.local_priority_bonus < 0 {
            return Err(ConfigError::ValidationError {
                message: "local_priority_bonus 不能为负数".to_string(),
            });
        }
        Ok(())
    }

    /// 设置最大解析深度
    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// 开关构建期校验
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_on_build = enabled;
        self
    }

    /// 开关构建期循环检测
    pub fn with_circular_dependency_detection(mut self, enabled: bool) -> Self {
        self.enable_circular_dependency_detection = enabled;
        self
    }

    /// 设置本地优先级加成
    pub fn with_local_priority_bonus(mut self, bonus: i32) -> Self {
        self.local_priority_bonus = bonus;
        self
    }

    /// 设置默认优先级
    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    /// 启用备选组件
    pub fn enable_alternative(mut self, id: impl Into<String>, priority: i32) -> Self {
        self.enabled_alternatives.insert(id.into(), priority);
        self
    }

    /// 设置构造型的优先级
    pub fn with_stereotype_priority(
        mut self,
        stereotype: impl Into<String>,
        priority: i32,
    ) -> Self {
        self.stereotype_priorities.insert(stereotype.into(), priority);
        self
    }

    /// 登记备选构造型
    pub fn with_alternative_stereotype(mut self, stereotype: impl Into<String>) -> Self {
        self.alternative_stereotypes.push(stereotype.into());
        self
    }

    /// 开关生命周期事件
    pub fn with_lifecycle_events(mut self, enabled: bool) -> Self {
        self.fire_lifecycle_events = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.local_priority_bonus, 1_000_000);
        assert_eq!(config.default_priority, 0);
        assert!(config.validate_on_build);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_depth() {
        let config = ContainerConfig::new().with_max_resolution_depth(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ContainerConfig::load("/definitely/not/here/di.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!("lorn-di-{}.toml", uuid::Uuid::new_v4()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(
                file,
                r#"
local_priority_bonus = 500
alternative_stereotypes = ["Mock"]

[enabled_alternatives]
mock_repository = 10
"#
            )
            .unwrap();
        }

        let config = ContainerConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.local_priority_bonus, 500);
        assert_eq!(config.alternative_stereotypes, vec!["Mock".to_string()]);
        assert_eq!(config.enabled_alternatives.get("mock_repository"), Some(&10));
        assert_eq!(config.max_resolution_depth, 64);
    }
}
