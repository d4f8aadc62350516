//! 容器配置加载
//!
//! 按内置默认值、可选 TOML 文件、环境变量的顺序叠加配置。

use crate::container::Container;
use config::{Config, Environment, File, FileFormat};
use di_abstractions::ContainerConfig;
use infrastructure_common::{init_logging, ConfigError, ConfigResult, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// 内置默认配置
const DEFAULT_SETTINGS_TOML: &str = include_str!("../config/default.toml");

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "LORN_DI";

/// 容器相关的全部配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// 容器配置
    pub container: ContainerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl ContainerSettings {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.container.validate()?;
        self.logging.parse_level()?;
        Ok(())
    }

    /// 按配置创建根容器
    pub fn build_container(&self) -> ConfigResult<Container> {
        Container::with_config(self.container.clone())
    }

    /// 按配置初始化日志系统
    pub fn init_logging(&self) -> ConfigResult<()> {
        init_logging(&self.logging)
    }
}

/// 配置加载器
#[derive(Debug, Clone)]
pub struct ContainerSettingsLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ContainerSettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerSettingsLoader {
    /// 创建只读取默认值和环境变量的加载器
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// 叠加 TOML 配置文件，文件必须存在
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// 修改环境变量前缀
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 加载配置
    pub fn load(&self) -> ConfigResult<ContainerSettings> {
        let mut builder = Config::builder().add_source(File::from_str(DEFAULT_SETTINGS_TOML, FileFormat::Toml));

        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!("加载配置文件: {}", path.display());
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                error!("配置构建失败: {}", e);
                ConfigError::parse_error(e)
            })?;

        let settings: ContainerSettings = settings.try_deserialize().map_err(|e| {
            error!("配置绑定失败: {}", e);
            ConfigError::parse_error(e)
        })?;

        settings.validate()?;
        info!(
            "容器配置加载完成: 循环检测={}, 最大深度={}",
            settings.container.enable_circular_dependency_detection, settings.container.max_resolution_depth
        );
        Ok(settings)
    }
}

/// 以默认加载器读取配置
pub fn load_settings() -> ConfigResult<ContainerSettings> {
    ContainerSettingsLoader::new().load()
}
