use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指向配置文件的环境变量。
pub const CONFIG_ENV: &str = "AUTOJOIN_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub join: JoinConfig,
}

impl AppConfig {
    /// 从显式路径加载配置，并校验取值。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `AUTOJOIN_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        Self::discover_with(None)
    }

    /// 与 [`AppConfig::discover`] 相同，但命令行显式指定的路径优先。
    pub fn discover_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let cwd = env::current_dir().map_err(|source| ConfigError::Context {
            message: "获取当前工作目录失败".to_string(),
            source,
        })?;
        let from_env = env::var_os(CONFIG_ENV).map(PathBuf::from);
        match resolve_path(explicit, from_env, &cwd) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let join = &self.join;
        if !join.tolerance.is_finite() || join.tolerance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "join.tolerance 必须为正数，实际为 {}",
                join.tolerance
            )));
        }
        if !join.arc_sample_step_degrees.is_finite()
            || join.arc_sample_step_degrees <= 0.0
            || join.arc_sample_step_degrees > 180.0
        {
            return Err(ConfigError::Invalid(format!(
                "join.arc_sample_step_degrees 必须位于 (0, 180]，实际为 {}",
                join.arc_sample_step_degrees
            )));
        }
        if join.output_suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "join.output_suffix 不能为空，否则会覆盖输入文件".to_string(),
            ));
        }
        Ok(())
    }
}

/// 显式路径 > 环境变量 > `<cwd>/config/default.toml`（存在时）。
fn resolve_path(explicit: Option<&Path>, from_env: Option<PathBuf>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = from_env {
        return Some(path);
    }
    let default_path = cwd.join("config").join("default.toml");
    default_path.exists().then_some(default_path)
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 自动连接参数。
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JoinConfig {
    /// 端点视为重合的距离。
    #[serde(default = "JoinConfig::default_tolerance")]
    pub tolerance: f64,
    /// 包含检测时圆弧与圆的离散角步长（度）。
    #[serde(default = "JoinConfig::default_arc_sample_step")]
    pub arc_sample_step_degrees: f64,
    /// 默认输出文件名追加在主干后的后缀。
    #[serde(default = "JoinConfig::default_output_suffix")]
    pub output_suffix: String,
}

impl JoinConfig {
    fn default_tolerance() -> f64 {
        0.01
    }

    fn default_arc_sample_step() -> f64 {
        10.0
    }

    fn default_output_suffix() -> String {
        "-auto-bound".to_string()
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::default_tolerance(),
            arc_sample_step_degrees: Self::default_arc_sample_step(),
            output_suffix: Self::default_output_suffix(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置取值非法: {0}")]
    Invalid(String),
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
