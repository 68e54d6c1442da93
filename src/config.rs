//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// 后端 REST API 根地址，例如 "http://localhost:3000/api"
    pub base_url: String,
    /// 单次请求超时时间（秒）
    pub request_timeout_secs: u64,
    /// 登出时是否通知服务端（默认只清理本地会话）
    pub remote_logout: bool,
    /// 可选的 API Key（使用 Secret 包装，防止日志泄露）
    pub api_key: Option<Secret<String>>,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 会话存储后端: file, memory
    pub store: StoreBackend,
    /// 文件存储路径
    pub store_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, compact
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// 密码最小长度
    pub password_min_length: usize,
    /// 密码必须包含大写字母
    pub password_require_uppercase: bool,
    /// 密码必须包含小写字母
    pub password_require_lowercase: bool,
    /// 密码必须包含数字
    pub password_require_digit: bool,
    /// 密码必须包含特殊字符
    pub password_require_special: bool,
    /// MFA 验证码位数
    pub mfa_code_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("api.base_url", "http://localhost:3000/api")?
            .set_default("api.request_timeout_secs", 30)?
            .set_default("api.remote_logout", false)?
            .set_default("session.store", "file")?
            .set_default("session.store_path", ".shepherd/session.json")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("security.password_min_length", 8)?
            .set_default("security.password_require_uppercase", true)?
            .set_default("security.password_require_lowercase", true)?
            .set_default("security.password_require_digit", true)?
            .set_default("security.password_require_special", false)?
            .set_default("security.mfa_code_length", 6)?;

        // 从环境变量加载配置（前缀为 SHEPHERD_）
        settings = settings.add_source(
            Environment::with_prefix("SHEPHERD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证 API 地址
        let base_url = self.api.base_url.to_lowercase();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Message(format!(
                "Invalid API base URL: {}. Must start with http:// or https://",
                self.api.base_url
            )));
        }

        if self.api.request_timeout_secs < 1 || self.api.request_timeout_secs > 300 {
            return Err(ConfigError::Message(
                "request_timeout_secs must be between 1 and 300".to_string(),
            ));
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, compact",
                    self.logging.format
                )))
            }
        }

        if self.session.store == StoreBackend::File
            && self.session.store_path.as_os_str().is_empty()
        {
            return Err(ConfigError::Message(
                "session.store_path is required for the file store".to_string(),
            ));
        }

        // 验证密码策略
        if self.security.password_min_length < 6 || self.security.password_min_length > 128 {
            return Err(ConfigError::Message(
                "password_min_length must be between 6 and 128".to_string(),
            ));
        }

        if self.security.mfa_code_length < 4 || self.security.mfa_code_length > 10 {
            return Err(ConfigError::Message(
                "mfa_code_length must be between 4 and 10".to_string(),
            ));
        }

        Ok(())
    }
}
