//! 统一错误模型
//! 定义会话核心与认证服务客户端的所有错误类型

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 邮箱/密码错误，或 MFA 验证码被拒绝
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// 认证服务不可达
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// 刷新令牌被拒绝，会话已被强制登出
    #[error("Session expired")]
    SessionExpired,

    /// 远端拒绝了访问令牌
    #[error("Authentication failed")]
    Unauthorized,

    /// 当前没有已认证的会话
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Access denied")]
    Forbidden,

    /// 响应到达时已有更新的请求发出，结果被丢弃
    #[error("Request superseded by a newer one")]
    Superseded,

    /// 当前登录尝试不处于等待 MFA 验证码的状态
    #[error("No login attempt is waiting for an MFA code")]
    NoPendingMfa,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidCredentials(msg) if !msg.is_empty() => msg.clone(),
            AppError::InvalidCredentials(_) => "Invalid credentials".to_string(),
            AppError::Network(_) => {
                "Unable to reach the server. Please try again.".to_string()
            }
            AppError::Timeout => "The server took too long to respond. Please try again.".to_string(),
            AppError::SessionExpired => "Your session has expired. Please sign in again.".to_string(),
            AppError::Unauthorized | AppError::NotAuthenticated => {
                "Please sign in to continue".to_string()
            }
            AppError::Forbidden => "Access denied".to_string(),
            AppError::Superseded => "Request was cancelled".to_string(),
            AppError::NoPendingMfa => "Please sign in with your email and password first".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Api { message, .. } if !message.is_empty() => message.clone(),
            AppError::Api { .. } => "The server reported an error".to_string(),
            AppError::InvalidResponse(_) => "Unexpected response from the server".to_string(),
            AppError::Storage(_) => "Local session storage error".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials(_) => "invalid_credentials",
            AppError::Network(_) => "network_error",
            AppError::Timeout => "timeout",
            AppError::SessionExpired => "session_expired",
            AppError::Unauthorized => "unauthorized",
            AppError::NotAuthenticated => "not_authenticated",
            AppError::Forbidden => "forbidden",
            AppError::Superseded => "superseded",
            AppError::NoPendingMfa => "no_pending_mfa",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidResponse(_) => "invalid_response",
            AppError::Api { .. } => "api_error",
            AppError::Storage(_) => "storage_error",
            AppError::Config(_) => "config_error",
        }
    }

    /// 调用方是否可以原样重试
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Timeout => true,
            AppError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout
        } else if e.is_decode() {
            AppError::InvalidResponse(e.to_string())
        } else if e.is_connect() || e.is_request() {
            AppError::Network(e.to_string())
        } else if let Some(status) = e.status() {
            AppError::Api {
                status: status.as_u16(),
                message: String::new(),
            }
        } else {
            AppError::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // 只取第一条带消息的错误，与表单逐条提示一致
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| {
                    err.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .next()
            .unwrap_or_else(|| "Invalid input".to_string());
        AppError::Validation(message)
    }
}
