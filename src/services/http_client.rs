//! REST API 客户端
//! 基于 reqwest，负责请求头、超时与状态码到 AppError 的映射

use crate::{
    config::ApiConfig,
    error::AppError,
    models::auth::{
        ApiErrorBody, ChangePasswordRequest, LoginCredentials, LoginReply, LoginRequest,
        LoginResponse, MfaSetup, PasswordChange, ProfileUpdate, RefreshTokenRequest,
        RefreshTokenResponse, SuccessResponse, UserEnvelope, UserPatchEnvelope, VerifyMfaRequest,
    },
    models::{Identity, IdentityPatch},
    services::auth_api::AuthApi,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::{debug, warn};

/// 非 2xx 响应的解释方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 登录、MFA 校验、修改密码：4xx 表示凭据被拒
    Credentials,
    /// 令牌刷新：4xx 表示会话过期
    Refresh,
    Default,
}

/// 将 HTTP 状态码映射为应用错误
pub fn map_status(status: StatusCode, message: String, kind: FailureKind) -> AppError {
    let rejected = matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    );

    match kind {
        FailureKind::Credentials if rejected => AppError::InvalidCredentials(message),
        FailureKind::Refresh if rejected => AppError::SessionExpired,
        _ => match status {
            StatusCode::UNAUTHORIZED => AppError::Unauthorized,
            StatusCode::FORBIDDEN => AppError::Forbidden,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => AppError::Validation(
                if message.is_empty() { "Invalid request".to_string() } else { message },
            ),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => AppError::Timeout,
            _ => AppError::Api {
                status: status.as_u16(),
                message,
            },
        },
    }
}

/// 共享的 API 客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<Secret<String>>,
}

impl ApiClient {
    /// 根据配置创建客户端
    pub fn from_config(config: &ApiConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("shepherd-admin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 构建请求，附带请求 ID、API Key 与 Bearer 令牌
    pub fn request(
        &self,
        method: Method,
        path: &str,
        access_token: Option<&Secret<String>>,
    ) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string());

        if let Some(api_key) = &self.api_key {
            builder = builder.header("X-Api-Key", api_key.expose_secret());
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        builder
    }

    /// 发送请求并解析 JSON 响应
    pub async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        builder: RequestBuilder,
        kind: FailureKind,
    ) -> Result<T, AppError> {
        let response = self.send(endpoint, builder, kind).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::InvalidResponse(format!("{}: {}", endpoint, e)))
    }

    /// 发送请求，忽略响应体
    pub async fn execute_empty(
        &self,
        endpoint: &'static str,
        builder: RequestBuilder,
        kind: FailureKind,
    ) -> Result<(), AppError> {
        self.send(endpoint, builder, kind).await.map(|_| ())
    }

    async fn send(
        &self,
        endpoint: &'static str,
        builder: RequestBuilder,
        kind: FailureKind,
    ) -> Result<reqwest::Response, AppError> {
        let started = Instant::now();
        let result = builder.send().await;
        metrics::histogram!("auth_api_request_duration_seconds", "endpoint" => endpoint)
            .record(started.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            warn!(endpoint, error = %e, "API request failed");
            AppError::from(e)
        })?;

        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "API response");

        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ApiErrorBody>()
            .await
            .unwrap_or_default()
            .into_message();
        Err(map_status(status, message, kind))
    }
}

/// 基于 HTTP 的认证服务实现
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    api: ApiClient,
    remote_logout: bool,
}

impl HttpAuthApi {
    pub fn new(api: ApiClient, remote_logout: bool) -> Self {
        Self { api, remote_logout }
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, AppError> {
        Ok(Self::new(ApiClient::from_config(config)?, config.remote_logout))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &LoginCredentials) -> Result<LoginReply, AppError> {
        let body = LoginRequest {
            email: &credentials.email,
            password: credentials.password.expose_secret(),
            mfa_token: credentials.mfa_code.as_deref(),
        };
        let builder = self.api.request(Method::POST, "/auth/login", None).json(&body);

        let response: LoginResponse = self
            .api
            .execute("auth.login", builder, FailureKind::Credentials)
            .await?;
        response.into_reply().map_err(AppError::InvalidResponse)
    }

    async fn refresh(&self, refresh_token: &Secret<String>) -> Result<Secret<String>, AppError> {
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.expose_secret(),
        };
        let builder = self.api.request(Method::POST, "/auth/refresh", None).json(&body);

        let response: RefreshTokenResponse = self
            .api
            .execute("auth.refresh", builder, FailureKind::Refresh)
            .await?;
        if response.access_token.is_empty() {
            return Err(AppError::InvalidResponse("empty access token".to_string()));
        }
        Ok(Secret::new(response.access_token))
    }

    async fn logout(&self, refresh_token: &Secret<String>) -> Result<(), AppError> {
        if !self.remote_logout {
            return Ok(());
        }
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.expose_secret(),
        };
        let builder = self.api.request(Method::POST, "/auth/logout", None).json(&body);
        self.api
            .execute_empty("auth.logout", builder, FailureKind::Default)
            .await
    }

    async fn current_user(&self, access_token: &Secret<String>) -> Result<Identity, AppError> {
        let builder = self.api.request(Method::GET, "/auth/me", Some(access_token));
        let envelope: UserEnvelope = self
            .api
            .execute("auth.me", builder, FailureKind::Default)
            .await?;
        Ok(envelope.user)
    }

    async fn setup_mfa(&self, access_token: &Secret<String>) -> Result<MfaSetup, AppError> {
        let builder = self
            .api
            .request(Method::POST, "/auth/mfa/setup", Some(access_token));
        self.api
            .execute("auth.mfa.setup", builder, FailureKind::Default)
            .await
    }

    async fn verify_mfa(&self, access_token: &Secret<String>, code: &str) -> Result<bool, AppError> {
        let builder = self
            .api
            .request(Method::POST, "/auth/mfa/verify", Some(access_token))
            .json(&VerifyMfaRequest { token: code });
        let response: SuccessResponse = self
            .api
            .execute("auth.mfa.verify", builder, FailureKind::Credentials)
            .await?;
        Ok(response.success)
    }

    async fn change_password(
        &self,
        access_token: &Secret<String>,
        change: &PasswordChange,
    ) -> Result<bool, AppError> {
        let body = ChangePasswordRequest {
            current_password: change.current_password.expose_secret(),
            new_password: change.new_password.expose_secret(),
        };
        let builder = self
            .api
            .request(Method::PATCH, "/auth/password/change", Some(access_token))
            .json(&body);
        let response: SuccessResponse = self
            .api
            .execute("auth.password.change", builder, FailureKind::Credentials)
            .await?;
        Ok(response.success)
    }

    async fn update_profile(
        &self,
        access_token: &Secret<String>,
        update: &ProfileUpdate,
    ) -> Result<IdentityPatch, AppError> {
        let builder = self
            .api
            .request(Method::PATCH, "/auth/profile", Some(access_token))
            .json(update);
        let envelope: UserPatchEnvelope = self
            .api
            .execute("auth.profile", builder, FailureKind::Default)
            .await?;
        Ok(envelope.user)
    }
}
