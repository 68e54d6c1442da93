//! 系统用户管理（仅 SUPER_ADMIN）
//! 每个操作先检查 MANAGE_USERS 权限；访问令牌被拒时刷新一次后重试

use crate::{
    auth::password::PasswordPolicy,
    auth::permissions::Permission,
    error::AppError,
    models::user::{
        CreateUserRequest, SystemUser, SystemUserEnvelope, SystemUserList, UpdateStatusRequest,
        UpdateUserRequest,
    },
    services::http_client::{ApiClient, FailureKind},
    session::SessionController,
};
use reqwest::Method;
use secrecy::{ExposeSecret, Secret};
use std::future::Future;
use std::sync::Arc;
use validator::Validate;

pub struct UsersAdmin {
    api: ApiClient,
    session: Arc<SessionController>,
    password_policy: PasswordPolicy,
}

impl UsersAdmin {
    pub fn new(api: ApiClient, session: Arc<SessionController>) -> Self {
        Self {
            api,
            session,
            password_policy: PasswordPolicy::default(),
        }
    }

    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    /// 获取所有系统用户
    pub async fn list(&self) -> Result<Vec<SystemUser>, AppError> {
        let list: SystemUserList = self
            .call(|token| {
                let builder = self.api.request(Method::GET, "/users", Some(&token));
                async move { self.api.execute("users.list", builder, FailureKind::Default).await }
            })
            .await?;
        Ok(list.data)
    }

    /// 获取单个用户
    pub async fn get(&self, id: &str) -> Result<SystemUser, AppError> {
        let path = user_path(id, "")?;
        let envelope: SystemUserEnvelope = self
            .call(|token| {
                let builder = self.api.request(Method::GET, &path, Some(&token));
                async move { self.api.execute("users.get", builder, FailureKind::Default).await }
            })
            .await?;
        Ok(envelope.into_inner())
    }

    /// 创建用户
    pub async fn create(&self, request: CreateUserRequest) -> Result<SystemUser, AppError> {
        let request = CreateUserRequest {
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email: request.email.trim().to_string(),
            ..request
        };
        request.validate()?;
        let password = request.password.expose_secret();
        if password.is_empty() {
            return Err(AppError::Validation("Password is required".to_string()));
        }
        self.password_policy.check(password)?;

        let envelope: SystemUserEnvelope = self
            .call(|token| {
                let builder = self
                    .api
                    .request(Method::POST, "/users", Some(&token))
                    .json(&request);
                async move { self.api.execute("users.create", builder, FailureKind::Default).await }
            })
            .await?;

        let user = envelope.into_inner();
        tracing::info!(user_id = %user.id, role = %user.role, "System user created");
        Ok(user)
    }

    /// 更新用户；只有提供了新密码时才校验密码策略
    pub async fn update(&self, id: &str, request: UpdateUserRequest) -> Result<SystemUser, AppError> {
        let path = user_path(id, "")?;
        let request = UpdateUserRequest {
            first_name: request.first_name.map(|s| s.trim().to_string()),
            last_name: request.last_name.map(|s| s.trim().to_string()),
            email: request.email.map(|s| s.trim().to_string()),
            password: request.password.filter(|p| !p.expose_secret().is_empty()),
            role: request.role,
        };
        request.validate()?;
        if let Some(password) = &request.password {
            self.password_policy.check(password.expose_secret())?;
        }

        let envelope: SystemUserEnvelope = self
            .call(|token| {
                let builder = self
                    .api
                    .request(Method::PATCH, &path, Some(&token))
                    .json(&request);
                async move { self.api.execute("users.update", builder, FailureKind::Default).await }
            })
            .await?;
        Ok(envelope.into_inner())
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let path = user_path(id, "")?;
        self.call(|token| {
            let builder = self.api.request(Method::DELETE, &path, Some(&token));
            async move {
                self.api
                    .execute_empty("users.delete", builder, FailureKind::Default)
                    .await
            }
        })
        .await?;
        tracing::info!(user_id = %id, "System user deleted");
        Ok(())
    }

    /// 启用/停用账户
    pub async fn update_status(&self, id: &str, is_active: bool) -> Result<(), AppError> {
        let path = user_path(id, "/status")?;
        let body = UpdateStatusRequest { is_active };
        self.call(|token| {
            let builder = self
                .api
                .request(Method::PATCH, &path, Some(&token))
                .json(&body);
            async move {
                self.api
                    .execute_empty("users.status", builder, FailureKind::Default)
                    .await
            }
        })
        .await
    }

    /// 触发服务端发送重置密码邮件
    pub async fn reset_password(&self, id: &str) -> Result<(), AppError> {
        let path = user_path(id, "/reset-password")?;
        self.call(|token| {
            let builder = self.api.request(Method::POST, &path, Some(&token));
            async move {
                self.api
                    .execute_empty("users.reset_password", builder, FailureKind::Default)
                    .await
            }
        })
        .await
    }

    fn authorize(&self) -> Result<(), AppError> {
        if self.session.can(Permission::ManageUsers) {
            return Ok(());
        }
        if !self.session.is_authenticated() {
            return Err(AppError::NotAuthenticated);
        }
        tracing::warn!(
            permission = %Permission::ManageUsers,
            "Permission denied"
        );
        Err(AppError::Forbidden)
    }

    /// 执行请求；401 时刷新令牌并重试一次
    async fn call<T, F, Fut>(&self, send: F) -> Result<T, AppError>
    where
        F: Fn(Secret<String>) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.authorize()?;
        let token = self
            .session
            .access_token()
            .await
            .ok_or(AppError::NotAuthenticated)?;

        match send(token).await {
            Err(AppError::Unauthorized) => {
                self.session.refresh_token().await?;
                self.authorize()?;
                let token = self
                    .session
                    .access_token()
                    .await
                    .ok_or(AppError::NotAuthenticated)?;
                send(token).await
            }
            other => other,
        }
    }
}

/// 用户 ID 作为单个路径段；`.`/`..` 会被 URL 规范化吃掉
fn user_path(id: &str, suffix: &str) -> Result<String, AppError> {
    let id = id.trim();
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '?', '#', '%']) {
        return Err(AppError::Validation(format!("Invalid user id: {}", id)));
    }
    Ok(format!("/users/{}{}", id, suffix))
}
