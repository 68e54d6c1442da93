//! 会话控制器
//! 登录（含 MFA 二次验证）、登出、令牌刷新、个人资料更新；唯一可以修改会话与会话存储的组件

use crate::{
    auth::password::{check_mfa_code, PasswordPolicy},
    auth::permissions::Permission,
    config::SecurityConfig,
    error::AppError,
    models::auth::{LoginCredentials, LoginReply, MfaSetup, PasswordChange, ProfileUpdate},
    models::Identity,
    services::auth_api::AuthApi,
    session::login_attempt::{LoginAttempt, LoginStep, Resolution},
    session::state::{Credentials, RoleQuery, Session, SessionSnapshot, SessionStatus},
    session::store::{PersistedSession, SessionStore, StoreKey},
};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use validator::Validate;

/// 登录结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// 已认证；`redirect_to` 为触发登录的原始路径，否则为首页
    Success { identity: Identity, redirect_to: String },
    /// 密码正确，需要 MFA 验证码
    MfaRequired,
}

struct Inner {
    session: Session,
    attempt: LoginAttempt,
    /// 每次整体替换会话（登录、登出、取消登录）时递增
    sequence: u64,
    /// 每次发起修改身份的请求（资料更新、重新获取、MFA 启用）时递增
    identity_version: u64,
}

/// 身份修改请求发起时的序号快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdentityTicket {
    sequence: u64,
    version: u64,
}

pub struct SessionController {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn SessionStore>,
    inner: Mutex<Inner>,
    snapshot: watch::Sender<SessionSnapshot>,
    password_policy: PasswordPolicy,
    mfa_code_length: usize,
}

impl SessionController {
    /// 创建控制器，初始状态为 Restoring；随后调用 `restore()`
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn SessionStore>) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::restoring());
        Self {
            api,
            store,
            inner: Mutex::new(Inner {
                session: Session::Restoring,
                attempt: LoginAttempt::default(),
                sequence: 0,
                identity_version: 0,
            }),
            snapshot,
            password_policy: PasswordPolicy::default(),
            mfa_code_length: 6,
        }
    }

    /// 应用安全配置（密码策略、MFA 验证码位数）
    pub fn with_security(mut self, security: &SecurityConfig) -> Self {
        self.password_policy = PasswordPolicy::from(security);
        self.mfa_code_length = security.mfa_code_length;
        self
    }

    // ==================== 读取 ====================

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.snapshot.borrow().status
    }

    pub fn is_restoring(&self) -> bool {
        self.status() == SessionStatus::Restoring
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn identity(&self) -> Option<Identity> {
        self.snapshot.borrow().identity.clone()
    }

    /// 订阅会话变化（恢复完成、登录、登出）
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// 唯一的授权原语：未认证时恒为 false
    pub fn has_role(&self, roles: impl RoleQuery) -> bool {
        self.snapshot.borrow().has_role(roles)
    }

    /// `has_role` 数据与权限表的组合
    pub fn can(&self, permission: Permission) -> bool {
        self.snapshot.borrow().can(permission)
    }

    /// 当前访问令牌，供其他 API 客户端使用
    pub async fn access_token(&self) -> Option<Secret<String>> {
        let inner = self.inner.lock().await;
        inner
            .session
            .credentials()
            .map(|credentials| credentials.access_token().clone())
    }

    pub async fn login_step(&self) -> LoginStep {
        self.inner.lock().await.attempt.step()
    }

    /// 登录成功后将要跳转的路径
    pub async fn login_destination(&self) -> String {
        self.inner.lock().await.attempt.destination()
    }

    // ==================== 恢复 ====================

    /// 从会话存储恢复；只在 Restoring 状态下生效
    pub async fn restore(&self) -> SessionStatus {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.session, Session::Restoring) {
            return inner.session.status();
        }

        let restored = match self.store.load_session().await {
            Ok(persisted) => self.parse_persisted(persisted).await,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                None
            }
        };

        inner.session = match restored {
            Some((identity, credentials)) => {
                info!(user_id = %identity.id, role = %identity.role, "Session restored");
                Session::Authenticated {
                    identity,
                    credentials,
                }
            }
            None => {
                debug!("No persisted session, starting anonymous");
                Session::Anonymous
            }
        };
        self.publish(&inner);
        inner.session.status()
    }

    /// 形状检查；不完整或损坏的条目被清除并视为无会话
    async fn parse_persisted(&self, persisted: PersistedSession) -> Option<(Identity, Credentials)> {
        if persisted.is_empty() {
            return None;
        }

        let parsed = match (persisted.access_token, persisted.refresh_token, persisted.user) {
            (Some(access), Some(refresh), Some(user)) => {
                let identity = serde_json::from_str::<Identity>(&user)
                    .ok()
                    .filter(Identity::is_well_formed);
                identity.zip(Credentials::new(access, refresh))
            }
            _ => None,
        };

        if parsed.is_none() {
            warn!("Discarding malformed persisted session");
            if let Err(e) = self.store.clear_session().await {
                warn!(error = %e, "Failed to clear malformed session");
            }
        }
        parsed
    }

    // ==================== 登录 ====================

    /// 开始新的登录尝试，记录触发登录的原始路径
    pub async fn begin_login(&self, return_to: Option<String>) {
        let mut inner = self.inner.lock().await;
        inner.sequence += 1;
        inner.attempt = LoginAttempt::new(return_to);
    }

    /// 放弃 MFA 二次验证；在途请求的响应将被丢弃
    pub async fn cancel_login(&self) {
        let mut inner = self.inner.lock().await;
        inner.sequence += 1;
        inner.attempt.cancel();
        debug!("Login attempt cancelled");
    }

    /// 登录；`mfa_code` 为空且服务端要求 MFA 时返回 `MfaRequired`
    pub async fn login(
        &self,
        email: &str,
        password: Secret<String>,
        mfa_code: Option<&str>,
    ) -> Result<LoginOutcome, AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }
        if password.expose_secret().is_empty() {
            return Err(AppError::Validation("Password is required".to_string()));
        }
        let mfa_code = mfa_code.map(str::trim);
        if let Some(code) = mfa_code {
            check_mfa_code(code, self.mfa_code_length)?;
        }

        let ticket = {
            let mut inner = self.inner.lock().await;
            inner.sequence += 1;
            if matches!(inner.attempt.step(), LoginStep::Resolved(_)) {
                inner.attempt.cancel();
            }
            inner.sequence
        };

        let credentials = LoginCredentials {
            email: email.to_string(),
            password,
            mfa_code: mfa_code.map(str::to_string),
        };
        let result = self.api.login(&credentials).await;

        let mut inner = self.inner.lock().await;
        if inner.sequence != ticket {
            debug!(ticket, current = inner.sequence, "Discarding stale login response");
            return Err(AppError::Superseded);
        }

        match result {
            Ok(LoginReply::MfaRequired) if credentials.mfa_code.is_none() => {
                info!(email = %credentials.email, "MFA code required");
                inner.attempt.await_mfa(credentials.email, credentials.password);
                metrics::counter!("session_login_total", "outcome" => "mfa_required").increment(1);
                Ok(LoginOutcome::MfaRequired)
            }
            Ok(LoginReply::MfaRequired) => {
                // 提交了验证码却仍被要求 MFA：视为验证码被拒
                inner.attempt.reject();
                metrics::counter!("session_login_total", "outcome" => "invalid_credentials").increment(1);
                Err(AppError::InvalidCredentials("Invalid MFA code".to_string()))
            }
            Ok(LoginReply::Granted(grant)) => {
                let credentials_pair = Credentials::new(grant.access_token, grant.refresh_token);
                let (identity, credentials_pair) = match credentials_pair {
                    Some(pair) if grant.identity.is_well_formed() => (grant.identity, pair),
                    _ => {
                        inner.attempt.resolve(Resolution::Failure);
                        return Err(AppError::InvalidResponse(
                            "login grant is missing identity or tokens".to_string(),
                        ));
                    }
                };

                if let Err(e) = self.persist(&identity, &credentials_pair).await {
                    // 存储仍是旧会话：不切换内存会话，保持两者一致
                    inner.attempt.resolve(Resolution::Failure);
                    metrics::counter!("session_login_total", "outcome" => "error").increment(1);
                    return Err(e);
                }

                let redirect_to = inner.attempt.take_destination();
                inner.attempt.resolve(Resolution::Success);
                inner.session = Session::Authenticated {
                    identity: identity.clone(),
                    credentials: credentials_pair,
                };
                self.publish(&inner);

                info!(user_id = %identity.id, role = %identity.role, "Login successful");
                metrics::counter!("session_login_total", "outcome" => "success").increment(1);
                Ok(LoginOutcome::Success {
                    identity,
                    redirect_to,
                })
            }
            Err(AppError::InvalidCredentials(message)) => {
                inner.attempt.reject();
                warn!(email = %credentials.email, "Login rejected");
                metrics::counter!("session_login_total", "outcome" => "invalid_credentials").increment(1);
                Err(AppError::InvalidCredentials(message))
            }
            Err(e) => {
                inner.attempt.resolve(Resolution::Failure);
                warn!(error = %e, "Login failed");
                metrics::counter!("session_login_total", "outcome" => "error").increment(1);
                Err(e)
            }
        }
    }

    /// 使用登录尝试中保存的邮箱与密码提交 MFA 验证码
    pub async fn submit_mfa_code(&self, code: &str) -> Result<LoginOutcome, AppError> {
        let (email, password) = {
            let inner = self.inner.lock().await;
            match inner.attempt.pending_credentials() {
                Some((email, password)) => (email.to_string(), password.clone()),
                None => return Err(AppError::NoPendingMfa),
            }
        };
        self.login(&email, password, Some(code)).await
    }

    // ==================== 登出 ====================

    /// 登出；幂等，未登录时会话不变，但在途的登录响应仍被作废
    pub async fn logout(&self) {
        let previous = {
            let mut inner = self.inner.lock().await;
            inner.sequence += 1;
            inner.attempt = LoginAttempt::default();
            if matches!(inner.session, Session::Anonymous) {
                return;
            }
            let previous = std::mem::replace(&mut inner.session, Session::Anonymous);
            if let Err(e) = self.store.clear_session().await {
                warn!(error = %e, "Failed to clear persisted session");
            }
            self.publish(&inner);
            previous
        };

        if let Session::Authenticated {
            identity,
            credentials,
        } = previous
        {
            info!(user_id = %identity.id, "Logged out");
            if let Err(e) = self.api.logout(credentials.refresh_token()).await {
                debug!(error = %e, "Remote logout failed");
            }
        }
    }

    // ==================== 令牌刷新 ====================

    /// 刷新访问令牌；刷新令牌被拒时强制登出
    pub async fn refresh_token(&self) -> Result<(), AppError> {
        let (ticket, refresh_token) = self.authenticated_ticket(|c| c.refresh_token().clone()).await?;

        let result = self.api.refresh(&refresh_token).await;

        let mut inner = self.inner.lock().await;
        if inner.sequence != ticket {
            debug!("Discarding stale refresh response");
            return Err(AppError::Superseded);
        }

        match result {
            Ok(access_token) => {
                let replaced = match &mut inner.session {
                    Session::Authenticated { credentials, .. } => {
                        credentials.replace_access_token(access_token.clone())
                    }
                    _ => false,
                };
                if !replaced {
                    return Err(AppError::InvalidResponse("empty access token".to_string()));
                }
                if let Err(e) = self
                    .store
                    .set(StoreKey::AccessToken, access_token.expose_secret())
                    .await
                {
                    warn!(error = %e, "Failed to persist refreshed access token");
                    self.discard_persisted().await;
                }
                metrics::counter!("session_refresh_total", "outcome" => "success").increment(1);
                debug!("Access token refreshed");
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                metrics::counter!("session_refresh_total", "outcome" => "retryable").increment(1);
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Refresh token rejected, forcing logout");
                inner.sequence += 1;
                inner.session = Session::Anonymous;
                inner.attempt = LoginAttempt::default();
                if let Err(e) = self.store.clear_session().await {
                    warn!(error = %e, "Failed to clear persisted session");
                }
                self.publish(&inner);
                metrics::counter!("session_refresh_total", "outcome" => "rejected").increment(1);
                metrics::counter!("session_forced_logout_total").increment(1);
                Err(AppError::SessionExpired)
            }
        }
    }

    // ==================== 个人资料与安全设置 ====================

    /// 更新个人资料；返回字段合并进当前身份
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Identity, AppError> {
        let update = update.normalized();
        if update.is_empty() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        update.validate()?;

        let (ticket, access_token) = self.identity_ticket().await?;
        let patch = self.api.update_profile(&access_token, &update).await?;

        let mut inner = self.inner.lock().await;
        if !ticket.is_current(&inner) {
            debug!("Discarding stale profile response");
            return Err(AppError::Superseded);
        }
        let identity = match &mut inner.session {
            Session::Authenticated { identity, .. } => {
                identity.merge(patch);
                identity.clone()
            }
            _ => return Err(AppError::NotAuthenticated),
        };
        self.persist_identity(&identity).await;
        self.publish(&inner);

        info!(user_id = %identity.id, "Profile updated");
        Ok(identity)
    }

    /// 从服务端重新获取当前用户并整体替换身份
    pub async fn reload_identity(&self) -> Result<Identity, AppError> {
        let (ticket, access_token) = self.identity_ticket().await?;
        let fetched = self.api.current_user(&access_token).await?;
        if !fetched.is_well_formed() {
            return Err(AppError::InvalidResponse("current user is malformed".to_string()));
        }

        let mut inner = self.inner.lock().await;
        if !ticket.is_current(&inner) {
            return Err(AppError::Superseded);
        }
        match &mut inner.session {
            Session::Authenticated { identity, .. } => *identity = fetched.clone(),
            _ => return Err(AppError::NotAuthenticated),
        }
        self.persist_identity(&fetched).await;
        self.publish(&inner);
        Ok(fetched)
    }

    /// 修改密码；先按本地策略校验
    pub async fn change_password(
        &self,
        current_password: Secret<String>,
        new_password: Secret<String>,
    ) -> Result<(), AppError> {
        self.password_policy
            .check_change(current_password.expose_secret(), new_password.expose_secret())?;

        let (_, access_token) = self.authenticated_ticket(|c| c.access_token().clone()).await?;
        let change = PasswordChange {
            current_password,
            new_password,
        };
        if self.api.change_password(&access_token, &change).await? {
            info!("Password changed");
            Ok(())
        } else {
            Err(AppError::InvalidCredentials(
                "Failed to change password. Please check your current password.".to_string(),
            ))
        }
    }

    /// 开始 MFA 绑定，返回二维码与密钥
    pub async fn setup_mfa(&self) -> Result<MfaSetup, AppError> {
        let (_, access_token) = self.authenticated_ticket(|c| c.access_token().clone()).await?;
        self.api.setup_mfa(&access_token).await
    }

    /// 校验 MFA 绑定验证码；成功后身份标记为已启用 MFA
    pub async fn verify_mfa(&self, code: &str) -> Result<(), AppError> {
        let code = code.trim();
        check_mfa_code(code, self.mfa_code_length)?;

        let (ticket, access_token) = self.identity_ticket().await?;
        if !self.api.verify_mfa(&access_token, code).await? {
            return Err(AppError::InvalidCredentials("Invalid verification code".to_string()));
        }

        let mut inner = self.inner.lock().await;
        if !ticket.is_current(&inner) {
            return Err(AppError::Superseded);
        }
        let identity = match &mut inner.session {
            Session::Authenticated { identity, .. } => {
                identity.mfa_enabled = true;
                identity.clone()
            }
            _ => return Err(AppError::NotAuthenticated),
        };
        self.persist_identity(&identity).await;
        self.publish(&inner);

        info!(user_id = %identity.id, "MFA enabled");
        Ok(())
    }

    // ==================== 内部 ====================

    /// 取当前序号与所需凭据；未认证时报错
    async fn authenticated_ticket<T>(
        &self,
        pick: impl FnOnce(&Credentials) -> T,
    ) -> Result<(u64, T), AppError> {
        let inner = self.inner.lock().await;
        match inner.session.credentials() {
            Some(credentials) => Ok((inner.sequence, pick(credentials))),
            None => Err(AppError::NotAuthenticated),
        }
    }

    /// 发起身份修改请求：递增身份版本，较早发出的同类请求响应将被丢弃
    async fn identity_ticket(&self) -> Result<(IdentityTicket, Secret<String>), AppError> {
        let mut inner = self.inner.lock().await;
        let access_token = match inner.session.credentials() {
            Some(credentials) => credentials.access_token().clone(),
            None => return Err(AppError::NotAuthenticated),
        };
        inner.identity_version += 1;
        let ticket = IdentityTicket {
            sequence: inner.sequence,
            version: inner.identity_version,
        };
        Ok((ticket, access_token))
    }

    /// 整组写入存储
    ///
    /// 写入失败时清空存储，下次启动最多回到匿名；清空也失败则返回错误，
    /// 由调用方保持内存会话不变
    async fn persist(&self, identity: &Identity, credentials: &Credentials) -> Result<(), AppError> {
        let written = match serde_json::to_string(identity) {
            Ok(user) => {
                let persisted = PersistedSession {
                    access_token: Some(credentials.access_token().clone()),
                    refresh_token: Some(credentials.refresh_token().clone()),
                    user: Some(user),
                };
                self.store.write_session(&persisted).await
            }
            Err(e) => Err(AppError::Storage(e.to_string())),
        };

        match written {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to persist session, clearing store");
                self.store.clear_session().await.map_err(|clear_error| {
                    warn!(error = %clear_error, "Failed to clear persisted session");
                    clear_error
                })
            }
        }
    }

    async fn persist_identity(&self, identity: &Identity) {
        let written = match serde_json::to_string(identity) {
            Ok(user) => self.store.set(StoreKey::User, &user).await,
            Err(e) => Err(AppError::Storage(e.to_string())),
        };
        if let Err(e) = written {
            warn!(error = %e, "Failed to persist identity");
            self.discard_persisted().await;
        }
    }

    /// 单键写入失败后清空存储，避免下次启动恢复出与内存不一致的会话
    async fn discard_persisted(&self) {
        if let Err(e) = self.store.clear_session().await {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }

    fn publish(&self, inner: &Inner) {
        self.snapshot.send_replace(inner.session.snapshot());
    }
}

impl IdentityTicket {
    fn is_current(&self, inner: &Inner) -> bool {
        inner.sequence == self.sequence && inner.identity_version == self.version
    }
}
