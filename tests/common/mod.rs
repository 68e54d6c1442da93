//! 测试公共模块
//! 提供脚本化的认证服务、测试用户与测试配置

#![allow(dead_code)]

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use shepherd_admin::{
    config::{
        ApiConfig, AppConfig, LoggingConfig, SecurityConfig, SessionConfig, StoreBackend,
    },
    error::AppError,
    models::auth::{AuthGrant, LoginCredentials, LoginReply, MfaSetup, PasswordChange, ProfileUpdate},
    models::{Identity, IdentityPatch, Role},
    services::AuthApi,
    session::{MemorySessionStore, SessionController, SessionStore},
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub const PASSWORD: &str = "Shepherd2024";
pub const MFA_CODE: &str = "123456";

pub const ADMIN_EMAIL: &str = "admin@gracechurch.org";
pub const STAFF_EMAIL: &str = "office@gracechurch.org";
pub const PASTOR_EMAIL: &str = "pastor@gracechurch.org";
pub const LEADER_EMAIL: &str = "leader@gracechurch.org";
pub const VIEWER_EMAIL: &str = "viewer@gracechurch.org";
pub const VOLUNTEER_EMAIL: &str = "volunteer@gracechurch.org";

pub fn identity(id: &str, email: &str, role: Role) -> Identity {
    Identity {
        id: id.to_string(),
        first_name: "Test".to_string(),
        last_name: role.label().to_string(),
        email: email.to_string(),
        role,
        mfa_enabled: false,
        last_login: None,
    }
}

pub fn password() -> Secret<String> {
    Secret::new(PASSWORD.to_string())
}

struct MockUser {
    identity: Identity,
    password: String,
    mfa_code: Option<String>,
}

#[derive(Default)]
struct MockState {
    users: HashMap<String, MockUser>,
    revoked_refresh_tokens: HashSet<String>,
    gates: HashMap<String, oneshot::Receiver<()>>,
    profile_gate: Option<oneshot::Receiver<()>>,
    issued: usize,
}

/// 脚本化的认证服务
///
/// 访问令牌形如 `access-{id}-{n}`，刷新令牌形如 `refresh-{id}`
#[derive(Default)]
pub struct MockAuthApi {
    state: Mutex<MockState>,
    offline: std::sync::atomic::AtomicBool,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
}

impl MockAuthApi {
    /// 每个角色一个用户；管理员开启了 MFA
    pub fn new() -> Self {
        let api = Self::default();
        api.add_user(identity("1", ADMIN_EMAIL, Role::SuperAdmin), Some(MFA_CODE));
        api.add_user(identity("2", STAFF_EMAIL, Role::AdminStaff), None);
        api.add_user(identity("3", PASTOR_EMAIL, Role::PastoralStaff), None);
        api.add_user(identity("4", LEADER_EMAIL, Role::MinistryLeader), None);
        api.add_user(identity("5", VIEWER_EMAIL, Role::ReadOnly), None);
        api.add_user(identity("6", VOLUNTEER_EMAIL, Role::Volunteer), None);
        api
    }

    pub fn add_user(&self, mut identity: Identity, mfa_code: Option<&str>) {
        identity.mfa_enabled = mfa_code.is_some();
        let mut state = self.state.lock().unwrap();
        state.users.insert(
            identity.email.clone(),
            MockUser {
                identity,
                password: PASSWORD.to_string(),
                mfa_code: mfa_code.map(str::to_string),
            },
        );
    }

    /// 直接修改服务端的用户资料
    pub fn edit_user(&self, id: &str, edit: impl FnOnce(&mut Identity)) {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.values_mut().find(|user| user.identity.id == id) {
            edit(&mut user.identity);
        }
    }

    /// 模拟服务端不可达
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn revoke_refresh_token(&self, token: &str) {
        self.state
            .lock()
            .unwrap()
            .revoked_refresh_tokens
            .insert(token.to_string());
    }

    /// 该邮箱的下一次登录请求挂起，直到返回的 Sender 被触发
    pub fn gate(&self, email: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().gates.insert(email.to_string(), rx);
        tx
    }

    /// 下一次资料更新请求挂起，直到返回的 Sender 被触发
    pub fn gate_profile(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().profile_gate = Some(rx);
        tx
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    fn issue_access_token(&self, user_id: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.issued += 1;
        format!("access-{}-{}", user_id, state.issued)
    }

    fn user_id_for(&self, access_token: &Secret<String>) -> Result<String, AppError> {
        access_token
            .expose_secret()
            .strip_prefix("access-")
            .and_then(|rest| rest.rsplit_once('-'))
            .map(|(id, _)| id.to_string())
            .ok_or(AppError::Unauthorized)
    }

    fn with_user<T>(
        &self,
        access_token: &Secret<String>,
        f: impl FnOnce(&mut MockUser) -> T,
    ) -> Result<T, AppError> {
        let id = self.user_id_for(access_token)?;
        let mut state = self.state.lock().unwrap();
        state
            .users
            .values_mut()
            .find(|user| user.identity.id == id)
            .map(f)
            .ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, credentials: &LoginCredentials) -> Result<LoginReply, AppError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.state.lock().unwrap().gates.remove(&credentials.email);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.check_online()?;

        let (identity, mfa_code) = {
            let state = self.state.lock().unwrap();
            let user = state
                .users
                .get(&credentials.email)
                .filter(|user| user.password == *credentials.password.expose_secret())
                .ok_or_else(|| AppError::InvalidCredentials("Invalid credentials".to_string()))?;
            (user.identity.clone(), user.mfa_code.clone())
        };

        if let Some(expected) = mfa_code {
            match credentials.mfa_code.as_deref() {
                None => return Ok(LoginReply::MfaRequired),
                Some(code) if code == expected => {}
                Some(_) => {
                    return Err(AppError::InvalidCredentials("Invalid MFA code".to_string()))
                }
            }
        }

        Ok(LoginReply::Granted(AuthGrant {
            access_token: Secret::new(self.issue_access_token(&identity.id)),
            refresh_token: Secret::new(format!("refresh-{}", identity.id)),
            identity,
        }))
    }

    async fn refresh(&self, refresh_token: &Secret<String>) -> Result<Secret<String>, AppError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let token = refresh_token.expose_secret();
        if self
            .state
            .lock()
            .unwrap()
            .revoked_refresh_tokens
            .contains(token)
        {
            return Err(AppError::SessionExpired);
        }
        let id = token
            .strip_prefix("refresh-")
            .ok_or(AppError::SessionExpired)?;
        Ok(Secret::new(self.issue_access_token(id)))
    }

    async fn logout(&self, _refresh_token: &Secret<String>) -> Result<(), AppError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }

    async fn current_user(&self, access_token: &Secret<String>) -> Result<Identity, AppError> {
        self.check_online()?;
        self.with_user(access_token, |user| user.identity.clone())
    }

    async fn setup_mfa(&self, access_token: &Secret<String>) -> Result<MfaSetup, AppError> {
        self.check_online()?;
        self.with_user(access_token, |_| MfaSetup {
            qr_code: "data:image/png;base64,AAAA".to_string(),
            secret: "JBSWY3DPEHPK3PXP".to_string(),
        })
    }

    async fn verify_mfa(&self, access_token: &Secret<String>, code: &str) -> Result<bool, AppError> {
        self.check_online()?;
        self.with_user(access_token, |user| {
            if code != MFA_CODE {
                return false;
            }
            user.identity.mfa_enabled = true;
            user.mfa_code = Some(MFA_CODE.to_string());
            true
        })
    }

    async fn change_password(
        &self,
        access_token: &Secret<String>,
        change: &PasswordChange,
    ) -> Result<bool, AppError> {
        self.check_online()?;
        self.with_user(access_token, |user| {
            if user.password != *change.current_password.expose_secret() {
                return false;
            }
            user.password = change.new_password.expose_secret().clone();
            true
        })
    }

    /// 只回传被修改的字段
    async fn update_profile(
        &self,
        access_token: &Secret<String>,
        update: &ProfileUpdate,
    ) -> Result<IdentityPatch, AppError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.state.lock().unwrap().profile_gate.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.check_online()?;
        self.with_user(access_token, |user| {
            if let Some(first_name) = &update.first_name {
                user.identity.first_name = first_name.clone();
            }
            if let Some(last_name) = &update.last_name {
                user.identity.last_name = last_name.clone();
            }
            if let Some(email) = &update.email {
                user.identity.email = email.clone();
            }
            IdentityPatch {
                first_name: update.first_name.clone(),
                last_name: update.last_name.clone(),
                email: update.email.clone(),
                ..IdentityPatch::default()
            }
        })
    }
}

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        api: ApiConfig {
            base_url: "http://127.0.0.1:3000/api".to_string(),
            request_timeout_secs: 5,
            remote_logout: true,
            api_key: None,
        },
        session: SessionConfig {
            store: StoreBackend::Memory,
            store_path: std::env::temp_dir().join("shepherd-test-session.json"),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            password_min_length: 8,
            password_require_uppercase: true,
            password_require_lowercase: true,
            password_require_digit: true,
            password_require_special: false,
            mfa_code_length: 6,
        },
    }
}

/// 测试上下文：控制器与它背后的服务、存储
pub struct TestContext {
    pub api: Arc<MockAuthApi>,
    pub store: Arc<MemorySessionStore>,
    pub controller: Arc<SessionController>,
}

impl TestContext {
    /// 空存储，已完成恢复（Anonymous）
    pub async fn new() -> Self {
        let ctx = Self::unrestored(Arc::new(MockAuthApi::new()), Arc::new(MemorySessionStore::new()));
        ctx.controller.restore().await;
        ctx
    }

    /// 尚未恢复（Restoring）
    pub fn unrestored(api: Arc<MockAuthApi>, store: Arc<MemorySessionStore>) -> Self {
        let controller = SessionController::new(api.clone(), store.clone() as Arc<dyn SessionStore>)
            .with_security(&create_test_config().security);
        Self {
            api,
            store,
            controller: Arc::new(controller),
        }
    }

    /// 共享同一服务与存储的新控制器，模拟页面重新加载
    pub async fn reload(&self) -> Self {
        let ctx = Self::unrestored(self.api.clone(), self.store.clone());
        ctx.controller.restore().await;
        ctx
    }

    pub async fn login_as(&self, email: &str) -> Identity {
        match self.controller.login(email, password(), None).await {
            Ok(shepherd_admin::session::LoginOutcome::Success { identity, .. }) => identity,
            other => panic!("login as {} failed: {:?}", email, other),
        }
    }
}
