//! 认证服务接口：会话控制器通过它访问远端 API

use crate::{
    error::AppError,
    models::auth::{LoginCredentials, LoginReply, MfaSetup, PasswordChange, ProfileUpdate},
    models::{Identity, IdentityPatch},
};
use async_trait::async_trait;
use secrecy::Secret;

/// 远端认证服务
///
/// 实现负责超时策略，并以 `Network`/`Timeout` 区分不可达；不做重试
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// 登录；需要二次验证时返回 `LoginReply::MfaRequired`
    async fn login(&self, credentials: &LoginCredentials) -> Result<LoginReply, AppError>;

    /// 用刷新令牌换取新的访问令牌
    async fn refresh(&self, refresh_token: &Secret<String>) -> Result<Secret<String>, AppError>;

    /// 通知服务端结束会话（可选，失败可忽略）
    async fn logout(&self, refresh_token: &Secret<String>) -> Result<(), AppError>;

    /// 获取当前用户
    async fn current_user(&self, access_token: &Secret<String>) -> Result<Identity, AppError>;

    async fn setup_mfa(&self, access_token: &Secret<String>) -> Result<MfaSetup, AppError>;

    async fn verify_mfa(&self, access_token: &Secret<String>, code: &str) -> Result<bool, AppError>;

    async fn change_password(
        &self,
        access_token: &Secret<String>,
        change: &PasswordChange,
    ) -> Result<bool, AppError>;

    /// 更新个人资料，返回的字段可能不完整
    async fn update_profile(
        &self,
        access_token: &Secret<String>,
        update: &ProfileUpdate,
    ) -> Result<IdentityPatch, AppError>;
}
