//! 认证相关模型

use super::identity::{Identity, IdentityPatch};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 一次登录尝试提交的凭据
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: Secret<String>,
    pub mfa_code: Option<String>,
}

/// 登录请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_token: Option<&'a str>,
}

/// API 返回的登录响应
///
/// 要么携带完整授权，要么只有 MFA 标记
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default, alias = "requiresMFA", alias = "mfaRequired")]
    pub requires_mfa: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(alias = "identity")]
    pub user: Option<Identity>,
}

/// 登录成功后签发的令牌与身份
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    pub identity: Identity,
}

/// 远程登录调用的结果
#[derive(Debug, Clone)]
pub enum LoginReply {
    Granted(AuthGrant),
    MfaRequired,
}

impl LoginResponse {
    /// 解释原始响应；授权必须同时包含两个令牌和用户
    pub fn into_reply(self) -> Result<LoginReply, String> {
        match (self.access_token, self.refresh_token, self.user) {
            (Some(access), Some(refresh), Some(identity))
                if !access.is_empty() && !refresh.is_empty() =>
            {
                Ok(LoginReply::Granted(AuthGrant {
                    access_token: Secret::new(access),
                    refresh_token: Secret::new(refresh),
                    identity,
                }))
            }
            _ if self.requires_mfa => Ok(LoginReply::MfaRequired),
            _ => Err("login response carries neither a complete grant nor an MFA request".to_string()),
        }
    }
}

/// 令牌刷新请求
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

/// 令牌刷新响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
}

/// MFA 绑定材料（二维码与密钥）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaSetup {
    pub qr_code: String,
    pub secret: String,
}

/// MFA 验证请求
#[derive(Debug, Serialize)]
pub struct VerifyMfaRequest<'a> {
    pub token: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}

/// 当前用户提交的修改密码请求
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub current_password: Secret<String>,
    pub new_password: Secret<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

/// 可编辑的个人资料字段
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: Option<String>,
}

impl ProfileUpdate {
    /// 去除首尾空白；空白值随后无法通过校验
    pub fn normalized(self) -> Self {
        Self {
            first_name: self.first_name.map(|s| s.trim().to_string()),
            last_name: self.last_name.map(|s| s.trim().to_string()),
            email: self.email.map(|s| s.trim().to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}

/// 包装完整用户的响应
#[derive(Debug, Deserialize)]
pub struct UserEnvelope {
    #[serde(alias = "identity")]
    pub user: Identity,
}

/// 包装部分用户的响应
#[derive(Debug, Deserialize)]
pub struct UserPatchEnvelope {
    #[serde(default, alias = "identity")]
    pub user: IdentityPatch,
}

/// API 返回的错误体
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    pub fn into_message(self) -> String {
        self.message.or(self.error).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::identity::Role;
    use secrecy::ExposeSecret;

    #[test]
    fn test_login_response_grant() {
        let raw = r#"{
            "accessToken": "a1",
            "refreshToken": "r1",
            "user": {"id":"7","firstName":"Ruth","lastName":"Moab","email":"ruth@example.org","role":"PASTORAL_STAFF","mfaEnabled":true}
        }"#;
        let reply = serde_json::from_str::<LoginResponse>(raw).unwrap().into_reply().unwrap();
        match reply {
            LoginReply::Granted(grant) => {
                assert_eq!(grant.access_token.expose_secret(), "a1");
                assert_eq!(grant.identity.role, Role::PastoralStaff);
                assert!(grant.identity.mfa_enabled);
            }
            LoginReply::MfaRequired => panic!("expected a grant"),
        }
    }

    #[test]
    fn test_login_response_tolerates_display_fields() {
        // 数字 ID 与非 RFC 3339 时间戳不影响登录
        let raw = r#"{
            "accessToken": "a1",
            "refreshToken": "r1",
            "user": {"id":7,"firstName":"Ruth","lastName":"Moab","email":"ruth@example.org","role":"PASTORAL_STAFF","lastLogin":"2024-05-01 10:00:00"}
        }"#;
        let reply = serde_json::from_str::<LoginResponse>(raw).unwrap().into_reply().unwrap();
        let LoginReply::Granted(grant) = reply else {
            panic!("expected a grant");
        };
        assert_eq!(grant.identity.id, "7");
        assert_eq!(
            grant.identity.last_login.map(|t| t.to_rfc3339()),
            Some("2024-05-01T10:00:00+00:00".to_string())
        );

        let raw = r#"{
            "accessToken": "a1",
            "refreshToken": "r1",
            "user": {"id":"7","firstName":"Ruth","lastName":"Moab","email":"ruth@example.org","role":"PASTORAL_STAFF","lastLogin":"last tuesday"}
        }"#;
        let reply = serde_json::from_str::<LoginResponse>(raw).unwrap().into_reply().unwrap();
        let LoginReply::Granted(grant) = reply else {
            panic!("expected a grant");
        };
        assert!(grant.identity.last_login.is_none());
    }

    #[test]
    fn test_login_response_mfa_flag_spellings() {
        for raw in [r#"{"requiresMFA":true}"#, r#"{"mfaRequired":true}"#, r#"{"requiresMfa":true}"#] {
            let reply = serde_json::from_str::<LoginResponse>(raw).unwrap().into_reply().unwrap();
            assert!(matches!(reply, LoginReply::MfaRequired), "{}", raw);
        }
    }

    #[test]
    fn test_login_response_incomplete_grant_is_rejected() {
        let raw = r#"{"accessToken":"a1"}"#;
        assert!(serde_json::from_str::<LoginResponse>(raw).unwrap().into_reply().is_err());

        let raw = r#"{"accessToken":"","refreshToken":"r","user":{"id":"1","firstName":"a","lastName":"b","email":"e@x.org","role":"READ_ONLY"}}"#;
        assert!(serde_json::from_str::<LoginResponse>(raw).unwrap().into_reply().is_err());
    }

    #[test]
    fn test_profile_update_validation() {
        let update = ProfileUpdate {
            first_name: Some("  ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert!(update.validate().is_err());

        let update = ProfileUpdate {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());

        let update = ProfileUpdate {
            first_name: Some(" Lydia ".to_string()),
            email: Some("lydia@example.org".to_string()),
            ..Default::default()
        }
        .normalized();
        assert!(update.validate().is_ok());
        assert_eq!(update.first_name.as_deref(), Some("Lydia"));

        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body["firstName"], "Lydia");
        assert!(body.get("lastName").is_none());
    }
}
