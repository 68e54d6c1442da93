//! 系统用户（仪表盘账户）模型

use super::identity::{deserialize_id, deserialize_timestamp, Role};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use validator::Validate;

/// 设置 → 系统用户 中列出的账户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemUser {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub last_login: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

/// 列表响应，行数据包在 `data` 中
#[derive(Debug, Deserialize)]
pub struct SystemUserList {
    #[serde(default)]
    pub data: Vec<SystemUser>,
}

/// 单个用户响应：裸对象，或包在 `data`/`user` 中
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SystemUserEnvelope {
    Data { data: SystemUser },
    User { user: SystemUser },
    Bare(SystemUser),
}

impl SystemUserEnvelope {
    pub fn into_inner(self) -> SystemUser {
        match self {
            SystemUserEnvelope::Data { data } => data,
            SystemUserEnvelope::User { user } => user,
            SystemUserEnvelope::Bare(user) => user,
        }
    }
}

// 密码只在写入请求体时暴露
fn expose_password<S: Serializer>(password: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(password.expose_secret())
}

fn expose_optional_password<S: Serializer>(
    password: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match password {
        Some(password) => serializer.serialize_some(password.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// 创建用户请求
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[serde(serialize_with = "expose_password")]
    pub password: Secret<String>,
    pub role: Role,
}

/// 更新用户请求
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: Option<String>,
    /// 只有管理员设置新密码时才发送
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "expose_optional_password"
    )]
    pub password: Option<Secret<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// 启用/停用请求
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}
