//! 身份与角色模型

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// 仪表盘用户角色
///
/// 封闭集合：API 返回集合之外的值会反序列化失败，永远不会被授权
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    AdminStaff,
    PastoralStaff,
    MinistryLeader,
    ReadOnly,
    Volunteer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::SuperAdmin,
        Role::AdminStaff,
        Role::PastoralStaff,
        Role::MinistryLeader,
        Role::ReadOnly,
        Role::Volunteer,
    ];

    /// 线上名称，例如 `SUPER_ADMIN`
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::AdminStaff => "ADMIN_STAFF",
            Role::PastoralStaff => "PASTORAL_STAFF",
            Role::MinistryLeader => "MINISTRY_LEADER",
            Role::ReadOnly => "READ_ONLY",
            Role::Volunteer => "VOLUNTEER",
        }
    }

    /// 显示在用户名旁边的标签
    pub fn label(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super Admin",
            Role::AdminStaff => "Admin Staff",
            Role::PastoralStaff => "Pastoral Staff",
            Role::MinistryLeader => "Ministry Leader",
            Role::ReadOnly => "Read Only",
            Role::Volunteer => "Volunteer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// 会话中保存的已认证用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_login: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// 对持久化和接收到的身份做最小形状检查
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty() && !self.email.trim().is_empty()
    }

    /// 合并 API 返回的（可能不完整的）身份，缺失字段保持原值
    pub fn merge(&mut self, patch: IdentityPatch) {
        if let Some(id) = patch.id {
            self.id = id;
        }
        if let Some(first_name) = patch.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            self.last_name = last_name;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(mfa_enabled) = patch.mfa_enabled {
            self.mfa_enabled = mfa_enabled;
        }
        if let Some(last_login) = patch.last_login {
            self.last_login = Some(last_login);
        }
    }
}

/// 部分身份，个人资料更新时返回
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPatch {
    #[serde(
        default,
        deserialize_with = "deserialize_optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_enabled: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_login: Option<DateTime<Utc>>,
}

// ==================== 宽松解码 ====================

/// 用户 ID：后端可能返回字符串或数字
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Unsigned(n) => n.to_string(),
            RawId::Signed(n) => n.to_string(),
        }
    }
}

pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

pub(crate) fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}

/// 时间戳只用于显示：RFC 3339、无时区的本地格式或毫秒数；其他值视为缺失
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
    Other(IgnoredAny),
}

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_timestamp(raw: RawTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::Text(text) => {
            let text = text.trim();
            DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NAIVE_FORMATS
                        .iter()
                        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                        .map(|naive| naive.and_utc())
                })
        }
        RawTimestamp::Millis(millis) => DateTime::from_timestamp_millis(millis),
        RawTimestamp::Other(_) => None,
    }
}

pub(crate) fn deserialize_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(raw.and_then(parse_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            id: "u-1".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@example.org".to_string(),
            role: Role::AdminStaff,
            mfa_enabled: false,
            last_login: None,
        }
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"SUPER_ADMIN\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"MINISTRY_LEADER\"").unwrap(),
            Role::MinistryLeader
        );
        assert!(serde_json::from_str::<Role>("\"ROOT\"").is_err());
        assert_eq!("volunteer".parse::<Role>().unwrap(), Role::Volunteer);
    }

    #[test]
    fn test_identity_camel_case() {
        let json = serde_json::to_value(identity()).unwrap();
        assert_eq!(json["firstName"], "Grace");
        assert_eq!(json["mfaEnabled"], false);
        assert!(json.get("lastLogin").is_none());
    }

    #[test]
    fn test_identity_without_role_is_rejected() {
        let raw = r#"{"id":"u-1","firstName":"A","lastName":"B","email":"a@b.org"}"#;
        assert!(serde_json::from_str::<Identity>(raw).is_err());
    }

    #[test]
    fn test_persisted_identity_keeps_last_login() {
        let mut current = identity();
        current.last_login = DateTime::from_timestamp(1_714_557_600, 0);

        let raw = serde_json::to_string(&current).unwrap();
        let decoded: Identity = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded, current);
    }

    #[test]
    fn test_patch_id_and_timestamp_are_lenient() {
        let patch: IdentityPatch =
            serde_json::from_str(r#"{"id":12,"lastLogin":"not a date"}"#).unwrap();
        assert_eq!(patch.id.as_deref(), Some("12"));
        assert!(patch.last_login.is_none());

        let patch: IdentityPatch = serde_json::from_str(r#"{"id":null,"lastLogin":null}"#).unwrap();
        assert_eq!(patch, IdentityPatch::default());
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut current = identity();
        current.merge(IdentityPatch {
            first_name: Some("Amazing".to_string()),
            ..Default::default()
        });

        assert_eq!(current.first_name, "Amazing");
        assert_eq!(current.last_name, "Hopper");
        assert_eq!(current.email, "grace@example.org");
        assert_eq!(current.role, Role::AdminStaff);
    }
}
