//! 会话状态及交给调用方的只读视图

use crate::auth::permissions::Permission;
use crate::models::{Identity, Role};
use secrecy::{ExposeSecret, Secret};

/// 访问令牌 + 刷新令牌，两者始终非空
#[derive(Debug, Clone)]
pub struct Credentials {
    access_token: Secret<String>,
    refresh_token: Secret<String>,
}

impl Credentials {
    pub fn new(access_token: Secret<String>, refresh_token: Secret<String>) -> Option<Self> {
        if access_token.expose_secret().is_empty() || refresh_token.expose_secret().is_empty() {
            return None;
        }
        Some(Self {
            access_token,
            refresh_token,
        })
    }

    pub fn access_token(&self) -> &Secret<String> {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &Secret<String> {
        &self.refresh_token
    }

    /// 替换访问令牌；空令牌被拒绝
    pub(crate) fn replace_access_token(&mut self, access_token: Secret<String>) -> bool {
        if access_token.expose_secret().is_empty() {
            return false;
        }
        self.access_token = access_token;
        true
    }
}

/// 运行时认证状态
///
/// 身份与凭据只会同时存在
#[derive(Debug, Clone)]
pub enum Session {
    Restoring,
    Anonymous,
    Authenticated {
        identity: Identity,
        credentials: Credentials,
    },
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        match self {
            Session::Restoring => SessionStatus::Restoring,
            Session::Anonymous => SessionStatus::Anonymous,
            Session::Authenticated { .. } => SessionStatus::Authenticated,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Session::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Session::Authenticated { credentials, .. } => Some(credentials),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status(),
            identity: self.identity().cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Restoring,
    Anonymous,
    Authenticated,
}

/// 不含令牌的会话副本，每次变化时发布
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub identity: Option<Identity>,
}

impl SessionSnapshot {
    pub fn restoring() -> Self {
        Self {
            status: SessionStatus::Restoring,
            identity: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            status: SessionStatus::Anonymous,
            identity: None,
        }
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            identity: Some(identity),
        }
    }

    pub fn is_restoring(&self) -> bool {
        self.status == SessionStatus::Restoring
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn role(&self) -> Option<Role> {
        match self.status {
            SessionStatus::Authenticated => self.identity.as_ref().map(|identity| identity.role),
            _ => None,
        }
    }

    /// 未认证时恒为 false；否则按单个角色相等或集合包含判断
    pub fn has_role(&self, roles: impl RoleQuery) -> bool {
        self.role().is_some_and(|role| roles.matches(role))
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.role().is_some_and(|role| permission.allows(role))
    }
}

/// 用于匹配当前角色的单个角色或角色集合
pub trait RoleQuery {
    fn matches(&self, role: Role) -> bool;
}

impl RoleQuery for Role {
    fn matches(&self, role: Role) -> bool {
        *self == role
    }
}

impl RoleQuery for [Role] {
    fn matches(&self, role: Role) -> bool {
        self.contains(&role)
    }
}

impl<const N: usize> RoleQuery for [Role; N] {
    fn matches(&self, role: Role) -> bool {
        self.contains(&role)
    }
}

impl RoleQuery for Vec<Role> {
    fn matches(&self, role: Role) -> bool {
        self.contains(&role)
    }
}

impl<T: RoleQuery + ?Sized> RoleQuery for &T {
    fn matches(&self, role: Role) -> bool {
        (**self).matches(role)
    }
}
