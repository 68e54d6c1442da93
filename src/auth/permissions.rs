//! 静态权限表：操作 → 允许执行的角色

use crate::models::Role;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 需要授权的仪表盘操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    CreateMember,
    UpdateMember,
    DeleteMember,
    ViewMember,
    ManageUsers,
    ViewAuditLogs,
}

const MEMBER_EDITORS: &[Role] = &[Role::SuperAdmin, Role::AdminStaff, Role::PastoralStaff];
const STAFF_ADMINS: &[Role] = &[Role::SuperAdmin, Role::AdminStaff];
const SUPER_ADMIN_ONLY: &[Role] = &[Role::SuperAdmin];

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::CreateMember,
        Permission::UpdateMember,
        Permission::DeleteMember,
        Permission::ViewMember,
        Permission::ManageUsers,
        Permission::ViewAuditLogs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CreateMember => "CREATE_MEMBER",
            Permission::UpdateMember => "UPDATE_MEMBER",
            Permission::DeleteMember => "DELETE_MEMBER",
            Permission::ViewMember => "VIEW_MEMBER",
            Permission::ManageUsers => "MANAGE_USERS",
            Permission::ViewAuditLogs => "VIEW_AUDIT_LOGS",
        }
    }

    /// 拥有该权限的角色；未列出的角色一律拒绝
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Permission::CreateMember | Permission::UpdateMember => MEMBER_EDITORS,
            Permission::DeleteMember | Permission::ViewAuditLogs => STAFF_ADMINS,
            Permission::ViewMember => &Role::ALL,
            Permission::ManageUsers => SUPER_ADMIN_ONLY,
        }
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PERMISSIONS
            .get(s)
            .copied()
            .ok_or_else(|| format!("Permission {} not defined", s))
    }
}

static PERMISSIONS: Lazy<HashMap<&'static str, Permission>> = Lazy::new(|| {
    Permission::ALL
        .iter()
        .map(|permission| (permission.as_str(), *permission))
        .collect()
});

/// 检查 `role` 能否执行指定操作
///
/// 未定义的操作名一律拒绝并记录告警
pub fn is_authorized(role: Role, action: &str) -> bool {
    match PERMISSIONS.get(action) {
        Some(permission) => permission.allows(role),
        None => {
            tracing::warn!(action = %action, "Permission not defined");
            false
        }
    }
}

pub fn can_create_member(role: Role) -> bool {
    Permission::CreateMember.allows(role)
}

pub fn can_update_member(role: Role) -> bool {
    Permission::UpdateMember.allows(role)
}

pub fn can_delete_member(role: Role) -> bool {
    Permission::DeleteMember.allows(role)
}

pub fn can_view_member(role: Role) -> bool {
    Permission::ViewMember.allows(role)
}
