//! 授权模块：权限表、密码策略与路由守卫

pub mod guard;
pub mod password;
pub mod permissions;

pub use guard::{GuardDecision, NavItem, RouteGuard, RouteTable};
pub use password::PasswordPolicy;
pub use permissions::{is_authorized, Permission};
