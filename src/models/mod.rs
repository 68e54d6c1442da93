//! 数据模型模块
//! 身份、认证请求/响应与系统用户模型

pub mod auth;
pub mod identity;
pub mod user;

pub use identity::{Identity, IdentityPatch, Role};
