//! Shepherd 管理后台客户端核心库
//! 会话、认证与基于角色的访问控制

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod telemetry;
