//! 会话核心：状态、持久化、登录尝试与控制器

pub mod controller;
pub mod login_attempt;
pub mod state;
pub mod store;

pub use controller::{LoginOutcome, SessionController};
pub use login_attempt::{LoginAttempt, LoginStep, Resolution, DEFAULT_LANDING};
pub use state::{Credentials, RoleQuery, Session, SessionSnapshot, SessionStatus};
pub use store::{FileSessionStore, MemorySessionStore, PersistedSession, SessionStore, StoreKey};
