//! 远程 API 层

pub mod auth_api;
pub mod http_client;
pub mod users;

pub use auth_api::AuthApi;
pub use http_client::{ApiClient, HttpAuthApi};
pub use users::UsersAdmin;
