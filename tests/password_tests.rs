//! 密码策略测试
//!
//! 测试由配置构建的密码策略与 MFA 验证码位数

mod common;

use common::*;
use secrecy::Secret;
use shepherd_admin::{
    auth::password::{check_mfa_code, PasswordPolicy},
    error::AppError,
};

#[test]
fn test_policy_from_config() {
    let mut config = create_test_config();
    config.security.password_min_length = 12;
    config.security.password_require_special = true;

    let policy = PasswordPolicy::from(&config.security);

    assert_eq!(policy.min_length, 12);
    assert!(policy.check("Harvest2025").is_err());
    assert!(policy.check("Harvest2025!").is_ok());
}

#[test]
fn test_policy_messages() {
    let policy = PasswordPolicy::default();

    let err = policy.check("Ab1").unwrap_err();
    assert_eq!(err.user_message(), "Password must be at least 8 characters long");

    let err = policy.check("harvest2025").unwrap_err();
    assert_eq!(
        err.user_message(),
        "Password must contain at least one uppercase letter"
    );

    let err = policy.check("Harvestfield").unwrap_err();
    assert_eq!(err.user_message(), "Password must contain at least one number");
}

#[test]
fn test_length_counts_characters() {
    let policy = PasswordPolicy {
        min_length: 8,
        require_uppercase: false,
        require_lowercase: false,
        require_digit: false,
        require_special: false,
    };
    // 8 个字符，超过 8 个字节
    assert!(policy.check("牧羊人的羊群在吃草").is_ok());
    assert!(policy.check("牧羊人").is_err());
}

#[test]
fn test_mfa_code_length_is_configurable() {
    assert!(check_mfa_code("12345678", 8).is_ok());
    assert!(check_mfa_code("123456", 8).is_err());
    assert!(check_mfa_code("", 6).is_err());
}

#[tokio::test]
async fn test_controller_applies_configured_policy() {
    let ctx = TestContext::new().await;
    ctx.login_as(STAFF_EMAIL).await;

    // 默认测试配置不要求特殊字符，但要求数字
    let result = ctx
        .controller
        .change_password(password(), Secret::new("Harvestfield".to_string()))
        .await;
    assert!(matches!(result, Err(AppError::Validation(ref m)) if m.contains("number")));

    let result = ctx.controller.change_password(password(), password()).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}
