//! 错误处理单元测试
//!
//! 测试错误码、用户消息、可重试判断与类型转换

use shepherd_admin::error::AppError;
use validator::Validate;

// ==================== 错误码测试 ====================

#[test]
fn test_error_codes() {
    assert_eq!(AppError::InvalidCredentials("x".to_string()).code(), "invalid_credentials");
    assert_eq!(AppError::Network("x".to_string()).code(), "network_error");
    assert_eq!(AppError::Timeout.code(), "timeout");
    assert_eq!(AppError::SessionExpired.code(), "session_expired");
    assert_eq!(AppError::Unauthorized.code(), "unauthorized");
    assert_eq!(AppError::NotAuthenticated.code(), "not_authenticated");
    assert_eq!(AppError::Forbidden.code(), "forbidden");
    assert_eq!(AppError::Superseded.code(), "superseded");
    assert_eq!(AppError::NoPendingMfa.code(), "no_pending_mfa");
    assert_eq!(AppError::Validation("x".to_string()).code(), "validation_error");
    assert_eq!(AppError::InvalidResponse("x".to_string()).code(), "invalid_response");
    assert_eq!(
        AppError::Api {
            status: 500,
            message: String::new()
        }
        .code(),
        "api_error"
    );
    assert_eq!(AppError::Storage("x".to_string()).code(), "storage_error");
    assert_eq!(AppError::Config("x".to_string()).code(), "config_error");
}

// ==================== 可重试判断 ====================

#[test]
fn test_retryable_errors() {
    assert!(AppError::Network("refused".to_string()).is_retryable());
    assert!(AppError::Timeout.is_retryable());
    assert!(AppError::Api {
        status: 502,
        message: String::new()
    }
    .is_retryable());

    assert!(!AppError::Api {
        status: 404,
        message: String::new()
    }
    .is_retryable());
    assert!(!AppError::InvalidCredentials(String::new()).is_retryable());
    assert!(!AppError::SessionExpired.is_retryable());
    assert!(!AppError::Unauthorized.is_retryable());
}

// ==================== 用户消息测试 ====================

#[test]
fn test_api_message_passes_through() {
    let err = AppError::Api {
        status: 409,
        message: "Email already in use".to_string(),
    };
    assert_eq!(err.user_message(), "Email already in use");

    let err = AppError::Api {
        status: 500,
        message: String::new(),
    };
    assert_eq!(err.user_message(), "The server reported an error");
}

#[test]
fn test_error_display() {
    assert_eq!(
        AppError::Validation("Email is required".to_string()).to_string(),
        "Validation error: Email is required"
    );
    assert_eq!(
        AppError::Api {
            status: 503,
            message: "down".to_string()
        }
        .to_string(),
        "API error (503): down"
    );
}

// ==================== 转换测试 ====================

#[test]
fn test_io_error_becomes_storage() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
    assert!(matches!(err, AppError::Storage(_)));
}

#[test]
fn test_validation_errors_use_field_message() {
    #[derive(Validate)]
    struct Form {
        #[validate(email(message = "Please enter a valid email address"))]
        email: String,
    }

    let err: AppError = Form {
        email: "nope".to_string(),
    }
    .validate()
    .unwrap_err()
    .into();
    assert!(matches!(err, AppError::Validation(ref m) if m == "Please enter a valid email address"));
}
