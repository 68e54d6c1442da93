//! 客户端密码策略，密码发出进程前先校验

use crate::{config::SecurityConfig, error::AppError};

/// 与服务端一致的密码规则
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: false,
        }
    }
}

impl From<&SecurityConfig> for PasswordPolicy {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            min_length: config.password_min_length,
            require_uppercase: config.password_require_uppercase,
            require_lowercase: config.password_require_lowercase,
            require_digit: config.password_require_digit,
            require_special: config.password_require_special,
        }
    }
}

impl PasswordPolicy {
    /// 按策略校验密码
    pub fn check(&self, password: &str) -> Result<(), AppError> {
        // 检查长度（按字符计）
        if password.chars().count() < self.min_length {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters long",
                self.min_length
            )));
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err(AppError::Validation(
                "Password must contain at least one uppercase letter".to_string(),
            ));
        }

        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            return Err(AppError::Validation(
                "Password must contain at least one lowercase letter".to_string(),
            ));
        }

        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation(
                "Password must contain at least one number".to_string(),
            ));
        }

        if self.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err(AppError::Validation(
                "Password must contain at least one special character".to_string(),
            ));
        }

        Ok(())
    }

    /// 校验当前用户修改自己的密码
    pub fn check_change(&self, current: &str, new: &str) -> Result<(), AppError> {
        if current.is_empty() {
            return Err(AppError::Validation("Current password is required".to_string()));
        }
        if new.is_empty() {
            return Err(AppError::Validation("New password is required".to_string()));
        }
        if current == new {
            return Err(AppError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }
        self.check(new)
    }
}

/// 一次性 MFA 验证码的形状检查
pub fn check_mfa_code(code: &str, length: usize) -> Result<(), AppError> {
    let code = code.trim();
    if code.len() != length || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(format!(
            "MFA code must be {} digits",
            length
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_policy_validation() {
        let policy = PasswordPolicy::default();

        // 合法密码
        assert!(policy.check("Test1234").is_ok());

        // 太短
        assert!(policy.check("Test1").is_err());

        // 缺少大写字母
        assert!(policy.check("test1234").is_err());

        // 缺少小写字母
        assert!(policy.check("TEST1234").is_err());

        // 缺少数字
        assert!(policy.check("Testtest").is_err());
    }

    #[test]
    fn test_special_character_rule() {
        let policy = PasswordPolicy {
            require_special: true,
            ..Default::default()
        };
        assert!(policy.check("Test1234").is_err());
        assert!(policy.check("Test1234!").is_ok());
    }

    #[test]
    fn test_change_must_differ() {
        let policy = PasswordPolicy::default();
        let err = policy.check_change("Shepherd1", "Shepherd1").unwrap_err();
        assert_eq!(
            err.user_message(),
            "New password must be different from current password"
        );
        assert!(policy.check_change("", "Shepherd2").is_err());
        assert!(policy.check_change("Shepherd1", "Shepherd2").is_ok());
    }

    #[test]
    fn test_mfa_code_shape() {
        assert!(check_mfa_code("123456", 6).is_ok());
        assert!(check_mfa_code(" 123456 ", 6).is_ok());
        assert!(check_mfa_code("12345", 6).is_err());
        assert!(check_mfa_code("12a456", 6).is_err());
    }
}
