//! 登录尝试状态机（MFA 二次验证）

use secrecy::Secret;

/// 没有指定目标时登录成功后进入的路径
pub const DEFAULT_LANDING: &str = "/";

/// 登录尝试的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Success,
    Failure,
}

/// 尝试状态
///
/// 密码只存在于 `AwaitingMfaCode` 中，其他状态都已丢弃
#[derive(Debug, Clone)]
pub enum AttemptState {
    CollectingCredentials,
    AwaitingMfaCode {
        email: String,
        password: Secret<String>,
    },
    Resolved(Resolution),
}

/// 不含密码的状态视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    CollectingCredentials,
    AwaitingMfaCode { email: String },
    Resolved(Resolution),
}

/// 临时的登录尝试及触发登录的目标路径
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    state: AttemptState,
    return_to: Option<String>,
}

impl Default for LoginAttempt {
    fn default() -> Self {
        Self::new(None)
    }
}

impl LoginAttempt {
    pub fn new(return_to: Option<String>) -> Self {
        Self {
            state: AttemptState::CollectingCredentials,
            return_to: return_to.filter(|path| is_internal_path(path)),
        }
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn step(&self) -> LoginStep {
        match &self.state {
            AttemptState::CollectingCredentials => LoginStep::CollectingCredentials,
            AttemptState::AwaitingMfaCode { email, .. } => LoginStep::AwaitingMfaCode {
                email: email.clone(),
            },
            AttemptState::Resolved(resolution) => LoginStep::Resolved(*resolution),
        }
    }

    pub fn return_to(&self) -> Option<&str> {
        self.return_to.as_deref()
    }

    /// 登录成功后要跳转的路径
    pub fn destination(&self) -> String {
        self.return_to
            .clone()
            .unwrap_or_else(|| DEFAULT_LANDING.to_string())
    }

    /// 等待 MFA 验证码期间保存的凭据
    pub fn pending_credentials(&self) -> Option<(&str, &Secret<String>)> {
        match &self.state {
            AttemptState::AwaitingMfaCode { email, password } => Some((email.as_str(), password)),
            _ => None,
        }
    }

    /// 密码正确，需要第二因子
    pub fn await_mfa(&mut self, email: String, password: Secret<String>) {
        self.state = AttemptState::AwaitingMfaCode { email, password };
    }

    /// 凭据或验证码被拒：回到表单，不再保存任何凭据
    pub fn reject(&mut self) {
        self.state = AttemptState::CollectingCredentials;
    }

    pub fn resolve(&mut self, resolution: Resolution) {
        self.state = AttemptState::Resolved(resolution);
    }

    /// 放弃二次验证；目标路径保留给下一次尝试
    pub fn cancel(&mut self) {
        self.state = AttemptState::CollectingCredentials;
    }

    /// 登录成功后取出目标路径
    pub fn take_destination(&mut self) -> String {
        self.return_to
            .take()
            .unwrap_or_else(|| DEFAULT_LANDING.to_string())
    }
}

/// 只接受同源的绝对路径作为返回目标
pub fn is_internal_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains("://")
}
