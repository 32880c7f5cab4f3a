//! 会话上下文
//!
//! 向导和后端客户端都通过注入的 [`SessionContext`] 拿 token，
//! 不直接读全局存储。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::{debug, info};

/// 登录凭证
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// 后端登录接口的返回
///
/// 用户身份只认这里的 `user_id`，不从 token 里解码。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub enrolled: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// 会话能力
pub trait SessionContext: Send + Sync {
    /// 当前有效的 token；过期视为没有
    fn token(&self) -> Option<Token>;

    /// 当前用户是否已完成注册
    fn is_enrolled(&self) -> bool;
}

/// 内存会话
#[derive(Debug, Default)]
pub struct MemorySession {
    grant: RwLock<Option<AuthGrant>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用已有的登录结果创建
    pub fn with_grant(grant: AuthGrant) -> Self {
        Self {
            grant: RwLock::new(Some(grant)),
        }
    }

    /// 保存登录结果
    pub fn store(&self, grant: AuthGrant) {
        info!(
            "🔑 登录成功，token 有效期至 {}",
            grant.expires_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Ok(mut slot) = self.grant.write() {
            *slot = Some(grant);
        }
    }

    /// 退出登录
    pub fn clear(&self) {
        if let Ok(mut slot) = self.grant.write() {
            *slot = None;
        }
    }

    /// 服务端返回的用户 ID
    pub fn user_id(&self) -> Option<String> {
        self.grant
            .read()
            .ok()
            .and_then(|g| g.as_ref().and_then(|g| g.user_id.clone()))
    }

    fn token_at(&self, now: DateTime<Utc>) -> Option<Token> {
        let guard = self.grant.read().ok()?;
        let grant = guard.as_ref()?;
        let token = Token {
            value: grant.token.clone(),
            expires_at: grant.expires_at,
        };
        if token.is_expired_at(now) {
            debug!("token 已过期，需要重新登录");
            return None;
        }
        Some(token)
    }
}

impl SessionContext for MemorySession {
    fn token(&self) -> Option<Token> {
        self.token_at(Utc::now())
    }

    fn is_enrolled(&self) -> bool {
        self.token().is_some()
            && self
                .grant
                .read()
                .map(|g| g.as_ref().map(|g| g.enrolled).unwrap_or(false))
                .unwrap_or(false)
    }
}

/// 不需要登录的场景（本地演示、测试）
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousSession;

impl SessionContext for AnonymousSession {
    fn token(&self) -> Option<Token> {
        None
    }

    fn is_enrolled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(expires_in: Duration, enrolled: bool) -> AuthGrant {
        AuthGrant {
            token: "tok-123".to_string(),
            expires_at: Utc::now() + expires_in,
            enrolled,
            user_id: Some("user-7".to_string()),
        }
    }

    #[test]
    fn test_valid_token_is_returned() {
        let session = MemorySession::with_grant(grant(Duration::hours(1), true));
        assert_eq!(session.token().map(|t| t.value), Some("tok-123".to_string()));
        assert!(session.is_enrolled());
        assert_eq!(session.user_id().as_deref(), Some("user-7"));
    }

    #[test]
    fn test_expired_token_is_treated_as_absent() {
        let session = MemorySession::with_grant(grant(Duration::seconds(-5), true));
        assert!(session.token().is_none());
        assert!(!session.is_enrolled());
    }

    #[test]
    fn test_clear_removes_token() {
        let session = MemorySession::new();
        session.store(grant(Duration::hours(1), false));
        assert!(session.token().is_some());
        assert!(!session.is_enrolled());

        session.clear();
        assert!(session.token().is_none());
    }
}
