use async_trait::async_trait;

use crate::error::AppError;

/// Source of the calling user's identity. The service layer only ever asks
/// "who is making this request"; where that answer comes from is deployment
/// specific.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The id of the authenticated caller, or `Unauthenticated` when there
    /// is none.
    async fn current_caller_id(&self) -> Result<String, AppError>;
}

/// An identity provider that always answers with one fixed user id. Useful
/// for single-user deployments and tests.
pub struct FixedIdentity {
    user_id: String,
}

impl FixedIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn current_caller_id(&self) -> Result<String, AppError> {
        if self.user_id.is_empty() {
            return Err(AppError::Unauthenticated("no caller identity".into()));
        }
        Ok(self.user_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_identity_returns_user() {
        let identity = FixedIdentity::new("user123");
        let caller = identity.current_caller_id().await.expect("caller");
        assert_eq!(caller, "user123");
    }

    #[tokio::test]
    async fn test_empty_identity_is_unauthenticated() {
        let identity = FixedIdentity::new("");
        let result = identity.current_caller_id().await;
        assert!(matches!(result, Err(AppError::Unauthenticated(_))));
    }
}
