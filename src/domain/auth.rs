use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The signed-in user as reported by the auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Session lookup. Every mutation stamps ownership from (and is gated on)
/// the current user.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// `None` when no session is active or the auth service is unreachable.
    async fn current_user(&self) -> Option<AuthUser>;
}
