use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthUser;

/// Per-user display information. Keyed by the auth user id, one row per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Stand-in profile built from auth metadata when no row exists yet.
    pub fn fallback_for(user: &AuthUser) -> Self {
        let display_name = user
            .display_name
            .clone()
            .or_else(|| {
                user.full_name
                    .as_deref()
                    .and_then(|name| name.split_whitespace().next())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "there".to_owned());
        Self {
            id: user.id,
            full_name: user.full_name.clone().unwrap_or_default(),
            display_name,
            created_at: user.created_at,
            updated_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
