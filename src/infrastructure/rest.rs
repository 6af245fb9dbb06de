use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::domain::auth::{AuthProvider, AuthUser};
use crate::domain::error::RemoteError;
use crate::domain::gateway::{ChangeFeed, ListGateway, ProfileGateway, TodoGateway};
use crate::domain::list::{List, ListId, UpdateList};
use crate::domain::profile::{Profile, UpdateProfile};
use crate::domain::todo::{Todo, TodoId, TodoScope, UpdateTodo};

use super::realtime;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project base URL, e.g. `https://abc.example.co`.
    pub base_url: String,
    /// Public API key, sent with every request.
    pub api_key: String,
    /// Access token of the signed-in session.
    pub access_token: String,
}

impl RestConfig {
    /// Read `TASKWIRE_URL`, `TASKWIRE_API_KEY` and optionally
    /// `TASKWIRE_TOKEN` (defaults to the API key) from the environment.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("TASKWIRE_URL").ok()?;
        let api_key = std::env::var("TASKWIRE_API_KEY").ok()?;
        let access_token = std::env::var("TASKWIRE_TOKEN").unwrap_or_else(|_| api_key.clone());
        Some(Self {
            base_url,
            api_key,
            access_token,
        })
    }
}

/// Gateway over the hosted backend's REST row API, speaking its PostgREST
/// conventions: equality filters in the query string, `Prefer:
/// return=representation` so every write echoes the stored row, and a
/// realtime websocket channel per table for change notifications.
pub struct RestBackend {
    http: Client,
    config: RestConfig,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn table(&self, name: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            name
        )
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.access_token)
    }

    async fn rows<T: DeserializeOwned>(
        response: reqwest::Response,
        id: Option<Uuid>,
    ) -> Result<Vec<T>, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body, id));
        }
        response
            .json()
            .await
            .map_err(|err| RemoteError::Protocol(err.to_string()))
    }

    /// A write filtered on one id returns exactly that row; an empty result
    /// means the id did not exist (or the caller may not touch it).
    async fn single<T: DeserializeOwned>(
        response: reqwest::Response,
        id: Uuid,
    ) -> Result<T, RemoteError> {
        let mut rows: Vec<T> = Self::rows(response, Some(id)).await?;
        match rows.len() {
            0 => Err(RemoteError::NotFound(id)),
            1 => Ok(rows.swap_remove(0)),
            n => Err(RemoteError::Protocol(format!(
                "expected one row for id {id}, got {n}"
            ))),
        }
    }

    fn status_error(status: StatusCode, body: String, id: Option<Uuid>) -> RemoteError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(body),
            StatusCode::NOT_FOUND => match id {
                Some(id) => RemoteError::NotFound(id),
                None => RemoteError::Protocol(body),
            },
            StatusCode::CONFLICT => RemoteError::Constraint(body),
            _ => RemoteError::Network(format!("http {status}: {body}")),
        }
    }

    fn network(err: reqwest::Error) -> RemoteError {
        RemoteError::Network(err.to_string())
    }
}

#[async_trait]
impl ListGateway for RestBackend {
    async fn fetch_all(&self) -> Result<Vec<List>, RemoteError> {
        let response = self
            .authed(self.http.get(self.table("lists")))
            .query(&[("select", "*"), ("order", "created_at.asc")])
            .send()
            .await
            .map_err(Self::network)?;
        Self::rows(response, None).await
    }

    async fn insert(&self, row: List) -> Result<List, RemoteError> {
        let id = row.id.0;
        let response = self
            .authed(self.http.post(self.table("lists")))
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await
            .map_err(Self::network)?;
        Self::single(response, id).await
    }

    async fn update(&self, id: ListId, patch: UpdateList) -> Result<List, RemoteError> {
        let response = self
            .authed(self.http.patch(self.table("lists")))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(Self::network)?;
        Self::single(response, id.0).await
    }

    async fn delete(&self, id: ListId) -> Result<(), RemoteError> {
        let response = self
            .authed(self.http.delete(self.table("lists")))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(Self::network)?;
        Self::single::<List>(response, id.0).await.map(|_| ())
    }

    async fn subscribe(&self) -> Result<ChangeFeed<List>, RemoteError> {
        realtime::subscribe_table(&self.config, "lists").await
    }
}

#[async_trait]
impl TodoGateway for RestBackend {
    async fn fetch_all(&self, scope: TodoScope) -> Result<Vec<Todo>, RemoteError> {
        let mut query = vec![
            ("select".to_owned(), "*".to_owned()),
            ("order".to_owned(), "created_at.desc".to_owned()),
        ];
        match scope {
            TodoScope::All => {}
            TodoScope::Unlisted => query.push(("list_id".to_owned(), "is.null".to_owned())),
            TodoScope::InList(list_id) => {
                query.push(("list_id".to_owned(), format!("eq.{list_id}")));
            }
        }
        let response = self
            .authed(self.http.get(self.table("todos")))
            .query(&query)
            .send()
            .await
            .map_err(Self::network)?;
        Self::rows(response, None).await
    }

    async fn insert(&self, row: Todo) -> Result<Todo, RemoteError> {
        let id = row.id.0;
        let response = self
            .authed(self.http.post(self.table("todos")))
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await
            .map_err(Self::network)?;
        Self::single(response, id).await
    }

    async fn update(&self, id: TodoId, patch: UpdateTodo) -> Result<Todo, RemoteError> {
        let response = self
            .authed(self.http.patch(self.table("todos")))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(Self::network)?;
        Self::single(response, id.0).await
    }

    async fn delete(&self, id: TodoId) -> Result<(), RemoteError> {
        let response = self
            .authed(self.http.delete(self.table("todos")))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(Self::network)?;
        Self::single::<Todo>(response, id.0).await.map(|_| ())
    }

    async fn delete_in_list(&self, list_id: ListId) -> Result<(), RemoteError> {
        let response = self
            .authed(self.http.delete(self.table("todos")))
            .query(&[("list_id", format!("eq.{list_id}"))])
            .send()
            .await
            .map_err(Self::network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body, None));
        }
        // A list with no todos deletes zero rows; that is fine.
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed<Todo>, RemoteError> {
        realtime::subscribe_table(&self.config, "todos").await
    }
}

#[async_trait]
impl ProfileGateway for RestBackend {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<Profile>, RemoteError> {
        let response = self
            .authed(self.http.get(self.table("profiles")))
            .query(&[("select", "*".to_owned()), ("id", format!("eq.{user_id}"))])
            .send()
            .await
            .map_err(Self::network)?;
        let mut rows: Vec<Profile> = Self::rows(response, None).await?;
        Ok(rows.pop())
    }

    async fn update(&self, user_id: Uuid, patch: UpdateProfile) -> Result<Profile, RemoteError> {
        let response = self
            .authed(self.http.patch(self.table("profiles")))
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(Self::network)?;
        Self::single(response, user_id).await
    }
}

#[derive(Debug, Deserialize)]
struct AuthUserRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    #[serde(default)]
    user_metadata: AuthMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct AuthMetadata {
    full_name: Option<String>,
    display_name: Option<String>,
}

/// Session lookup against the hosted auth endpoint.
pub struct RestAuth {
    http: Client,
    config: RestConfig,
}

impl RestAuth {
    pub fn new(config: RestConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn current_user(&self) -> Option<AuthUser> {
        let url = format!(
            "{}/auth/v1/user",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let row: AuthUserRow = response.json().await.ok()?;
        Some(AuthUser {
            id: row.id,
            full_name: row.user_metadata.full_name,
            display_name: row.user_metadata.display_name,
            created_at: row.created_at,
        })
    }
}
