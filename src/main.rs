use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use taskwire::application::bus::ChangeBus;
use taskwire::application::list_sync::ListSync;
use taskwire::application::todo_sync::TodoSync;
use taskwire::domain::auth::AuthUser;
use taskwire::domain::list::{CreateList, ListKind};
use taskwire::domain::todo::{CreateTodo, ListRef, TodoScope};
use taskwire::infrastructure::memory::{MemoryBackend, StaticAuth};
use taskwire::infrastructure::rest::{RestAuth, RestBackend, RestConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match RestConfig::from_env() {
        Some(config) => run_remote(config).await,
        None => run_local().await,
    }
}

async fn run_remote(config: RestConfig) -> anyhow::Result<()> {
    tracing::info!(url = %config.base_url, "using hosted backend");
    let backend = Arc::new(RestBackend::new(config.clone()));
    let auth = Arc::new(RestAuth::new(config));
    let bus = ChangeBus::new();

    let lists =
        ListSync::mount(backend.clone(), backend.clone(), auth.clone(), bus.clone()).await?;
    let todos = TodoSync::mount(backend, auth, bus, TodoScope::All).await?;

    let view = lists.view();
    tracing::info!(lists = view.records.len(), error = ?view.error, "lists fetched");
    let view = todos.view();
    tracing::info!(todos = view.records.len(), error = ?view.error, "todos fetched");
    Ok(())
}

async fn run_local() -> anyhow::Result<()> {
    tracing::info!("no backend configured, running the in-memory demo");
    let backend = Arc::new(MemoryBackend::new());
    let auth = Arc::new(StaticAuth::signed_in(AuthUser {
        id: Uuid::new_v4(),
        full_name: Some("Demo User".to_owned()),
        display_name: Some("Demo".to_owned()),
        created_at: Utc::now(),
    }));
    let bus = ChangeBus::new();

    let lists =
        ListSync::mount(backend.clone(), backend.clone(), auth.clone(), bus.clone()).await?;
    let everything = TodoSync::mount(backend.clone(), auth.clone(), bus.clone(), TodoScope::All)
        .await?;

    let groceries = lists
        .add(CreateList {
            name: "Groceries".to_owned(),
            kind: ListKind::Casual,
            color: None,
            icon: None,
        })
        .await?;
    tracing::info!(id = %groceries.id, "created list");

    let scoped = TodoSync::mount(
        backend.clone(),
        auth.clone(),
        bus.clone(),
        TodoScope::InList(groceries.id),
    )
    .await?;

    let milk = scoped
        .add(CreateTodo {
            list: Some(ListRef::of(&groceries)),
            ..CreateTodo::titled("Milk")
        })
        .await?;
    scoped
        .add(CreateTodo {
            list: Some(ListRef::of(&groceries)),
            ..CreateTodo::titled("Eggs")
        })
        .await?;
    scoped.toggle_completed(milk.id, true).await?;

    // Give the bus-driven refresh of the unscoped view a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(
        lists = lists.view().records.len(),
        todos = everything.view().records.len(),
        scoped = scoped.view().records.len(),
        "after adds"
    );

    lists.delete(groceries.id).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(
        lists = lists.view().records.len(),
        todos = everything.view().records.len(),
        "after cascade delete"
    );
    Ok(())
}
