//! End-to-end scenarios over the full wiring: synchronizers, bus and the
//! in-memory backend standing in for the hosted service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use taskwire::application::bus::ChangeBus;
use taskwire::application::list_sync::ListSync;
use taskwire::application::todo_sync::TodoSync;
use taskwire::domain::auth::AuthUser;
use taskwire::domain::gateway::{ListGateway, TodoGateway};
use taskwire::domain::list::{CreateList, ListKind};
use taskwire::domain::todo::{CreateTodo, ListRef, Priority, TodoScope};
use taskwire::infrastructure::memory::{MemoryBackend, RemoteOp, StaticAuth};
use taskwire::{RemoteError, SyncError};

struct Harness {
    backend: Arc<MemoryBackend>,
    auth: Arc<StaticAuth>,
    bus: ChangeBus,
}

impl Harness {
    fn new() -> Self {
        let user = AuthUser {
            id: Uuid::new_v4(),
            full_name: Some("Ada Lovelace".to_owned()),
            display_name: Some("Ada".to_owned()),
            created_at: Utc::now(),
        };
        Self {
            backend: Arc::new(MemoryBackend::new()),
            auth: Arc::new(StaticAuth::signed_in(user)),
            bus: ChangeBus::new(),
        }
    }

    async fn lists(&self) -> ListSync<MemoryBackend, MemoryBackend, StaticAuth> {
        ListSync::mount(
            self.backend.clone(),
            self.backend.clone(),
            self.auth.clone(),
            self.bus.clone(),
        )
        .await
        .expect("mount lists")
    }

    async fn todos(&self, scope: TodoScope) -> TodoSync<MemoryBackend, StaticAuth> {
        TodoSync::mount(
            self.backend.clone(),
            self.auth.clone(),
            self.bus.clone(),
            scope,
        )
        .await
        .expect("mount todos")
    }
}

async fn wait_for(mut probe: impl FnMut() -> bool) {
    for _ in 0..200 {
        if probe() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn created_list_is_visible_immediately_and_reconciled_with_server_timestamps() {
    let harness = Harness::new();
    let lists = harness.lists().await;

    let before = Utc::now();
    let confirmed = lists
        .add(CreateList {
            name: "Groceries".to_owned(),
            kind: ListKind::Casual,
            color: None,
            icon: None,
        })
        .await
        .expect("add");

    let view = lists.view();
    assert_eq!(view.records.len(), 1);
    assert_eq!(view.records[0].id, confirmed.id);
    assert_eq!(view.records[0].kind, ListKind::Casual);
    // Timestamps were replaced by the server's during reconciliation.
    assert!(view.records[0].created_at >= before);
    assert_eq!(view.records[0], confirmed);
}

#[tokio::test]
async fn todos_in_casual_lists_store_null_details() {
    let harness = Harness::new();
    let lists = harness.lists().await;
    let groceries = lists
        .add(CreateList {
            name: "Groceries".to_owned(),
            kind: ListKind::Casual,
            color: None,
            icon: None,
        })
        .await
        .expect("add list");

    let todos = harness.todos(TodoScope::InList(groceries.id)).await;
    let milk = todos
        .add(CreateTodo {
            list: Some(ListRef::of(&groceries)),
            priority: Some(Priority::High),
            due_date: chrono::NaiveDate::from_ymd_opt(2025, 6, 15),
            ..CreateTodo::titled("Milk")
        })
        .await
        .expect("add todo");

    assert_eq!(milk.list_id, Some(groceries.id));
    assert_eq!(milk.priority, None);
    assert_eq!(milk.due_date, None);
}

#[tokio::test]
async fn failed_update_reverts_and_surfaces_the_error() {
    let harness = Harness::new();
    let todos = harness.todos(TodoScope::All).await;
    let milk = todos.add(CreateTodo::titled("Milk")).await.expect("add");
    let before = todos.view().records;

    harness.backend.fail_next(
        RemoteOp::UpdateTodo,
        RemoteError::Network("connection reset".to_owned()),
    );
    let err = todos
        .toggle_completed(milk.id, true)
        .await
        .expect_err("toggle must fail");
    assert!(matches!(err, SyncError::Remote(RemoteError::Network(_))));

    // The failed toggle converges back to the server state.
    wait_for(|| todos.view().records == before).await;
    assert!(todos.view().error.is_some());
}

#[tokio::test]
async fn cascade_failure_leaves_no_partial_state() {
    let harness = Harness::new();
    let lists = harness.lists().await;
    let groceries = lists
        .add(CreateList {
            name: "Groceries".to_owned(),
            kind: ListKind::Casual,
            color: None,
            icon: None,
        })
        .await
        .expect("add list");

    let todos = harness.todos(TodoScope::InList(groceries.id)).await;
    for title in ["Milk", "Eggs"] {
        todos
            .add(CreateTodo {
                list: Some(ListRef::of(&groceries)),
                ..CreateTodo::titled(title)
            })
            .await
            .expect("add todo");
    }

    harness.backend.fail_next(
        RemoteOp::DeleteTodosInList,
        RemoteError::Network("timeout".to_owned()),
    );
    let err = lists.delete(groceries.id).await.expect_err("delete must fail");
    assert!(matches!(err, SyncError::CascadeDelete { .. }));

    // Everything is still there, locally and remotely.
    assert_eq!(lists.view().records.len(), 1);
    assert!(lists.view().error.is_some());
    let remote_lists = ListGateway::fetch_all(harness.backend.as_ref())
        .await
        .expect("fetch");
    assert_eq!(remote_lists.len(), 1);
    let remote_todos =
        TodoGateway::fetch_all(harness.backend.as_ref(), TodoScope::InList(groceries.id))
            .await
            .expect("fetch");
    assert_eq!(remote_todos.len(), 2);
}

#[tokio::test]
async fn successful_cascade_removes_todos_and_list_everywhere() {
    let harness = Harness::new();
    let lists = harness.lists().await;
    let everything = harness.todos(TodoScope::All).await;
    let groceries = lists
        .add(CreateList {
            name: "Groceries".to_owned(),
            kind: ListKind::Casual,
            color: None,
            icon: None,
        })
        .await
        .expect("add list");
    let scoped = harness.todos(TodoScope::InList(groceries.id)).await;
    for title in ["Milk", "Eggs"] {
        scoped
            .add(CreateTodo {
                list: Some(ListRef::of(&groceries)),
                ..CreateTodo::titled(title)
            })
            .await
            .expect("add todo");
    }
    wait_for(|| everything.view().records.len() == 2).await;

    lists.delete(groceries.id).await.expect("delete");

    assert!(lists.view().records.is_empty());
    wait_for(|| everything.view().records.is_empty()).await;
    let remote_todos = TodoGateway::fetch_all(harness.backend.as_ref(), TodoScope::All)
        .await
        .expect("fetch");
    assert!(remote_todos.is_empty());
}

#[tokio::test]
async fn scoped_and_unscoped_instances_both_reflect_a_scoped_add() {
    let harness = Harness::new();
    let lists = harness.lists().await;
    let groceries = lists
        .add(CreateList {
            name: "Groceries".to_owned(),
            kind: ListKind::Casual,
            color: None,
            icon: None,
        })
        .await
        .expect("add list");

    let everything = harness.todos(TodoScope::All).await;
    let scoped = harness.todos(TodoScope::InList(groceries.id)).await;

    scoped
        .add(CreateTodo {
            list: Some(ListRef::of(&groceries)),
            ..CreateTodo::titled("Milk")
        })
        .await
        .expect("add todo");

    assert_eq!(scoped.view().records.len(), 1);
    wait_for(|| everything.view().records.len() == 1).await;
}
