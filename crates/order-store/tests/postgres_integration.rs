//! PostgreSQL integration tests
//!
//! These tests start a PostgreSQL container and are ignored by default.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::{CustomerId, OrderId};
use order_store::{OrderRecord, OrderStore, PostgresOrderStore, StoreError};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_order_states_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_states")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn record(order_id: &str, customer_id: &str, status: &str) -> OrderRecord {
    OrderRecord::new(
        OrderId::new(order_id),
        CustomerId::new(customer_id),
        status,
        serde_json::json!({ "order_id": order_id, "status": status }),
    )
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_create_then_load() {
    let store = get_test_store().await;
    store.create(&record("O1", "C1", "Received")).await.unwrap();

    let loaded = store.load(&OrderId::new("O1")).await.unwrap().unwrap();
    assert_eq!(loaded.customer_id, CustomerId::new("C1"));
    assert_eq!(loaded.status, "Received");
    assert_eq!(loaded.document["order_id"], "O1");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_duplicate_create_is_rejected() {
    let store = get_test_store().await;
    store.create(&record("O1", "C1", "Received")).await.unwrap();

    let result = store.create(&record("O1", "C1", "Received")).await;
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_save_overwrites_document() {
    let store = get_test_store().await;
    store.create(&record("O1", "C1", "Received")).await.unwrap();
    store.save(&record("O1", "C1", "Confirmed")).await.unwrap();

    let loaded = store.load(&OrderId::new("O1")).await.unwrap().unwrap();
    assert_eq!(loaded.status, "Confirmed");
    assert_eq!(loaded.document["status"], "Confirmed");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_save_without_create_fails() {
    let store = get_test_store().await;
    let result = store.save(&record("O9", "C1", "Confirmed")).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_list_for_customer() {
    let store = get_test_store().await;
    store.create(&record("O1", "C1", "Received")).await.unwrap();
    store.create(&record("O2", "C2", "Received")).await.unwrap();
    store.create(&record("O3", "C1", "Received")).await.unwrap();

    let orders = store
        .list_for_customer(&CustomerId::new("C1"))
        .await
        .unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|r| r.customer_id.as_str() == "C1"));

    assert!(store.load(&OrderId::new("missing")).await.unwrap().is_none());
}
