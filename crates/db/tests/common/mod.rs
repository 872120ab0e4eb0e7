//! Helpers shared by the live-database tests.
//!
//! Every test works in its own freshly created schema so tests can run in
//! parallel against one database; the schema is dropped again on success.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use db::{DbConfig, DbPool};

static NEXT: AtomicU32 = AtomicU32::new(0);

pub async fn pool() -> DbPool {
    let config = DbConfig::from_env()
        .expect("integration tests need DATABASE_URL")
        .with_max_connections(2);
    db::pool::connect(&config).await.expect("connect to test database")
}

/// Create an empty schema with a name unique to this test.
pub async fn scratch_schema(pool: &DbPool, prefix: &str) -> String {
    let n = NEXT.fetch_add(1, Ordering::SeqCst);
    let schema = format!("{prefix}_{}_{n}", std::process::id());
    sqlx::raw_sql(&format!("CREATE SCHEMA \"{schema}\""))
        .execute(pool)
        .await
        .expect("create scratch schema");
    schema
}

pub async fn drop_schema(pool: &DbPool, schema: &str) {
    sqlx::raw_sql(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"))
        .execute(pool)
        .await
        .expect("drop scratch schema");
}

pub async fn exec(pool: &DbPool, sql: &str) {
    sqlx::raw_sql(sql).execute(pool).await.expect(sql);
}

/// The SQLSTATE of a database error, if `err` is one.
pub fn sqlstate(err: &db::DbError) -> Option<String> {
    match err {
        db::DbError::Sqlx(e) => e.as_database_error().and_then(|d| d.code()).map(|c| c.into_owned()),
        _ => None,
    }
}
