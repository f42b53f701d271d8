//! Shared database repository test infrastructure
//!
//! Each repository has a test module containing shared test functions that take
//! `&TestRepos`, and the `sqlite_test!` macro that runs them against a fresh
//! in-memory SQLite database with the real migrations applied.

/// Generate a `#[tokio::test]` that runs a shared test function against SQLite.
macro_rules! sqlite_test {
    ($name:ident) => {
        #[tokio::test]
        async fn $name() {
            let repos = crate::db::tests::harness::TestRepos::sqlite().await;
            super::$name(&repos).await;
        }
    };
}

pub mod harness;
mod retention_audit_logs;
