//! Test harnesses for integration testing.
//!
//! [`TestHarness`] wires the pipelines to the in-memory store, a job queue
//! with a manual clock, and the kernel mocks. Nothing leaves the process, so
//! these tests run everywhere.
//!
//! [`PostgresHarness`] starts a shared Postgres container once per test
//! binary. Tests using it are `#[ignore]`d; run them with
//! `cargo test -- --ignored` where Docker is available.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pricelist_core::common::{Actor, UserId};
use pricelist_core::domains;
use pricelist_core::kernel::jobs::{JobRunner, MemoryJobQueue};
use pricelist_core::kernel::store::{MemoryStore, PostgresStore};
use pricelist_core::kernel::{ServerDeps, TestDependencies};
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory pipelines with a job runner that only moves when told to.
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &mut TestHarness) {
///     let actor = ctx.user_with_credits(1);
///     // ... start something, then
///     ctx.settle().await;
/// }
/// ```
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub mocks: TestDependencies,
    pub deps: Arc<ServerDeps>,
    runner: JobRunner,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let mocks = TestDependencies::new();
        let deps = mocks.into_deps(store.clone(), queue.clone());
        let runner = JobRunner::new(Arc::new(domains::job_registry()), deps.clone());

        Self {
            store,
            queue,
            mocks,
            deps,
            runner,
        }
    }

    /// A regular user with `credits` credits and an email address.
    pub fn user_with_credits(&self, credits: i32) -> Actor {
        let user_id = UserId::new();
        self.store
            .insert_user(user_id, &format!("{}@salon.test", user_id), credits);
        Actor::user(user_id)
    }

    pub fn admin(&self) -> Actor {
        Actor::admin(UserId::new())
    }

    /// Run every job that is due now, including jobs they enqueue.
    pub async fn settle(&self) -> usize {
        self.runner.drain().await.expect("job runner failed")
    }

    /// Move the queue clock forward, then settle.
    pub async fn advance_and_settle(&self, by: Duration) -> usize {
        self.queue.advance(by);
        self.settle().await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared Postgres container, started once and reused by every test.
struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// A migrated Postgres store on the shared container.
pub struct PostgresHarness {
    pub store: PostgresStore,
}

impl AsyncTestContext for PostgresHarness {
    async fn setup() -> Self {
        let infra = SharedTestInfra::get().await;
        let store = PostgresStore::connect(&infra.db_url, 5)
            .await
            .expect("Failed to connect to test database");
        Self { store }
    }
}
