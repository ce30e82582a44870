//! Fixtures for driving full bisection runs against a mock browser stack.

use std::sync::Arc;

use tempfile::TempDir;

use bisectrix::eval::{MockEvaluator, MockProbe, ReproducedChecker};
use bisectrix::search::TransitionDirection;
use bisectrix::state::{Browser, StateSpace};
use bisectrix::{Config, Database, Orchestrator, SessionSpec};

/// Database in a temporary directory, kept alive for the test's duration.
pub struct TestStore {
    pub db: Database,
    _dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::open(dir.path().join("test.db")).expect("Failed to open database");
        Self { db, _dir: dir }
    }

    pub fn results_count(&self) -> i64 {
        self.count("results")
    }

    pub fn claims_count(&self) -> i64 {
        self.count("eval_claims")
    }

    fn count(&self, table: &str) -> i64 {
        self.db
            .with_connection(|conn| {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
            })
            .expect("Failed to count rows")
    }
}

/// Config with short claim timings so contention tests finish quickly.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.workers = 4;
    config.claim_poll_ms = 10;
    config.claim_patience_ms = 2_000;
    config
}

/// A chromium revision-range job with the default experiment shape.
pub fn chromium_job(
    collection: &str,
    mech_group: &str,
    lo: u64,
    hi: u64,
) -> (SessionSpec, StateSpace) {
    (
        SessionSpec::new(
            collection,
            "test-project",
            mech_group,
            TransitionDirection::FalseToTrue,
            lo,
            hi,
        ),
        StateSpace::revisions(Browser::Chromium),
    )
}

/// Orchestrator over the store with every binary available.
pub fn orchestrator(store: &TestStore, evaluator: Arc<MockEvaluator>, config: Config) -> Orchestrator {
    orchestrator_with_probe(store, evaluator, Arc::new(MockProbe::always_available()), config)
}

pub fn orchestrator_with_probe(
    store: &TestStore,
    evaluator: Arc<MockEvaluator>,
    probe: Arc<MockProbe>,
    config: Config,
) -> Orchestrator {
    Orchestrator::new(
        store.db.clone(),
        evaluator,
        probe,
        Arc::new(ReproducedChecker),
        config,
    )
}
