//! Concurrency behavior of the orchestrator: shared claims, duplicate
//! sessions, and the two stop levers.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use bisectrix::data::ClaimStore;
use bisectrix::eval::MockEvaluator;
use bisectrix::{Automation, Browser, EvalKey, SessionStatus, State};

use super::common::fixtures::{chromium_job, fast_config, orchestrator, TestStore};

/// Sessions on different experiments run side by side over one store.
#[tokio::test]
async fn test_parallel_sessions_complete_independently() {
    let store = TestStore::new();
    let evaluator = Arc::new(MockEvaluator::reproduced_from(63));
    let orchestrator = orchestrator(&store, evaluator, fast_config());

    let outcomes = orchestrator
        .run(vec![
            chromium_job("csp", "leak", 0, 99),
            chromium_job("csp", "inject", 0, 99),
        ])
        .await;

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(outcome.status, SessionStatus::Done);
        let report = outcome.report.as_ref().unwrap();
        assert_eq!(report.lo.index(), 62);
        assert_eq!(report.hi.index(), 63);
    }
    let statuses = orchestrator.statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.values().all(|status| *status == SessionStatus::Done));
    // Distinct mech groups never share results.
    assert_eq!(store.results_count(), 14);
}

/// Two submissions of the same experiment cost one set of evaluations.
#[tokio::test]
async fn test_duplicate_sessions_evaluate_each_candidate_once() {
    let store = TestStore::new();
    // The delay keeps both sessions overlapping so they contend on claims
    // instead of running past each other.
    let evaluator = Arc::new(
        MockEvaluator::reproduced_from(63).with_delay(Duration::from_millis(20)),
    );
    let orchestrator = orchestrator(&store, evaluator.clone(), fast_config());

    let outcomes = orchestrator
        .run(vec![
            chromium_job("csp", "leak", 0, 99),
            chromium_job("csp", "leak", 0, 99),
        ])
        .await;

    for outcome in &outcomes {
        assert_eq!(outcome.status, SessionStatus::Done);
        let report = outcome.report.as_ref().unwrap();
        assert_eq!(report.lo.index(), 62);
        assert_eq!(report.hi.index(), 63);
    }
    assert_eq!(evaluator.evaluation_count(), 7);
    assert_eq!(store.results_count(), 7);
    assert_eq!(store.claims_count(), 0);
}

/// Graceful stop finishes the visit in flight and keeps its result.
#[tokio::test]
async fn test_graceful_stop_keeps_inflight_results() {
    let store = TestStore::new();
    let evaluator = Arc::new(
        MockEvaluator::reproduced_from(63).with_delay(Duration::from_millis(50)),
    );
    let orchestrator = Arc::new(orchestrator(&store, evaluator.clone(), fast_config()));

    let runner = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run(vec![chromium_job("csp", "leak", 0, 99)]).await }
    });
    tokio::time::sleep(Duration::from_millis(25)).await;
    orchestrator.stop_gracefully();
    let outcomes = runner.await.expect("runner task");

    assert_eq!(outcomes[0].status, SessionStatus::Stopped);
    assert_eq!(
        orchestrator.status(outcomes[0].session_id),
        Some(SessionStatus::Stopped)
    );
    // The visit that was in flight finished and is reusable later.
    assert_eq!(evaluator.evaluation_count(), 1);
    assert_eq!(store.results_count(), 1);
    assert_eq!(store.claims_count(), 0);
}

/// Forceful stop abandons the visit in flight without recording it.
#[tokio::test]
async fn test_forceful_stop_abandons_inflight_work() {
    let store = TestStore::new();
    let evaluator = Arc::new(
        MockEvaluator::reproduced_from(63).with_delay(Duration::from_secs(30)),
    );
    let orchestrator = Arc::new(orchestrator(&store, evaluator, fast_config()));

    let runner = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run(vec![chromium_job("csp", "leak", 0, 99)]).await }
    });
    tokio::time::sleep(Duration::from_millis(25)).await;
    orchestrator.stop_forcefully();
    let outcomes = runner.await.expect("runner task");

    assert_eq!(outcomes[0].status, SessionStatus::Stopped);
    assert_eq!(store.results_count(), 0);
    assert_eq!(store.claims_count(), 0);
}

/// A claim that is never released fails the waiting session, loudly.
#[tokio::test]
async fn test_abandoned_foreign_claim_exhausts_patience() {
    let store = TestStore::new();
    // Claim the first candidate on behalf of a session that no longer exists.
    let key = EvalKey::new(
        State::revision(Browser::Chromium, 49),
        Automation::Terminal,
        "default",
        vec![],
        vec![],
        "leak",
    );
    let claims = ClaimStore::new(store.db.connection());
    claims
        .try_acquire(&key.fingerprint(), Uuid::new_v4())
        .expect("pre-claim");

    let evaluator = Arc::new(MockEvaluator::reproduced_from(63));
    let mut config = fast_config();
    config.claim_patience_ms = 80;
    let orchestrator = orchestrator(&store, evaluator.clone(), config);

    let outcomes = orchestrator.run(vec![chromium_job("csp", "leak", 0, 99)]).await;

    assert_eq!(outcomes[0].status, SessionStatus::Failed);
    let error = outcomes[0].error.as_ref().expect("failure message");
    assert!(
        error.contains("Gave up waiting"),
        "unexpected error: {error}"
    );
    assert_eq!(evaluator.evaluation_count(), 0);
    // The foreign claim is still there; this session added nothing.
    assert_eq!(store.claims_count(), 1);
}
