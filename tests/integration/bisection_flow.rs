//! End-to-end bisection runs over a mock browser archive.
//!
//! Each test drives the orchestrator through real stores in a temporary
//! database; only the browser stack itself is scripted.

use std::sync::Arc;

use bisectrix::eval::{BinaryOrigin, MockEvaluator, MockOutcome, MockProbe, VarEntry};
use bisectrix::state::ReleaseIndex;
use bisectrix::{
    Automation, Browser, EvalKey, EvalRecord, ResultStore, SessionSpec, SessionStatus, State,
    StateResult, StateSpace, TransitionDirection,
};

use super::common::fixtures::{chromium_job, fast_config, orchestrator, orchestrator_with_probe, TestStore};

fn leak_key(index: u64) -> EvalKey {
    EvalKey::new(
        State::revision(Browser::Chromium, index),
        Automation::Terminal,
        "default",
        vec![],
        vec![],
        "leak",
    )
}

fn record(reproduced: bool) -> EvalRecord {
    let mut request_vars = Vec::new();
    if reproduced {
        request_vars.push(VarEntry::new("reproduced", "OK"));
    }
    EvalRecord::new(
        "100.0.0.0",
        BinaryOrigin::Downloaded,
        StateResult::new(vec![], request_vars, vec![], false),
    )
}

/// A behavior introduced at revision 63 is pinned down in seven visits.
#[tokio::test]
async fn test_finds_the_change_point() {
    let store = TestStore::new();
    let evaluator = Arc::new(MockEvaluator::reproduced_from(63));
    let orchestrator = orchestrator(&store, evaluator.clone(), fast_config());

    let outcomes = orchestrator.run(vec![chromium_job("csp", "leak", 0, 99)]).await;

    assert_eq!(outcomes[0].status, SessionStatus::Done);
    let report = outcomes[0].report.as_ref().expect("report for a done session");
    assert_eq!(report.lo.index(), 62);
    assert_eq!(report.hi.index(), 63);
    assert!(report.is_exact());
    assert_eq!(report.evaluations, 7);
    assert_eq!(
        evaluator.evaluated_indices(),
        vec![49, 74, 61, 67, 64, 62, 63]
    );
    assert_eq!(store.results_count(), 7);
    assert_eq!(store.claims_count(), 0);
}

/// Rerunning a finished search touches the store, not the browser.
#[tokio::test]
async fn test_rerun_reuses_stored_results() {
    let store = TestStore::new();
    let first = Arc::new(MockEvaluator::reproduced_from(63));
    orchestrator(&store, first, fast_config())
        .run(vec![chromium_job("csp", "leak", 0, 99)])
        .await;

    let second = Arc::new(MockEvaluator::reproduced_from(63));
    let outcomes = orchestrator(&store, second.clone(), fast_config())
        .run(vec![chromium_job("csp", "leak", 0, 99)])
        .await;

    assert_eq!(outcomes[0].status, SessionStatus::Done);
    let report = outcomes[0].report.as_ref().unwrap();
    assert_eq!(report.lo.index(), 62);
    assert_eq!(report.hi.index(), 63);
    assert_eq!(report.evaluations, 0);
    assert_eq!(second.evaluation_count(), 0);
    assert_eq!(store.results_count(), 7);
}

/// Results from an interrupted run seed the next one.
#[tokio::test]
async fn test_partial_results_resume_the_search() {
    let store = TestStore::new();
    let results = ResultStore::new(store.db.connection());
    results
        .put("csp", &leak_key(49), &record(false), None)
        .expect("seed 49");
    results
        .put("csp", &leak_key(74), &record(true), None)
        .expect("seed 74");

    let evaluator = Arc::new(MockEvaluator::reproduced_from(63));
    let outcomes = orchestrator(&store, evaluator.clone(), fast_config())
        .run(vec![chromium_job("csp", "leak", 0, 99)])
        .await;

    assert_eq!(outcomes[0].status, SessionStatus::Done);
    let report = outcomes[0].report.as_ref().unwrap();
    assert_eq!(report.lo.index(), 62);
    assert_eq!(report.hi.index(), 63);
    assert_eq!(report.evaluations, 5);
    assert_eq!(evaluator.evaluated_indices(), vec![61, 67, 64, 62, 63]);
}

/// Collections are disjoint: results in one never seed another.
#[tokio::test]
async fn test_collections_do_not_share_results() {
    let store = TestStore::new();
    let first = Arc::new(MockEvaluator::reproduced_from(63));
    orchestrator(&store, first, fast_config())
        .run(vec![chromium_job("csp", "leak", 0, 99)])
        .await;

    let second = Arc::new(MockEvaluator::reproduced_from(63));
    let outcomes = orchestrator(&store, second.clone(), fast_config())
        .run(vec![chromium_job("xs-leaks", "leak", 0, 99)])
        .await;

    assert_eq!(outcomes[0].status, SessionStatus::Done);
    assert_eq!(second.evaluation_count(), 7);
    assert_eq!(store.results_count(), 14);
}

/// A hole in the archive narrows to the tightest bracket around it.
#[tokio::test]
async fn test_unavailable_build_leaves_a_gap() {
    let store = TestStore::new();
    let evaluator = Arc::new(MockEvaluator::reproduced_from(150));
    let probe = Arc::new(MockProbe::new(|state| state.index() != 150));
    let orchestrator =
        orchestrator_with_probe(&store, evaluator.clone(), probe.clone(), fast_config());

    let outcomes = orchestrator
        .run(vec![chromium_job("csp", "leak", 100, 200)])
        .await;

    assert_eq!(outcomes[0].status, SessionStatus::Done);
    let report = outcomes[0].report.as_ref().unwrap();
    assert!(report.gap);
    assert!(!report.is_exact());
    assert_eq!(report.lo.index(), 149);
    assert_eq!(report.hi.index(), 151);
    assert_eq!(report.skipped, vec![150]);
    // The candidate above the hole is preferred at each distance.
    assert_eq!(evaluator.evaluated_indices()[0], 151);
    // The negative verdict is cached after one probe.
    let probes_at_150 = probe
        .probed_indices()
        .into_iter()
        .filter(|index| *index == 150)
        .count();
    assert_eq!(probes_at_150, 1);
}

/// Dirty runs still narrow, but the verdict is flagged.
#[tokio::test]
async fn test_dirty_run_marks_the_report_provisional() {
    let store = TestStore::new();
    let evaluator = Arc::new(MockEvaluator::new(|state, _| {
        if state.index() == 64 {
            MockOutcome::Dirty { reproduced: true }
        } else if state.index() >= 63 {
            MockOutcome::Reproduced
        } else {
            MockOutcome::Clean
        }
    }));
    let outcomes = orchestrator(&store, evaluator.clone(), fast_config())
        .run(vec![chromium_job("csp", "leak", 0, 99)])
        .await;

    assert_eq!(outcomes[0].status, SessionStatus::Done);
    let report = outcomes[0].report.as_ref().unwrap();
    assert_eq!(report.lo.index(), 62);
    assert_eq!(report.hi.index(), 63);
    assert!(report.provisional);
    assert_eq!(evaluator.evaluation_count(), 7);
}

/// Strict-clean repeats a dirty run once before narrowing on it.
#[tokio::test]
async fn test_strict_clean_repeats_dirty_runs() {
    let store = TestStore::new();
    let evaluator = Arc::new(MockEvaluator::new(|state, attempt| {
        if state.index() == 49 && attempt == 0 {
            MockOutcome::Dirty { reproduced: false }
        } else if state.index() >= 63 {
            MockOutcome::Reproduced
        } else {
            MockOutcome::Clean
        }
    }));
    let mut config = fast_config();
    config.strict_clean = true;
    let outcomes = orchestrator(&store, evaluator.clone(), config)
        .run(vec![chromium_job("csp", "leak", 0, 99)])
        .await;

    assert_eq!(outcomes[0].status, SessionStatus::Done);
    let report = outcomes[0].report.as_ref().unwrap();
    assert_eq!(report.lo.index(), 62);
    assert_eq!(report.hi.index(), 63);
    assert!(!report.provisional);
    // Seven candidates plus one clean repeat of the dirty first visit.
    assert_eq!(evaluator.evaluation_count(), 8);
}

/// Version spaces skip majors that were never released.
#[tokio::test]
async fn test_release_hole_behaves_like_a_missing_binary() {
    let store = TestStore::new();
    let evaluator = Arc::new(MockEvaluator::reproduced_from(6));
    let index = ReleaseIndex::new(
        Browser::Chromium,
        (1..=10u64).filter(|major| *major != 5).map(|major| (major, major * 1_000)),
    );
    let job = (
        SessionSpec::new(
            "csp",
            "test-project",
            "leak",
            TransitionDirection::FalseToTrue,
            1,
            10,
        ),
        StateSpace::releases(index),
    );
    let outcomes = orchestrator(&store, evaluator.clone(), fast_config())
        .run(vec![job])
        .await;

    assert_eq!(outcomes[0].status, SessionStatus::Done);
    let report = outcomes[0].report.as_ref().unwrap();
    assert!(report.gap);
    assert_eq!(report.lo.index(), 4);
    assert_eq!(report.hi.index(), 6);
    assert_eq!(report.skipped, vec![5]);
    assert!(!evaluator.evaluated_indices().contains(&5));
}
