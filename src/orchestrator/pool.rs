//! Bounded, cancellable execution of evaluator runs.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::eval::{EvalRecord, EvalRequest, Evaluator, EvaluatorError};

/// Caps concurrent evaluator runs across every session sharing the pool.
#[derive(Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            cancel: CancellationToken::new(),
        }
    }

    /// Run one evaluation once a slot frees up.
    ///
    /// Cancellation interrupts both the wait for a slot and the run itself;
    /// an interrupted run reports [`EvaluatorError::Cancelled`] and produces
    /// no record.
    pub async fn run(
        &self,
        evaluator: &dyn Evaluator,
        request: &EvalRequest,
    ) -> Result<EvalRecord, EvaluatorError> {
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(EvaluatorError::Cancelled),
            permit = self.slots.acquire() => permit.map_err(|_| EvaluatorError::Cancelled)?,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EvaluatorError::Cancelled),
            record = evaluator.evaluate(request) => record,
        }
    }

    /// Interrupt every in-flight run and fail all future ones.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::eval::{Automation, BinaryOrigin, EvalKey, StateResult};
    use crate::state::{Browser, State};

    /// Evaluator that tracks how many runs overlap.
    struct GaugeEvaluator {
        delay: Duration,
        active: Mutex<usize>,
        peak: Mutex<usize>,
    }

    impl GaugeEvaluator {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: Mutex::new(0),
                peak: Mutex::new(0),
            }
        }

        fn peak(&self) -> usize {
            *self.peak.lock()
        }
    }

    #[async_trait]
    impl Evaluator for GaugeEvaluator {
        async fn evaluate(&self, _request: &EvalRequest) -> Result<EvalRecord, EvaluatorError> {
            {
                let mut active = self.active.lock();
                *active += 1;
                let mut peak = self.peak.lock();
                *peak = (*peak).max(*active);
            }
            tokio::time::sleep(self.delay).await;
            *self.active.lock() -= 1;
            Ok(EvalRecord::new(
                "1.0",
                BinaryOrigin::Downloaded,
                StateResult::default(),
            ))
        }
    }

    fn request_for(index: u64) -> EvalRequest {
        let key = EvalKey::new(
            State::revision(Browser::Chromium, index),
            Automation::Terminal,
            "default",
            vec![],
            vec![],
            "group",
        );
        EvalRequest::new(key, "project", 5)
    }

    #[tokio::test]
    async fn test_pool_caps_concurrency() {
        let pool = WorkerPool::new(2);
        let evaluator = GaugeEvaluator::new(Duration::from_millis(50));

        let (req1, req2, req3) = (request_for(1), request_for(2), request_for(3));
        let (a, b, c) = tokio::join!(
            pool.run(&evaluator, &req1),
            pool.run(&evaluator, &req2),
            pool.run(&evaluator, &req3),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert!(evaluator.peak() <= 2, "peak concurrency was {}", evaluator.peak());
        assert_eq!(pool.available_slots(), 2);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_runs() {
        let pool = WorkerPool::new(1);
        let evaluator = Arc::new(GaugeEvaluator::new(Duration::from_secs(30)));

        let runner = {
            let pool = pool.clone();
            let evaluator = evaluator.clone();
            tokio::spawn(async move { pool.run(evaluator.as_ref(), &request_for(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.cancel_all();

        let result = runner.await.unwrap();
        assert!(matches!(result, Err(EvaluatorError::Cancelled)));
        assert!(pool.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_pool_rejects_new_runs() {
        let pool = WorkerPool::new(1);
        let evaluator = GaugeEvaluator::new(Duration::from_millis(5));

        pool.cancel_all();
        let result = pool.run(&evaluator, &request_for(1)).await;
        assert!(matches!(result, Err(EvaluatorError::Cancelled)));
        assert_eq!(evaluator.peak(), 0);
    }
}
