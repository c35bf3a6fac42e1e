//! Hybrid dual-write executor.
//!
//! Decides which of the vector/graph stages must run for the configured
//! sync mode, runs them in the configured order, and reports exactly which
//! stages committed so the caller can compensate precisely after a partial
//! failure.

use futures::future::BoxFuture;
use tracing::debug;

use vaultsync_core::{Error, ExecutionOrder, Result, SyncMode};

/// One store-write stage, boxed so callers can close over their own state.
pub type Stage<'a> = BoxFuture<'a, Result<()>>;

/// A hybrid write request: the mode plus whichever stages the caller can
/// provide.
pub struct HybridWrite<'a> {
    pub mode: SyncMode,
    pub vector_stage: Option<Stage<'a>>,
    pub graph_stage: Option<Stage<'a>>,
}

/// Which stages committed during an execution, successful or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HybridOutcome {
    pub vector_committed: bool,
    pub graph_committed: bool,
}

/// A failed hybrid execution, carrying what already committed.
#[derive(Debug)]
pub struct HybridFailure {
    pub committed: HybridOutcome,
    pub error: Error,
}

/// Executes hybrid writes per the configured order and dual-write contract.
#[derive(Debug, Clone, Copy)]
pub struct HybridExecutor {
    order: ExecutionOrder,
    require_dual_write: bool,
}

impl HybridExecutor {
    pub fn new(order: ExecutionOrder, require_dual_write: bool) -> Self {
        Self {
            order,
            require_dual_write,
        }
    }

    /// Run the stages required by the mode.
    ///
    /// In hybrid mode with dual-write required, a missing required stage is
    /// a configuration error and nothing runs; the executor never silently
    /// runs one side only in that mode.
    pub async fn execute(
        &self,
        write: HybridWrite<'_>,
    ) -> std::result::Result<HybridOutcome, HybridFailure> {
        let run_vector = write.vector_stage.is_some() && write.mode.wants_vector();
        let run_graph = write.graph_stage.is_some() && write.mode.wants_graph();

        if write.mode == SyncMode::Hybrid
            && self.require_dual_write
            && (!run_vector || !run_graph)
        {
            return Err(HybridFailure {
                committed: HybridOutcome::default(),
                error: Error::Config(
                    "hybrid mode requires both vector and graph stages".into(),
                ),
            });
        }

        let vector_stage = write.vector_stage.filter(|_| run_vector);
        let graph_stage = write.graph_stage.filter(|_| run_graph);

        match (vector_stage, graph_stage) {
            (Some(vector), Some(graph)) => self.execute_both(vector, graph).await,
            (Some(vector), None) => Self::execute_one(vector, false).await,
            (None, Some(graph)) => Self::execute_one(graph, true).await,
            (None, None) => Ok(HybridOutcome::default()),
        }
    }

    async fn execute_one(
        stage: Stage<'_>,
        is_graph: bool,
    ) -> std::result::Result<HybridOutcome, HybridFailure> {
        match stage.await {
            Ok(()) => Ok(HybridOutcome {
                vector_committed: !is_graph,
                graph_committed: is_graph,
            }),
            Err(error) => Err(HybridFailure {
                committed: HybridOutcome::default(),
                error,
            }),
        }
    }

    async fn execute_both(
        &self,
        vector: Stage<'_>,
        graph: Stage<'_>,
    ) -> std::result::Result<HybridOutcome, HybridFailure> {
        match self.order {
            ExecutionOrder::VectorFirst => Self::sequential(vector, graph, false).await,
            ExecutionOrder::GraphFirst => Self::sequential(graph, vector, true).await,
            ExecutionOrder::Parallel => {
                debug!(component = "hybrid", order = "parallel", "Running stages concurrently");
                let (vector_result, graph_result) = futures::join!(vector, graph);
                let committed = HybridOutcome {
                    vector_committed: vector_result.is_ok(),
                    graph_committed: graph_result.is_ok(),
                };
                match (vector_result, graph_result) {
                    (Ok(()), Ok(())) => Ok(committed),
                    (Err(error), _) | (_, Err(error)) => {
                        Err(HybridFailure { committed, error })
                    }
                }
            }
        }
    }

    /// Run `first` then `second`. `graph_first` labels which stage is which.
    async fn sequential(
        first: Stage<'_>,
        second: Stage<'_>,
        graph_first: bool,
    ) -> std::result::Result<HybridOutcome, HybridFailure> {
        if let Err(error) = first.await {
            return Err(HybridFailure {
                committed: HybridOutcome::default(),
                error,
            });
        }
        let committed_first = HybridOutcome {
            vector_committed: !graph_first,
            graph_committed: graph_first,
        };
        if let Err(error) = second.await {
            return Err(HybridFailure {
                committed: committed_first,
                error,
            });
        }
        Ok(HybridOutcome {
            vector_committed: true,
            graph_committed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ok_stage<'a>(log: Arc<std::sync::Mutex<Vec<&'static str>>>, name: &'static str) -> Stage<'a> {
        Box::pin(async move {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    fn err_stage<'a>(message: &'static str) -> Stage<'a> {
        Box::pin(async move { Err(Error::Graph(message.to_string())) })
    }

    #[tokio::test]
    async fn test_hybrid_both_succeed_vector_first() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let executor = HybridExecutor::new(ExecutionOrder::VectorFirst, true);

        let outcome = executor
            .execute(HybridWrite {
                mode: SyncMode::Hybrid,
                vector_stage: Some(ok_stage(log.clone(), "vector")),
                graph_stage: Some(ok_stage(log.clone(), "graph")),
            })
            .await
            .unwrap();

        assert!(outcome.vector_committed && outcome.graph_committed);
        assert_eq!(*log.lock().unwrap(), vec!["vector", "graph"]);
    }

    #[tokio::test]
    async fn test_graph_first_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let executor = HybridExecutor::new(ExecutionOrder::GraphFirst, true);

        executor
            .execute(HybridWrite {
                mode: SyncMode::Hybrid,
                vector_stage: Some(ok_stage(log.clone(), "vector")),
                graph_stage: Some(ok_stage(log.clone(), "graph")),
            })
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["graph", "vector"]);
    }

    #[tokio::test]
    async fn test_graph_failure_reports_vector_committed() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let executor = HybridExecutor::new(ExecutionOrder::VectorFirst, true);

        let failure = executor
            .execute(HybridWrite {
                mode: SyncMode::Hybrid,
                vector_stage: Some(ok_stage(log, "vector")),
                graph_stage: Some(err_stage("boom")),
            })
            .await
            .unwrap_err();

        assert!(failure.committed.vector_committed);
        assert!(!failure.committed.graph_committed);
    }

    #[tokio::test]
    async fn test_vector_failure_runs_nothing_else() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let executor = HybridExecutor::new(ExecutionOrder::VectorFirst, true);

        let failure = executor
            .execute(HybridWrite {
                mode: SyncMode::Hybrid,
                vector_stage: Some(err_stage("down")),
                graph_stage: Some(ok_stage(log.clone(), "graph")),
            })
            .await
            .unwrap_err();

        assert_eq!(failure.committed, HybridOutcome::default());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_missing_stage_is_config_error() {
        let executor = HybridExecutor::new(ExecutionOrder::VectorFirst, true);
        let failure = executor
            .execute(HybridWrite {
                mode: SyncMode::Hybrid,
                vector_stage: Some(err_stage("never run")),
                graph_stage: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::Config(_)));
        assert_eq!(failure.committed, HybridOutcome::default());
    }

    #[tokio::test]
    async fn test_hybrid_missing_stage_allowed_without_dual_write() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let executor = HybridExecutor::new(ExecutionOrder::VectorFirst, false);

        let outcome = executor
            .execute(HybridWrite {
                mode: SyncMode::Hybrid,
                vector_stage: Some(ok_stage(log, "vector")),
                graph_stage: None,
            })
            .await
            .unwrap();

        assert!(outcome.vector_committed);
        assert!(!outcome.graph_committed);
    }

    #[tokio::test]
    async fn test_vector_only_skips_graph_stage() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let executor = HybridExecutor::new(ExecutionOrder::VectorFirst, true);

        let outcome = executor
            .execute(HybridWrite {
                mode: SyncMode::VectorOnly,
                vector_stage: Some(Box::pin(async { Ok(()) })),
                graph_stage: Some(Box::pin(async move {
                    counter_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
            })
            .await
            .unwrap();

        assert!(outcome.vector_committed);
        assert!(!outcome.graph_committed);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parallel_failure_reports_committed_side() {
        let executor = HybridExecutor::new(ExecutionOrder::Parallel, true);
        let failure = executor
            .execute(HybridWrite {
                mode: SyncMode::Hybrid,
                vector_stage: Some(Box::pin(async { Ok(()) })),
                graph_stage: Some(err_stage("graph down")),
            })
            .await
            .unwrap_err();

        assert!(failure.committed.vector_committed);
        assert!(!failure.committed.graph_committed);
    }

    #[tokio::test]
    async fn test_parallel_both_succeed() {
        let executor = HybridExecutor::new(ExecutionOrder::Parallel, true);
        let outcome = executor
            .execute(HybridWrite {
                mode: SyncMode::Hybrid,
                vector_stage: Some(Box::pin(async { Ok(()) })),
                graph_stage: Some(Box::pin(async { Ok(()) })),
            })
            .await
            .unwrap();

        assert!(outcome.vector_committed && outcome.graph_committed);
    }
}
