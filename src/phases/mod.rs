// Pipeline phases
//
// Phase 1: script        (one call)
// Phase 2: character art (fan-out, all-or-nothing join)
// Phase 3: panel art     (one call in flight at a time)

pub mod phase1;
pub mod phase2;
pub mod phase3;

pub use phase1::Phase1Pipeline;
pub use phase2::Phase2Pipeline;
pub use phase3::{PanelJob, PanelPlan, Phase3Pipeline};

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::errors::{ApiError, ApiResult, GenerationError, GenerationResult, Stage};

/// Bounds every remote call of a run by a timeout and the run's cancellation token
#[derive(Debug, Clone)]
pub struct CallGuard {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallGuard {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// Race `call` against the timeout and cancellation.
    ///
    /// The outer error is cancellation; a timeout comes back as
    /// `ApiError::Timeout` so it is reported like any other remote failure.
    pub async fn run<T, F>(&self, stage: Stage, call: F) -> GenerationResult<ApiResult<T>>
    where
        F: Future<Output = ApiResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled { stage });
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled { stage }),
            result = tokio::time::timeout(self.timeout, call) => Ok(match result {
                Ok(outcome) => outcome,
                Err(_) => Err(ApiError::Timeout(self.timeout.as_secs())),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let guard = CallGuard::new(Duration::from_secs(1), CancellationToken::new());
        let outcome = guard.run(Stage::Script, async { Ok::<_, ApiError>(7) }).await;
        assert_eq!(outcome.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_guard_times_out_hung_call() {
        let guard = CallGuard::new(Duration::from_millis(20), CancellationToken::new());
        let outcome = guard
            .run(Stage::PanelImage, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ApiError>(())
            })
            .await;
        assert!(matches!(outcome, Ok(Err(ApiError::Timeout(_)))));
    }

    #[tokio::test]
    async fn test_guard_observes_cancellation() {
        let cancel = CancellationToken::new();
        let guard = CallGuard::new(Duration::from_secs(5), cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome = guard
            .run(Stage::CharacterImage, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ApiError>(())
            })
            .await;
        assert!(matches!(
            outcome,
            Err(GenerationError::Cancelled { stage: Stage::CharacterImage })
        ));
        assert!(cancel.is_cancelled());
    }
}
