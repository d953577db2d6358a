//! Structured concurrent fan-out over units of work.
//!
//! All unit futures are polled on the calling task. Nothing is spawned, so
//! when the group finishes no unit can still be running.

use futures_util::future::{join_all, try_join_all};
use std::future::Future;

/// Run `op` once per unit concurrently and collect the results in input order.
///
/// The first error drops every sibling future, which cancels any request it
/// had in flight, and is returned as the group's error.
pub async fn fan_out<U, T, E, F, Fut>(
    units: impl IntoIterator<Item = U>,
    op: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(U) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let futures: Vec<Fut> = units.into_iter().map(op).collect();
    let count = futures.len();
    tracing::debug!("Fanning out over {} units", count);

    match try_join_all(futures).await {
        Ok(results) => {
            tracing::debug!("Fan-out over {} units completed", count);
            Ok(results)
        }
        Err(e) => {
            tracing::warn!("Fan-out over {} units aborted on first failure", count);
            Err(e)
        }
    }
}

/// Like [`fan_out`], but every unit runs to completion and reports its own result
pub async fn fan_out_settled<U, T, E, F, Fut>(
    units: impl IntoIterator<Item = U>,
    op: F,
) -> Vec<Result<T, E>>
where
    F: FnMut(U) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let results = join_all(units.into_iter().map(op)).await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        tracing::warn!("{} of {} units failed", failed, results.len());
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::{DiagnosticSink, HarvestError, QueryExecutor};
    use crate::models::Query;
    use crate::transport::MockTransport;
    use crate::utils::{PersistentCache, RateLimiter, QUERY_NAMESPACE};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let delays = [30u64, 10, 20];
        let results: Result<Vec<u64>, String> = fan_out(delays, |ms| async move {
            sleep(Duration::from_millis(ms)).await;
            Ok(ms)
        })
        .await;

        assert_eq!(results.unwrap(), vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Result<Vec<()>, String> =
            fan_out(Vec::<u32>::new(), |_| async { Ok(()) }).await;
        assert!(results.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_cancels_siblings() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(
            MockTransport::with_body(r#"{"data": {"ok": true}}"#).latency(Duration::from_millis(10)),
        );
        let executor = QueryExecutor::new(
            transport.clone(),
            Arc::new(PersistentCache::open(dir.path(), QUERY_NAMESPACE).unwrap()),
            Arc::new(RateLimiter::new(Duration::ZERO)),
            DiagnosticSink::new(dir.path().join("error.txt")),
        );

        let result = fan_out(["A", "B", "C"], |unit| {
            let executor = &executor;
            async move {
                if unit == "B" {
                    sleep(Duration::from_millis(35)).await;
                    return Err(HarvestError::Setup(format!("unit {} failed", unit)));
                }
                for page in 0..50 {
                    let query: Query<serde_json::Value> =
                        Query::new(format!("query {{ {}(page: {}) }}", unit, page));
                    executor.execute(&query).await?;
                }
                Ok(unit)
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("unit B failed"));

        let calls_at_failure = transport.calls();
        assert!(calls_at_failure < 100);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.calls(), calls_at_failure);
    }

    #[tokio::test]
    async fn test_settled_isolates_failures() {
        let results = fan_out_settled(1..=4, |n| async move {
            if n % 2 == 0 {
                Err(format!("unit {} failed", n))
            } else {
                Ok(n * 10)
            }
        })
        .await;

        assert_eq!(
            results,
            vec![
                Ok(10),
                Err("unit 2 failed".to_string()),
                Ok(30),
                Err("unit 4 failed".to_string()),
            ]
        );
    }
}
