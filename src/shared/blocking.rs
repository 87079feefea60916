//! Usage: Run blocking work (sqlite, settings files) on the tokio blocking pool with a stable label.

use crate::shared::error::{AppError, AppResult};

pub async fn run<T, E>(
    label: &'static str,
    f: impl FnOnce() -> Result<T, E> + Send + 'static,
) -> AppResult<T>
where
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(join_err) => {
            // Panic payloads may echo file contents or tokens; keep them out of the error text.
            if join_err.is_panic() {
                tracing::error!(label, "blocking task panicked");
                return Err(AppError::new(
                    "TASK_JOIN",
                    format!("{label}: task panicked"),
                ));
            }

            tracing::warn!(label, "blocking task cancelled");
            Err(AppError::new(
                "TASK_JOIN",
                format!("{label}: task cancelled"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_closure_result() {
        let value = run("sum", || Ok::<_, AppError>(2 + 2)).await.expect("sum");
        assert_eq!(value, 4);
    }

    #[tokio::test]
    async fn run_maps_panic_to_task_join() {
        let err = run("explode", || -> Result<(), AppError> { panic!("boom") })
            .await
            .expect_err("panic should surface as error");
        assert_eq!(err.code(), "TASK_JOIN");
        assert!(err.to_string().contains("explode: task panicked"));
    }
}
