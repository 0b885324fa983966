//! Panic recovery for tool handlers.
//!
//! A panicking handler must not take the connection task down with it: the
//! panic is caught while the handler future is polled, logged, and turned
//! into an `Internal` error that the dispatcher flattens like any other.

use crate::types::{Error, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Await `future`, converting a panic during any poll into `Error::Internal`.
pub async fn with_recovery<F, T>(future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            tracing::error!(
                operation = operation_name,
                panic = %panic_msg,
                "panic_recovered"
            );
            Err(Error::internal(format!(
                "Panic in {}: {}",
                operation_name, panic_msg
            )))
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (no message)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    #[tokio::test]
    async fn test_passes_results_through() {
        assert_eq!(with_recovery(async { Ok(42) }, "answer").await.unwrap(), 42);

        let err = with_recovery::<_, ()>(async { Err(Error::validation("bad")) }, "answer")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_panic_after_await_becomes_internal() {
        let result: Result<()> = with_recovery(
            async {
                tokio::task::yield_now().await;
                panic!("detector exploded");
            },
            "acquire_image",
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        let msg = err.to_string();
        assert!(msg.contains("Panic in acquire_image"), "{}", msg);
        assert!(msg.contains("detector exploded"), "{}", msg);
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "Unknown panic (no message)");
    }
}
