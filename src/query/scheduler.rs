//! Chunk Scheduler
//!
//! Runs one task per chunk on the tokio runtime with a semaphore bounding how
//! many backend calls are live at once:
//!
//! ```text
//! chunk 0 ─┐                      ┌─ slot 0
//! chunk 1 ─┼─ spawn → permit → run ┼─ slot 1   → scan in order, first error wins
//! chunk 2 ─┘                      └─ slot 2
//! ```
//!
//! Each task owns its own result slot (its `JoinHandle`), so completion order
//! never affects result order. A panicking chunk is caught by the runtime and
//! surfaces as that chunk's error.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::error::{QueryError, QueryResult};
use crate::frame::{Frame, TimeRange};

/// Text of a panic payload
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `run(chunk)` for every chunk with at most `max_concurrency` running.
///
/// Waits for every chunk (or cancellation) before returning. On success the
/// frames are in chunk order; otherwise the error of the earliest failing
/// chunk is returned, tagged with that chunk's range.
pub async fn execute_chunks<F, Fut>(
    chunks: &[TimeRange],
    max_concurrency: usize,
    cancel: &CancellationToken,
    run: F,
) -> QueryResult<Vec<Frame>>
where
    F: Fn(TimeRange) -> Fut,
    Fut: Future<Output = QueryResult<Frame>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    let handles: Vec<_> = chunks
        .iter()
        .map(|chunk| {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let task = run(*chunk);

            tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(QueryError::Cancelled),
                    permit = semaphore.acquire_owned() => {
                        permit.map_err(|_| QueryError::Cancelled)?
                    }
                };
                task.await
            })
        })
        .collect();

    let mut slots = Vec::with_capacity(handles.len());
    for (handle, chunk) in handles.into_iter().zip(chunks) {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(chunk = %chunk, panic = %message, "Chunk task panicked");
                Err(QueryError::Panic(message))
            }
            Err(_) => Err(QueryError::Cancelled),
        };
        slots.push(result.map_err(|e| QueryError::in_chunk(*chunk, e)));
    }

    slots.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::frame::{Column, ColumnData};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn hours(n: usize) -> Vec<TimeRange> {
        let base = 1_771_372_800_000; // 2026-02-18T00:00:00Z
        (0..n as i64)
            .map(|i| TimeRange::from_millis(base + i * 3_600_000, base + (i + 1) * 3_600_000).unwrap())
            .collect()
    }

    fn frame_for(chunk: TimeRange) -> Frame {
        Frame::with_columns(
            "",
            vec![Column::from_data(
                "time",
                ColumnData::Timestamp(vec![Some(chunk.from.timestamp_millis())]),
            )],
        )
    }

    #[tokio::test]
    async fn test_results_in_chunk_order() {
        let chunks = hours(6);
        let frames = execute_chunks(&chunks, 4, &CancellationToken::new(), |chunk| async move {
            // Later chunks finish first
            let delay = 60 - (chunk.from.timestamp_millis() / 3_600_000 % 24) * 10;
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            Ok(frame_for(chunk))
        })
        .await
        .unwrap();

        let starts: Vec<_> = frames
            .iter()
            .map(|f| f.columns[0].data.timestamps().unwrap()[0].unwrap())
            .collect();
        let expected: Vec<_> = chunks.iter().map(|c| c.from.timestamp_millis()).collect();
        assert_eq!(starts, expected);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let chunks = hours(10);
        execute_chunks(&chunks, 3, &CancellationToken::new(), |chunk| {
            let live = Arc::clone(&live);
            let peak = Arc::clone(&peak);
            async move {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                live.fetch_sub(1, Ordering::SeqCst);
                Ok(frame_for(chunk))
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_first_error_in_chunk_order_wins() {
        let chunks = hours(4);
        let second = chunks[1];
        let third = chunks[2];

        let err = execute_chunks(&chunks, 4, &CancellationToken::new(), move |chunk| async move {
            if chunk == third {
                return Err(QueryError::Client(ClientError::EmptyBackendError { status: 500 }));
            }
            if chunk == second {
                // Fails last in time, but first in order
                tokio::time::sleep(Duration::from_millis(50)).await;
                return Err(QueryError::Client(ClientError::EmptyBackendError { status: 502 }));
            }
            Ok(frame_for(chunk))
        })
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "[chunk 2026-02-18 01:00 to 2026-02-18 02:00] Backend returned HTTP 502 with no error message"
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_chunk_error() {
        let chunks = hours(3);
        let bad = chunks[1];

        let err = execute_chunks(&chunks, 2, &CancellationToken::new(), move |chunk| async move {
            if chunk == bad {
                panic!("index out of bounds");
            }
            Ok(frame_for(chunk))
        })
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "[chunk 2026-02-18 01:00 to 2026-02-18 02:00] panic: index out of bounds"
        );
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_permit() {
        let cancel = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let chunks = hours(4);
        let counter = Arc::clone(&started);
        let err = execute_chunks(&chunks, 1, &cancel, move |chunk| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(frame_for(chunk))
            }
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        // Chunks queued behind the permit never started
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(err.to_string().starts_with("[chunk 2026-02-18 01:00 to 2026-02-18 02:00]"));
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let frames = execute_chunks(&[], 4, &CancellationToken::new(), |chunk| async move {
            Ok(frame_for(chunk))
        })
        .await
        .unwrap();
        assert!(frames.is_empty());
    }
}
