//! # Example: background
//!
//! Blocking work off the async runtime: a dedicated worker thread, a
//! compute-once memo, and a deadline-bounded retry over both.
//!
//! Demonstrates how to:
//! - Submit blocking jobs to a [`Worker`] and share the [`Ticket`] result.
//! - Compute a keyed value at most once with [`Memo`].
//! - Combine a first attempt with budgeted re-attempts via [`Retry`].
//! - Stop the worker with a final cleanup task.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Worker::start("hasher") ──► dedicated OS thread
//!   ├─► submit(blocking job) ──► Ticket, awaited twice, computed once
//!   ├─► Memo::value("alpha") x2 ──► single factory run
//!   ├─► Retry::get(2s) ──► first try fails, retry 1 succeeds
//!   └─► stop(final flush, 1s) ──► thread joins, later submits rejected
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example background
//! ```

use std::sync::Arc;
use std::time::Duration;

use sequin::{Memo, Retry, WorkError, Worker};

fn digest(input: &str) -> u64 {
    input.bytes().fold(0xcbf2_9ce4_8422_2325, |acc, b| {
        (acc ^ u64::from(b)).wrapping_mul(0x100_0000_01b3)
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ============================================================
    // Demo 1: one blocking job, many observers
    // ============================================================
    println!("Demo 1: shared worker results");

    let worker = Arc::new(Worker::start("hasher")?);

    let ticket = worker.submit(|| {
        // Blocking on purpose: this runs on the worker thread.
        std::thread::sleep(Duration::from_millis(150));
        println!("  [hasher] digesting (runs once)");
        Ok::<_, std::io::Error>(digest("the quick brown fox"))
    });

    let (first, second) = tokio::join!(ticket.outcome(), ticket.outcome());
    println!(" ─► observer 1: {:#018x}", first?);
    println!(" ─► observer 2: {:#018x}", second?);

    let bad = worker.submit(|| {
        Err::<u64, _>(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "corrupt input",
        ))
    });
    if let Err(err) = bad.outcome().await {
        println!(" ─► failed job: kind={} message={err}", err.as_label());
    }

    // ============================================================
    // Demo 2: compute-once memoization
    // ============================================================
    println!("\nDemo 2: memoized digests");

    let memo = Memo::new(|key: String| async move {
        println!("  [memo] computing {key:?} (once per key)");
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, WorkError>(digest(&key))
    });

    let key = "alpha".to_string();
    let (a, b) = tokio::join!(memo.value(&key), memo.value(&key));
    assert_eq!(a?, b?);
    println!(" ─► both callers saw the same digest");

    memo.forget(&key).await;
    let again = memo.value(&key).await?;
    println!(" ─► after forget, recomputed: {again:#018x}");

    // ============================================================
    // Demo 3: bounded retry over the worker
    // ============================================================
    println!("\nDemo 3: retry with a shared budget");

    let flaky = worker.submit(|| {
        Err::<String, _>(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "first try always loses",
        ))
    });

    let retrier = {
        let worker = Arc::clone(&worker);
        Retry::new(flaky, 3, move |attempt| {
            let worker = Arc::clone(&worker);
            async move {
                worker
                    .submit(move || {
                        if attempt == 0 {
                            Err(std::io::Error::new(
                                std::io::ErrorKind::ConnectionReset,
                                "still warming up",
                            ))
                        } else {
                            Ok(format!("recovered on retry {attempt}"))
                        }
                    })
                    .outcome()
                    .await
            }
        })
    };

    let answer = retrier.get(Duration::from_secs(2)).await?;
    println!(" ─► {answer}");

    // ============================================================
    // Shutdown: final task runs on the worker thread
    // ============================================================
    println!("\nShutdown");

    worker
        .stop(|| println!("  [hasher] final flush"), Duration::from_secs(1))
        .outcome()
        .await?;

    let refused = worker.submit(|| Ok::<_, std::io::Error>(0_u64));
    if let Err(err) = refused.outcome().await {
        println!(" ─► submit after stop: {}", err.as_label());
    }

    Ok(())
}
