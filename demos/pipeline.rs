//! # Example: pipeline
//!
//! A three-stage report pipeline where the stages must run in order even
//! though they are attached up front, plus a cancellation demo.
//!
//! Demonstrates how to:
//! - Attach producers with [`Session::attach_fn`] and read their [`Sequence`]s.
//! - Seal the session and wait for the drain.
//! - Cancel a session and get the never-started producers back.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Session::builder(cfg).build()
//!   ├─► attach "extract"  ──► runs first, emits raw records
//!   ├─► attach "transform" ──► waits for extract to finish
//!   ├─► attach "report"    ──► waits for transform to finish
//!   ├─► seal() ──► Drain.wait() resolves once all three terminated
//!   └─► second session: cancel() while "slow" runs
//!         └─► "never-1"/"never-2" come back, factories never invoked
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example pipeline
//! cargo run --example pipeline --features logging   # with the event log
//! ```

use std::sync::Arc;
use std::time::Duration;

use sequin::{Emitter, Session, SessionConfig, Subscribe};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Optional: log every session event (requires "logging" feature)
    #[cfg(feature = "logging")]
    let subs: Vec<Arc<dyn Subscribe>> = {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
        vec![Arc::new(sequin::LogWriter::new())]
    };
    #[cfg(not(feature = "logging"))]
    let subs: Vec<Arc<dyn Subscribe>> = Vec::new();

    // ============================================================
    // Demo 1: three stages, strict order
    // ============================================================
    println!("Demo 1: ordered pipeline");

    let session = Session::builder(SessionConfig::default())
        .with_subscribers(subs)
        .build();

    let mut raw = session
        .attach_fn("extract", |out, _ctx| async move {
            for record in ["alpha", "beta", "gamma"] {
                println!("  [extract] {record}");
                let _ = out.emit(record.to_string()).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(())
        })
        .await?;

    let mut transformed = session
        .attach_fn("transform", |out, _ctx| async move {
            // Runs only after "extract" terminated, fast or not.
            println!("  [transform] starting");
            let _ = out.emit("ALPHA+BETA+GAMMA".to_string()).await;
            Ok(())
        })
        .await?;

    let mut report = session
        .attach_fn("report", |out, _ctx| async move {
            println!("  [report] writing summary");
            let _ = out.emit(3_usize).await;
            Ok(())
        })
        .await?;

    let drain = session.seal().await?;

    while let Some(record) = raw.next().await {
        println!(" ─► raw: {record}");
    }
    while let Some(batch) = transformed.next().await {
        println!(" ─► transformed: {batch}");
    }
    while let Some(count) = report.next().await {
        println!(" ─► reported {count} records");
    }

    drain.wait().await?;
    println!(" ─► drained\n");

    // ============================================================
    // Demo 2: cancel hands back what never started
    // ============================================================
    println!("Demo 2: cancellation");

    let session = Session::new(SessionConfig::default());

    let mut slow = session
        .attach_fn("slow", |out, ctx| async move {
            let _ = out.emit(()).await;
            // Parked until the session cancels; the run is torn down the
            // moment the token fires.
            ctx.cancelled().await;
            Ok(())
        })
        .await?;

    for name in ["never-1", "never-2"] {
        session
            .attach_fn(name, move |_out: Emitter<()>, _ctx| async move {
                println!("  [{name}] this line never prints");
                Ok(())
            })
            .await?;
    }

    // Make sure "slow" is the one connected before cancelling.
    slow.next().await;

    let returned = session.cancel().await;
    println!(
        " ─► cancelled; returned: {:?}",
        returned.iter().map(|p| p.name()).collect::<Vec<_>>()
    );
    println!(" ─► outcome of slow: {}", slow.wait().await.as_label());

    Ok(())
}
