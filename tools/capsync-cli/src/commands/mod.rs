pub mod analyze;
pub mod list;
pub mod record;
pub mod record_windows;
pub mod worker;

use std::time::Duration;

/// Block until Ctrl+C, or until `duration_secs` elapses when given.
pub(crate) async fn wait_for_stop(duration_secs: Option<u64>) -> anyhow::Result<()> {
    match duration_secs {
        Some(secs) => {
            println!("Recording for {secs}s (Ctrl+C stops early)...");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                res = tokio::signal::ctrl_c() => res?,
            }
        }
        None => {
            println!("Press Ctrl+C to stop recording...");
            tokio::signal::ctrl_c().await?;
        }
    }
    println!();
    Ok(())
}
