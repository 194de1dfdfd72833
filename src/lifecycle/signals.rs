//! OS signal handling.
//!
//! # Responsibilities
//! - Translate Ctrl-C into a future the caller can race a call against
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed never resolves rather than cancelling

/// Resolve when the process receives Ctrl-C (SIGINT).
pub async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupt received, cancelling"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
