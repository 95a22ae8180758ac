//! Ctrl+C handling for the runner binary
//!
//! The runner loop selects on the receiver between cycles; a cycle already
//! in flight finishes before the loop exits.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shutdown signal type (unit type, just signals "shutdown now")
pub type ShutdownSignal = ();

/// Shutdown channel sender
pub type ShutdownSender = broadcast::Sender<ShutdownSignal>;

/// Shutdown channel receiver
pub type ShutdownReceiver = broadcast::Receiver<ShutdownSignal>;

/// Setup shutdown handling with Ctrl+C signal
///
/// The sender is returned for callers that need to stop the loop from
/// another task; the runner handles its cycle limit inline and only keeps
/// the receiver.
pub fn setup_shutdown() -> (ShutdownSender, ShutdownReceiver) {
    let (tx, rx) = broadcast::channel::<ShutdownSignal>(1);

    let tx_clone = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received, stopping after current cycle");
        let _ = tx_clone.send(());
    });

    (tx, rx)
}
