//! Signal handling for stopping a download session
//!
//! There is no mid-task cancellation. On Ctrl+C or SIGTERM the queue is
//! closed so no new task is claimed; workers finish the task in hand and the
//! pool drains normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app::queue::TaskQueue;

/// Closes a queue when the process is asked to terminate
pub struct SignalHandler {
    queue: TaskQueue,
    triggered: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler that will close `queue`
    pub fn new(queue: TaskQueue) -> Self {
        Self {
            queue,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once a signal has stopped the session
    pub fn triggered(&self) -> Arc<AtomicBool> {
        self.triggered.clone()
    }

    /// Install the handler on a background task; abort the handle once the
    /// session is over
    pub fn setup(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            wait_for_termination().await;
            info!("Stopping after in-flight downloads finish");
            self.triggered.store(true, Ordering::SeqCst);
            self.queue.close().await;
        })
    }
}

/// Resolve when Ctrl+C or SIGTERM arrives
///
/// A listener that cannot be installed is logged and never fires.
pub async fn wait_for_termination() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C signal received"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("SIGTERM signal received");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
