use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tracing::info;

/// Process-wide termination flag shared by every event loop.
#[derive(Clone, Debug)]
pub struct TerminationSignal {
    tx: watch::Sender<bool>,
}

impl Default for TerminationSignal {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }
}

impl TerminationSignal {
    pub fn trap_on_sigint(&self) -> Result<()> {
        let signal = self.clone();
        ::ctrlc::set_handler(move || signal.terminate())
            .map_err(|error| anyhow!("failed to set SIGINT handler: {error}"))
    }

    pub fn terminate(&self) {
        info!("Gracefully shutting down...");
        self.tx.send_replace(true);
    }

    pub fn is_terminating(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait_to_terminate(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so the channel never closes here
        let _ = rx.wait_for(|is_terminating| *is_terminating).await;
    }
}
