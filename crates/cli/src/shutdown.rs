use crate::error::CliError;
use std::sync::{Arc, OnceLock};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

impl StopSignal {
    fn name(self) -> &'static str {
        match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
        }
    }

    fn exit_code(self) -> ExitCode {
        match self {
            StopSignal::Interrupt => ExitCode::Interrupted,
            StopSignal::Terminate => ExitCode::Terminated,
        }
    }
}

/// The first SIGINT or SIGTERM cancels the running command: a migration
/// stops between scripts and releases its version lock, a page query is
/// abandoned. A second signal exits at once.
#[derive(Clone)]
pub struct Shutdown {
    cancel: CancellationToken,
    received: Arc<OnceLock<StopSignal>>,
}

impl Shutdown {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            received: Arc::new(OnceLock::new()),
        }
    }

    /// Starts watching for signals.
    pub fn listen() -> Self {
        let shutdown = Self::new();
        tokio::spawn(shutdown.clone().watch());
        shutdown
    }

    async fn watch(self) {
        let first = next_signal().await;
        let _ = self.received.set(first);
        info!(signal = first.name(), "Stopping, send it again to exit immediately");
        self.cancel.cancel();

        let second = next_signal().await;
        warn!(signal = second.name(), "Exiting without waiting for cleanup");
        std::process::exit(second.exit_code().as_i32());
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn received(&self) -> Option<StopSignal> {
        self.received.get().copied()
    }

    /// A failure after a signal exits with that signal's code, whatever the
    /// error it surfaced as.
    pub fn exit_code(&self, result: &Result<(), CliError>) -> ExitCode {
        match (result, self.received()) {
            (Ok(()), _) => ExitCode::Success,
            (Err(_), Some(signal)) => signal.exit_code(),
            (Err(err), None) if err.is_cancellation() => ExitCode::Interrupted,
            (Err(_), None) => ExitCode::GeneralError,
        }
    }
}

async fn next_signal() -> StopSignal {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => StopSignal::Interrupt,
            Err(err) => {
                error!(%err, "Failed to listen for SIGINT");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                StopSignal::Terminate
            }
            Err(err) => {
                error!(%err, "Failed to listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<StopSignal>();

    tokio::select! {
        stop = interrupt => stop,
        stop = terminate => stop,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// 128 + SIGINT
    Interrupted = 130,
    /// 128 + SIGTERM
    Terminated = 143,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
