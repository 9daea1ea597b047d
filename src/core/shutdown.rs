//! # Interruption of a protected task.
//!
//! [`interrupted`] completes when the invocation must stop early: its cancellation token
//! fired, or, when the supervisor was built with OS signals enabled, the process received
//! a termination signal.
//!
//! ## Signals
//! **Unix platforms:** `SIGINT`, `SIGTERM`, `SIGQUIT`
//!
//! **Windows platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`]
//!
//! Tokio never uninstalls a signal handler. After the first listener is registered the
//! default disposition of these signals is gone for the life of the process, which is
//! why signal observation is opt-in.

use tokio_util::sync::CancellationToken;

/// Why a protected task was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Token,
    Signal,
}

impl Interrupt {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Interrupt::Token => "cancelled",
            Interrupt::Signal => "signal",
        }
    }
}

/// Waits until `token` is cancelled or, if `signals` is set, a termination signal arrives.
///
/// If signal listeners cannot be registered, only the token is observed.
pub(crate) async fn interrupted(token: &CancellationToken, signals: bool) -> Interrupt {
    if !signals {
        token.cancelled().await;
        return Interrupt::Token;
    }
    tokio::select! {
        _ = token.cancelled() => Interrupt::Token,
        res = wait_for_shutdown_signal() => match res {
            Ok(()) => Interrupt::Signal,
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for termination signals");
                token.cancelled().await;
                Interrupt::Token
            }
        },
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn test_token_interrupts() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(interrupted(&token, false).await, Interrupt::Token);
        assert_eq!(interrupted(&token, true).await, Interrupt::Token);
    }

    #[tokio::test]
    async fn test_without_signals_only_the_token_ends_the_wait() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { interrupted(&token, false).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        token.cancel();
        assert_eq!(waiter.await.unwrap(), Interrupt::Token);
    }
}
