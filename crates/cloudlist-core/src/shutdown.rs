//! Graceful shutdown on Ctrl-C via a cancellation token

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit code for a second interrupt (128 + SIGINT)
pub const FORCED_EXIT_CODE: i32 = 130;

/// Cancel `token` on the first Ctrl-C; exit the process on the second.
///
/// Must be called inside a tokio runtime. Sessions opened with
/// [`Session::with_parent`](crate::Session::with_parent) observe the
/// cancellation at their next suspension point.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            log::debug!("no signal handler available, Ctrl-C will not cancel listings");
            return;
        }
        log::warn!("Interrupt received, stopping (press Ctrl-C again to force exit)");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            log::error!("Forced exit");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
}
