// Interrupt handling
//
// The first interrupt asks the worker to stop after the current task. A second one
// means the user is done waiting, so the caller should exit right away.

use futures::{Stream, StreamExt};
use log::{info, warn};
use tokio::sync::watch;

/// Exit status used when a second interrupt cuts the current task short
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Forward interrupts to the worker's shutdown channel.
///
/// Returns `true` once a second interrupt arrives, `false` if the interrupts end first.
pub async fn relay_interrupts<S>(interrupts: S, shutdown: watch::Sender<bool>) -> bool
where
    S: Stream<Item = ()>,
{
    tokio::pin!(interrupts);

    if interrupts.next().await.is_none() {
        return false;
    }
    info!("Shutdown requested, finishing current task (interrupt again to exit now)");
    let _ = shutdown.send(true);

    if interrupts.next().await.is_none() {
        return false;
    }
    warn!("Interrupted again, exiting without finishing the current task");
    true
}

/// Ctrl-C presses, ending if the signal handler cannot be installed
pub fn ctrl_c_presses() -> impl Stream<Item = ()> {
    futures::stream::unfold((), |()| async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(((), ())),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                None
            }
        }
    })
}
