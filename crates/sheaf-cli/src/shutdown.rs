//! Signal-driven cancellation.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the returned token: downloads
//! in flight are dropped, nothing new starts, and datasets that already
//! finished are still saved. A second signal exits immediately with status
//! 130.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const EXIT_INTERRUPTED: i32 = 130;

pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut unix_signals = {
            use tokio::signal::unix::{signal, SignalKind};
            match (
                signal(SignalKind::terminate()),
                signal(SignalKind::hangup()),
            ) {
                (Ok(term), Ok(hup)) => Some((term, hup)),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Cannot listen for SIGTERM/SIGHUP ({}), only Ctrl+C stops a run", e);
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            let received = match unix_signals.as_mut() {
                Some((term, hup)) => {
                    tokio::select! {
                        r = tokio::signal::ctrl_c() => r.is_ok(),
                        _ = term.recv() => true,
                        _ = hup.recv() => true,
                    }
                }
                None => tokio::signal::ctrl_c().await.is_ok(),
            };

            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await.is_ok();

            if !received {
                warn!("Signal listener failed; cancellation by signal is disabled");
                return;
            }

            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                info!("Received shutdown signal, stopping; finished downloads will be saved");
                info!("Press Ctrl+C again to force exit");
                handler_token.cancel();
            } else {
                warn!("Force exit requested");
                std::process::exit(EXIT_INTERRUPTED);
            }
        }
    });

    token
}
