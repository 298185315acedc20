// Session countdown
//
// One-second ticker gated on the connection state: it only counts down
// while the call is connected, and stops itself at zero.

use log::{debug, info};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::types::{ConnectionState, RemainingTime};

/// Emitted by the ticker task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick(RemainingTime),
    /// Countdown reached zero; fired at most once
    Expired,
}

/// Countdown for one call attempt.
///
/// Dropping the timer cancels it.
pub struct SessionTimer {
    remaining: watch::Receiver<u64>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionTimer {
    /// Spawn the ticker.
    ///
    /// `connection` drives the gate: time only elapses while it reads
    /// `Connected`. A partially elapsed tick is discarded when the
    /// connection drops.
    pub fn start(
        duration_secs: u64,
        tick_interval: Duration,
        connection: watch::Receiver<ConnectionState>,
        events: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let (remaining_tx, remaining_rx) = watch::channel(duration_secs);
        let token = CancellationToken::new();

        let handle = tokio::spawn(run_ticker(
            duration_secs,
            tick_interval,
            connection,
            remaining_tx,
            events,
            token.clone(),
        ));

        Self {
            remaining: remaining_rx,
            token,
            handle: Some(handle),
        }
    }

    pub fn remaining(&self) -> RemainingTime {
        RemainingTime(*self.remaining.borrow())
    }

    /// Stop the countdown. Returns false when it was already stopped.
    pub fn cancel(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the ticker task to exit
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_ticker(
    mut remaining: u64,
    tick_interval: Duration,
    mut connection: watch::Receiver<ConnectionState>,
    remaining_tx: watch::Sender<u64>,
    events: mpsc::UnboundedSender<TimerEvent>,
    token: CancellationToken,
) {
    loop {
        if *connection.borrow_and_update() != ConnectionState::Connected {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        if remaining == 0 {
            expire(&events, &token);
            break;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = time::sleep(tick_interval) => {
                remaining -= 1;
                remaining_tx.send_replace(remaining);
                let _ = events.send(TimerEvent::Tick(RemainingTime(remaining)));
                if remaining == 0 {
                    expire(&events, &token);
                    break;
                }
            }
        }
    }
    debug!("Session ticker stopped with {}s left", remaining);
}

fn expire(events: &mpsc::UnboundedSender<TimerEvent>, token: &CancellationToken) {
    if token.is_cancelled() {
        return;
    }
    token.cancel();
    info!("Session time is up");
    let _ = events.send(TimerEvent::Expired);
}
