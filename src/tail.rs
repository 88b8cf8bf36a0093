//! Tail mode: poll a source for growth on a background thread.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{trace, warn};

use crate::cancel::CancelToken;
use crate::source::{Refresh, SourceHandle};

/// Change notification from a [`TailFollower`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    Grew {
        previous_lines: usize,
        total_lines: usize,
    },
    Rebuilt {
        total_lines: usize,
    },
    Error(String),
}

impl From<Refresh> for TailEvent {
    fn from(refresh: Refresh) -> Self {
        match refresh {
            Refresh::Grew {
                previous_lines,
                total_lines,
            } => TailEvent::Grew {
                previous_lines,
                total_lines,
            },
            Refresh::Rebuilt { total_lines } => TailEvent::Rebuilt { total_lines },
        }
    }
}

/// Repeating refresh of a shared source.
///
/// One thread, so ticks never overlap. A tick that finds the source locked
/// by the consumer is skipped rather than queued.
pub struct TailFollower {
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
    receiver: Receiver<TailEvent>,
}

impl TailFollower {
    pub fn start(source: Arc<Mutex<SourceHandle>>, interval: Duration) -> Self {
        let (tx, rx) = channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let handle = thread::spawn(move || {
            while token.sleep(interval) {
                if !tick(&source, &tx) {
                    break;
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
            receiver: rx,
        }
    }

    /// Next pending event, without blocking.
    pub fn try_recv(&self) -> Option<TailEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel and wait for the polling thread. No tick runs after this
    /// returns. Idempotent.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("tail thread panicked");
            }
        }
    }
}

impl Drop for TailFollower {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poll. Returns `false` when following should end.
fn tick(source: &Mutex<SourceHandle>, tx: &Sender<TailEvent>) -> bool {
    let mut source = match source.try_lock() {
        Ok(source) => source,
        Err(TryLockError::WouldBlock) => {
            trace!("source busy, skipping tail tick");
            return true;
        }
        Err(TryLockError::Poisoned(_)) => {
            warn!("source lock poisoned, stopping tail");
            let _ = tx.send(TailEvent::Error("source lock poisoned".to_string()));
            return false;
        }
    };

    match source.refresh() {
        Ok(Some(refresh)) => {
            let _ = tx.send(refresh.into());
        }
        Ok(None) => {}
        Err(e) => {
            warn!(path = %source.path().display(), error = %e, "tail refresh failed");
            let _ = tx.send(TailEvent::Error(e.to_string()));
        }
    }
    true
}
