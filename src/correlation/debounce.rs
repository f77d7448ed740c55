//! Quiet-window debouncing.
//!
//! [`Debouncer::arm`] marks state dirty and (re)starts the window. The single
//! [`QuietWindows`] receiver resolves once no arm has happened for `delay`,
//! so a burst of arms yields one tick. At most one window is pending at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    dirty: AtomicBool,
    tx: mpsc::Sender<()>,
    rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        // Capacity 1: a queued arm already restarts the window.
        let (tx, rx) = mpsc::channel(1);
        Self {
            delay,
            dirty: AtomicBool::new(false),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Mark dirty and restart the quiet window.
    pub fn arm(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        let _ = self.tx.try_send(());
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Take the window receiver. Only the first caller gets one.
    pub fn windows(&self) -> Option<QuietWindows> {
        let mut slot = self.rx.lock().unwrap_or_else(|p| p.into_inner());
        slot.take().map(|rx| QuietWindows {
            rx,
            delay: self.delay,
        })
    }
}

/// Yields once per burst of arms, after the burst has been quiet for `delay`.
#[derive(Debug)]
pub struct QuietWindows {
    rx: mpsc::Receiver<()>,
    delay: Duration,
}

impl QuietWindows {
    /// Wait for the next quiet window. Returns `false` once the debouncer is gone.
    pub async fn next(&mut self) -> bool {
        if self.rx.recv().await.is_none() {
            return false;
        }
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => return true,
                armed = self.rx.recv() => {
                    if armed.is_none() {
                        return true;
                    }
                }
            }
        }
    }
}
