use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use log::{error, warn};

const TICK_SLEEP_CHUNK_MS: u64 = 10;

/// Posts a unit tick over a channel every `interval` until stopped or dropped.
pub struct FrameTicker {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameTicker {
    pub fn start(interval: Duration, ticks: Sender<()>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            loop {
                if sleep_with_cancellation(&flag, interval) {
                    break;
                }
                // Receiver gone means the session was dropped.
                if ticks.send(()).is_err() {
                    break;
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it. Safe to call more than once.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        join_ticker_handle(&mut self.handle);
    }
}

impl Drop for FrameTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sleep_with_cancellation(flag: &AtomicBool, duration: Duration) -> bool {
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        if flag.load(Ordering::Relaxed) {
            return true;
        }
        let step = (duration - elapsed).min(Duration::from_millis(TICK_SLEEP_CHUNK_MS));
        thread::sleep(step);
        elapsed += step;
    }
    flag.load(Ordering::Relaxed)
}

fn join_ticker_handle(handle: &mut Option<thread::JoinHandle<()>>) {
    if let Some(handle) = handle.take() {
        if handle.thread().id() == thread::current().id() {
            warn!("Skipping frame ticker join because stop was called from the ticker thread");
            return;
        }

        if handle.join().is_err() {
            error!("Frame ticker thread panicked during shutdown");
        }
    }
}
