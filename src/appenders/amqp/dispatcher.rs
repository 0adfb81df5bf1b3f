//! Background event loop for readiness notifications and the send timer
//!
//! Producers run their part of the work on their own thread under the
//! context lock. Everything that happens later (a connection becoming ready
//! or failing, the batched-mode timer expiring) arrives here as a
//! [`Signal`] and is applied under the same lock, one signal at a time.

use super::context::AppenderContext;
use crate::core::{AppenderError, Result};
use crossbeam_channel::{after, never, select, Receiver};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub(crate) enum Signal {
    /// Connection attempt `generation` finished its setup and parked the
    /// connection for the manager
    Ready { generation: u64 },
    Failed {
        generation: u64,
        error: AppenderError,
    },
    /// Fire the send timer once after `interval`
    ArmTimer { interval: Duration },
    Stop,
}

pub(crate) fn spawn(
    context: Arc<Mutex<AppenderContext>>,
    signals: Receiver<Signal>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("amqp-dispatcher".to_string())
        .spawn(move || run(context, signals))
        .map_err(|e| AppenderError::spawn("amqp-dispatcher", e))
}

fn run(context: Arc<Mutex<AppenderContext>>, signals: Receiver<Signal>) {
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = match deadline {
            Some(at) => after(at.saturating_duration_since(Instant::now())),
            None => never(),
        };

        select! {
            recv(signals) -> signal => match signal {
                Ok(Signal::Ready { generation }) => {
                    isolate("connection ready", || context.lock().on_connection_ready(generation));
                }
                Ok(Signal::Failed { generation, error }) => {
                    isolate("connection failed", || context.lock().on_connection_failed(generation, error));
                }
                Ok(Signal::ArmTimer { interval }) => {
                    // An interval too large to represent never fires.
                    deadline = Instant::now().checked_add(interval);
                }
                Ok(Signal::Stop) | Err(_) => break,
            },
            recv(timer) -> _ => {
                deadline = None;
                isolate("send timer", || context.lock().on_timer_fired());
            }
        }
    }

    debug!("dispatcher stopped");
}

/// Run a handler, keeping the loop alive if a layout or interceptor panics
fn isolate<F: FnOnce()>(what: &str, handler: F) {
    if let Err(panic_info) = catch_unwind(AssertUnwindSafe(handler)) {
        let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        error!(handler = what, panic = %panic_msg, "dispatcher handler panicked");
    }
}
