//! Scope-leak watchdog.
//!
//! Samples the number of live scopes under the root environment every
//! interval and cancels the run once it exceeds the configured ceiling.
//! Best effort: a host call in progress is not interrupted, the run stops at
//! its next step.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, select, Sender};
use tern_value::Environment;

use super::ExecutorError;
use crate::context::CancelToken;

/// Running watchdog; stops when dropped.
pub(super) struct Watchdog {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub(super) fn spawn(
        root: Environment,
        cancel: CancelToken,
        limit: usize,
        interval: Duration,
    ) -> Result<Self, ExecutorError> {
        let (stop, stopped) = channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("tern-watchdog".to_string())
            .spawn(move || loop {
                select! {
                    recv(stopped) -> _ => break,
                    default(interval) => {
                        let live = root.child_count();
                        if live > limit {
                            tracing::warn!(live, limit, "too many live scopes; cancelling run");
                            cancel.cancel();
                            break;
                        }
                    }
                }
            })
            .map_err(|source| ExecutorError::Spawn {
                what: "watchdog",
                source,
            })?;
        Ok(Watchdog {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("watchdog thread panicked");
            }
        }
    }
}
