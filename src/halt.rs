//! Machine-wide halted (alarm) state.
//!
//! The flag is the one piece of dispatcher state that may be touched from
//! outside the command thread, e.g. by an emergency stop, so it is atomic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Provider of the halted state consulted by the dispatcher
pub trait HaltState: Send + Sync {
    fn is_halted(&self) -> bool;

    /// Enter (`true`) or leave (`false`) the halted state
    fn broadcast_halt(&self, halted: bool);
}

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Atomic halted flag with change listeners
#[derive(Default)]
pub struct HaltFlag {
    halted: AtomicBool,
    listeners: RwLock<Vec<Listener>>,
}

impl HaltFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `listener` on every broadcast with the new state
    ///
    /// A listener subscribed during a broadcast is first called on the
    /// next one.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        let listener: Listener = Arc::new(listener);
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }
}

impl HaltState for HaltFlag {
    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    fn broadcast_halt(&self, halted: bool) {
        let was = self.halted.swap(halted, Ordering::AcqRel);
        if halted && !was {
            log::warn!("entering halt state");
        } else if !halted && was {
            log::info!("halt state cleared");
        }

        // called without the lock held so a listener may subscribe
        let listeners: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for listener in &listeners {
            listener(halted);
        }
    }
}

impl std::fmt::Debug for HaltFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaltFlag")
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}
