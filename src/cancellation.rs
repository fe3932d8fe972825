use log::warn;
use signal_hook::SigId;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

#[cfg(windows)]
use signal_hook::consts::signal::SIGBREAK;

/// Token observed by long-running operations to notice cancellation.
///
/// Cancellation aborts in-flight network transfers and skips pending retry
/// delays; it does not preempt a worker blocked on a download slot and does
/// not roll back assets that were already renamed into place.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    fn from_shared(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Marks the token as cancelled. Intended for internal use and tests.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct CancellationRegistry {
    flag: Arc<AtomicBool>,
    _handles: Vec<SigId>,
}

impl CancellationRegistry {
    fn new() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        for signal in registered_signals() {
            match flag::register(*signal, flag.clone()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    warn!("Failed to register cancellation handler for signal {signal}: {err}")
                }
            }
        }

        Self {
            flag,
            _handles: handles,
        }
    }

    fn token(&self) -> CancellationToken {
        CancellationToken::from_shared(self.flag.clone())
    }
}

fn registered_signals() -> &'static [i32] {
    #[cfg(windows)]
    {
        static SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGBREAK];
        &SIGNALS
    }

    #[cfg(not(windows))]
    {
        static SIGNALS: [i32; 2] = [SIGINT, SIGTERM];
        &SIGNALS
    }
}

static GLOBAL_REGISTRY: OnceLock<CancellationRegistry> = OnceLock::new();

/// Returns a cancellation token backed by global signal handlers.
pub fn global_token() -> CancellationToken {
    GLOBAL_REGISTRY
        .get_or_init(CancellationRegistry::new)
        .token()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_unset() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
