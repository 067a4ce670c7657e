//! Cooperative cancellation shared by every component that can block.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cheaply clonable, atomically readable "stop now" flag.
///
/// All clones observe the same flag. Once cancelled a token never resets; a
/// new run needs a new token.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            log::info!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());

        // Second cancel is a no-op
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
