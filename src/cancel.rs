//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ResolveError;

/// Shared flag checked at every queue round, reference hop, and combinator
/// expansion. Once set, the in-flight resolution returns
/// [`ResolveError::Cancelled`] and discards all partial results.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), ResolveError> {
        if self.is_cancelled() {
            Err(ResolveError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_until_cancelled() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());

        token.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(ResolveError::Cancelled)));
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let seen_by_worker = token.clone();
        token.cancel();
        assert!(seen_by_worker.is_cancelled());
    }
}
