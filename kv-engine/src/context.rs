//! # Context
//!
//! Every server-side blocking call takes a context so lock waits, channel
//! operations, and network I/O can all be cancelled uniformly (§5).

use tokio_util::sync::CancellationToken;

/// Cancellation handle threaded through keyspace, AOF, snapshot, and Raft
/// calls. Cloning shares the same cancellation signal.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    /// A context that never cancels, for call sites with no deadline.
    pub fn background() -> Self {
        Context { token: CancellationToken::new() }
    }

    /// Derives a child context; cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        Context { token: self.token.child_token() }
    }

    /// Signals cancellation to this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once `cancel` has been called on this context or an ancestor.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled; select against this to honor
    /// cancellation in an async wait.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_is_cancelled_with_parent() {
        let parent = Context::background();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
