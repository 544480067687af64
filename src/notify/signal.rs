//! One-shot change signals routed to the dispatch loop.

use std::fmt;
use tokio::sync::mpsc;

/// Opaque identity of a watch point's signal.
///
/// Only compared for equality; carries no meaning otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(u64);

impl SignalId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sending half that fired signals are delivered through.
///
/// The matching receiver is owned by the dispatch loop.
#[derive(Clone)]
pub struct SignalDispatcher {
    tx: mpsc::UnboundedSender<SignalId>,
}

impl SignalDispatcher {
    /// Create a dispatcher and the receiver the dispatch loop waits on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SignalId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Bind a one-shot signal for `id`.
    ///
    /// Returns `None` once the receiving side is gone.
    pub fn bind(&self, id: SignalId) -> Option<Signal> {
        if self.tx.is_closed() {
            return None;
        }
        Some(Signal {
            id,
            tx: self.tx.clone(),
        })
    }

    /// Whether the dispatch loop has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for SignalDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalDispatcher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// A bound, unfired signal. Firing consumes it, so it fires at most once.
pub struct Signal {
    id: SignalId,
    tx: mpsc::UnboundedSender<SignalId>,
}

impl Signal {
    /// Identity delivered to the dispatch loop.
    pub fn id(&self) -> SignalId {
        self.id
    }

    /// Deliver the signal. Returns `false` if nobody is listening anymore.
    pub fn fire(self) -> bool {
        self.tx.send(self.id).is_ok()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&self.id).finish()
    }
}
