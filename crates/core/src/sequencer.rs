//! Last-request-wins quote scheduling.
//!
//! Every input edit takes a ticket. A quote computed for a ticket is applied
//! only if no newer ticket was issued while it was in flight.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// Position of one quote request in the issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QuoteTicket(u64);

#[derive(Debug, Default)]
pub struct QuoteSequencer {
    latest: AtomicU64,
    debounce: Duration,
}

impl QuoteSequencer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            latest: AtomicU64::new(0),
            debounce,
        }
    }

    /// Supersede every earlier ticket.
    pub fn issue(&self) -> QuoteTicket {
        QuoteTicket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, ticket: QuoteTicket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }

    /// Wait out the debounce window. False if a newer ticket arrived meanwhile.
    pub async fn settle(&self, ticket: QuoteTicket) -> bool {
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }
        self.is_current(ticket)
    }

    /// Debounce, run `quote`, and return its output only if still current.
    pub async fn run<F, Fut, T>(&self, quote: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.issue();
        if !self.settle(ticket).await {
            trace!(ticket = ticket.0, "Quote superseded before start");
            return None;
        }
        let output = quote().await;
        if self.is_current(ticket) {
            Some(output)
        } else {
            trace!(ticket = ticket.0, "Discarding stale quote result");
            None
        }
    }
}
