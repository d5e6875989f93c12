// Coalescing change signal for the coordinator
//
// Multiple signalers OR bits into one mask; the single consumer's wait
// atomically takes the whole mask. Delivery is at-least-once and coalescing:
// raising the same bit twice before the consumer wakes produces one wake
// with that bit set, so the consumer must recompute desired state from the
// shared record rather than from the signal itself.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Notify;

/// Bitmask of pending change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalBits(u32);

impl SignalBits {
    /// The commanded control mode was changed.
    pub const CONTROL_MODE_CHANGED: SignalBits = SignalBits(1 << 0);
    /// The odometry broadcast flags were changed.
    pub const BROADCAST_STATUS_CHANGED: SignalBits = SignalBits(1 << 1);
    /// The owning controller is tearing the coordinator down.
    pub const SHUTDOWN: SignalBits = SignalBits(1 << 31);

    pub fn contains(self, other: SignalBits) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// One wheel's signal mask plus its wakeup.
pub struct Signal {
    bits: AtomicU32,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            notify: Notify::new(),
        }
    }

    /// OR `bits` into the mask and wake the consumer. Never blocks; callable
    /// from any task or from `Drop`.
    pub fn raise(&self, bits: SignalBits) {
        self.bits.fetch_or(bits.0, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Block until at least one bit is pending, then consume and return the
    /// entire mask. The swap clears the mask, so bits raised after this
    /// returns are observed on the next call.
    pub async fn wait(&self) -> SignalBits {
        loop {
            let notified = self.notify.notified();
            let bits = self.bits.swap(0, Ordering::SeqCst);
            if bits != 0 {
                return SignalBits(bits);
            }
            notified.await;
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_raised_bits() {
        let signal = Signal::new();
        signal.raise(SignalBits::CONTROL_MODE_CHANGED);

        let bits = signal.wait().await;
        assert!(bits.contains(SignalBits::CONTROL_MODE_CHANGED));
        assert!(!bits.contains(SignalBits::BROADCAST_STATUS_CHANGED));
    }

    #[tokio::test]
    async fn test_same_bit_coalesces() {
        let signal = Signal::new();
        signal.raise(SignalBits::CONTROL_MODE_CHANGED);
        signal.raise(SignalBits::CONTROL_MODE_CHANGED);

        let bits = signal.wait().await;
        assert!(bits.contains(SignalBits::CONTROL_MODE_CHANGED));

        // Nothing left pending after the consuming wait
        assert_eq!(signal.bits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_distinct_bits_merge_into_one_wake() {
        let signal = Signal::new();
        signal.raise(SignalBits::CONTROL_MODE_CHANGED);
        signal.raise(SignalBits::BROADCAST_STATUS_CHANGED);

        let bits = signal.wait().await;
        assert!(bits.contains(SignalBits::CONTROL_MODE_CHANGED));
        assert!(bits.contains(SignalBits::BROADCAST_STATUS_CHANGED));
    }

    #[tokio::test]
    async fn test_raise_after_wait_started_wakes() {
        let signal = std::sync::Arc::new(Signal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        // Let the waiter park on the notify before raising
        tokio::task::yield_now().await;
        signal.raise(SignalBits::SHUTDOWN);

        let bits = waiter.await.unwrap();
        assert!(bits.contains(SignalBits::SHUTDOWN));
    }
}
