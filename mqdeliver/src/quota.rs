use crate::types::RECEIVE_MAXIMUM_DEFAULT;

/// Tracks the in-flight slots of one direction of a session.
///
/// Always used under the lock of the store that owns it, so every
/// acquire and release is serialized with the store mutation it pairs with.
/// The count of slots in use may exceed a maximum lowered by `reset`; no slot
/// is handed out again until enough of them came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendQuota {
    in_use: u16,
    maximum: u16,
}

impl SendQuota {
    #[inline]
    pub fn new(maximum: u16) -> Self {
        let maximum = if maximum == 0 { RECEIVE_MAXIMUM_DEFAULT } else { maximum };
        Self { in_use: 0, maximum }
    }

    /// Free slots, `0` while more are in use than the maximum allows.
    #[inline]
    pub fn available(&self) -> u16 {
        self.maximum.saturating_sub(self.in_use)
    }

    #[inline]
    pub fn maximum(&self) -> u16 {
        self.maximum
    }

    #[inline]
    pub fn in_use(&self) -> u16 {
        self.in_use
    }

    #[inline]
    pub fn has_credit(&self) -> bool {
        self.in_use < self.maximum
    }

    /// Takes one slot, returns `false` when none is left.
    #[inline]
    pub fn try_acquire(&mut self) -> bool {
        if self.has_credit() {
            self.in_use += 1;
            true
        } else {
            false
        }
    }

    /// Returns one slot.
    #[inline]
    pub fn increment(&mut self) {
        self.in_use = self.in_use.saturating_sub(1);
    }

    /// Applies a new maximum, e.g. the Receive Maximum of a reconnect, keeping
    /// the slots that are still in use.
    #[inline]
    pub fn reset(&mut self, maximum: u16) {
        let in_use = self.in_use;
        *self = Self::new(maximum);
        self.in_use = in_use;
    }
}

impl Default for SendQuota {
    fn default() -> Self {
        Self::new(RECEIVE_MAXIMUM_DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_increment() {
        let mut q = SendQuota::new(2);
        assert!(q.try_acquire());
        assert!(q.try_acquire());
        assert!(!q.try_acquire());
        assert_eq!(q.in_use(), 2);
        q.increment();
        assert_eq!(q.available(), 1);
        q.increment();
        q.increment();
        assert_eq!(q.available(), 2);
    }

    #[test]
    fn test_zero_means_default() {
        assert_eq!(SendQuota::new(0).maximum(), RECEIVE_MAXIMUM_DEFAULT);
    }

    #[test]
    fn test_reset_keeps_in_use() {
        let mut q = SendQuota::new(10);
        for _ in 0..4 {
            q.try_acquire();
        }
        q.reset(5);
        assert_eq!(q.available(), 1);
        q.reset(3);
        assert_eq!(q.available(), 0);
        assert!(!q.has_credit());
    }

    #[test]
    fn test_shrunk_maximum_drains_surplus_first() {
        let mut q = SendQuota::new(4);
        for _ in 0..4 {
            assert!(q.try_acquire());
        }
        q.reset(2);
        q.increment();
        assert_eq!(q.in_use(), 3);
        assert!(!q.try_acquire());
        q.increment();
        assert!(!q.try_acquire());
        q.increment();
        assert_eq!(q.available(), 1);
        assert!(q.try_acquire());
        assert_eq!(q.in_use(), 2);
    }
}
