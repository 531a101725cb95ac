//! Per-node lock word: a 64-bit atomic used as a reader/writer lock plus a
//! sticky delete flag, spun on with [`crossbeam_utils::Backoff`].

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::Backoff;

use crate::config::SPIN_RETRY_LIMIT;

const DELETED_BIT: u64 = 1 << 63;
const STATE_MASK: u64 = !DELETED_BIT;
const HAS_WRITER: u64 = STATE_MASK;

/// `0` = unlocked, `1..HAS_WRITER` = that many shared readers, `HAS_WRITER`
/// = one exclusive writer. Bit 63 is a sticky "this node was freed" marker
/// independent of the lock state, checked by readers that raced a delete.
pub struct LockWord(AtomicU64);

impl LockWord {
    pub fn new() -> LockWord {
        LockWord(AtomicU64::new(0))
    }

    pub fn is_deleted(&self) -> bool {
        self.0.load(Ordering::Acquire) & DELETED_BIT != 0
    }

    /// Marks the node deleted. Called before the backing slab slot is freed
    /// so readers that already hold a stale handle detect the reuse hazard.
    pub fn mark_deleted(&self) {
        self.0.fetch_or(DELETED_BIT, Ordering::Release);
    }

    /// Spins (then yields after [`SPIN_RETRY_LIMIT`] attempts) until a
    /// shared slot is available, and takes it. Returns `false` if the node
    /// was found deleted mid-spin — the caller must restart its traversal
    /// from the root.
    pub fn rlock(&self) -> bool {
        let backoff = Backoff::new();
        let mut attempts = 0usize;
        loop {
            let word = self.0.load(Ordering::Acquire);
            if word & DELETED_BIT != 0 {
                return false;
            }
            let state = word & STATE_MASK;
            if state < HAS_WRITER - 1 {
                if self
                    .0
                    .compare_exchange_weak(word, word + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return true;
                }
            }
            attempts += 1;
            if attempts > SPIN_RETRY_LIMIT {
                std::thread::yield_now();
            } else {
                backoff.spin();
            }
        }
    }

    pub fn runlock(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }

    /// Single-attempt, non-spinning exclusive lock. Used where a caller
    /// needs to observe contention rather than wait it out.
    pub fn try_wlock(&self) -> bool {
        let word = self.0.load(Ordering::Acquire);
        word & STATE_MASK == 0
            && self
                .0
                .compare_exchange(word, word | HAS_WRITER, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Spins until the word is fully unlocked (`0`, ignoring the delete
    /// bit) and claims exclusive access.
    pub fn wlock(&self) -> bool {
        let backoff = Backoff::new();
        let mut attempts = 0usize;
        loop {
            let word = self.0.load(Ordering::Acquire);
            if word & DELETED_BIT != 0 {
                return false;
            }
            if word & STATE_MASK == 0 {
                if self
                    .0
                    .compare_exchange_weak(word, word | HAS_WRITER, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return true;
                }
            }
            attempts += 1;
            if attempts > SPIN_RETRY_LIMIT {
                std::thread::yield_now();
            } else {
                backoff.spin();
            }
        }
    }

    pub fn wunlock(&self) {
        self.0.fetch_and(!HAS_WRITER, Ordering::AcqRel);
    }

    /// Spins until this thread is the sole reader (state `== 1`), then
    /// promotes to an exclusive writer.
    pub fn upgrade(&self) {
        let backoff = Backoff::new();
        loop {
            let word = self.0.load(Ordering::Acquire);
            if word & STATE_MASK == 1 {
                let deleted = word & DELETED_BIT;
                if self
                    .0
                    .compare_exchange_weak(word, HAS_WRITER | deleted, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return;
                }
            }
            backoff.spin();
        }
    }

    /// Demotes an exclusive writer back to a single reader. Caller must be
    /// the sole writer.
    pub fn downgrade(&self) {
        let word = self.0.load(Ordering::Acquire);
        let deleted = word & DELETED_BIT;
        self.0.store(1 | deleted, Ordering::Release);
    }
}

impl Default for LockWord {
    fn default() -> Self {
        LockWord::new()
    }
}

/// RAII shared-read guard. Releases on every path, including early returns,
/// which resolves the leak the reference implementation's manual
/// `RLock`/`RUnlock` pairing was prone to.
pub struct ReadGuard<'a> {
    lock: &'a LockWord,
}

impl<'a> ReadGuard<'a> {
    /// Returns `None` if the node was deleted before the lock was acquired.
    pub fn acquire(lock: &'a LockWord) -> Option<ReadGuard<'a>> {
        if lock.rlock() {
            Some(ReadGuard { lock })
        } else {
            None
        }
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.runlock();
    }
}

/// RAII exclusive-write guard, mirroring [`ReadGuard`].
pub struct WriteGuard<'a> {
    lock: &'a LockWord,
}

impl<'a> WriteGuard<'a> {
    pub fn acquire(lock: &'a LockWord) -> Option<WriteGuard<'a>> {
        if lock.wlock() {
            Some(WriteGuard { lock })
        } else {
            None
        }
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.wunlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_guard_releases_on_drop() {
        let lock = LockWord::new();
        {
            let _g = ReadGuard::acquire(&lock).unwrap();
            assert!(!lock.try_wlock());
        }
        assert!(lock.try_wlock());
        lock.wunlock();
    }

    #[test]
    fn deleted_node_refuses_new_locks() {
        let lock = LockWord::new();
        lock.mark_deleted();
        assert!(ReadGuard::acquire(&lock).is_none());
        assert!(WriteGuard::acquire(&lock).is_none());
    }

    #[test]
    fn upgrade_then_downgrade_round_trips() {
        let lock = LockWord::new();
        assert!(lock.rlock());
        lock.upgrade();
        lock.downgrade();
        assert!(lock.rlock());
    }
}
