//! Scoped ownership of the interrupt-preemption window.

use cyd_rfid_hal::InterruptLock;

/// Holds an [`InterruptLock`] until dropped.
///
/// Release happens in `Drop`, so an early `?` return out of a byte transfer
/// still leaves the critical section.
pub struct LockGuard<'a, L: InterruptLock> {
    lock: &'a mut L,
    state: Option<L::State>,
}

impl<'a, L: InterruptLock> LockGuard<'a, L> {
    pub fn new(lock: &'a mut L) -> Self {
        let state = lock.acquire();
        Self {
            lock,
            state: Some(state),
        }
    }
}

impl<L: InterruptLock> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.lock.release(state);
        }
    }
}

/// Process-wide critical section provided by the `critical-section` crate.
///
/// On ESP-IDF this maps to the port spinlock with interrupts masked; on a
/// host with `critical-section/std` it is a global reentrant mutex.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalLock;

impl InterruptLock for GlobalLock {
    type State = critical_section::RestoreState;

    fn acquire(&mut self) -> Self::State {
        // Safety: the only caller is `LockGuard`, which releases exactly once
        // and in reverse acquisition order because guards are scoped.
        unsafe { critical_section::acquire() }
    }

    fn release(&mut self, state: Self::State) {
        // Safety: `state` came from the matching `acquire` above.
        unsafe { critical_section::release(state) }
    }
}
