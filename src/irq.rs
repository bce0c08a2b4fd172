use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

const NO_PENDING: u8 = 0xFF;

/// Shared interrupt handshake between device threads and the CPU.
///
/// `enabled` mirrors the master-enable memory cell; `pending` holds the
/// bus id of the device waiting for service. A device signals by calling
/// [`InterruptLine::interrupt_enable`], which succeeds only while the
/// master enable is set and atomically clears it, so at most one
/// interrupt is in flight until the handler restores the cell.
#[derive(Debug)]
pub struct InterruptLine {
    enabled: AtomicBool,
    pending: AtomicU8,
}

impl Default for InterruptLine {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptLine {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            pending: AtomicU8::new(NO_PENDING),
        }
    }

    /// Requests service for `bus` (low 4 bits). Returns `false` when the
    /// master enable is clear, in which case nothing is recorded and the
    /// device should retry later.
    pub fn interrupt_enable(&self, bus: u8) -> bool {
        if self
            .enabled
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.pending.store(bus & 0x0F, Ordering::SeqCst);
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::SeqCst);
    }

    pub fn pending(&self) -> Option<u8> {
        match self.pending.load(Ordering::SeqCst) {
            NO_PENDING => None,
            bus => Some(bus),
        }
    }

    pub(crate) fn take_pending(&self) -> Option<u8> {
        match self.pending.swap(NO_PENDING, Ordering::SeqCst) {
            NO_PENDING => None,
            bus => Some(bus),
        }
    }

    pub(crate) fn set_pending(&self, bus: Option<u8>) {
        self.pending
            .store(bus.map_or(NO_PENDING, |b| b & 0x0F), Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.set_enabled(false);
        self.set_pending(None);
    }
}
