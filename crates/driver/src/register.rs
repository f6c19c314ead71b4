//! Typed access to memory-mapped registers.
//!
//! Every hardware register is named by a [`Register`]: a peripheral base address plus
//! a byte offset. Components never dereference raw addresses themselves; they go
//! through a [`RegisterAccess`] backend, which is either the volatile [`Mmio`] backend
//! on real silicon or a simulated bus on the host.

use core::sync::atomic::{AtomicBool, Ordering};

/// A 32-bit memory-mapped register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    addr: u32,
}

impl Register {
    pub const fn new(base: u32, offset: u32) -> Self {
        Self { addr: base + offset }
    }

    pub const fn addr(self) -> u32 {
        self.addr
    }

    /// The same register block shifted by `delta` bytes.
    pub const fn offset_by(self, delta: u32) -> Self {
        Self {
            addr: self.addr + delta,
        }
    }
}

/// Word-width register backend.
///
/// Reads take `&mut self` because several registers have read side effects
/// (reading a UART data register pops its receive FIFO).
///
/// Passing a [`Register`] that does not exist on the target is a caller error;
/// backends do not report it.
pub trait RegisterAccess {
    fn read(&mut self, reg: Register) -> u32;

    fn write(&mut self, reg: Register, value: u32);

    /// Clear `clear`, then set `set`, on a freshly read value and write it back.
    fn modify(&mut self, reg: Register, set: u32, clear: u32) {
        let value = self.read(reg);
        self.write(reg, (value & !clear) | set);
    }

    fn set_bits(&mut self, reg: Register, bits: u32) {
        self.modify(reg, bits, 0);
    }

    fn clear_bits(&mut self, reg: Register, bits: u32) {
        self.modify(reg, 0, bits);
    }

    /// Replace the field selected by `mask` with `value << shift`.
    fn write_field(&mut self, reg: Register, mask: u32, shift: u32, value: u32) {
        self.modify(reg, (value << shift) & mask, mask);
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &mut T {
    fn read(&mut self, reg: Register) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Register, value: u32) {
        (**self).write(reg, value)
    }
}

static MMIO_TAKEN: AtomicBool = AtomicBool::new(false);

/// Volatile access to the real TM4C123 peripheral space.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Claim the peripheral space. Returns `None` on every call after the first.
    pub fn take() -> Option<Self> {
        if MMIO_TAKEN.swap(true, Ordering::AcqRel) {
            None
        } else {
            // SAFETY: the flag above guarantees a single owner.
            Some(unsafe { Self::steal() })
        }
    }

    /// # Safety
    /// The caller must be running on a TM4C123 and must not create a second
    /// owner of the same registers.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl RegisterAccess for Mmio {
    fn read(&mut self, reg: Register) -> u32 {
        // SAFETY: every `Register` built by this crate names a mapped, aligned word.
        unsafe { core::ptr::read_volatile(reg.addr() as usize as *const u32) }
    }

    fn write(&mut self, reg: Register, value: u32) {
        // SAFETY: see `read`.
        unsafe { core::ptr::write_volatile(reg.addr() as usize as *mut u32, value) }
    }
}
