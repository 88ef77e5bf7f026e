//! In-place synchronization wrappers for shared fields.
//!
//! All three shapes live directly inside the producer's object memory; an
//! observer reinterprets the same bytes under the matching wrapper when the
//! field's atomicity tag tells it to. The payload always sits at offset 0 of
//! the wrapper, so a field offset addresses the value whether or not the
//! reader goes through the protocol.
//!
//! - scalars ≤ 8 bytes: plain atomics ([`atomic_load`] / [`atomic_store`])
//! - compound, read-mostly: [`Seqlock`]
//! - compound, read-modify-write: [`SpinLock`]

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::size_of;
use core::ptr;
use core::sync::atomic::{
    AtomicBool, AtomicU8, AtomicU16, AtomicU32, AtomicU64, Ordering, fence,
};

// ── seqlock ────────────────────────────────────────────────────────────────

/// A sequence-locked value.
///
/// The counter is even while the value is stable and odd while a write is in
/// progress. A single writer is assumed; readers never block the writer and
/// retry until they copy a stable value.
#[repr(C)]
pub struct Seqlock<T: Copy> {
    value: UnsafeCell<T>,
    seq: AtomicU32,
}

unsafe impl<T: Copy + Send> Send for Seqlock<T> {}
unsafe impl<T: Copy + Send> Sync for Seqlock<T> {}

impl<T: Copy> Seqlock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            seq: AtomicU32::new(0),
        }
    }

    /// Store a new value. Single writer only.
    pub fn write(&self, value: T) {
        let s = self.seq.load(Ordering::Relaxed);
        // Odd: write in progress. The fence keeps the payload store after it.
        self.seq.store(s.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        unsafe { ptr::write_volatile(self.value.get(), value) };
        // Even again; release-publishes the payload.
        self.seq.store(s.wrapping_add(2), Ordering::Release);
    }

    /// Copy out the value, spinning while a write is in progress.
    pub fn read(&self) -> T {
        loop {
            let s1 = self.seq.load(Ordering::Acquire);
            if s1 & 1 != 0 {
                spin_loop();
                continue;
            }
            fence(Ordering::Acquire);
            let value = unsafe { ptr::read_volatile(self.value.get()) };
            fence(Ordering::Acquire);
            let s2 = self.seq.load(Ordering::Acquire);
            if s1 == s2 {
                return value;
            }
        }
    }

    /// Non-blocking read: `None` when a write is in progress or the copy was
    /// torn by a concurrent write.
    pub fn try_read(&self) -> Option<T> {
        let s1 = self.seq.load(Ordering::Acquire);
        if s1 & 1 != 0 {
            return None;
        }
        fence(Ordering::Acquire);
        let value = unsafe { ptr::read_volatile(self.value.get()) };
        fence(Ordering::Acquire);
        let s2 = self.seq.load(Ordering::Acquire);
        (s1 == s2).then_some(value)
    }
}

// ── spin lock ──────────────────────────────────────────────────────────────

/// A spin-locked value providing mutual exclusion for read-modify-write.
///
/// Contenders busy-wait with a CPU pause hint; critical sections are a
/// bytewise copy or a short closure, so holders are always on-core.
#[repr(C)]
pub struct SpinLock<T: Copy> {
    value: UnsafeCell<T>,
    lock: AtomicBool,
}

unsafe impl<T: Copy + Send> Send for SpinLock<T> {}
unsafe impl<T: Copy + Send> Sync for SpinLock<T> {}

impl<T: Copy> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            lock: AtomicBool::new(false),
        }
    }

    #[inline]
    fn acquire(&self) {
        while self.lock.swap(true, Ordering::Acquire) {
            spin_loop();
        }
    }

    #[inline]
    fn release(&self) {
        self.lock.store(false, Ordering::Release);
    }

    pub fn write(&self, value: T) {
        self.acquire();
        unsafe { ptr::write(self.value.get(), value) };
        self.release();
    }

    pub fn read(&self) -> T {
        self.acquire();
        let value = unsafe { ptr::read(self.value.get()) };
        self.release();
        value
    }

    /// Run `f` on the value under the lock.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.acquire();
        unsafe { f(&mut *self.value.get()) };
        self.release();
    }
}

// ── atomic scalar overlay ──────────────────────────────────────────────────

/// Acquire-load a scalar through an atomic view of its bytes.
///
/// Payloads of 1, 2, 4 or 8 bytes go through the matching `AtomicU*`; other
/// sizes fall back to a volatile copy (which may tear — callers select this
/// path only for fields tagged `Atomicity::None`).
///
/// # Safety
///
/// `ptr` must be valid, aligned for `T`, and the location must only ever be
/// accessed atomically (or be tolerant of racing plain stores).
#[inline]
pub unsafe fn atomic_load<T: Copy>(ptr: *const T) -> T {
    unsafe {
        match size_of::<T>() {
            1 => from_bits(&(*(ptr as *const AtomicU8)).load(Ordering::Acquire)),
            2 => from_bits(&(*(ptr as *const AtomicU16)).load(Ordering::Acquire)),
            4 => from_bits(&(*(ptr as *const AtomicU32)).load(Ordering::Acquire)),
            8 => from_bits(&(*(ptr as *const AtomicU64)).load(Ordering::Acquire)),
            _ => ptr::read_volatile(ptr),
        }
    }
}

/// Release-store a scalar through an atomic view of its bytes.
///
/// # Safety
///
/// Same contract as [`atomic_load`].
#[inline]
pub unsafe fn atomic_store<T: Copy>(ptr: *mut T, value: T) {
    unsafe {
        match size_of::<T>() {
            1 => (*(ptr as *const AtomicU8)).store(to_bits(&value), Ordering::Release),
            2 => (*(ptr as *const AtomicU16)).store(to_bits(&value), Ordering::Release),
            4 => (*(ptr as *const AtomicU32)).store(to_bits(&value), Ordering::Release),
            8 => (*(ptr as *const AtomicU64)).store(to_bits(&value), Ordering::Release),
            _ => ptr::write_volatile(ptr, value),
        }
    }
}

/// Reinterpret equal-sized bits. Size equality is checked by the caller's
/// dispatch on `size_of::<T>()`.
#[inline]
unsafe fn from_bits<B: Copy, T: Copy>(bits: &B) -> T {
    debug_assert_eq!(size_of::<B>(), size_of::<T>());
    unsafe { core::mem::transmute_copy(bits) }
}

#[inline]
unsafe fn to_bits<T: Copy, B: Copy>(value: &T) -> B {
    debug_assert_eq!(size_of::<T>(), size_of::<B>());
    unsafe { core::mem::transmute_copy(value) }
}
