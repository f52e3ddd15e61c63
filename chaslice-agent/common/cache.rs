//! Cache-line primitives used to provoke LLC lookups
//!
//! The functions take references so the pointed-to byte is known to be
//! mapped; flushing a line never changes its value.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64 as arch_x86;

/// Full memory fence
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn mfence() {
    unsafe { arch_x86::_mm_mfence() }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn mfence() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

/// Load one byte without letting the compiler elide the access
#[inline]
pub fn maccess(p: &u8) -> u8 {
    unsafe { std::ptr::read_volatile(p) }
}

/// Evict the line holding `p` from every cache level
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn flush(p: &u8) {
    unsafe { arch_x86::_mm_clflush(p) }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn flush(_p: &u8) {}

/// Access, fence, flush, fence: one guaranteed LLC lookup per call
#[inline]
pub fn access_flush(p: &u8) {
    maccess(p);
    mfence();
    flush(p);
    mfence();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_preserves_contents() {
        let buf = vec![0xA5u8; 256];
        for line in buf.chunks(64) {
            access_flush(&line[0]);
        }
        assert!(buf.iter().all(|&b| b == 0xA5));
        assert_eq!(maccess(&buf[128]), 0xA5);
    }
}
