//! # Byte Copy / Fill
//!
//! Allocation-free byte loops for use from relocated code.
//!
//! Plain loops would be recognised by the optimiser and lowered to calls to
//! `memcpy` / `memset`, which live outside the relocated transfer section and
//! may already have been overwritten by the image being loaded. Every access
//! is therefore volatile.

use core::ptr;

/// Copy `len` bytes from `src` to `dst`, front to back
///
/// # Safety
/// - `src` must be readable and `dst` writable for `len` bytes.
/// - Overlapping ranges are only correct when `dst <= src`.
#[inline(always)]
pub unsafe fn copy_bytes(dst: *mut u8, src: *const u8, len: usize) {
    let mut i = 0;
    while i < len {
        // SAFETY: both ranges are valid for `len` bytes per the contract.
        unsafe { ptr::write_volatile(dst.add(i), ptr::read_volatile(src.add(i))) };
        i += 1;
    }
}

/// Fill `len` bytes at `dst` with `value`
///
/// # Safety
/// `dst` must be writable for `len` bytes.
#[inline(always)]
pub unsafe fn fill_bytes(dst: *mut u8, value: u8, len: usize) {
    let mut i = 0;
    while i < len {
        // SAFETY: `dst` is valid for `len` bytes per the contract.
        unsafe { ptr::write_volatile(dst.add(i), value) };
        i += 1;
    }
}

/// Store a machine word with a single volatile write
///
/// # Safety
/// `dst` must be writable and aligned for `u64`.
#[inline(always)]
pub unsafe fn store_word(dst: *mut u64, value: u64) {
    // SAFETY: per the contract.
    unsafe { ptr::write_volatile(dst, value) };
}

/// Load a machine word with a single volatile read
///
/// # Safety
/// `src` must be readable and aligned for `u64`.
#[inline(always)]
pub unsafe fn load_word(src: *const u64) -> u64 {
    // SAFETY: per the contract.
    unsafe { ptr::read_volatile(src) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_bytes() {
        let src = [1u8, 2, 3, 4, 5];
        let mut dst = [0u8; 5];
        unsafe { copy_bytes(dst.as_mut_ptr(), src.as_ptr(), src.len()) };
        assert_eq!(dst, src);
    }

    #[test]
    fn test_copy_zero_length() {
        let src = [0xAAu8; 4];
        let mut dst = [0x55u8; 4];
        unsafe { copy_bytes(dst.as_mut_ptr(), src.as_ptr(), 0) };
        assert_eq!(dst, [0x55; 4]);
    }

    #[test]
    fn test_fill_bytes_is_bounded() {
        let mut buf = [0xFFu8; 8];
        unsafe { fill_bytes(buf.as_mut_ptr().add(2), 0, 4) };
        assert_eq!(buf, [0xFF, 0xFF, 0, 0, 0, 0, 0xFF, 0xFF]);
    }

    #[test]
    fn test_word_access() {
        let mut cell = 0u64;
        unsafe { store_word(&mut cell, 0x1060) };
        assert_eq!(unsafe { load_word(&cell) }, 0x1060);
    }
}
