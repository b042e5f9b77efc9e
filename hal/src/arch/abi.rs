//! # Function Descriptors
//!
//! On ELFv1 PowerPC (`powerpc64-unknown-linux-gnu`) a function symbol names a
//! descriptor in `.opd` rather than the code: the entry address, the TOC base
//! the callee expects in r2, and an environment word. Code that is copied and
//! entered by address needs the entry, not the symbol.

/// ELFv1 function descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct FunctionDescriptor {
    /// Code entry address
    pub entry: u64,
    /// TOC base
    pub toc: u64,
    /// Environment pointer (unused by C and Rust)
    pub env: u64,
}

static_assertions::assert_eq_size!(FunctionDescriptor, [u64; 3]);

impl FunctionDescriptor {
    /// Code entry of the function whose symbol address is `symbol`
    ///
    /// # Safety
    /// `symbol` must be the address of an ELFv1 function descriptor.
    pub unsafe fn entry_of(symbol: *const ()) -> u64 {
        // SAFETY: forwarded to the caller.
        unsafe { core::ptr::read(symbol as *const FunctionDescriptor) }.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_is_first_doubleword() {
        let descriptor = FunctionDescriptor {
            entry: 0x8010_0100,
            toc: 0x8020_8000,
            env: 0,
        };
        let symbol = &descriptor as *const FunctionDescriptor as *const ();
        assert_eq!(unsafe { FunctionDescriptor::entry_of(symbol) }, 0x8010_0100);
        assert_ne!(symbol as u64, descriptor.entry);
    }
}
