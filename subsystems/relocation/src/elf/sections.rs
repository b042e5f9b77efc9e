//! # ELF Sections
//!
//! Section descriptors, the selection rule for mapping, and section-name
//! lookup.

use core::marker::PhantomData;
use core::ptr;

use bitflags::bitflags;

use super::{ElfImage, SHT_NOBITS, SHT_PROGBITS, SHT_STRTAB};

bitflags! {
    /// Section attribute flags (`sh_flags`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u32 {
        /// Writable at run time
        const WRITE = 0x1;
        /// Occupies memory at run time
        const ALLOC = 0x2;
        /// Contains executable instructions
        const EXECINSTR = 0x4;
    }
}

/// What a section holds, as far as mapping is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// File-backed content (`SHT_PROGBITS`)
    Content,
    /// Zero-initialized, no file bytes (`SHT_NOBITS`)
    ZeroFill,
    /// String table (`SHT_STRTAB`)
    StringTable,
    /// Any other type; mapped as file-backed content when allocated
    Other(u32),
}

impl SectionKind {
    /// Kind of a raw `sh_type`
    #[inline(always)]
    pub const fn from_type(sh_type: u32) -> Self {
        match sh_type {
            SHT_PROGBITS => Self::Content,
            SHT_NOBITS => Self::ZeroFill,
            SHT_STRTAB => Self::StringTable,
            other => Self::Other(other),
        }
    }

    /// Does mapping copy bytes from the image
    #[inline(always)]
    pub const fn is_file_backed(self) -> bool {
        !matches!(self, Self::ZeroFill)
    }
}

/// Decoded section header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Offset of the name in the section-name string table
    pub name: u32,
    /// Section kind
    pub kind: SectionKind,
    /// Attribute flags (unknown bits retained)
    pub flags: SectionFlags,
    /// Link-time address
    pub addr: u32,
    /// Offset of the contents in the image
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

impl Section {
    #[inline(always)]
    pub(super) fn decode(mut field: impl FnMut(usize) -> u32) -> Self {
        Self {
            name: field(0),
            kind: SectionKind::from_type(field(4)),
            flags: SectionFlags::from_bits_retain(field(8)),
            addr: field(12),
            offset: field(16),
            size: field(20),
        }
    }

    /// Is the section written to memory when the image is mapped
    ///
    /// Unallocated or empty sections are skipped entirely.
    #[inline(always)]
    pub fn is_loadable(&self) -> bool {
        self.flags.contains(SectionFlags::ALLOC) && self.size != 0
    }
}

// ============================================================================
// ITERATORS
// ============================================================================

/// All section headers in table order, with their index
pub struct Sections<'i, 'a> {
    image: &'i ElfImage<'a>,
    next: u16,
    count: u16,
}

impl<'i, 'a> Sections<'i, 'a> {
    #[inline(always)]
    pub(super) fn new(image: &'i ElfImage<'a>, count: u16) -> Self {
        Self {
            image,
            next: 0,
            count,
        }
    }
}

impl Iterator for Sections<'_, '_> {
    type Item = (u16, Section);

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some((index, self.image.section(index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.next) as usize;
        (left, Some(left))
    }
}

/// Section headers selected for mapping, in table order
pub struct LoadableSections<'i, 'a> {
    inner: Sections<'i, 'a>,
}

impl<'i, 'a> LoadableSections<'i, 'a> {
    #[inline(always)]
    pub(super) fn new(inner: Sections<'i, 'a>) -> Self {
        Self { inner }
    }
}

impl Iterator for LoadableSections<'_, '_> {
    type Item = Section;

    #[inline(always)]
    fn next(&mut self) -> Option<Section> {
        while let Some((_, section)) = self.inner.next() {
            if section.is_loadable() {
                return Some(section);
            }
        }
        None
    }
}

// ============================================================================
// STRING TABLE
// ============================================================================

/// Section-name string table
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'a> {
    base: *const u8,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> StringTable<'a> {
    /// # Safety
    /// `base` must point to a NUL-terminated string table readable for `'a`.
    #[inline(always)]
    pub(super) unsafe fn from_ptr(base: *const u8) -> Self {
        Self {
            base,
            _marker: PhantomData,
        }
    }

    /// Name at `offset`, without its terminator
    ///
    /// The offset is not checked against the table size.
    #[inline(always)]
    pub fn name(&self, offset: u32) -> &'a [u8] {
        let start = self.base.wrapping_add(offset as usize);
        let mut len = 0;
        // SAFETY: names are NUL-terminated inside the trusted table.
        while unsafe { ptr::read_volatile(start.add(len)) } != 0 {
            len += 1;
        }
        // SAFETY: `len` bytes were just read from `start`.
        unsafe { core::slice::from_raw_parts(start, len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ElfBuilder;

    #[test]
    fn test_kind_from_type() {
        assert_eq!(SectionKind::from_type(1), SectionKind::Content);
        assert_eq!(SectionKind::from_type(8), SectionKind::ZeroFill);
        assert_eq!(SectionKind::from_type(3), SectionKind::StringTable);
        assert_eq!(SectionKind::from_type(14), SectionKind::Other(14));
        assert!(SectionKind::Other(14).is_file_backed());
        assert!(!SectionKind::ZeroFill.is_file_backed());
    }

    #[test]
    fn test_unknown_flag_bits_retained() {
        let flags = SectionFlags::from_bits_retain(0x1000_0003);
        assert!(flags.contains(SectionFlags::ALLOC | SectionFlags::WRITE));
        assert_eq!(flags.bits(), 0x1000_0003);
    }

    #[test]
    fn test_loadable_selection() {
        let bytes = ElfBuilder::new(0x1000)
            .progbits(".text", 0x1000, &[0xAA; 16])
            .section(".comment", SHT_PROGBITS, SectionFlags::empty(), 0, &[1, 2, 3])
            .progbits(".empty", 0x1800, &[])
            .nobits(".bss", 0x3000, 0x40)
            .build();
        let image = unsafe { ElfImage::new(&bytes) };

        let loadable: Vec<(u32, u32)> = image.loadable_sections().map(|s| (s.addr, s.size)).collect();
        assert_eq!(loadable, [(0x1000, 16), (0x3000, 0x40)]);
    }

    #[test]
    fn test_sections_size_hint() {
        let bytes = ElfBuilder::new(0).progbits(".text", 0x1000, &[0]).build();
        let image = unsafe { ElfImage::new(&bytes) };
        let mut sections = image.sections();
        assert_eq!(sections.size_hint(), (3, Some(3)));
        sections.next();
        assert_eq!(sections.size_hint(), (2, Some(2)));
    }
}
