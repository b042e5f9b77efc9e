//! # ELF32 Image View
//!
//! Unchecked decoding of a trusted 32-bit ELF image. Nothing is validated:
//! offsets, counts and the string-table index are used as found. Reads go
//! through raw pointers so the same view works on a slice in tests and on a
//! staging address in relocated code.
//!
//! Multi-byte fields are decoded in the byte order named by
//! `e_ident[EI_DATA]`.

mod sections;

pub use sections::{LoadableSections, Section, SectionFlags, SectionKind, Sections, StringTable};

use core::marker::PhantomData;
use core::ptr;

// ============================================================================
// ELF CONSTANTS
// ============================================================================

/// ELF magic bytes
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// ELF class: 32-bit
pub const ELFCLASS32: u8 = 1;

/// ELF data: little-endian
pub const ELFDATA2LSB: u8 = 1;

/// ELF data: big-endian
pub const ELFDATA2MSB: u8 = 2;

/// Index of the class byte in `e_ident`
pub const EI_CLASS: usize = 4;

/// Index of the data-encoding byte in `e_ident`
pub const EI_DATA: usize = 5;

/// ELF machine: PowerPC (32-bit image format)
pub const EM_PPC: u16 = 20;

/// ELF type: executable
pub const ET_EXEC: u16 = 2;

// Section types
/// Program data
pub const SHT_PROGBITS: u32 = 1;
/// String table
pub const SHT_STRTAB: u32 = 3;
/// BSS
pub const SHT_NOBITS: u32 = 8;

/// Size of the ELF32 file header
pub const EHDR_SIZE: usize = 52;

/// Size of an ELF32 section header
pub const SHDR_SIZE: usize = 40;

// Field offsets within the file header
const E_ENTRY: usize = 24;
const E_SHOFF: usize = 32;
const E_SHENTSIZE: usize = 46;
const E_SHNUM: usize = 48;
const E_SHSTRNDX: usize = 50;

// ============================================================================
// BYTE ORDER
// ============================================================================

/// Byte order of multi-byte fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// `ELFDATA2LSB`
    Little,
    /// `ELFDATA2MSB`
    Big,
}

impl Endian {
    /// Byte order named by an `EI_DATA` byte
    ///
    /// Anything other than `ELFDATA2MSB` decodes little-endian.
    #[inline(always)]
    pub const fn from_ident(data: u8) -> Self {
        if data == ELFDATA2MSB { Self::Big } else { Self::Little }
    }

    #[inline(always)]
    const fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        }
    }

    #[inline(always)]
    const fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }
}

// ============================================================================
// FILE HEADER
// ============================================================================

/// Decoded fields of the ELF32 file header used by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32Header {
    /// Entry point
    pub entry: u32,
    /// Section header table offset
    pub shoff: u32,
    /// Section header entry size
    pub shentsize: u16,
    /// Number of section headers
    pub shnum: u16,
    /// Section name string table index
    pub shstrndx: u16,
}

// ============================================================================
// IMAGE VIEW
// ============================================================================

/// Unchecked view of an ELF32 image in memory
#[derive(Debug, Clone, Copy)]
pub struct ElfImage<'a> {
    base: *const u8,
    endian: Endian,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> ElfImage<'a> {
    /// View an image held in a slice
    ///
    /// # Safety
    /// The image is trusted: every header, section header and section range
    /// it names must lie inside `bytes`.
    pub unsafe fn new(bytes: &'a [u8]) -> Self {
        // SAFETY: forwarded to the caller.
        unsafe { Self::from_ptr(bytes.as_ptr()) }
    }

    /// View an image at a raw address
    ///
    /// # Safety
    /// `base` must point to a trusted ELF image that stays readable and
    /// unmodified for `'a`.
    #[inline(always)]
    pub unsafe fn from_ptr(base: *const u8) -> Self {
        // SAFETY: the identification bytes are part of the image.
        let data = unsafe { ptr::read(base.add(EI_DATA)) };
        Self {
            base,
            endian: Endian::from_ident(data),
            _marker: PhantomData,
        }
    }

    /// Byte order of the image
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Pointer to the byte at `offset` from the start of the image
    #[inline(always)]
    pub fn at(&self, offset: usize) -> *const u8 {
        self.base.wrapping_add(offset)
    }

    #[inline(always)]
    fn read_u16(&self, offset: usize) -> u16 {
        // SAFETY: the image is trusted to contain every field it names.
        let bytes = unsafe { ptr::read_unaligned(self.at(offset) as *const [u8; 2]) };
        self.endian.u16(bytes)
    }

    #[inline(always)]
    fn read_u32(&self, offset: usize) -> u32 {
        // SAFETY: the image is trusted to contain every field it names.
        let bytes = unsafe { ptr::read_unaligned(self.at(offset) as *const [u8; 4]) };
        self.endian.u32(bytes)
    }

    /// Decode the file header
    #[inline(always)]
    pub fn header(&self) -> Elf32Header {
        Elf32Header {
            entry: self.read_u32(E_ENTRY),
            shoff: self.read_u32(E_SHOFF),
            shentsize: self.read_u16(E_SHENTSIZE),
            shnum: self.read_u16(E_SHNUM),
            shstrndx: self.read_u16(E_SHSTRNDX),
        }
    }

    /// Entry point
    #[inline(always)]
    pub fn entry(&self) -> u32 {
        self.read_u32(E_ENTRY)
    }

    /// Decode section header `index`
    ///
    /// The index is not checked against the header count.
    #[inline(always)]
    pub fn section(&self, index: u16) -> Section {
        let header = self.header();
        let at = header.shoff as usize + index as usize * header.shentsize as usize;
        Section::decode(|field| self.read_u32(at + field))
    }

    /// Section headers in table order
    #[inline(always)]
    pub fn sections(&self) -> Sections<'_, 'a> {
        Sections::new(self, self.header().shnum)
    }

    /// Sections that are written to memory when the image is mapped
    #[inline(always)]
    pub fn loadable_sections(&self) -> LoadableSections<'_, 'a> {
        LoadableSections::new(self.sections())
    }

    /// Section-name string table, when the named section is one
    #[inline(always)]
    pub fn string_table(&self) -> Option<StringTable<'a>> {
        let strtab = self.section(self.header().shstrndx);
        if strtab.kind != SectionKind::StringTable {
            return None;
        }
        // SAFETY: the string table lies inside the trusted image.
        Some(unsafe { StringTable::from_ptr(self.at(strtab.offset as usize)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ElfBuilder;

    #[test]
    fn test_header_decodes_big_endian() {
        let bytes = ElfBuilder::new(0x1000)
            .progbits(".text", 0x1000, &[0x60, 0, 0, 0])
            .build();
        let image = unsafe { ElfImage::new(&bytes) };

        assert_eq!(image.endian(), Endian::Big);
        let header = image.header();
        assert_eq!(header.entry, 0x1000);
        assert_eq!(header.shentsize as usize, SHDR_SIZE);
        // null + .text + .shstrtab
        assert_eq!(header.shnum, 3);
        assert_eq!(header.shstrndx, 2);
    }

    #[test]
    fn test_header_decodes_little_endian() {
        let bytes = ElfBuilder::new(0x8000_4000)
            .little_endian()
            .nobits(".bss", 0x4000, 0x100)
            .build();
        let image = unsafe { ElfImage::new(&bytes) };

        assert_eq!(image.endian(), Endian::Little);
        assert_eq!(image.entry(), 0x8000_4000);
        let bss = image.section(1);
        assert_eq!(bss.kind, SectionKind::ZeroFill);
        assert_eq!(bss.addr, 0x4000);
        assert_eq!(bss.size, 0x100);
    }

    #[test]
    fn test_string_table_names() {
        let bytes = ElfBuilder::new(0)
            .progbits(".text", 0x1000, &[1, 2, 3, 4])
            .progbits(".data", 0x2000, &[5, 6])
            .build();
        let image = unsafe { ElfImage::new(&bytes) };
        let strtab = image.string_table().expect("shstrtab present");

        let names: Vec<&[u8]> = image.sections().map(|(_, s)| strtab.name(s.name)).collect();
        assert_eq!(names, [&b""[..], &b".text"[..], &b".data"[..], &b".shstrtab"[..]]);
    }

    #[test]
    fn test_string_table_absent_when_index_is_not_strtab() {
        let bytes = ElfBuilder::new(0)
            .progbits(".text", 0x1000, &[1])
            .string_table_index(1)
            .build();
        let image = unsafe { ElfImage::new(&bytes) };
        assert!(image.string_table().is_none());
    }
}
