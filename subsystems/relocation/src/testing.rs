//! # Simulated Board
//!
//! Host-side stand-ins for the hardware: a [`SimBoard`] with buffers behind
//! the physical regions the loader touches, an event log of every
//! collaborator call, and an [`ElfBuilder`] for test images.
//!
//! Transfers that never return on hardware unwind here with a [`Handoff`]
//! payload; [`expect_handoff`] catches it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use helix_hal::cache::{CacheMaintenance, XENON_LINE_SIZE};
use helix_hal::serial::ConsoleWriter;
use helix_hal::timer::Delay;
use helix_hal::{PhysAddr, PhysMemory};

use crate::board::{Board, Peripherals};
use crate::config::Layout;
use crate::context::{Trampoline, TrampolineSymbols};
use crate::elf::{
    SectionFlags, EHDR_SIZE, ELFCLASS32, ELFDATA2LSB, ELFDATA2MSB, ELF_MAGIC, EM_PPC, ET_EXEC, SHDR_SIZE,
    SHT_NOBITS, SHT_PROGBITS, SHT_STRTAB,
};
use crate::handoff::{StagedImage, Transfer};
use crate::mapper;
use crate::smp::SecondaryCores;

// =============================================================================
// EVENTS
// =============================================================================

/// Collaborator call recorded by the simulated board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Network quiesced
    QuiesceNetwork,
    /// USB shut down
    ShutdownUsb,
    /// Secondary threads started
    Startup,
    /// Task dispatch attempt
    Dispatch {
        /// Target core
        core: usize,
        /// Routine dispatched
        routine: PhysAddr,
        /// Whether the core accepted
        accepted: bool,
    },
    /// Busy delay
    Delay(u32),
    /// Line synced for execution
    Sync(PhysAddr),
    /// Data line flushed
    Flush(PhysAddr),
    /// Relocated mapper entered
    EnterRelocated(PhysAddr),
    /// Relocated run routine entered
    Run {
        /// Routine called
        routine: PhysAddr,
        /// Image entry point
        entry: u64,
        /// Device-tree argument
        devtree: u64,
    },
}

/// Where control left the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Primary core entered the image
    Primary {
        /// Relocated run routine
        routine: PhysAddr,
        /// Image entry point
        entry: u64,
        /// Device-tree argument
        devtree: u64,
    },
    /// A secondary core left its parking routine
    Secondary {
        /// Published release address
        target: u64,
        /// Core index passed along
        core: usize,
    },
}

/// Run `f`, which must end in a simulated transfer, and return where it went
///
/// Panics if `f` returns, or re-raises any other panic.
pub fn expect_handoff<R>(f: impl FnOnce() -> R) -> Handoff {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(_) => panic!("control transfer returned"),
        Err(payload) => match payload.downcast::<Handoff>() {
            Ok(handoff) => *handoff,
            Err(other) => panic::resume_unwind(other),
        },
    }
}

// =============================================================================
// MEMORY
// =============================================================================

/// Physical range backed by a host buffer (word-aligned storage)
struct Region {
    base: PhysAddr,
    words: Vec<u64>,
}

impl Region {
    fn new(base: PhysAddr, size: usize) -> Self {
        Self {
            base,
            words: vec![0; size / 8],
        }
    }

    fn len(&self) -> u64 {
        self.words.len() as u64 * 8
    }

    fn contains(&self, addr: PhysAddr) -> bool {
        addr >= self.base && addr - self.base < self.len()
    }
}

/// Size of the simulated link-time trampoline
const LINK_SIZE: usize = 0x400;

// =============================================================================
// SIMULATED BOARD
// =============================================================================

/// Board with memory-backed regions and a recorded call log
pub struct SimBoard {
    layout: Layout,
    regions: Vec<Region>,
    link: Vec<u64>,
    events: Vec<Event>,
    output: Vec<u8>,
    hold_samples: Vec<(PhysAddr, u64)>,
    rejections: HashMap<usize, usize>,
}

impl SimBoard {
    /// Board for [`Layout::XENON`]
    ///
    /// Backs the first MiB of high RAM (section targets), the device-tree and
    /// code staging regions and one MiB of data staging.
    pub fn new() -> Self {
        Self::with_layout(Layout::XENON)
    }

    /// Board for `layout`
    pub fn with_layout(layout: Layout) -> Self {
        let regions = vec![
            Region::new(PhysAddr::new(layout.high_mem_bit), 0x10_0000),
            Region::new(layout.devtree_staging, layout.devtree_max_size),
            Region::new(layout.code_staging, layout.code_staging_size as usize),
            Region::new(layout.data_staging, 0x10_0000),
        ];

        // Link-time trampoline: hold cell in the first word, a recognisable
        // pattern after it.
        let mut link = vec![0u64; LINK_SIZE / 8];
        for (i, word) in link.iter_mut().enumerate().skip(1) {
            *word = 0x6000_0000_0000_0000 | i as u64;
        }

        Self {
            layout,
            regions,
            link,
            events: Vec::new(),
            output: Vec::new(),
            hold_samples: Vec::new(),
            rejections: HashMap::new(),
        }
    }

    /// Layout the board was built for
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Trampoline bound to the code staging region
    pub fn trampoline(&self) -> Trampoline {
        Trampoline::new(
            self.trampoline_symbols(),
            self.layout.code_staging,
            self.layout.code_staging_size,
        )
        .expect("simulated trampoline binds")
    }

    /// Link-time trampoline bytes
    pub fn link_bytes(&self) -> &[u8] {
        // SAFETY: u64 storage viewed as bytes.
        unsafe { std::slice::from_raw_parts(self.link.as_ptr() as *const u8, LINK_SIZE) }
    }

    /// Make `core` refuse the next `times` dispatches
    pub fn reject_dispatches(&mut self, core: usize, times: usize) {
        self.rejections.insert(core, times);
    }

    /// Recorded collaborator calls
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Lines synced for execution, in order
    pub fn synced_lines(&self) -> Vec<PhysAddr> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Sync(line) => Some(*line),
                _ => None,
            })
            .collect()
    }

    /// Lines flushed, in order
    pub fn flushed_lines(&self) -> Vec<PhysAddr> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Flush(line) => Some(*line),
                _ => None,
            })
            .collect()
    }

    /// Relocated hold-cell value observed at every line sync
    pub fn hold_samples(&self) -> &[(PhysAddr, u64)] {
        &self.hold_samples
    }

    /// Serial output
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Serial output as text
    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Copy `len` bytes out of simulated memory
    pub fn read(&mut self, addr: PhysAddr, len: usize) -> Vec<u8> {
        let src = self.phys_ptr(addr);
        // SAFETY: `phys_ptr` checked the start; regions are contiguous buffers.
        unsafe { std::slice::from_raw_parts(src, len) }.to_vec()
    }

    /// Copy `bytes` into simulated memory
    pub fn write(&mut self, addr: PhysAddr, bytes: &[u8]) {
        let dst = self.phys_ptr(addr);
        // SAFETY: see `read`.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
    }

    /// Fill simulated memory
    pub fn fill(&mut self, addr: PhysAddr, value: u8, len: usize) {
        let dst = self.phys_ptr(addr);
        // SAFETY: see `read`.
        unsafe { std::ptr::write_bytes(dst, value, len) };
    }

    fn region_ptr(&mut self, addr: PhysAddr) -> Option<*mut u8> {
        self.regions.iter_mut().find(|r| r.contains(addr)).map(|r| {
            let offset = (addr - r.base) as usize;
            // SAFETY: `contains` bounds the offset.
            unsafe { (r.words.as_mut_ptr() as *mut u8).add(offset) }
        })
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysMemory for SimBoard {
    fn phys_ptr(&mut self, addr: PhysAddr) -> *mut u8 {
        match self.region_ptr(addr) {
            Some(ptr) => ptr,
            None => panic!("access to unbacked physical address {}", addr),
        }
    }
}

impl CacheMaintenance for SimBoard {
    const LINE_SIZE: u64 = XENON_LINE_SIZE;

    fn sync_line(&mut self, line: PhysAddr) {
        assert!(line.is_aligned(Self::LINE_SIZE), "unaligned sync {}", line);
        self.events.push(Event::Sync(line));
        let cell = self.layout.code_staging;
        if let Some(ptr) = self.region_ptr(cell) {
            // SAFETY: code staging is word-aligned storage.
            let hold = unsafe { std::ptr::read_volatile(ptr as *const u64) };
            self.hold_samples.push((line, hold));
        }
    }

    fn flush_line(&mut self, line: PhysAddr) {
        assert!(line.is_aligned(Self::LINE_SIZE), "unaligned flush {}", line);
        self.events.push(Event::Flush(line));
    }
}

impl ConsoleWriter for SimBoard {
    fn write_byte(&mut self, byte: u8) {
        self.output.push(byte);
    }
}

impl Delay for SimBoard {
    fn delay_ms(&mut self, ms: u32) {
        self.events.push(Event::Delay(ms));
    }
}

impl Peripherals for SimBoard {
    fn quiesce_network(&mut self) {
        self.events.push(Event::QuiesceNetwork);
    }

    fn shutdown_usb(&mut self) {
        self.events.push(Event::ShutdownUsb);
    }
}

impl SecondaryCores for SimBoard {
    fn startup(&mut self) {
        self.events.push(Event::Startup);
    }

    fn dispatch(&mut self, core: usize, routine: PhysAddr) -> bool {
        let refusals = self.rejections.entry(core).or_insert(0);
        let accepted = *refusals == 0;
        if !accepted {
            *refusals -= 1;
        }
        self.events.push(Event::Dispatch { core, routine, accepted });
        accepted
    }
}

impl Transfer for SimBoard {
    unsafe fn enter_relocated(&mut self, routine: PhysAddr, staged: StagedImage) -> ! {
        self.events.push(Event::EnterRelocated(routine));
        assert_eq!(routine, self.trampoline().prepare_run(), "entered unrelocated mapper");
        let layout = self.layout;
        // SAFETY: forwarded from the caller.
        unsafe { mapper::prepare_run(self, staged, &layout) }
    }

    unsafe fn run(&mut self, routine: PhysAddr, entry: u64, devtree: u64) -> ! {
        self.events.push(Event::Run { routine, entry, devtree });
        panic::panic_any(Handoff::Primary { routine, entry, devtree })
    }

    unsafe fn release_secondary(&mut self, target: u64, core: usize) -> ! {
        panic::panic_any(Handoff::Secondary { target, core })
    }
}

impl Board for SimBoard {
    fn trampoline_symbols(&self) -> TrampolineSymbols {
        let start = self.link.as_ptr() as u64;
        TrampolineSymbols {
            start,
            end: start + LINK_SIZE as u64,
            prepare_run: start + 0x100,
            run: start + 0x200,
            hold_thread: start + 0x300,
            hold_cell: start,
        }
    }
}

// =============================================================================
// ELF BUILDER
// =============================================================================

struct PendingSection {
    name: String,
    sh_type: u32,
    flags: SectionFlags,
    addr: u32,
    data: Vec<u8>,
    size: u32,
    offset: Option<u32>,
}

/// Builds ELF32 images for tests (big-endian unless asked otherwise)
///
/// Layout: file header, section contents, `.shstrtab`, section headers.
/// Section 0 is the null section and the string table comes last.
pub struct ElfBuilder {
    entry: u32,
    little: bool,
    sections: Vec<PendingSection>,
    shstrndx: Option<u16>,
}

impl ElfBuilder {
    /// Image with entry point `entry`
    pub fn new(entry: u32) -> Self {
        Self {
            entry,
            little: false,
            sections: Vec::new(),
            shstrndx: None,
        }
    }

    /// Encode little-endian
    pub fn little_endian(mut self) -> Self {
        self.little = true;
        self
    }

    /// Override the string-table index
    pub fn string_table_index(mut self, index: u16) -> Self {
        self.shstrndx = Some(index);
        self
    }

    /// Allocated `SHT_PROGBITS` section
    pub fn progbits(self, name: &str, addr: u32, data: &[u8]) -> Self {
        self.section(name, SHT_PROGBITS, SectionFlags::ALLOC | SectionFlags::EXECINSTR, addr, data)
    }

    /// Allocated `SHT_NOBITS` section
    pub fn nobits(mut self, name: &str, addr: u32, size: u32) -> Self {
        self.sections.push(PendingSection {
            name: name.into(),
            sh_type: SHT_NOBITS,
            flags: SectionFlags::ALLOC | SectionFlags::WRITE,
            addr,
            data: Vec::new(),
            size,
            offset: None,
        });
        self
    }

    /// Arbitrary file-backed section
    pub fn section(mut self, name: &str, sh_type: u32, flags: SectionFlags, addr: u32, data: &[u8]) -> Self {
        self.sections.push(PendingSection {
            name: name.into(),
            sh_type,
            flags,
            addr,
            data: data.to_vec(),
            size: data.len() as u32,
            offset: None,
        });
        self
    }

    /// Record `offset` as the file offset of the last section added
    ///
    /// The section's own bytes (if any) are still laid out as usual.
    pub fn file_offset(mut self, offset: u32) -> Self {
        if let Some(last) = self.sections.last_mut() {
            last.offset = Some(offset);
        }
        self
    }

    fn u16(&self, v: u16) -> [u8; 2] {
        if self.little { v.to_le_bytes() } else { v.to_be_bytes() }
    }

    fn u32(&self, v: u32) -> [u8; 4] {
        if self.little { v.to_le_bytes() } else { v.to_be_bytes() }
    }

    /// Encode the image
    pub fn build(self) -> Vec<u8> {
        let align4 = |n: usize| (n + 3) & !3;

        // Name table: "\0" then every section name, then ".shstrtab"
        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for s in &self.sections {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(s.name.as_bytes());
            strtab.push(0);
        }
        let strtab_name = strtab.len() as u32;
        strtab.extend_from_slice(b".shstrtab\0");

        let mut out = vec![0u8; EHDR_SIZE];
        let mut offsets = Vec::new();
        for s in &self.sections {
            out.resize(align4(out.len()), 0);
            offsets.push(out.len() as u32);
            out.extend_from_slice(&s.data);
        }
        out.resize(align4(out.len()), 0);
        let strtab_offset = out.len() as u32;
        out.extend_from_slice(&strtab);
        out.resize(align4(out.len()), 0);
        let shoff = out.len() as u32;

        let shnum = self.sections.len() as u16 + 2;
        let shstrndx = self.shstrndx.unwrap_or(shnum - 1);

        // Section headers: null, user sections, .shstrtab
        let mut headers = vec![0u8; SHDR_SIZE];
        let push_header = |headers: &mut Vec<u8>, fields: [u32; 10]| {
            for f in fields {
                headers.extend_from_slice(&self.u32(f));
            }
        };
        for (i, s) in self.sections.iter().enumerate() {
            push_header(
                &mut headers,
                [name_offsets[i], s.sh_type, s.flags.bits(), s.addr, s.offset.unwrap_or(offsets[i]), s.size, 0, 0, 4, 0],
            );
        }
        push_header(
            &mut headers,
            [strtab_name, SHT_STRTAB, 0, 0, strtab_offset, strtab.len() as u32, 0, 0, 1, 0],
        );
        out.extend_from_slice(&headers);

        // File header
        let mut ehdr = Vec::with_capacity(EHDR_SIZE);
        ehdr.extend_from_slice(&ELF_MAGIC);
        ehdr.extend_from_slice(&[ELFCLASS32, if self.little { ELFDATA2LSB } else { ELFDATA2MSB }, 1]);
        ehdr.resize(16, 0);
        ehdr.extend_from_slice(&self.u16(ET_EXEC));
        ehdr.extend_from_slice(&self.u16(EM_PPC));
        ehdr.extend_from_slice(&self.u32(1));
        ehdr.extend_from_slice(&self.u32(self.entry));
        ehdr.extend_from_slice(&self.u32(0));
        ehdr.extend_from_slice(&self.u32(shoff));
        ehdr.extend_from_slice(&self.u32(0));
        ehdr.extend_from_slice(&self.u16(EHDR_SIZE as u16));
        ehdr.extend_from_slice(&self.u16(0));
        ehdr.extend_from_slice(&self.u16(0));
        ehdr.extend_from_slice(&self.u16(SHDR_SIZE as u16));
        ehdr.extend_from_slice(&self.u16(shnum));
        ehdr.extend_from_slice(&self.u16(shstrndx));
        out[..EHDR_SIZE].copy_from_slice(&ehdr);

        out
    }
}
