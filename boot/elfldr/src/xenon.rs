//! # Xenon Board Glue
//!
//! Wires the loader to libxenon and the Xenon hardware:
//!
//! - peripherals and hardware threads through the libxenon C entry points;
//! - the transfer trampoline, linked into `.elfldr*` input sections (see `elfldr.ld`);
//! - file access through the newlib descriptors libxenon provides;
//! - C-callable entry points returning negative codes.
//!
//! The trampoline is `elfldr_prepare_run` plus the two assembly routines
//! below and the hold cell. Everything `elfldr_prepare_run` reaches in the
//! mapper and the HAL is `#[inline(always)]`, and the workspace builds these
//! crates optimized in every profile, so it is emitted into that one function
//! inside `.elfldr`. `tools/check-elfldr.sh` rejects a link where it is not.
//!
//! `powerpc64-unknown-linux-gnu` is an ELFv1 target: a Rust function symbol
//! names a descriptor in `.opd`, not code. Trampoline routines are therefore
//! tracked as raw code addresses and entered with `mtctr`/`bctrl`, never
//! through Rust function pointers.

use core::arch::{asm, global_asm};
use core::convert::Infallible;
use core::ffi::{c_char, c_int, c_long, c_void, CStr};
use core::ptr::{self, addr_of};

use alloc::boxed::Box;

use helix_hal::arch::{FunctionDescriptor, XenonCache, XenonTimebase};
use helix_hal::cache::CacheMaintenance;
use helix_hal::serial::{ConsoleWriter, Uart};
use helix_hal::timer::{Delay, TimebaseDelay};
use helix_hal::{PhysAddr, PhysMemory};
use helix_relocation::{mapper, Board, Layout, Peripherals, SecondaryCores, StagedImage, Transfer, TrampolineSymbols};
use log::{LevelFilter, SetLoggerError};

use crate::error::{buffer_len, LoadResult};
use crate::loader::ElfLoader;
use crate::logger;
use crate::storage::Storage;

// =============================================================================
// EXTERNAL SYMBOLS
// =============================================================================

extern "C" {
    fn enet_quiesce();
    fn usb_shutdown();
    fn xenon_thread_startup();
    fn xenon_run_thread_task(thread: c_int, stack: *mut c_void, task: *mut c_void) -> c_int;

    fn open(path: *const c_char, flags: c_int, ...) -> c_int;
    fn lseek(fd: c_int, offset: c_long, whence: c_int) -> c_long;
    fn read(fd: c_int, buf: *mut c_void, len: usize) -> isize;
    fn close(fd: c_int) -> c_int;

    /// Bounds of the transfer section (`elfldr.ld`)
    static __elfldr_start: u8;
    static __elfldr_end: u8;

    /// Final jump: `r3` = entry, `r4` = device tree
    static elfldr_run: u8;
    /// Secondary parking routine
    static elfldr_hold_thread: u8;
    /// Word polled by parked threads
    static elfldr_hold_cell: u64;
}

const O_RDONLY: c_int = 0;
const SEEK_SET: c_int = 0;
const SEEK_END: c_int = 2;

// Hold cell, final jump and parking loop. Threads are dispatched here with no
// stack, so the parking loop touches nothing but registers and the cell,
// which it finds relative to its own address.
global_asm!(
    r#"
    .section .elfldr.asm, "awx"
    .balign 8
    .globl elfldr_hold_cell
elfldr_hold_cell:
    .quad 0

    .globl elfldr_run
elfldr_run:
    mtctr 3
    mr 3, 4
    li 4, 0
    li 5, 0
    bctr

    .globl elfldr_hold_thread
elfldr_hold_thread:
    bl 1f
1:  mflr 4
    addi 4, 4, elfldr_hold_cell - 1b
2:  ld 5, 0(4)
    cmpdi 5, 0
    beq 2b
    mtctr 5
    mfspr 3, 1023
    bctr

    .previous
"#
);

/// Relocated section mapper
///
/// # Safety
/// Only called through its relocated address, with `staged` pointing to a
/// staged image descriptor.
#[no_mangle]
#[link_section = ".elfldr"]
pub unsafe extern "C" fn elfldr_prepare_run(staged: *const StagedImage) -> ! {
    let mut board = XenonBoard::new();
    // SAFETY: the caller passes a live descriptor.
    let staged = unsafe { ptr::read(staged) };
    // SAFETY: running relocated with every secondary thread parked.
    unsafe { mapper::prepare_run(&mut board, staged, &Layout::XENON) }
}

// =============================================================================
// BOARD
// =============================================================================

/// The Xenon console
pub struct XenonBoard {
    uart: Uart,
    cache: XenonCache,
    delay: TimebaseDelay<XenonTimebase>,
}

impl XenonBoard {
    /// Board handle over the SMC UART and the CPU timebase
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            uart: Uart::xenon(),
            cache: XenonCache,
            delay: TimebaseDelay::new(XenonTimebase),
        }
    }
}

impl Default for XenonBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysMemory for XenonBoard {
    #[inline(always)]
    fn phys_ptr(&mut self, addr: PhysAddr) -> *mut u8 {
        addr.as_mut_ptr()
    }
}

impl CacheMaintenance for XenonBoard {
    const LINE_SIZE: u64 = XenonCache::LINE_SIZE;

    #[inline(always)]
    fn sync_line(&mut self, line: PhysAddr) {
        self.cache.sync_line(line);
    }

    #[inline(always)]
    fn flush_line(&mut self, line: PhysAddr) {
        self.cache.flush_line(line);
    }
}

impl ConsoleWriter for XenonBoard {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) {
        self.uart.putc(byte);
    }
}

impl Delay for XenonBoard {
    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

impl Peripherals for XenonBoard {
    fn quiesce_network(&mut self) {
        // SAFETY: libxenon driver call, no preconditions.
        unsafe { enet_quiesce() };
    }

    fn shutdown_usb(&mut self) {
        // SAFETY: libxenon driver call, no preconditions.
        unsafe { usb_shutdown() };
    }
}

impl SecondaryCores for XenonBoard {
    fn startup(&mut self) {
        // SAFETY: libxenon thread bring-up, idempotent.
        unsafe { xenon_thread_startup() };
    }

    fn dispatch(&mut self, core: usize, routine: PhysAddr) -> bool {
        // SAFETY: `routine` is relocated stackless code.
        unsafe { xenon_run_thread_task(core as c_int, ptr::null_mut(), routine.as_mut_ptr()) == 0 }
    }
}

impl Transfer for XenonBoard {
    unsafe fn enter_relocated(&mut self, routine: PhysAddr, staged: StagedImage) -> ! {
        // SAFETY: `routine` is the code entry of the relocated
        // `elfldr_prepare_run`; `staged` stays live on this stack, which the
        // mapper never overwrites. r2 still holds this module's TOC.
        unsafe {
            asm!(
                "mtctr {routine}",
                "bctrl",
                routine = in(reg) routine.as_u64(),
                in("r3") ptr::addr_of!(staged),
                in("r12") routine.as_u64(),
                options(noreturn),
            )
        }
    }

    #[inline(always)]
    unsafe fn run(&mut self, routine: PhysAddr, entry: u64, devtree: u64) -> ! {
        // SAFETY: `routine` is the relocated `elfldr_run`, which takes the
        // entry in r3 and the device tree in r4.
        unsafe {
            asm!(
                "mtctr {routine}",
                "bctrl",
                routine = in(reg) routine.as_u64(),
                in("r3") entry,
                in("r4") devtree,
                options(noreturn),
            )
        }
    }

    #[inline(always)]
    unsafe fn release_secondary(&mut self, target: u64, core: usize) -> ! {
        // SAFETY: `target` is a published release address.
        unsafe {
            asm!(
                "mtctr {target}",
                "bctr",
                target = in(reg) target,
                in("r3") core as u64,
                options(noreturn),
            )
        }
    }
}

impl Board for XenonBoard {
    fn trampoline_symbols(&self) -> TrampolineSymbols {
        let prepare_run: unsafe extern "C" fn(*const StagedImage) -> ! = elfldr_prepare_run;
        // SAFETY: linker and assembler symbols, whose addresses are taken, and
        // the `.opd` descriptor of `elfldr_prepare_run`.
        unsafe {
            TrampolineSymbols {
                start: addr_of!(__elfldr_start) as u64,
                end: addr_of!(__elfldr_end) as u64,
                prepare_run: FunctionDescriptor::entry_of(prepare_run as *const ()),
                run: addr_of!(elfldr_run) as u64,
                hold_thread: addr_of!(elfldr_hold_thread) as u64,
                hold_cell: addr_of!(elfldr_hold_cell) as u64,
            }
        }
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Files reached through libxenon's newlib descriptors
#[derive(Debug, Clone, Copy)]
pub struct XenonStorage {
    path: [u8; 256],
}

impl Default for XenonStorage {
    fn default() -> Self {
        Self { path: [0; 256] }
    }
}

impl XenonStorage {
    fn c_path(&mut self, path: &str) -> Result<*const c_char, i32> {
        let bytes = path.as_bytes();
        if bytes.len() >= self.path.len() {
            return Err(-36); // ENAMETOOLONG
        }
        self.path[..bytes.len()].copy_from_slice(bytes);
        self.path[bytes.len()] = 0;
        Ok(self.path.as_ptr() as *const c_char)
    }
}

impl Storage for XenonStorage {
    type File = c_int;

    fn open(&mut self, path: &str) -> Result<c_int, i32> {
        let path = self.c_path(path)?;
        // SAFETY: `path` is NUL-terminated and outlives the call.
        let fd = unsafe { open(path, O_RDONLY) };
        if fd < 0 { Err(fd) } else { Ok(fd) }
    }

    fn size(&mut self, file: &c_int) -> Result<usize, i32> {
        // SAFETY: plain descriptor calls.
        let end = unsafe { lseek(*file, 0, SEEK_END) };
        if end < 0 {
            return Err(end as i32);
        }
        // SAFETY: plain descriptor call.
        let start = unsafe { lseek(*file, 0, SEEK_SET) };
        if start < 0 {
            return Err(start as i32);
        }
        Ok(end as usize)
    }

    fn read(&mut self, file: &mut c_int, buf: &mut [u8]) -> Result<usize, i32> {
        // SAFETY: `buf` is writable for its length.
        let n = unsafe { read(*file, buf.as_mut_ptr() as *mut c_void, buf.len()) };
        if n < 0 { Err(n as i32) } else { Ok(n as usize) }
    }

    fn close(&mut self, file: c_int) {
        // SAFETY: the descriptor is owned and closed once.
        unsafe { close(file) };
    }
}

// =============================================================================
// C ENTRY POINTS
// =============================================================================

/// Route `log` records to the SMC UART
pub fn init_logging(level: LevelFilter) -> Result<(), SetLoggerError> {
    logger::set_console(Box::leak(Box::new(Uart::xenon())));
    logger::init(level)
}

fn code(result: LoadResult<Infallible>) -> c_int {
    match result {
        Ok(never) => match never {},
        Err(e) => {
            log::error!("elfldr: {}", e);
            e.errno()
        },
    }
}

/// Load an in-memory image and enter it
///
/// # Safety
/// `addr` must point to `size` bytes holding a trusted ELF32 image.
#[no_mangle]
pub unsafe extern "C" fn helix_elfldr_run_from_memory(addr: *const u8, size: c_int) -> c_int {
    let size = match buffer_len(size) {
        Ok(size) => size,
        Err(e) => return code(Err(e)),
    };
    // SAFETY: per the contract.
    let image = unsafe { core::slice::from_raw_parts(addr, size) };
    let mut board = XenonBoard::new();
    // SAFETY: per the contract.
    code(unsafe { ElfLoader::xenon(&mut board).run_from_memory(image) })
}

/// Load the image file at `path` and enter it
///
/// Returns the negative storage code on failure.
///
/// # Safety
/// `path` must be NUL-terminated; the file must hold a trusted ELF32 image.
#[no_mangle]
pub unsafe extern "C" fn helix_elfldr_run_from_disk(path: *const c_char) -> c_int {
    // SAFETY: per the contract.
    let path = match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(path) => path,
        Err(_) => return -22, // EINVAL
    };
    let mut board = XenonBoard::new();
    let mut storage = XenonStorage::default();
    // SAFETY: per the contract.
    code(unsafe { ElfLoader::xenon(&mut board).run_from_disk(&mut storage, path) })
}

/// Stage a device tree, then load an in-memory image and enter it
///
/// # Safety
/// Both buffers must be valid for their sizes; the image must be trusted.
#[no_mangle]
pub unsafe extern "C" fn helix_elfldr_run_with_device_tree(
    elf: *const u8,
    elf_size: c_int,
    devtree: *const u8,
    devtree_size: c_int,
) -> c_int {
    let (elf_size, devtree_size) = match (buffer_len(elf_size), buffer_len(devtree_size)) {
        (Ok(elf_size), Ok(devtree_size)) => (elf_size, devtree_size),
        (Err(e), _) | (_, Err(e)) => return code(Err(e)),
    };
    // SAFETY: per the contract.
    let (image, blob) = unsafe {
        (
            core::slice::from_raw_parts(elf, elf_size),
            core::slice::from_raw_parts(devtree, devtree_size),
        )
    };
    let mut board = XenonBoard::new();
    // SAFETY: per the contract.
    code(unsafe { ElfLoader::xenon(&mut board).run_with_device_tree(image, blob) })
}
