//! # Section Mapper
//!
//! Runs from the relocated trampoline on the primary core, after every other
//! core is parked. It writes each loadable section to its target address,
//! makes it fetchable, releases the parked cores and jumps into the image.
//!
//! Nothing here may call outside the HAL primitives: the code it was linked
//! next to may be overwritten by the sections it is copying. In particular
//! there is no logging beyond the raw boot trace, and everything reachable
//! from [`prepare_run`] is `#[inline(always)]` so that it is emitted into the
//! board's relocated entry.

use helix_hal::cache::{sync_before_exec, CacheMaintenance};
use helix_hal::mem::{copy_bytes, fill_bytes};
use helix_hal::serial::ConsoleWriter;
use helix_hal::PhysMemory;

use crate::config::Layout;
use crate::elf::ElfImage;
use crate::handoff::{HoldCell, StagedImage, Transfer};
use crate::trace;

/// Map every loadable section of `image` and return the entry point
///
/// Sections are handled in table order. Each one is traced, written (copied
/// from the image or zero-filled) at `high_mem_bit | sh_addr`, then synced
/// before the next one is touched. The entry line is traced last.
///
/// # Safety
/// The image is trusted. Section targets are written without any check and
/// must not overlap the staging regions.
#[inline(always)]
pub unsafe fn map_sections<B>(board: &mut B, image: &ElfImage<'_>, layout: &Layout) -> u32
where
    B: PhysMemory + CacheMaintenance + ConsoleWriter + ?Sized,
{
    let strtab = image.string_table();

    for section in image.loadable_sections() {
        let target = layout.section_target(section.addr as u64);
        let name = match strtab {
            Some(table) => table.name(section.name),
            None => &[],
        };
        trace::section(board, section.addr, section.size, name);

        let dst = board.phys_ptr(target);
        let len = section.size as usize;
        if section.kind.is_file_backed() {
            // SAFETY: trusted image; target writable per the contract.
            unsafe { copy_bytes(dst, image.at(section.offset as usize), len) };
        } else {
            // SAFETY: target writable per the contract.
            unsafe { fill_bytes(dst, 0, len) };
        }

        sync_before_exec(board, target, section.size as u64);
    }

    let entry = image.entry();
    trace::entry(board, entry);
    entry
}

/// Map the staged image, release the secondaries and enter the image
///
/// # Safety
/// Must run from the relocated trampoline with every secondary core parked.
/// `staged` must describe a trusted image copied to its staging region.
#[inline(always)]
pub unsafe fn prepare_run<B>(board: &mut B, staged: StagedImage, layout: &Layout) -> !
where
    B: PhysMemory + CacheMaintenance + ConsoleWriter + Transfer + ?Sized,
{
    // SAFETY: the staging region holds the image and is not a section target.
    let image = unsafe { ElfImage::from_ptr(board.phys_ptr(staged.image)) };
    // SAFETY: forwarded to the caller.
    let entry = unsafe { map_sections(board, &image, layout) };

    HoldCell::at(staged.hold_cell).publish(board, layout.secondary_release(entry as u64));

    // SAFETY: every section is mapped and synced.
    unsafe { board.run(staged.run, entry as u64, layout.devtree_arg()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::{SectionFlags, EHDR_SIZE, SHT_PROGBITS};
    use crate::testing::{expect_handoff, ElfBuilder, Event, Handoff, SimBoard};
    use helix_hal::PhysAddr;

    fn map(board: &mut SimBoard, bytes: &[u8]) -> u32 {
        let image = unsafe { ElfImage::new(bytes) };
        unsafe { map_sections(board, &image, &Layout::XENON) }
    }

    #[test]
    fn test_two_section_image() {
        let text: Vec<u8> = (0..16).collect();
        let data = [0xD0, 0xD1, 0xD2, 0xD3];
        let bytes = ElfBuilder::new(0x1000)
            .progbits(".text", 0x1000, &text)
            .progbits(".data", 0x2000, &data)
            .build();
        let mut board = SimBoard::new();

        assert_eq!(map(&mut board, &bytes), 0x1000);
        assert_eq!(
            board.output_str(),
            "00001000 00000010 .text\r\n00002000 00000004 .data\r\n\r\nEP 00001000\r\n"
        );
        assert_eq!(board.read(PhysAddr::new(0x8000_1000), 16), text);
        assert_eq!(board.read(PhysAddr::new(0x8000_2000), 4), data);
    }

    #[test]
    fn test_zero_fill_section() {
        let bytes = ElfBuilder::new(0x1000).nobits(".bss", 0x3000, 0x100).build();
        let mut board = SimBoard::new();
        board.fill(PhysAddr::new(0x8000_2F80), 0xFF, 0x200);

        map(&mut board, &bytes);
        assert!(board.read(PhysAddr::new(0x8000_3000), 0x100).iter().all(|&b| b == 0));
        // Bytes around the section are untouched
        assert_eq!(board.read(PhysAddr::new(0x8000_2FFF), 1), [0xFF]);
        assert_eq!(board.read(PhysAddr::new(0x8000_3100), 1), [0xFF]);
    }

    #[test]
    fn test_zero_fill_never_reads_image() {
        // The .bss header names the .text bytes as its file contents
        let bytes = ElfBuilder::new(0x1000)
            .progbits(".text", 0x1000, &[0xAA; 0x40])
            .nobits(".bss", 0x2000, 0x40)
            .file_offset(EHDR_SIZE as u32)
            .build();
        let mut board = SimBoard::new();
        board.fill(PhysAddr::new(0x8000_2000), 0x55, 0x40);

        map(&mut board, &bytes);
        assert!(board.read(PhysAddr::new(0x8000_1000), 0x40).iter().all(|&b| b == 0xAA));
        assert!(board.read(PhysAddr::new(0x8000_2000), 0x40).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_skipped_sections_write_and_sync_nothing() {
        let bytes = ElfBuilder::new(0x1000)
            .section(".comment", SHT_PROGBITS, SectionFlags::empty(), 0x4000, &[1, 2, 3, 4])
            .progbits(".empty", 0x5000, &[])
            .build();
        let mut board = SimBoard::new();
        board.fill(PhysAddr::new(0x8000_4000), 0xEE, 0x1080);

        map(&mut board, &bytes);
        assert!(board.read(PhysAddr::new(0x8000_4000), 0x1080).iter().all(|&b| b == 0xEE));
        assert!(board.synced_lines().is_empty());
        assert_eq!(board.output_str(), "\r\nEP 00001000\r\n");
    }

    #[test]
    fn test_each_section_synced_over_rounded_range() {
        let bytes = ElfBuilder::new(0x1010)
            .progbits(".text", 0x1010, &[0x60; 0x100])
            .nobits(".bss", 0x2000, 0x80)
            .build();
        let mut board = SimBoard::new();

        map(&mut board, &bytes);
        assert_eq!(
            board.synced_lines(),
            [0x8000_1000, 0x8000_1080, 0x8000_1100, 0x8000_2000].map(PhysAddr::new)
        );
    }

    #[test]
    fn test_sections_traced_before_written() {
        let bytes = ElfBuilder::new(0x1000)
            .progbits(".a", 0x1000, &[1])
            .progbits(".b", 0x1080, &[2])
            .build();
        let mut board = SimBoard::new();

        map(&mut board, &bytes);
        // One sync per section, each after that section's trace line
        let syncs = board.events().iter().filter(|e| matches!(e, Event::Sync(_))).count();
        assert_eq!(syncs, 2);
        assert!(board.output_str().starts_with("00001000 00000001 .a\r\n00001080 00000001 .b\r\n"));
    }

    #[test]
    fn test_unnamed_when_string_table_missing() {
        let bytes = ElfBuilder::new(0x1000)
            .progbits(".text", 0x1000, &[1, 2])
            .string_table_index(0)
            .build();
        let mut board = SimBoard::new();
        map(&mut board, &bytes);
        assert_eq!(board.output_str(), "00001000 00000002 \r\n\r\nEP 00001000\r\n");
    }

    #[test]
    fn test_prepare_run_publishes_after_mapping() {
        let bytes = ElfBuilder::new(0x1000)
            .progbits(".text", 0x1000, &[0x48; 0x200])
            .nobits(".bss", 0x4000, 0x100)
            .build();
        let mut board = SimBoard::new();
        let trampoline = board.trampoline();
        board.write(Layout::XENON.data_staging, &bytes);
        let staged = StagedImage {
            image: Layout::XENON.data_staging,
            hold_cell: trampoline.hold_cell(),
            run: trampoline.run(),
        };

        let handoff = expect_handoff(|| unsafe { prepare_run(&mut board, staged, &Layout::XENON) });
        assert_eq!(
            handoff,
            Handoff::Primary {
                routine: trampoline.run(),
                entry: 0x1000,
                devtree: 0x07FE_0000,
            }
        );

        // Cell stays empty through every section sync, then holds entry + 0x60
        let samples = board.hold_samples();
        let (last, before) = samples.split_last().expect("hold cell synced");
        assert!(before.iter().all(|&(_, hold)| hold == 0));
        assert_eq!(*last, (trampoline.hold_cell(), 0x1060));
        assert_eq!(before.len(), 4 + 2);
    }
}
