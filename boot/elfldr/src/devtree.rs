//! # Device-Tree Staging
//!
//! The blob is stored verbatim at the start of a fixed, zeroed region. The
//! whole region is written back to memory so the image finds it with caches
//! off.

use helix_hal::cache::{flush_range, CacheMaintenance};
use helix_hal::mem::{copy_bytes, fill_bytes};
use helix_hal::serial::ConsoleWriter;
use helix_hal::PhysMemory;
use helix_relocation::Layout;

use crate::error::{LoadError, LoadResult};
use crate::logger;

/// Copy `blob` into the device-tree staging region
///
/// An oversized blob is reported on the console and rejected before
/// anything is written.
pub fn stage_device_tree<B>(board: &mut B, blob: &[u8], layout: &Layout) -> LoadResult<()>
where
    B: PhysMemory + CacheMaintenance + ConsoleWriter + ?Sized,
{
    let max = layout.devtree_max_size;
    if blob.len() > max {
        let err = LoadError::DeviceTreeTooLarge {
            size: blob.len(),
            max,
        };
        let _ = logger::write_fmt(board, format_args!("[ELF loader] {}\r\n", err));
        return Err(err);
    }

    let dst = board.phys_ptr(layout.devtree_staging);
    // SAFETY: the staging region is reserved for the device tree and is
    // `max` bytes long; `blob` fits in it.
    unsafe {
        fill_bytes(dst, 0, max);
        copy_bytes(dst, blob.as_ptr(), blob.len());
    }
    flush_range(board, layout.devtree_staging, max as u64);

    log::debug!("devtree: staged {} bytes at {}", blob.len(), layout.devtree_staging);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_relocation::testing::SimBoard;

    const MAX: usize = Layout::XENON.devtree_max_size;

    #[test]
    fn test_blob_stored_in_zeroed_region() {
        let mut board = SimBoard::new();
        board.fill(Layout::XENON.devtree_staging, 0xAA, MAX);
        let blob = [0xD0, 0x0D, 0xFE, 0xED, 0x00, 0x00, 0x01, 0x00];

        stage_device_tree(&mut board, &blob, &Layout::XENON).unwrap();

        let region = board.read(Layout::XENON.devtree_staging, MAX);
        assert_eq!(region[..blob.len()], blob);
        assert!(region[blob.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_whole_region_flushed() {
        let mut board = SimBoard::new();
        stage_device_tree(&mut board, &[1, 2, 3], &Layout::XENON).unwrap();

        let flushed = board.flushed_lines();
        assert_eq!(flushed.len(), MAX / 128);
        assert_eq!(flushed.first(), Some(&Layout::XENON.devtree_staging));
        assert!(board.synced_lines().is_empty());
    }

    #[test]
    fn test_exact_maximum_accepted() {
        let mut board = SimBoard::new();
        let blob = vec![0x5A; MAX];
        stage_device_tree(&mut board, &blob, &Layout::XENON).unwrap();
        assert_eq!(board.read(Layout::XENON.devtree_staging, MAX), blob);
    }

    #[test]
    fn test_oversized_rejected_untouched() {
        let mut board = SimBoard::new();
        board.fill(Layout::XENON.devtree_staging, 0xAA, MAX);
        let blob = vec![0x5A; MAX + 1];

        let err = stage_device_tree(&mut board, &blob, &Layout::XENON).unwrap_err();
        assert_eq!(err, LoadError::DeviceTreeTooLarge { size: MAX + 1, max: MAX });
        assert_eq!(board.output_str(), "[ELF loader] Device tree too big (> 65536 bytes) !\r\n");
        assert!(board.read(Layout::XENON.devtree_staging, MAX).iter().all(|&b| b == 0xAA));
        assert!(board.flushed_lines().is_empty());
    }
}
