//! Writes a zero-initialized disk image: a valid superblock, an all-zero FAT
//! and an all-zero root directory.
//!
//! This is not the disk-formatting *utility* (a CLI, a separate concern) but
//! the one routine it would call; it is exposed here so the mount lifecycle's
//! own tests, and any embedder, can build a fixture disk without shelling out
//! to one.

use crate::block::BlockDevice;
use crate::block::FileBlockDevice;
use crate::directory::RootDirectory;
use crate::fat::Fat;
use crate::superblock::Superblock;
use std::io;
use std::path::Path;

/// Options controlling how a disk is formatted, mirroring the way the
/// teacher's own `mkfs` factories default their geometry from the device
/// when the caller doesn't pin it down.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
	/// Number of data blocks to provision. If `None`, as many as fit in the
	/// file's current length are used.
	pub data_blocks: Option<u16>,
}

/// Formats the file at `path` as an empty filesystem.
///
/// The file must already exist and be at least large enough to hold a
/// superblock, FAT, root directory and one data block.
pub fn format(path: &Path, options: FormatOptions) -> io::Result<()> {
	let mut device = FileBlockDevice::open(path)?;
	let available = device.block_count();

	let data_block_count = match options.data_blocks {
		Some(d) => d,
		None => fit_data_blocks(available),
	};

	let superblock = Superblock::for_data_blocks(data_block_count);
	if superblock.block_count as usize > available {
		return Err(io::Error::new(
			io::ErrorKind::InvalidInput,
			"device is too small for the requested number of data blocks",
		));
	}

	device.write_block(0, &superblock.to_block())?;

	let fat = Fat::empty(superblock.fat_block_count, superblock.data_block_count);
	for (i, block) in fat.to_blocks().into_iter().enumerate() {
		device.write_block(1 + i, &block)?;
	}

	let directory = RootDirectory::empty();
	device.write_block(superblock.root_block_idx as usize, &directory.to_block())?;

	device.close()
}

/// Finds the largest `D` such that `1 + ceil(D*2/BLOCK_SIZE) + 1 + D` fits
/// within `available` blocks.
fn fit_data_blocks(available: usize) -> u16 {
	if available < 2 {
		return 0;
	}
	let mut data_blocks = (available - 2) as u16;
	loop {
		let sb = Superblock::for_data_blocks(data_blocks);
		if sb.block_count as usize <= available || data_blocks == 0 {
			return data_blocks;
		}
		data_blocks -= 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block::BLOCK_SIZE;
	use std::io::Write as _;

	#[test]
	fn formats_a_blank_image() {
		let mut tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.write_all(&vec![0u8; BLOCK_SIZE * 64]).unwrap();
		tmp.flush().unwrap();

		format(tmp.path(), FormatOptions { data_blocks: Some(50) }).unwrap();

		let mut device = FileBlockDevice::open(tmp.path()).unwrap();
		let mut block = [0u8; BLOCK_SIZE];
		device.read_block(0, &mut block).unwrap();
		let sb = Superblock::parse(&block).unwrap();
		assert_eq!(sb.data_block_count, 50);

		let mut dir_block = [0u8; BLOCK_SIZE];
		device.read_block(sb.root_block_idx as usize, &mut dir_block).unwrap();
		let dir = RootDirectory::parse(&dir_block);
		assert_eq!(dir.files_present(), 0);
	}

	#[test]
	fn default_geometry_fits_available_space() {
		let mut tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.write_all(&vec![0u8; BLOCK_SIZE * 64]).unwrap();
		tmp.flush().unwrap();

		format(tmp.path(), FormatOptions::default()).unwrap();

		let mut device = FileBlockDevice::open(tmp.path()).unwrap();
		let mut block = [0u8; BLOCK_SIZE];
		device.read_block(0, &mut block).unwrap();
		let sb = Superblock::parse(&block).unwrap();
		assert!(sb.block_count as usize <= 64);
		assert!(sb.data_block_count > 0);
	}
}
