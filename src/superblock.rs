//! The on-disk header describing a filesystem's geometry.

use crate::block::Block;
use crate::block::BLOCK_SIZE;
use crate::error::FsError;
use std::mem::size_of;
use std::slice;

/// The filesystem's signature, stored verbatim in the superblock's first 8 bytes.
pub const SIGNATURE: [u8; 8] = *b"MICROFAT";

/// Number of 16-bit entries a single FAT block can hold.
pub const FAT_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u16>();

/// The raw, on-disk layout of block 0.
///
/// Occupies exactly one block; fields beyond `fat_block_count` are unused
/// padding, zeroed by [`super::format::format`].
#[repr(C, packed)]
struct SuperblockRaw {
	signature: [u8; 8],
	block_count: u16,
	root_block_idx: u16,
	data_block_start_idx: u16,
	data_block_count: u16,
	fat_block_count: u8,
	_padding: [u8; BLOCK_SIZE - 17],
}

const _: () = assert!(size_of::<SuperblockRaw>() == BLOCK_SIZE);

/// In-memory projection of the superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
	/// Total number of blocks on the disk, including the superblock, FAT,
	/// root directory and data regions.
	pub block_count: u16,
	/// Index of the (single) root directory block.
	pub root_block_idx: u16,
	/// Index of the first data block.
	pub data_block_start_idx: u16,
	/// Number of data blocks, `D`.
	pub data_block_count: u16,
	/// Number of FAT blocks, `F`.
	pub fat_block_count: u8,
}

impl Superblock {
	/// Computes the geometry for a filesystem holding `data_block_count` data
	/// blocks.
	pub fn for_data_blocks(data_block_count: u16) -> Self {
		let fat_block_count = fat_blocks_for(data_block_count);
		let root_block_idx = 1 + fat_block_count as u16;
		let data_block_start_idx = root_block_idx + 1;
		let block_count = data_block_start_idx + data_block_count;

		Self {
			block_count,
			root_block_idx,
			data_block_start_idx,
			data_block_count,
			fat_block_count,
		}
	}

	/// Parses a superblock from a freshly-read block 0, validating the
	/// signature and internal geometry consistency.
	pub fn parse(block: &Block) -> Result<Self, FsError> {
		let raw: &SuperblockRaw = unsafe { &*(block.as_ptr() as *const SuperblockRaw) };

		if raw.signature != SIGNATURE {
			return Err(FsError::NotAFilesystem);
		}

		let sb = Self {
			block_count: raw.block_count,
			root_block_idx: raw.root_block_idx,
			data_block_start_idx: raw.data_block_start_idx,
			data_block_count: raw.data_block_count,
			fat_block_count: raw.fat_block_count,
		};

		if !sb.is_consistent() {
			return Err(FsError::NotAFilesystem);
		}

		Ok(sb)
	}

	/// Checks that the geometry fields agree with each other.
	fn is_consistent(&self) -> bool {
		let expected_fat_blocks = fat_blocks_for(self.data_block_count);
		let expected_root = 1 + expected_fat_blocks as u16;
		let expected_data_start = expected_root + 1;
		let expected_total = expected_data_start + self.data_block_count;

		self.fat_block_count == expected_fat_blocks
			&& self.root_block_idx == expected_root
			&& self.data_block_start_idx == expected_data_start
			&& self.block_count == expected_total
	}

	/// Serializes the superblock into a zero-padded block, ready to write to
	/// block 0.
	pub fn to_block(self) -> Block {
		let raw = SuperblockRaw {
			signature: SIGNATURE,
			block_count: self.block_count,
			root_block_idx: self.root_block_idx,
			data_block_start_idx: self.data_block_start_idx,
			data_block_count: self.data_block_count,
			fat_block_count: self.fat_block_count,
			_padding: [0; BLOCK_SIZE - 17],
		};

		let mut block = [0u8; BLOCK_SIZE];
		let bytes = unsafe {
			slice::from_raw_parts(&raw as *const _ as *const u8, size_of::<SuperblockRaw>())
		};
		block.copy_from_slice(bytes);
		block
	}
}

/// Computes `F = ceil(D * 2 / BLOCK_SIZE)`, the number of FAT blocks needed to
/// index `data_block_count` data blocks.
pub fn fat_blocks_for(data_block_count: u16) -> u8 {
	let entries = data_block_count as usize;
	let blocks = entries.div_ceil(FAT_ENTRIES_PER_BLOCK);
	blocks as u8
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn geometry_round_trips() {
		let sb = Superblock::for_data_blocks(50);
		let block = sb.to_block();
		let parsed = Superblock::parse(&block).unwrap();
		assert_eq!(sb, parsed);
	}

	#[test]
	fn rejects_bad_signature() {
		let block = [0u8; BLOCK_SIZE];
		assert!(matches!(Superblock::parse(&block), Err(FsError::NotAFilesystem)));
	}

	#[test]
	fn rejects_tampered_geometry() {
		let sb = Superblock::for_data_blocks(50);
		let mut block = sb.to_block();
		// Corrupt `data_block_count` without touching the rest.
		block[15] = 0xFF;
		assert!(matches!(Superblock::parse(&block), Err(FsError::NotAFilesystem)));
	}

	#[test]
	fn fat_sizing_matches_entry_budget() {
		assert_eq!(fat_blocks_for(0), 0);
		assert_eq!(fat_blocks_for(1), 1);
		assert_eq!(fat_blocks_for(FAT_ENTRIES_PER_BLOCK as u16), 1);
		assert_eq!(fat_blocks_for(FAT_ENTRIES_PER_BLOCK as u16 + 1), 2);
	}
}
