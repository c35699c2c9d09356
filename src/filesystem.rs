//! The mounted filesystem: ties the superblock, FAT, root directory and
//! open-file table together behind one handle.

use crate::block::Block;
use crate::block::BlockDevice;
use crate::block::FileBlockDevice;
use crate::block::BLOCK_SIZE;
use crate::directory::validate_name;
use crate::directory::RootDirectory;
use crate::error::FsError;
use crate::fat::Fat;
use crate::fat::TailLink;
use crate::io_engine::advance;
use crate::io_engine::translate;
use crate::io_engine::Translation;
use crate::openfile::OpenFileTable;
use crate::superblock::Superblock;
use std::path::Path;

/// A mounted filesystem.
///
/// Generic over the block device so tests can swap in an in-memory stub;
/// [`FileSystem::mount`] on a plain path always produces a
/// `FileSystem<FileBlockDevice>`.
pub struct FileSystem<D: BlockDevice = FileBlockDevice> {
	device: D,
	superblock: Superblock,
	fat: Fat,
	directory: RootDirectory,
	open_files: OpenFileTable,
	files_present: usize,
	used_blocks: usize,
}

/// A snapshot of the geometry and usage figures reported by `info`.
#[derive(Debug, Clone, Copy)]
pub struct Info {
	pub total_blocks: u16,
	pub fat_blocks: u8,
	pub root_block: u16,
	pub data_block_start: u16,
	pub data_blocks: u16,
	pub free_data_blocks: usize,
	pub free_directory_slots: usize,
}

impl FileSystem<FileBlockDevice> {
	/// Mounts the filesystem stored in the file at `path`.
	pub fn mount(path: &Path) -> Result<Self, FsError> {
		Self::mount_on(FileBlockDevice::open(path)?)
	}
}

impl<D: BlockDevice> FileSystem<D> {
	/// Mounts the filesystem stored on an already-open device.
	pub fn mount_on(mut device: D) -> Result<Self, FsError> {
		let mut block = [0u8; BLOCK_SIZE];
		device.read_block(0, &mut block)?;
		let superblock = Superblock::parse(&block)?;

		if superblock.block_count as usize > device.block_count() {
			return Err(FsError::NotAFilesystem);
		}

		let mut fat_blocks = Vec::with_capacity(superblock.fat_block_count as usize);
		for i in 0..superblock.fat_block_count as usize {
			let mut b = [0u8; BLOCK_SIZE];
			device.read_block(1 + i, &mut b)?;
			fat_blocks.push(b);
		}
		let fat = Fat::parse(&fat_blocks, superblock.data_block_count);

		let mut dir_block = [0u8; BLOCK_SIZE];
		device.read_block(superblock.root_block_idx as usize, &mut dir_block)?;
		let directory = RootDirectory::parse(&dir_block);

		let files_present = directory.files_present();
		let used_blocks = fat.used_blocks();

		Ok(Self {
			device,
			superblock,
			fat,
			directory,
			open_files: OpenFileTable::new(),
			files_present,
			used_blocks,
		})
	}

	/// Persists the superblock, root directory and full FAT, then closes the
	/// device.
	pub fn unmount(mut self) -> Result<(), FsError> {
		self.persist_superblock()?;
		self.persist_directory()?;
		self.persist_fat()?;
		self.device.close()?;
		Ok(())
	}

	/// Returns the geometry and usage figures for `info`.
	pub fn info(&self) -> Info {
		Info {
			total_blocks: self.superblock.block_count,
			fat_blocks: self.superblock.fat_block_count,
			root_block: self.superblock.root_block_idx,
			data_block_start: self.superblock.data_block_start_idx,
			data_blocks: self.superblock.data_block_count,
			free_data_blocks: self.superblock.data_block_count as usize - self.used_blocks,
			free_directory_slots: crate::directory::MAX_FILES - self.files_present,
		}
	}

	/// Prints the same geometry report as the original tool's `info` command.
	pub fn print_info(&self) {
		let info = self.info();
		println!("FS Info:");
		println!("total_blk_count={}", info.total_blocks);
		println!("fat_blk_count={}", info.fat_blocks);
		println!("rdir_blk={}", info.root_block);
		println!("data_blk={}", info.data_block_start);
		println!("data_blk_count={}", info.data_blocks);
		println!("fat_free_ratio={}/{}", info.free_data_blocks, info.data_blocks);
		println!(
			"rdir_free_ratio={}/{}",
			info.free_directory_slots,
			crate::directory::MAX_FILES
		);
	}

	/// Creates a new, empty file named `name`.
	pub fn create(&mut self, name: &str) -> Result<(), FsError> {
		validate_name(name)?;
		if self.directory.find(name).is_some() {
			return Err(FsError::DuplicateName);
		}
		if self.files_present >= crate::directory::MAX_FILES {
			return Err(FsError::DirectoryFull);
		}

		self.directory.insert(name).expect("capacity already checked");
		self.files_present += 1;
		self.persist_directory()?;
		Ok(())
	}

	/// Deletes the file named `name`, freeing its blocks.
	pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
		validate_name(name)?;
		let slot = self.directory.find(name).ok_or(FsError::NotFound)?;

		let first = self.directory.get(slot).first_block;
		let freed = self.fat.free_chain(first);
		self.used_blocks -= freed;

		self.directory.remove(slot);
		self.files_present -= 1;

		self.persist_directory()?;
		self.persist_fat()?;
		Ok(())
	}

	/// Prints every non-empty directory entry, as `ls` would.
	pub fn ls(&self) {
		println!("FS Ls:");
		for (_, entry) in self.directory.iter_present() {
			println!("file: {}, size: {}, data_blk: {}", entry.name, entry.size, entry.first_block);
		}
	}

	/// Opens `name`, returning a descriptor positioned at offset 0.
	pub fn open(&mut self, name: &str) -> Result<usize, FsError> {
		let slot = self.directory.find(name).ok_or(FsError::NotFound)?;
		self.open_files.open(slot).ok_or(FsError::TooManyOpenFiles)
	}

	/// Closes descriptor `fd`.
	pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
		self.open_files.close(fd)
	}

	/// Returns the size of the file open on `fd`.
	pub fn stat(&self, fd: usize) -> Result<u32, FsError> {
		let open = self.open_files.get(fd)?;
		Ok(self.directory.get(open.file_index).size)
	}

	/// Moves `fd`'s cursor to `offset`, which must lie within `[0, size]`.
	pub fn lseek(&mut self, fd: usize, offset: u32) -> Result<(), FsError> {
		let file_index = self.open_files.get(fd)?.file_index;
		let size = self.directory.get(file_index).size;
		if offset > size {
			return Err(FsError::OffsetOutOfRange);
		}
		self.open_files.get_mut(fd)?.offset = offset;
		Ok(())
	}

	/// Reads up to `buf.len()` bytes from `fd`'s current offset.
	///
	/// Never extends the file; returns the number of bytes actually
	/// transferred, which is `min(buf.len(), size - offset)`.
	pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
		let open = *self.open_files.get(fd)?;
		let size = self.directory.get(open.file_index).size;
		let effective = (buf.len() as u32).min(size.saturating_sub(open.offset)) as usize;
		if effective == 0 {
			return Ok(0);
		}

		let first = self.directory.get(open.file_index).first_block;
		let mut cursor = translate(&self.fat, first, open.offset);
		let mut bytes_read = 0usize;
		let mut block_buf = [0u8; BLOCK_SIZE];

		while bytes_read < effective {
			let (block, intra) = match cursor {
				Translation::Block { block, intra } => (block, intra),
				Translation::AtEnd { .. } => break,
			};

			self.device.read_block(self.data_block_addr(block), &mut block_buf)?;
			let chunk = (effective - bytes_read).min(BLOCK_SIZE - intra as usize);
			buf[bytes_read..bytes_read + chunk].copy_from_slice(&block_buf[intra as usize..intra as usize + chunk]);
			bytes_read += chunk;

			cursor = advance(&self.fat, block, intra, chunk as u16);
		}

		self.open_files.get_mut(fd)?.offset = open.offset + bytes_read as u32;
		Ok(bytes_read)
	}

	/// Writes `buf` at `fd`'s current offset, extending the file and
	/// allocating blocks as needed.
	///
	/// Returns the number of bytes actually written, which is less than
	/// `buf.len()` only if the disk ran out of free blocks partway through;
	/// that is not an error.
	pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize, FsError> {
		let file_index = self.open_files.get(fd)?.file_index;
		let start_offset = self.open_files.get(fd)?.offset;
		if buf.is_empty() {
			return Ok(0);
		}

		let first = self.directory.get(file_index).first_block;
		let mut cursor = translate(&self.fat, first, start_offset);
		let mut bytes_written = 0usize;
		let mut block_buf = [0u8; BLOCK_SIZE];

		while bytes_written < buf.len() {
			let block = match cursor {
				Translation::Block { block, .. } => block,
				Translation::AtEnd { tail } => {
					let Some((new_block, _)) = self.fat.extend_chain(tail) else {
						break;
					};
					if tail == TailLink::FileEntry {
						self.directory.get_mut(file_index).first_block = new_block;
					}
					self.used_blocks += 1;
					self.persist_fat()?;
					cursor = Translation::Block { block: new_block, intra: 0 };
					new_block
				}
			};
			let intra = match cursor {
				Translation::Block { intra, .. } => intra,
				Translation::AtEnd { .. } => unreachable!("just resolved to a block"),
			};

			let chunk = (buf.len() - bytes_written).min(BLOCK_SIZE - intra as usize);
			let addr = self.data_block_addr(block);
			if chunk < BLOCK_SIZE {
				self.device.read_block(addr, &mut block_buf)?;
			}
			block_buf[intra as usize..intra as usize + chunk].copy_from_slice(&buf[bytes_written..bytes_written + chunk]);
			self.device.write_block(addr, &block_buf)?;

			bytes_written += chunk;
			cursor = advance(&self.fat, block, intra, chunk as u16);
		}

		let new_offset = start_offset + bytes_written as u32;
		self.open_files.get_mut(fd)?.offset = new_offset;
		if new_offset > self.directory.get(file_index).size {
			self.directory.get_mut(file_index).size = new_offset;
			self.persist_directory()?;
		}

		Ok(bytes_written)
	}

	/// Absolute disk block index for data-block index `block`.
	fn data_block_addr(&self, block: u16) -> usize {
		self.superblock.data_block_start_idx as usize + block as usize
	}

	fn persist_superblock(&mut self) -> Result<(), FsError> {
		self.device.write_block(0, &self.superblock.to_block())?;
		Ok(())
	}

	fn persist_directory(&mut self) -> Result<(), FsError> {
		let block: Block = self.directory.to_block();
		self.device.write_block(self.superblock.root_block_idx as usize, &block)?;
		Ok(())
	}

	fn persist_fat(&mut self) -> Result<(), FsError> {
		for (i, block) in self.fat.to_blocks().into_iter().enumerate() {
			self.device.write_block(1 + i, &block)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::format::format;
	use crate::format::FormatOptions;
	use std::io::Write as _;
	use tempfile::NamedTempFile;

	/// Builds a blank disk image with `data_blocks` data blocks and mounts it.
	fn mounted_disk(data_blocks: u16) -> (NamedTempFile, FileSystem) {
		let tmp = NamedTempFile::new().unwrap();
		let total_bytes = (data_blocks as usize + 16) * BLOCK_SIZE;
		tmp.as_file().set_len(total_bytes as u64).unwrap();
		tmp.as_file().sync_all().unwrap();

		format(tmp.path(), FormatOptions { data_blocks: Some(data_blocks) }).unwrap();
		let fs = FileSystem::mount(tmp.path()).unwrap();
		(tmp, fs)
	}

	#[test]
	fn write_then_read_back_survives_a_remount() {
		let (tmp, mut fs) = mounted_disk(50);

		fs.create("a").unwrap();
		let fd = fs.open("a").unwrap();
		assert_eq!(fs.write(fd, b"0123456789").unwrap(), 10);
		assert_eq!(fs.stat(fd).unwrap(), 10);

		fs.lseek(fd, 0).unwrap();
		let mut buf = [0u8; 10];
		assert_eq!(fs.read(fd, &mut buf).unwrap(), 10);
		assert_eq!(&buf, b"0123456789");

		fs.close(fd).unwrap();
		fs.unmount().unwrap();

		let mut fs = FileSystem::mount(tmp.path()).unwrap();
		let fd = fs.open("a").unwrap();
		let mut buf = [0u8; 10];
		assert_eq!(fs.read(fd, &mut buf).unwrap(), 10);
		assert_eq!(&buf, b"0123456789");
	}

	#[test]
	fn directory_rejects_a_129th_file_then_recovers_after_a_delete() {
		let (_tmp, mut fs) = mounted_disk(4);

		for i in 0..crate::directory::MAX_FILES {
			fs.create(&format!("f{i}")).unwrap();
		}
		assert!(matches!(fs.create("overflow"), Err(FsError::DirectoryFull)));

		fs.delete("f0").unwrap();
		fs.create("f0-again").unwrap();
	}

	#[test]
	fn large_write_round_trips_byte_for_byte() {
		let (_tmp, mut fs) = mounted_disk(32);

		let mut data = Vec::with_capacity(24_000);
		for value in 0u32..6 {
			for _ in 0..1000 {
				data.extend_from_slice(&value.to_le_bytes());
			}
		}
		assert_eq!(data.len(), 24_000);

		fs.create("x").unwrap();
		let fd = fs.open("x").unwrap();
		assert_eq!(fs.write(fd, &data).unwrap(), data.len());
		assert_eq!(fs.stat(fd).unwrap(), data.len() as u32);

		fs.lseek(fd, 0).unwrap();
		let mut readback = vec![0u8; data.len()];
		assert_eq!(fs.read(fd, &mut readback).unwrap(), data.len());
		assert_eq!(readback, data);
	}

	#[test]
	fn two_descriptors_on_the_same_file_share_size() {
		let (_tmp, mut fs) = mounted_disk(8);

		fs.create("shared").unwrap();
		let fd1 = fs.open("shared").unwrap();
		let fd2 = fs.open("shared").unwrap();

		assert_eq!(fs.write(fd1, b"0123456789").unwrap(), 10);
		assert_eq!(fs.stat(fd1).unwrap(), 10);
		assert_eq!(fs.stat(fd2).unwrap(), 10);
	}

	#[test]
	fn write_past_capacity_returns_a_short_count() {
		let (_tmp, mut fs) = mounted_disk(2);

		fs.create("y").unwrap();
		let fd = fs.open("y").unwrap();
		let full = vec![0xABu8; 2 * BLOCK_SIZE];
		assert_eq!(fs.write(fd, &full).unwrap(), full.len());

		let n = fs.write(fd, &[0u8; 100]).unwrap();
		assert_eq!(n, 0);
		assert_eq!(fs.fat.find_free_block(), None);
	}

	#[test]
	fn delete_frees_exactly_the_blocks_it_used() {
		let (_tmp, mut fs) = mounted_disk(8);

		fs.create("z").unwrap();
		let fd = fs.open("z").unwrap();
		fs.write(fd, &vec![0u8; 5000]).unwrap();
		assert_eq!(fs.used_blocks, 2);

		fs.delete("z").unwrap();
		assert_eq!(fs.used_blocks, 0);
		assert_eq!(fs.fat.used_blocks(), 0);
	}

	#[test]
	fn lseek_rejects_offsets_past_the_end_of_file() {
		let (_tmp, mut fs) = mounted_disk(4);

		fs.create("f").unwrap();
		let fd = fs.open("f").unwrap();
		fs.write(fd, b"hello").unwrap();

		assert!(fs.lseek(fd, 5).is_ok());
		assert!(matches!(fs.lseek(fd, 6), Err(FsError::OffsetOutOfRange)));
	}

	#[test]
	fn read_after_seek_returns_the_remaining_bytes() {
		let (_tmp, mut fs) = mounted_disk(4);

		fs.create("f").unwrap();
		let fd = fs.open("f").unwrap();
		fs.write(fd, b"hello world").unwrap();
		fs.lseek(fd, 6).unwrap();

		let mut buf = [0u8; 32];
		let n = fs.read(fd, &mut buf).unwrap();
		assert_eq!(n, "world".len());
		assert_eq!(&buf[..n], b"world");
	}

	#[test]
	fn mount_rejects_a_superblock_claiming_more_blocks_than_the_device_has() {
		let tmp = NamedTempFile::new().unwrap();
		let total_bytes = 66 * BLOCK_SIZE;
		tmp.as_file().set_len(total_bytes as u64).unwrap();
		tmp.as_file().sync_all().unwrap();
		format(tmp.path(), FormatOptions { data_blocks: Some(50) }).unwrap();

		// Truncate the backing file out from under the superblock it just wrote.
		tmp.as_file().set_len((10 * BLOCK_SIZE) as u64).unwrap();
		tmp.as_file().sync_all().unwrap();

		assert!(matches!(FileSystem::mount(tmp.path()), Err(FsError::NotAFilesystem)));
	}
}
