//! Block device adapter: binds the filesystem to a backing file on disk.
//!
//! The core filesystem never touches `std::fs::File` directly; it only speaks to
//! whatever implements [`BlockDevice`]. [`FileBlockDevice`] is the one concrete
//! adapter this crate ships, backed by a regular file (or a real block/char
//! device, if pointed at one).

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::path::PathBuf;

/// The fixed size of a block, in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// A fixed-size block buffer, as read from or written to a [`BlockDevice`].
pub type Block = [u8; BLOCK_SIZE];

/// A byte-addressable array of fixed-size blocks.
///
/// Implementors own the lifetime of the binding: `open` binds it, `close` (or
/// simply dropping the value) unbinds it.
pub trait BlockDevice: Sized {
	/// Binds the device to the file at `path`.
	fn open(path: &Path) -> io::Result<Self>;

	/// Unbinds the device, flushing any buffered writes.
	fn close(self) -> io::Result<()>;

	/// Returns the total number of blocks available on the device.
	fn block_count(&self) -> usize;

	/// Reads block `index` into `buf`.
	fn read_block(&mut self, index: usize, buf: &mut Block) -> io::Result<()>;

	/// Writes `buf` to block `index`.
	fn write_block(&mut self, index: usize, buf: &Block) -> io::Result<()>;
}

/// ioctl macro: Command.
macro_rules! ioc {
	($a:expr, $b:expr, $c:expr, $d:expr) => {
		(($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
	};
}

/// ioctl macro: Read command.
macro_rules! ior {
	($a:expr, $b:expr, $c:ty) => {
		ioc!(2, $a, $b, std::mem::size_of::<$c>() as std::ffi::c_long)
	};
}

/// ioctl command: get the size of a disk, in number of 512-byte sectors.
const BLKGETSIZE64: std::ffi::c_long = ior!(0x12, 114, u64);

/// Returns the number of `BLOCK_SIZE` blocks available at `path`.
///
/// For a real block or character device, this queries the kernel via
/// `ioctl(BLKGETSIZE64)`. For a regular file, it uses the file's length.
fn device_block_count(path: &Path, file: &File) -> io::Result<usize> {
	let metadata = fs::metadata(path)?;
	let file_type = metadata.file_type();

	let byte_len = if file_type.is_block_device() || file_type.is_char_device() {
		let mut sectors: u64 = 0;
		let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut sectors) };
		if ret < 0 {
			return Err(io::Error::last_os_error());
		}
		sectors * 512
	} else {
		metadata.len()
	};

	Ok((byte_len / BLOCK_SIZE as u64) as usize)
}

/// A [`BlockDevice`] backed by a regular file (the "virtual disk").
pub struct FileBlockDevice {
	path: PathBuf,
	file: File,
	block_count: usize,
}

impl BlockDevice for FileBlockDevice {
	fn open(path: &Path) -> io::Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		let block_count = device_block_count(path, &file)?;

		Ok(Self {
			path: path.to_path_buf(),
			file,
			block_count,
		})
	}

	fn close(self) -> io::Result<()> {
		let Self { mut file, .. } = self;
		file.flush()
	}

	fn block_count(&self) -> usize {
		self.block_count
	}

	fn read_block(&mut self, index: usize, buf: &mut Block) -> io::Result<()> {
		self.file.seek(SeekFrom::Start((index * BLOCK_SIZE) as u64))?;
		self.file.read_exact(buf)
	}

	fn write_block(&mut self, index: usize, buf: &Block) -> io::Result<()> {
		self.file.seek(SeekFrom::Start((index * BLOCK_SIZE) as u64))?;
		self.file.write_all(buf)
	}
}

impl FileBlockDevice {
	/// Returns the path the device is bound to.
	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write as _;

	#[test]
	fn round_trips_a_block() {
		let mut tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.write_all(&[0u8; BLOCK_SIZE * 4]).unwrap();
		tmp.flush().unwrap();

		let mut dev = FileBlockDevice::open(tmp.path()).unwrap();
		assert_eq!(dev.block_count(), 4);

		let mut block = [0xAAu8; BLOCK_SIZE];
		dev.write_block(2, &block).unwrap();
		block = [0u8; BLOCK_SIZE];
		dev.read_block(2, &mut block).unwrap();
		assert!(block.iter().all(|&b| b == 0xAA));

		dev.close().unwrap();
	}
}
