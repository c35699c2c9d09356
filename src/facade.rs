//! A free-function, POSIX-shaped API wrapping one module-private mount.
//!
//! This is the "process-wide global handle" shape of the original interface,
//! without an actual global: one [`Mutex<Option<FileSystem>>`] lives behind
//! these functions, and every call here takes the lock, so the crate still
//! behaves like a single-process, single-mount filesystem from the caller's
//! point of view. Embedders who want several independent mounts in one
//! process should use [`crate::FileSystem`] directly instead.

use crate::block::FileBlockDevice;
use crate::filesystem::FileSystem;
use std::path::Path;
use std::sync::Mutex;

static MOUNT: Mutex<Option<FileSystem<FileBlockDevice>>> = Mutex::new(None);

/// Mounts the filesystem at `diskname`. Returns `0` on success, `-1` if
/// already mounted or if the device can't be opened/parsed.
pub fn fs_mount(diskname: &str) -> i32 {
	let mut guard = MOUNT.lock().unwrap();
	if guard.is_some() {
		return -1;
	}
	match FileSystem::mount(Path::new(diskname)) {
		Ok(fs) => {
			*guard = Some(fs);
			0
		}
		Err(_) => -1,
	}
}

/// Unmounts the current filesystem, persisting the superblock, directory and
/// FAT. Returns `0` on success, `-1` if not mounted or a write failed.
pub fn fs_umount() -> i32 {
	let mut guard = MOUNT.lock().unwrap();
	match guard.take() {
		Some(fs) => match fs.unmount() {
			Ok(()) => 0,
			Err(_) => -1,
		},
		None => -1,
	}
}

/// Prints the mounted filesystem's geometry report. Returns `0`/`-1`.
pub fn fs_info() -> i32 {
	with_mount(|fs| {
		fs.print_info();
		0
	})
}

/// Creates an empty file named `name`. Returns `0`/`-1`.
pub fn fs_create(name: &str) -> i32 {
	with_mount(|fs| match fs.create(name) {
		Ok(()) => 0,
		Err(_) => -1,
	})
}

/// Deletes the file named `name`. Returns `0`/`-1`.
pub fn fs_delete(name: &str) -> i32 {
	with_mount(|fs| match fs.delete(name) {
		Ok(()) => 0,
		Err(_) => -1,
	})
}

/// Prints every file in the root directory. Returns `0`/`-1`.
pub fn fs_ls() -> i32 {
	with_mount(|fs| {
		fs.ls();
		0
	})
}

/// Opens `name`, returning a descriptor, or `-1`.
pub fn fs_open(name: &str) -> i32 {
	with_mount(|fs| match fs.open(name) {
		Ok(fd) => fd as i32,
		Err(_) => -1,
	})
}

/// Closes descriptor `fd`. Returns `0`/`-1`.
pub fn fs_close(fd: i32) -> i32 {
	with_fd(fd, |fs, fd| match fs.close(fd) {
		Ok(()) => 0,
		Err(_) => -1,
	})
}

/// Returns the size of the file open on `fd`, or `-1`.
pub fn fs_stat(fd: i32) -> i32 {
	with_fd(fd, |fs, fd| match fs.stat(fd) {
		Ok(size) => size as i32,
		Err(_) => -1,
	})
}

/// Moves `fd`'s cursor to `offset`. Returns `0`/`-1`.
pub fn fs_lseek(fd: i32, offset: u32) -> i32 {
	with_fd(fd, |fs, fd| match fs.lseek(fd, offset) {
		Ok(()) => 0,
		Err(_) => -1,
	})
}

/// Reads up to `buf.len()` bytes from `fd`. Returns the number of bytes
/// transferred, or `-1` if not mounted or `fd` is invalid.
pub fn fs_read(fd: i32, buf: &mut [u8]) -> i32 {
	with_fd(fd, |fs, fd| match fs.read(fd, buf) {
		Ok(n) => n as i32,
		Err(_) => -1,
	})
}

/// Writes `buf` to `fd`. Returns the number of bytes transferred (which may
/// be less than `buf.len()` if the disk is full), or `-1` if not mounted or
/// `fd` is invalid.
pub fn fs_write(fd: i32, buf: &[u8]) -> i32 {
	with_fd(fd, |fs, fd| match fs.write(fd, buf) {
		Ok(n) => n as i32,
		Err(_) => -1,
	})
}

/// Runs `f` against the current mount, returning `-1` if nothing is mounted.
fn with_mount(f: impl FnOnce(&mut FileSystem<FileBlockDevice>) -> i32) -> i32 {
	let mut guard = MOUNT.lock().unwrap();
	match guard.as_mut() {
		Some(fs) => f(fs),
		None => -1,
	}
}

/// Runs `f` against the current mount with a descriptor converted from the
/// facade's `i32` to the handle API's `usize`, returning `-1` on either a
/// missing mount or a negative/out-of-range descriptor.
fn with_fd(fd: i32, f: impl FnOnce(&mut FileSystem<FileBlockDevice>, usize) -> i32) -> i32 {
	let Ok(fd) = usize::try_from(fd) else {
		return -1;
	};
	with_mount(|fs| f(fs, fd))
}
