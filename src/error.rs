//! Error type for the handle-based API.
//!
//! The free-function facade in [`crate::facade`] collapses every variant down
//! to the POSIX-style `-1` the original interface returns; callers going
//! through [`crate::FileSystem`] directly get to match on the reason.

use std::fmt;
use std::io;

/// Something that went wrong while operating on a mounted filesystem.
#[derive(Debug)]
pub enum FsError {
	/// A filename was empty, longer than [`crate::directory::MAX_FILENAME_LEN`]
	/// bytes, or otherwise malformed.
	InvalidName,
	/// `create` was called with a name already present in the root directory.
	DuplicateName,
	/// `create` was called with the root directory already full.
	DirectoryFull,
	/// The named file does not exist.
	NotFound,
	/// `open` was called with all 32 descriptor slots already in use.
	TooManyOpenFiles,
	/// A descriptor was out of range or not currently open.
	BadDescriptor,
	/// `lseek` was called with an offset past the end of the file.
	OffsetOutOfRange,
	/// The on-disk signature did not match, or the geometry fields were
	/// inconsistent with the device's block count.
	NotAFilesystem,
	/// The underlying block device failed.
	Io(io::Error),
}

impl fmt::Display for FsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::InvalidName => write!(f, "invalid filename"),
			Self::DuplicateName => write!(f, "a file with that name already exists"),
			Self::DirectoryFull => write!(f, "root directory is full"),
			Self::NotFound => write!(f, "no such file"),
			Self::TooManyOpenFiles => write!(f, "too many open files"),
			Self::BadDescriptor => write!(f, "bad file descriptor"),
			Self::OffsetOutOfRange => write!(f, "offset past end of file"),
			Self::NotAFilesystem => write!(f, "device does not contain a valid filesystem"),
			Self::Io(e) => write!(f, "I/O error: {e}"),
		}
	}
}

impl std::error::Error for FsError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for FsError {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}
