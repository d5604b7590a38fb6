// Error kinds surfaced by the multimap engine. See spec.md §7.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Map directory, descriptor, or map file missing where one was required.
	NotFound(String),
	/// A map already exists where `error_if_exists` forbade it.
	AlreadyExists(String),
	/// Descriptor/stats/map files are inconsistent with each other or with
	/// the library, or a store file's length isn't a multiple of its block size.
	Corruption(String),
	/// Key or value exceeds a size limit, or a configuration value is invalid.
	InvalidArgument(String),
	/// Low-level file I/O failure. Propagated unmodified.
	Io(std::io::Error),
	/// A mutating operation was attempted on a read-only-opened map.
	Concurrency(String),
	/// Descriptor major/minor version incompatible with this library.
	VersionMismatch { stored_major: u64, stored_minor: u64, major: u64, minor: u64 },
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::NotFound(s) => write!(f, "not found: {}", s),
			Error::AlreadyExists(s) => write!(f, "already exists: {}", s),
			Error::Corruption(s) => write!(f, "corruption: {}", s),
			Error::InvalidArgument(s) => write!(f, "invalid argument: {}", s),
			Error::Io(e) => write!(f, "io error: {}", e),
			Error::Concurrency(s) => write!(f, "concurrency error: {}", s),
			Error::VersionMismatch { stored_major, stored_minor, major, minor } => write!(
				f,
				"version mismatch: stored {}.{}, library supports up to {}.{}",
				stored_major, stored_minor, major, minor,
			),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::Io(e)
	}
}
