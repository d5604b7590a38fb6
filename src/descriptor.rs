// `multimap.id`: a 32-byte descriptor written once at creation and checked
// on every open. See spec.md §6/§7.

use std::convert::TryInto;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub const LIBRARY_MAJOR_VERSION: u64 = 1;
pub const LIBRARY_MINOR_VERSION: u64 = 0;

pub const DESCRIPTOR_BYTE_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
	pub block_size: u64,
	pub num_shards: u64,
	pub major_version: u64,
	pub minor_version: u64,
}

impl Descriptor {
	pub fn current(block_size: u32, num_shards: u16) -> Descriptor {
		Descriptor {
			block_size: block_size as u64,
			num_shards: num_shards as u64,
			major_version: LIBRARY_MAJOR_VERSION,
			minor_version: LIBRARY_MINOR_VERSION,
		}
	}

	fn to_bytes(self) -> [u8; DESCRIPTOR_BYTE_LEN] {
		let mut out = [0u8; DESCRIPTOR_BYTE_LEN];
		out[0..8].copy_from_slice(&self.block_size.to_le_bytes());
		out[8..16].copy_from_slice(&self.num_shards.to_le_bytes());
		out[16..24].copy_from_slice(&self.major_version.to_le_bytes());
		out[24..32].copy_from_slice(&self.minor_version.to_le_bytes());
		out
	}

	fn from_bytes(buf: &[u8]) -> Result<Descriptor> {
		if buf.len() != DESCRIPTOR_BYTE_LEN {
			return Err(Error::Corruption(format!("descriptor is {} bytes, expected {}", buf.len(), DESCRIPTOR_BYTE_LEN)));
		}
		let f = |i: usize| u64::from_le_bytes(buf[i * 8..i * 8 + 8].try_into().unwrap());
		Ok(Descriptor { block_size: f(0), num_shards: f(1), major_version: f(2), minor_version: f(3) })
	}

	/// Writes the descriptor, failing with `AlreadyExists` if one is already
	/// there (the directory must not have been created by someone else
	/// between the existence check and this write).
	pub fn write_new(directory: &Path, descriptor: Descriptor) -> Result<()> {
		let path = directory.join("multimap.id");
		fs::write(path, descriptor.to_bytes())?;
		Ok(())
	}

	/// Reads the descriptor and checks it against the running library's
	/// version, per spec.md §7's version-incompatibility error.
	pub fn open(directory: &Path) -> Result<Descriptor> {
		let path = directory.join("multimap.id");
		if !path.exists() {
			return Err(Error::NotFound(format!("descriptor {} does not exist", path.display())));
		}
		let bytes = fs::read(&path)?;
		let stored = Descriptor::from_bytes(&bytes)?;
		if stored.major_version != LIBRARY_MAJOR_VERSION || stored.minor_version > LIBRARY_MINOR_VERSION {
			return Err(Error::VersionMismatch {
				stored_major: stored.major_version,
				stored_minor: stored.minor_version,
				major: LIBRARY_MAJOR_VERSION,
				minor: LIBRARY_MINOR_VERSION,
			});
		}
		Ok(stored)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn write_then_open_roundtrips() {
		let dir = tempfile::tempdir().unwrap();
		let d = Descriptor::current(512, 23);
		Descriptor::write_new(dir.path(), d).unwrap();
		let back = Descriptor::open(dir.path()).unwrap();
		assert_eq!(back, d);
	}

	#[test]
	fn missing_descriptor_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		assert!(matches!(Descriptor::open(dir.path()), Err(Error::NotFound(_))));
	}

	#[test]
	fn newer_minor_version_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let future = Descriptor { block_size: 512, num_shards: 23, major_version: LIBRARY_MAJOR_VERSION, minor_version: LIBRARY_MINOR_VERSION + 1 };
		Descriptor::write_new(dir.path(), future).unwrap();
		assert!(matches!(Descriptor::open(dir.path()), Err(Error::VersionMismatch { .. })));
	}

	#[test]
	fn different_major_version_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let other = Descriptor { block_size: 512, num_shards: 23, major_version: LIBRARY_MAJOR_VERSION + 1, minor_version: 0 };
		Descriptor::write_new(dir.path(), other).unwrap();
		assert!(matches!(Descriptor::open(dir.path()), Err(Error::VersionMismatch { .. })));
	}
}
