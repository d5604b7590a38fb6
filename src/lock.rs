// Process-exclusive directory lock: `multimap.lock`, the top of the lock
// hierarchy (spec.md §5 level 1). Grounded on the teacher's `fs2`
// dependency, carried for exactly this purpose.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct DirectoryLock {
	file: std::fs::File,
}

impl DirectoryLock {
	pub fn acquire(directory: &Path) -> Result<DirectoryLock> {
		let path = directory.join("multimap.lock");
		let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
		file.try_lock_exclusive().map_err(|_| {
			Error::Concurrency(format!("directory {} is locked by another process", directory.display()))
		})?;
		file.set_len(0)?;
		write!(file, "{}", std::process::id())?;
		file.sync_all()?;
		Ok(DirectoryLock { file })
	}
}

impl Drop for DirectoryLock {
	fn drop(&mut self) {
		let _ = FileExt::unlock(&self.file);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn second_lock_in_same_process_fails() {
		let dir = tempfile::tempdir().unwrap();
		let first = DirectoryLock::acquire(dir.path()).unwrap();
		let second = DirectoryLock::acquire(dir.path());
		assert!(matches!(second, Err(Error::Concurrency(_))));
		drop(first);
		assert!(DirectoryLock::acquire(dir.path()).is_ok());
	}
}
