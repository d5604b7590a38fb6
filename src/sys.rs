// Platform-specific positioned file I/O, following the same cfg(unix)/
// cfg(windows) split the teacher uses for its value table reads/writes.

use std::fs::File;
use std::io::Result;

#[cfg(unix)]
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
	use std::os::unix::fs::FileExt;
	file.write_all_at(buf, offset)
}

#[cfg(windows)]
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
	use std::os::windows::fs::FileExt;
	let mut written = 0;
	while written < buf.len() {
		written += file.seek_write(&buf[written..], offset + written as u64)?;
	}
	Ok(())
}
