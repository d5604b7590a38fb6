// Base64 import/export text format: one logical record per line,
// `<base64(key)> TAB <base64(value1)> TAB <base64(value2)> ...`.
// See spec.md §6.

use std::io::{self, BufRead, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn encode_record(out: &mut impl Write, key: &[u8], values: &[Vec<u8>]) -> io::Result<()> {
	write!(out, "{}", STANDARD.encode(key))?;
	for value in values {
		write!(out, "\t{}", STANDARD.encode(value))?;
	}
	writeln!(out)
}

/// One decoded `<key, values>` line, or `None` for a blank line.
pub fn decode_line(line: &str) -> Result<Option<(Vec<u8>, Vec<Vec<u8>>)>, String> {
	let line = line.trim_end_matches(['\r', '\n']);
	if line.is_empty() {
		return Ok(None);
	}
	let mut fields = line.split('\t');
	let key_field = fields.next().ok_or("empty record")?;
	let key = STANDARD.decode(key_field).map_err(|e| format!("invalid base64 key: {}", e))?;
	let mut values = Vec::new();
	for value_field in fields {
		if value_field.is_empty() {
			continue;
		}
		values.push(STANDARD.decode(value_field).map_err(|e| format!("invalid base64 value: {}", e))?);
	}
	Ok(Some((key, values)))
}

pub fn read_lines(reader: impl BufRead) -> io::Result<Vec<String>> {
	reader.lines().collect()
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn roundtrip_one_record() {
		let mut buf = Vec::new();
		encode_record(&mut buf, b"key", &[b"v1".to_vec(), b"v2".to_vec()]).unwrap();
		let text = String::from_utf8(buf).unwrap();
		let (key, values) = decode_line(&text).unwrap().unwrap();
		assert_eq!(key, b"key");
		assert_eq!(values, vec![b"v1".to_vec(), b"v2".to_vec()]);
	}

	#[test]
	fn blank_line_decodes_to_none() {
		assert_eq!(decode_line(""), Ok(None));
		assert_eq!(decode_line("\n"), Ok(None));
	}

	#[test]
	fn key_with_no_values() {
		let mut buf = Vec::new();
		encode_record(&mut buf, b"onlykey", &[]).unwrap();
		let text = String::from_utf8(buf).unwrap();
		let (key, values) = decode_line(&text).unwrap().unwrap();
		assert_eq!(key, b"onlykey");
		assert!(values.is_empty());
	}
}
