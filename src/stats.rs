// Per-partition aggregated counters, persisted alongside the map file.
// Field order and `total`/`max` reduction rules follow the 13-field
// layout and semantics of the original Stats struct. See spec.md §3/§4.10.

use std::convert::TryInto;

use crate::error::{Error, Result};

pub const STATS_BYTE_LEN: usize = 13 * 8;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Stats {
	pub block_size: u64,
	pub key_size_avg: u64,
	pub key_size_max: u64,
	pub key_size_min: u64,
	pub list_size_avg: u64,
	pub list_size_max: u64,
	pub list_size_min: u64,
	pub num_blocks: u64,
	pub num_keys_total: u64,
	pub num_keys_valid: u64,
	pub num_values_total: u64,
	pub num_values_valid: u64,
	pub num_partitions: u64,
}

impl Stats {
	pub fn to_bytes(&self) -> [u8; STATS_BYTE_LEN] {
		let mut out = [0u8; STATS_BYTE_LEN];
		let fields = [
			self.block_size,
			self.key_size_avg,
			self.key_size_max,
			self.key_size_min,
			self.list_size_avg,
			self.list_size_max,
			self.list_size_min,
			self.num_blocks,
			self.num_keys_total,
			self.num_keys_valid,
			self.num_values_total,
			self.num_values_valid,
			self.num_partitions,
		];
		for (i, f) in fields.iter().enumerate() {
			out[i * 8..i * 8 + 8].copy_from_slice(&f.to_le_bytes());
		}
		out
	}

	pub fn from_bytes(buf: &[u8]) -> Result<Stats> {
		if buf.len() != STATS_BYTE_LEN {
			return Err(Error::Corruption(format!("stats record is {} bytes, expected {}", buf.len(), STATS_BYTE_LEN)));
		}
		let f = |i: usize| u64::from_le_bytes(buf[i * 8..i * 8 + 8].try_into().unwrap());
		Ok(Stats {
			block_size: f(0),
			key_size_avg: f(1),
			key_size_max: f(2),
			key_size_min: f(3),
			list_size_avg: f(4),
			list_size_max: f(5),
			list_size_min: f(6),
			num_blocks: f(7),
			num_keys_total: f(8),
			num_keys_valid: f(9),
			num_values_total: f(10),
			num_values_valid: f(11),
			num_partitions: f(12),
		})
	}

	/// Sums counters across partitions; mins/maxes ignore zero ("no data")
	/// entries; averages are weighted by each partition's valid key count.
	pub fn total(stats: &[Stats]) -> Stats {
		let mut total = Stats::default();
		for s in stats {
			if total.block_size == 0 {
				total.block_size = s.block_size;
			}
			total.key_size_max = total.key_size_max.max(s.key_size_max);
			if s.key_size_min != 0 {
				total.key_size_min = if total.key_size_min != 0 { total.key_size_min.min(s.key_size_min) } else { s.key_size_min };
			}
			total.list_size_max = total.list_size_max.max(s.list_size_max);
			if s.list_size_min != 0 {
				total.list_size_min = if total.list_size_min != 0 { total.list_size_min.min(s.list_size_min) } else { s.list_size_min };
			}
			total.num_blocks += s.num_blocks;
			total.num_keys_total += s.num_keys_total;
			total.num_keys_valid += s.num_keys_valid;
			total.num_values_total += s.num_values_total;
			total.num_values_valid += s.num_values_valid;
		}
		if total.num_keys_valid != 0 {
			let mut key_size_avg = 0.0f64;
			let mut list_size_avg = 0.0f64;
			for s in stats {
				let w = s.num_keys_valid as f64 / total.num_keys_valid as f64;
				key_size_avg += w * s.key_size_avg as f64;
				list_size_avg += w * s.list_size_avg as f64;
			}
			total.key_size_avg = key_size_avg.round() as u64;
			total.list_size_avg = list_size_avg.round() as u64;
		}
		total.num_partitions = stats.len() as u64;
		total
	}

	/// Per-field maximum across partitions (mins still ignore zero entries).
	pub fn max(stats: &[Stats]) -> Stats {
		let mut max = Stats::default();
		for s in stats {
			max.block_size = max.block_size.max(s.block_size);
			max.key_size_avg = max.key_size_avg.max(s.key_size_avg);
			max.key_size_max = max.key_size_max.max(s.key_size_max);
			if s.key_size_min != 0 {
				max.key_size_min = max.key_size_min.max(s.key_size_min);
			}
			max.list_size_avg = max.list_size_avg.max(s.list_size_avg);
			max.list_size_max = max.list_size_max.max(s.list_size_max);
			if s.list_size_min != 0 {
				max.list_size_min = max.list_size_min.max(s.list_size_min);
			}
			max.num_blocks = max.num_blocks.max(s.num_blocks);
			max.num_keys_total = max.num_keys_total.max(s.num_keys_total);
			max.num_keys_valid = max.num_keys_valid.max(s.num_keys_valid);
			max.num_values_total = max.num_values_total.max(s.num_values_total);
			max.num_values_valid = max.num_values_valid.max(s.num_values_valid);
		}
		max
	}
}

/// Accumulates min/max/avg-ready running sums while walking a partition's
/// keys once; `finish` folds them into a [`Stats`] record.
#[derive(Default)]
pub struct StatsBuilder {
	pub block_size: u64,
	finished_num_blocks: u64,
	num_keys_total: u64,
	num_keys_valid: u64,
	num_values_total: u64,
	num_values_valid: u64,
	key_size_min: u64,
	key_size_max: u64,
	key_size_sum: u64,
	list_size_min: u64,
	list_size_max: u64,
	list_size_sum: u64,
}

impl StatsBuilder {
	pub fn new(block_size: u64) -> StatsBuilder {
		StatsBuilder { block_size, ..Default::default() }
	}

	pub fn add_key(&mut self, key_len: u64, num_values_total: u64, num_values_valid: u64) {
		self.num_keys_total += 1;
		self.num_values_total += num_values_total;
		self.num_values_valid += num_values_valid;
		if num_values_valid > 0 {
			self.num_keys_valid += 1;
			self.key_size_min = if self.key_size_min != 0 { self.key_size_min.min(key_len) } else { key_len };
			self.key_size_max = self.key_size_max.max(key_len);
			self.key_size_sum += key_len;
			self.list_size_min = if self.list_size_min != 0 { self.list_size_min.min(num_values_valid) } else { num_values_valid };
			self.list_size_max = self.list_size_max.max(num_values_valid);
			self.list_size_sum += num_values_valid;
		}
	}

	pub fn num_blocks(mut self, num_blocks: u64) -> StatsBuilder {
		self.finished_num_blocks = num_blocks;
		self
	}

	pub fn finish(self) -> Stats {
		let key_size_avg = if self.num_keys_valid > 0 { self.key_size_sum / self.num_keys_valid } else { 0 };
		let list_size_avg = if self.num_keys_valid > 0 { self.list_size_sum / self.num_keys_valid } else { 0 };
		Stats {
			block_size: self.block_size,
			key_size_avg,
			key_size_max: self.key_size_max,
			key_size_min: self.key_size_min,
			list_size_avg,
			list_size_max: self.list_size_max,
			list_size_min: self.list_size_min,
			num_blocks: self.finished_num_blocks,
			num_keys_total: self.num_keys_total,
			num_keys_valid: self.num_keys_valid,
			num_values_total: self.num_values_total,
			num_values_valid: self.num_values_valid,
			num_partitions: 1,
		}
	}
}
