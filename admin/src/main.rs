// CLI surface named in spec.md §6 as an external collaborator: stats,
// import, export, optimize, all thin wrappers over the `multimap` library.

mod codec;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::exit;

use structopt::StructOpt;

use multimap::{Map, Options};

#[derive(StructOpt)]
#[structopt(name = "multimap-tool", about = "Inspect and maintain multimap directories")]
enum Command {
	/// Print aggregated stats for a map.
	Stats {
		map: PathBuf,
		/// Print the per-field maximum across shards instead of the sum/weighted-average total.
		#[structopt(long)]
		max: bool,
	},
	/// Import Base64-encoded key/value records into a map.
	Import {
		map: PathBuf,
		path: PathBuf,
		#[structopt(long)]
		create: bool,
		#[structopt(long = "bs", default_value = "512")]
		block_size: u32,
		#[structopt(long = "nshards", default_value = "23")]
		num_shards: u16,
	},
	/// Export every key/value pair as Base64-encoded text.
	Export { map: PathBuf, path: PathBuf },
	/// Rebuild a map into a new directory, defragmenting and collecting garbage.
	Optimize {
		map: PathBuf,
		output: PathBuf,
		#[structopt(long = "bs")]
		block_size: Option<u32>,
		#[structopt(long = "nshards")]
		num_shards: Option<u16>,
	},
}

fn run() -> multimap::Result<()> {
	match Command::from_args() {
		Command::Stats { map, max } => {
			let map = Map::open(&Options::new(&map).read_only(true))?;
			let stats = if max { map.stats_max() } else { map.stats() };
			println!("{{");
			println!("  \"block_size\": {},", stats.block_size);
			println!("  \"num_blocks\": {},", stats.num_blocks);
			println!("  \"num_partitions\": {},", stats.num_partitions);
			println!("  \"num_keys_total\": {},", stats.num_keys_total);
			println!("  \"num_keys_valid\": {},", stats.num_keys_valid);
			println!("  \"num_values_total\": {},", stats.num_values_total);
			println!("  \"num_values_valid\": {},", stats.num_values_valid);
			println!("  \"key_size_avg\": {},", stats.key_size_avg);
			println!("  \"key_size_min\": {},", stats.key_size_min);
			println!("  \"key_size_max\": {},", stats.key_size_max);
			println!("  \"list_size_avg\": {},", stats.list_size_avg);
			println!("  \"list_size_min\": {},", stats.list_size_min);
			println!("  \"list_size_max\": {}", stats.list_size_max);
			println!("}}");
			Ok(())
		}
		Command::Import { map, path, create, block_size, num_shards } => {
			let options = Options::new(&map).create_if_missing(create).block_size(block_size).num_shards(num_shards);
			let map = Map::open(&options)?;
			let file = File::open(&path)?;
			for (lineno, line) in codec::read_lines(BufReader::new(file))?.into_iter().enumerate() {
				match codec::decode_line(&line) {
					Ok(Some((key, values))) => {
						for value in values {
							map.put(&key, &value)?;
						}
					}
					Ok(None) => {}
					Err(e) => {
						log::warn!(target: "multimap-tool", "skipping malformed line {}: {}", lineno + 1, e);
					}
				}
			}
			map.close()
		}
		Command::Export { map, path } => {
			let source = Map::open(&Options::new(&map).read_only(true))?;
			let file = File::create(&path)?;
			let mut out = BufWriter::new(file);
			let mut keys = Vec::new();
			source.for_each_key(|k| keys.push(k.to_vec()));
			for key in &keys {
				let values = source.get(key)?;
				codec::encode_record(&mut out, key, &values)?;
			}
			Ok(())
		}
		Command::Optimize { map, output, block_size, num_shards } => {
			multimap::optimize::optimize(&map, &output, multimap::optimize::OptimizeOptions { block_size, num_shards })
		}
	}
}

fn main() {
	env_logger::init();
	if let Err(e) = run() {
		eprintln!("error: {}", e);
		exit(1);
	}
}
