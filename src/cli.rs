use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "volread")]
#[command(version)]
#[command(about = "Read a file split across several parts as one stream", long_about = None)]
#[command(after_help = "Parts are given in order as PATH_OR_URL[@BASE[+SIZE]].\n\n\
Examples:\n  \
  volread movie.001 movie.002 movie.003 > movie.mkv    join three parts\n  \
  volread -s 1048576 -n 4096 a.r00 a.r01                read 4 KiB at 1 MiB\n  \
  volread --info vol1.rar@7012+1000000 vol2.rar@45      show the part table\n  \
  volread --locate 5000000 https://example.com/part1 https://example.com/part2")]
pub struct Cli {
    /// Parts of the virtual file, in order
    #[arg(value_name = "PART", required = true)]
    pub parts: Vec<PartArg>,

    /// Print the virtual file's length and part table
    #[arg(short = 'i', long)]
    pub info: bool,

    /// Print which part holds a virtual offset
    #[arg(long, value_name = "OFFSET")]
    pub locate: Option<u64>,

    /// Virtual offset to start reading at
    #[arg(short = 's', long, default_value_t = 0)]
    pub offset: u64,

    /// Number of bytes to read (default: to the end)
    #[arg(short = 'n', long)]
    pub length: Option<u64>,

    /// Write to this file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Bytes per read request
    #[arg(long, default_value_t = 64 * 1024)]
    pub chunk: usize,

    /// Read requests kept outstanding
    #[arg(long, default_value_t = 4)]
    pub in_flight: usize,

    /// Required alignment of offsets, lengths and buffers
    #[arg(long, default_value_t = 1)]
    pub align: usize,

    /// Give up on a read after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Read each part in turn instead of queueing overlapped reads
    #[arg(long)]
    pub sync: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            alignment: self.align,
            wait_timeout: self.timeout_ms.map(Duration::from_millis),
            chunk_size: self.chunk,
            max_in_flight: self.in_flight,
        }
    }
}

/// One part on the command line: a source plus an optional window into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartArg {
    pub source: String,
    pub base: u64,
    pub size: Option<u64>,
}

impl PartArg {
    pub fn is_http_url(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }
}

/// Parses `BASE` or `BASE+SIZE`.
fn parse_window(window: &str) -> Option<(u64, Option<u64>)> {
    match window.split_once('+') {
        Some((base, size)) => Some((base.parse().ok()?, Some(size.parse().ok()?))),
        None => Some((window.parse().ok()?, None)),
    }
}

impl FromStr for PartArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty part".into());
        }

        // A trailing `@...` that is not a window belongs to the source,
        // e.g. `https://user@host/part`.
        if let Some((source, window)) = s.rsplit_once('@')
            && let Some((base, size)) = parse_window(window)
        {
            if source.is_empty() {
                return Err(format!("part `{s}` has no source"));
            }
            return Ok(Self {
                source: source.to_string(),
                base,
                size,
            });
        }

        Ok(Self {
            source: s.to_string(),
            base: 0,
            size: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_part_windows() {
        assert_eq!(
            "vol1.rar@7012+1000".parse::<PartArg>().unwrap(),
            PartArg {
                source: "vol1.rar".into(),
                base: 7012,
                size: Some(1000),
            }
        );
        assert_eq!(
            "vol2.rar@45".parse::<PartArg>().unwrap(),
            PartArg {
                source: "vol2.rar".into(),
                base: 45,
                size: None,
            }
        );
        assert_eq!("movie.001".parse::<PartArg>().unwrap().base, 0);
    }

    #[test]
    fn at_sign_in_a_url_is_not_a_window() {
        let part: PartArg = "https://user@example.com/part1".parse().unwrap();
        assert_eq!(part.source, "https://user@example.com/part1");
        assert!(part.is_http_url());
        assert!("@12".parse::<PartArg>().is_err());
    }

    #[test]
    fn flags_map_onto_engine_config() {
        let cli = Cli::parse_from([
            "volread", "--align", "512", "--chunk", "4096", "--timeout-ms", "250", "a", "b",
        ]);
        let config = cli.engine_config();

        assert_eq!(cli.parts.len(), 2);
        assert_eq!(config.alignment, 512);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.wait_timeout, Some(Duration::from_millis(250)));
    }
}
