//! Deterministic filename parser for video libraries.
//!
//! Derives draft metadata (title, year, season/episode numbers, part
//! ordinals, codec/source/edition keywords, languages, set markers) from
//! release-style file and directory names. The parser never touches the
//! filesystem: the same name always parses to the same result.
//!
//! ```
//! let parsed = reelscan_parser::parse("Inception (2010) part2 1080p.mkv");
//! assert_eq!(parsed.title, "Inception");
//! assert_eq!(parsed.year, Some(2010));
//! assert_eq!(parsed.part, Some(2));
//! ```

mod config;
mod parser;
mod tokenizer;
mod types;

pub use config::{LanguageEntry, ParserConfig};
pub use parser::{parse, parse_with};
pub use tokenizer::{tokenize, SpannedToken, Token};
pub use types::{ParsedFilename, SetMarker};
