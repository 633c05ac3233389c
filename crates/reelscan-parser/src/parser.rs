//! Core parsing logic.
//!
//! The parser operates in three phases:
//! 1. strip the extension and any `[SET ...]` markers,
//! 2. tokenize and classify every token (lexer families plus the
//!    configurable keyword tables),
//! 3. extract the title from the leading token run and any secondary
//!    part/episode titles from the text behind their markers.
//!
//! Identical input always yields identical output; there is no I/O here.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::ParserConfig;
use crate::tokenizer::{tokenize, SpannedToken, Token};
use crate::types::{ParsedFilename, SetMarker};

/// Parse a file name with the default configuration.
pub fn parse(file_name: &str) -> ParsedFilename {
    parse_with(&ParserConfig::default(), file_name, true)
}

/// Parse a file or directory name into a [`ParsedFilename`].
///
/// `is_file` controls extension handling: directory units (DVD/BluRay
/// folders) have no extension and report a `DVD` container.
pub fn parse_with(cfg: &ParserConfig, file_name: &str, is_file: bool) -> ParsedFilename {
    let mut out = ParsedFilename::default();

    let mut stem = file_name.to_string();
    if is_file {
        if let Some(i) = file_name.rfind('.') {
            let ext = &file_name[i + 1..];
            if !ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                out.container = ext.to_ascii_uppercase();
                stem.truncate(i);
            }
        }
    } else {
        out.container = "DVD".to_string();
        out.video_source = Some("DVD".to_string());
    }

    let cleaned = extract_sets(&stem, &mut out.sets);
    let tokens = tokenize(&cleaned);

    // First classification pass: populate metadata fields and find where
    // the title run ends (start of the first recognized token).
    let mut title_end: Option<usize> = None;
    let mut part_marker: Option<usize> = None;
    let mut tv_marker: Option<usize> = None;

    for (i, st) in tokens.iter().enumerate() {
        let mut recognized = true;
        match &st.token {
            Token::SeasonEpisode(tag) => {
                let (season, episodes) = parse_season_episode(tag);
                if out.season.is_none() {
                    out.season = season;
                    out.episodes = episodes;
                    tv_marker = Some(i);
                }
            }
            Token::PartNumber(tag) => {
                if out.part.is_none() {
                    out.part = trailing_number(tag);
                    part_marker = Some(i);
                }
            }
            Token::Resolution(s) => {
                out.hd_resolution.get_or_insert_with(|| s.to_ascii_lowercase());
            }
            Token::Fps(s) => {
                if out.fps.is_none() {
                    out.fps = s
                        .chars()
                        .filter(|c| c.is_ascii_digit())
                        .collect::<String>()
                        .parse()
                        .ok();
                }
            }
            Token::VideoCodec(s) => {
                out.video_codec.get_or_insert_with(|| canonical_video_codec(s));
            }
            Token::AudioCodec(s) => {
                out.audio_codec
                    .get_or_insert_with(|| s.to_ascii_uppercase().replace('-', ""));
            }
            Token::VideoSource(s) => {
                out.video_source.get_or_insert_with(|| canonical_source(s));
            }
            Token::Edition(s) => {
                out.edition.get_or_insert_with(|| clean_fragment(s));
            }
            Token::Year(s) => {
                if out.year.is_none() {
                    out.year = s.parse().ok();
                }
            }
            Token::Word(w) => {
                if cfg.is_extras_keyword(w) {
                    out.extra = true;
                } else if cfg.is_skip_keyword(w) {
                    // noise, excluded from the title
                } else if w.eq_ignore_ascii_case("ts") {
                    out.video_source.get_or_insert_with(|| "TS".to_string());
                } else if w.eq_ignore_ascii_case("hd") {
                    out.hd_resolution.get_or_insert_with(|| "HD".to_string());
                } else if cfg.language_detection && cfg.decode_language(w).is_some() {
                    let label = cfg.decode_language(w).unwrap().to_string();
                    if !out.languages.contains(&label) {
                        out.languages.push(label);
                    }
                } else {
                    recognized = false;
                }
            }
            Token::OpenBracket => {
                // bracketed groups never contribute to the title
            }
            Token::Dot
            | Token::Hyphen
            | Token::Underscore
            | Token::Comma
            | Token::CloseBracket
            | Token::OpenParen
            | Token::CloseParen
            | Token::Number(_) => {
                recognized = false;
            }
        }
        if recognized && title_end.is_none() {
            title_end = Some(st.span.start);
        }
    }

    let end = title_end.unwrap_or(cleaned.len());
    out.title = normalize_case(&clean_fragment(&cleaned[..end]));

    if let Some(i) = part_marker {
        out.part_title = secondary_title(&tokens, i);
    }
    if let Some(i) = tv_marker {
        out.episode_title = secondary_title(&tokens, i);
    }

    out
}

/// Extract `[SET name-index]` markers, returning the input with the
/// markers removed.
fn extract_sets(input: &str, sets: &mut Vec<SetMarker>) -> String {
    static SET_RE: OnceLock<Regex> = OnceLock::new();
    static INDEX_RE: OnceLock<Regex> = OnceLock::new();
    let set_re = SET_RE.get_or_init(|| Regex::new(r"\[SET ([^\[\]]*)\]").expect("set pattern"));
    let index_re =
        INDEX_RE.get_or_init(|| Regex::new(r"-\s*(\d+)\s*$").expect("set index pattern"));

    for cap in set_re.captures_iter(input) {
        let mut title = cap[1].to_string();
        let mut index = None;
        if let Some(m) = index_re.captures(&title.clone()) {
            index = m[1].parse().ok();
            title.truncate(m.get(0).expect("whole match").start());
        }
        sets.push(SetMarker {
            title: title.trim().to_string(),
            index,
        });
    }
    set_re.replace_all(input, " ").into_owned()
}

/// Season + episode numbers from a tag like `S01E02E03` or `1x03`.
fn parse_season_episode(tag: &str) -> (Option<u16>, Vec<u16>) {
    let lower = tag.to_ascii_lowercase();
    let body = lower.strip_prefix('s').unwrap_or(&lower);

    let mut numbers: Vec<u16> = Vec::new();
    let mut current = String::new();
    for ch in body.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if (ch == 'e' || ch == 'x') && !current.is_empty() {
            if let Ok(n) = current.parse() {
                numbers.push(n);
            }
            current.clear();
        }
    }
    if !current.is_empty() {
        if let Ok(n) = current.parse() {
            numbers.push(n);
        }
    }

    match numbers.split_first() {
        Some((season, episodes)) => (Some(*season), episodes.to_vec()),
        None => (None, Vec::new()),
    }
}

fn trailing_number(tag: &str) -> Option<u32> {
    let digits: String = tag.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn canonical_video_codec(token: &str) -> String {
    let lower = token.to_ascii_lowercase();
    if lower.contains("265") || lower.contains("hevc") {
        "H.265".to_string()
    } else if lower.contains("264") || lower.contains("avc") {
        "H.264".to_string()
    } else if lower.contains("xvid") {
        "XviD".to_string()
    } else if lower.contains("divx") {
        "DivX".to_string()
    } else if lower.contains("av1") {
        "AV1".to_string()
    } else {
        "VP9".to_string()
    }
}

/// Map a raw source keyword onto its canonical label, folding the alias
/// families the lexer accepts (BDRIP and BLU-RAY are both BluRay, etc.).
fn canonical_source(token: &str) -> String {
    let lower = token.to_ascii_lowercase();
    if lower.contains("blu") || lower == "bdrip" {
        "BluRay".to_string()
    } else if lower.contains("hd-dvd") || lower.contains("hddvd") {
        "HDDVD".to_string()
    } else if lower == "dvdscr" {
        "DVDSCR".to_string()
    } else if lower == "dvdrip" || lower == "dvdr" {
        "DVDRip".to_string()
    } else if lower == "dvd5" || lower == "dvd9" || lower == "dvd" {
        lower.to_ascii_uppercase()
    } else if lower == "tvrip" || lower == "pal" || lower == "ntsc" || lower == "sdtv" {
        "SDTV".to_string()
    } else if lower.starts_with("web-dl") || lower == "webdl" {
        "WEB-DL".to_string()
    } else if lower == "webrip" {
        "WEBRip".to_string()
    } else if lower == "vhsrip" {
        "VHSRip".to_string()
    } else if lower.starts_with("dth") || lower.starts_with("d-theater") {
        "D-THEATER".to_string()
    } else {
        token.to_ascii_uppercase()
    }
}

/// Replace divider characters with spaces and collapse runs, trimming
/// trailing dashes left over from cut markers.
fn clean_fragment(fragment: &str) -> String {
    let mut cleaned = String::with_capacity(fragment.len());
    let mut last_space = true;
    for ch in fragment.chars() {
        let mapped = match ch {
            '.' | '_' | '[' | ']' | '(' | ')' | ',' => ' ',
            other => other,
        };
        if mapped == ' ' {
            if !last_space {
                cleaned.push(' ');
            }
            last_space = true;
        } else {
            cleaned.push(mapped);
            last_space = false;
        }
    }
    cleaned.trim().trim_end_matches('-').trim().to_string()
}

/// Title-case an all-lowercase title; leave mixed-case input untouched.
fn normalize_case(title: &str) -> String {
    if title.chars().any(|c| c.is_uppercase()) {
        return title.to_string();
    }
    title
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title text behind a part or episode marker: a dash followed by a run
/// of plain words, e.g. `Show.S01E04.-.The.One.With.The.Thing`.
fn secondary_title(tokens: &[SpannedToken<'_>], marker: usize) -> Option<String> {
    let mut i = marker + 1;
    // skip separators up to the dash
    while i < tokens.len()
        && matches!(
            tokens[i].token,
            Token::Dot | Token::Underscore | Token::Comma | Token::CloseParen | Token::CloseBracket
        )
    {
        i += 1;
    }
    if i >= tokens.len() || !matches!(tokens[i].token, Token::Hyphen) {
        return None;
    }
    i += 1;

    let mut words: Vec<&str> = Vec::new();
    while i < tokens.len() {
        match &tokens[i].token {
            Token::Word(w) => words.push(w),
            Token::Number(n) => words.push(n),
            Token::Dot | Token::Underscore | Token::Comma => {}
            _ => break,
        }
        i += 1;
    }
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}
