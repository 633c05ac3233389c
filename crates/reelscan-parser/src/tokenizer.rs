//! Logos-based tokenizer for video file names.
//!
//! Each variant of [`Token`] corresponds to a keyword family commonly found
//! in released video files. Keyword patterns are case-insensitive; maximal
//! munch keeps short codes (DD, TS) from firing inside ordinary words.

use logos::Logos;

/// Token types emitted by the lexer.
///
/// Variants are ordered by specificity -- more specific patterns carry
/// higher priorities so they win when several regexes could match the same
/// span. In particular `Resolution` outranks `Year` so the "1080" inside
/// "1080p" is never mistaken for a year.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
pub enum Token<'src> {
    /// Season/episode tag: S01E01, S01E01E02, 1x03, s2x01.
    #[regex(r"(?i)s\d{1,4}[ex]\d{1,3}([ex]\d{1,3})*", priority = 12)]
    #[regex(r"(?i)\d{1,2}x\d{1,3}(x\d{1,3})*", priority = 11)]
    SeasonEpisode(&'src str),

    /// Multi-part marker: CD2, DISC 1, DISK3, PART02.
    #[regex(r"(?i)(cd|disc|disk|part)[ ._-]?\d{1,3}", priority = 10)]
    PartNumber(&'src str),

    /// Video resolution: 2160p, 1080i, 720p, 480p.
    #[regex(r"(?i)(2160|1080|720|480)[pi]", priority = 10)]
    Resolution(&'src str),

    /// Frame rate: 25p, p25, 23p ... only the rates seen in the wild.
    #[regex(r"(?i)(23|24|25|29|30|50|59|60)p", priority = 9)]
    #[regex(r"(?i)p(23|24|25|29|30|50|59|60)", priority = 9)]
    Fps(&'src str),

    /// Video codec keyword.
    #[regex(r"(?i)(x|h)\.?26[45]|xvid|divx6?|hevc|avc|av1|vp9", priority = 8)]
    VideoCodec(&'src str),

    /// Audio codec keyword.
    #[regex(r"(?i)ac-?3|dts|aac|truehd|flac|dd", priority = 7)]
    AudioCodec(&'src str),

    /// Video source keyword (BluRay, DVDRip, HDTV, ...).
    #[regex(
        r"(?i)blu-?ray(rip)?|bdrip|hd-?dvd(rip)?|dvdrip|dvdscr|dvd[59]?|dvdr|hdtv|pdtv|sdtv|tvrip|pal|ntsc|web-?dl|webrip|vhsrip|mvcd|vcd|cam|r5|line|dsrip|hrhdtv|hd2dvd|d-?theater|dth",
        priority = 8
    )]
    VideoSource(&'src str),

    /// Edition marker.
    #[regex(
        r"(?i)directors?[ ._'-]*cut|special[ ._-]*edition|extended|unrated|remastered|theatrical|imax",
        priority = 8
    )]
    Edition(&'src str),

    /// Four-digit year 1900-2099.
    #[regex(r"(19|20)\d{2}", priority = 5)]
    Year(&'src str),

    #[token(".")]
    Dot,
    #[token("-")]
    Hyphen,
    #[token("_")]
    Underscore,
    #[token(",")]
    Comma,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,

    /// Anything not matched above.
    #[regex(r"[a-zA-Z][a-zA-Z0-9']*", priority = 1)]
    Word(&'src str),

    #[regex(r"\d+", priority = 2)]
    Number(&'src str),
}

/// A token together with the byte span it occupies in the input.
#[derive(Debug, Clone)]
pub struct SpannedToken<'src> {
    pub token: Token<'src>,
    pub span: std::ops::Range<usize>,
}

/// Tokenize an input string into spanned tokens, dropping lex errors.
pub fn tokenize(input: &str) -> Vec<SpannedToken<'_>> {
    Token::lexer(input)
        .spanned()
        .filter_map(|(result, span)| result.ok().map(|token| SpannedToken { token, span }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_not_taken_from_resolution() {
        let tokens = tokenize("Inception.2010.1080p");
        let years: Vec<_> = tokens
            .iter()
            .filter(|t| matches!(t.token, Token::Year(_)))
            .collect();
        assert_eq!(years.len(), 1);
        assert!(matches!(years[0].token, Token::Year("2010")));
        assert!(tokens
            .iter()
            .any(|t| matches!(t.token, Token::Resolution("1080p"))));
    }

    #[test]
    fn part_marker() {
        let tokens = tokenize("Movie part2 1080p");
        assert!(tokens
            .iter()
            .any(|t| matches!(t.token, Token::PartNumber("part2"))));
    }

    #[test]
    fn multi_episode_tag() {
        let tokens = tokenize("Show.S02E03E04");
        let se = tokens
            .iter()
            .find(|t| matches!(t.token, Token::SeasonEpisode(_)))
            .expect("season/episode tag");
        assert!(matches!(se.token, Token::SeasonEpisode("S02E03E04")));
    }

    #[test]
    fn short_codes_do_not_fire_inside_words() {
        let tokens = tokenize("Daddy.Day.Care.2003");
        assert!(!tokens
            .iter()
            .any(|t| matches!(t.token, Token::AudioCodec(_))));
    }

    #[test]
    fn source_keyword() {
        let tokens = tokenize("Movie.2001.DVDRip.XviD");
        assert!(tokens
            .iter()
            .any(|t| matches!(t.token, Token::VideoSource("DVDRip"))));
        assert!(tokens
            .iter()
            .any(|t| matches!(t.token, Token::VideoCodec("XviD"))));
    }
}
