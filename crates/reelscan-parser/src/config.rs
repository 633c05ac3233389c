//! Parser configuration: keyword families that sites and users tune.
//!
//! The lexer handles the fixed token families (years, resolutions, codec
//! and source keywords); everything that is configurable at runtime --
//! extras markers, noise keywords, the language alias table -- lives here.

use serde::{Deserialize, Serialize};

/// One canonical language label plus the tokens that map to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageEntry {
    /// Canonical label, e.g. "English".
    pub label: String,
    /// Tokens recognized for this label, matched case-insensitively
    /// against whole filename tokens.
    pub tokens: Vec<String>,
}

/// Tunable keyword families used by [`parse_with`](crate::parse_with).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Tokens that mark a file as a non-primary extra (trailer etc.).
    pub extras_keywords: Vec<String>,
    /// Noise tokens stripped before title extraction (release tags).
    pub skip_keywords: Vec<String>,
    /// Disable to skip the language pass entirely.
    pub language_detection: bool,
    /// Alias table mapping filename tokens to canonical language labels.
    pub languages: Vec<LanguageEntry>,
}

impl ParserConfig {
    /// Map a single token to a canonical language label, if recognized.
    ///
    /// Unknown tokens yield `None`; the parser drops them rather than
    /// guessing.
    pub fn decode_language(&self, token: &str) -> Option<&str> {
        for entry in &self.languages {
            if entry.tokens.iter().any(|t| t.eq_ignore_ascii_case(token)) {
                return Some(&entry.label);
            }
        }
        None
    }

    pub fn is_extras_keyword(&self, token: &str) -> bool {
        self.extras_keywords
            .iter()
            .any(|k| k.eq_ignore_ascii_case(token))
    }

    pub fn is_skip_keyword(&self, token: &str) -> bool {
        self.skip_keywords
            .iter()
            .any(|k| k.eq_ignore_ascii_case(token))
    }
}

fn lang(label: &str, tokens: &str) -> LanguageEntry {
    LanguageEntry {
        label: label.to_string(),
        tokens: tokens.split(' ').map(str::to_string).collect(),
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            extras_keywords: vec![
                "trailer".to_string(),
                "featurette".to_string(),
                "sample".to_string(),
            ],
            skip_keywords: vec![
                "limited".to_string(),
                "proper".to_string(),
                "repack".to_string(),
                "internal".to_string(),
                "readnfo".to_string(),
                "stv".to_string(),
                "ws".to_string(),
            ],
            language_detection: true,
            languages: vec![
                lang("Chinese", "ZH CHI CHINESE"),
                lang("Dual Language", "DL"),
                lang("English", "ENG EN ENGLISH"),
                lang("French", "FRA FR FRENCH VF"),
                lang("German", "GER DE GERMAN"),
                lang("Hebrew", "HEB HE HEBREW HEBDUB"),
                lang("Hindi", "HI HIN HINDI"),
                lang("Hungarian", "HUN HU HUNGARIAN"),
                lang("Italian", "ITA IT ITALIAN"),
                lang("Japanese", "JPN JP JAPANESE"),
                lang("Norwegian", "NOR NORWEGIAN"),
                lang("Polish", "POL PL POLISH PLDUB"),
                lang("Portuguese", "POR PT PORTUGUESE"),
                lang("Russian", "RUS RU RUSSIAN"),
                lang("Spanish", "SPA ES SPANISH"),
                lang("Swedish", "SV SWE SWEDISH"),
                lang("Thai", "TH THA THAI"),
                lang("VO", "VO VOSTFR"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_known_abbreviations() {
        let cfg = ParserConfig::default();
        assert_eq!(cfg.decode_language("FR"), Some("French"));
        assert_eq!(cfg.decode_language("vostfr"), Some("VO"));
        assert_eq!(cfg.decode_language("german"), Some("German"));
    }

    #[test]
    fn unknown_token_is_dropped() {
        let cfg = ParserConfig::default();
        assert_eq!(cfg.decode_language("klingon"), None);
    }
}
