//! Term normalization: case fold, diacritic strip, romanized-Urdu transliteration.

use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Turns free text into a canonical token sequence.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Romanized token -> native-script tokens.
    transliteration: HashMap<String, Vec<String>>,
}

impl Normalizer {
    pub fn new(table: &HashMap<String, String>) -> Self {
        let transliteration = table
            .iter()
            .map(|(roman, native)| {
                let key = fold(roman);
                let value = fold(native).split_whitespace().map(String::from).collect();
                (key, value)
            })
            .collect();
        Self { transliteration }
    }

    /// Canonical tokens for `text`.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let folded = fold(text);
        let mut out = Vec::new();
        for token in folded.split_whitespace() {
            match self.transliteration.get(token) {
                Some(native) => out.extend(native.iter().cloned()),
                None => out.push(token.to_string()),
            }
        }
        out
    }

    /// Canonical key for `text`: its tokens joined by single spaces.
    pub fn key(&self, text: &str) -> String {
        self.tokens(text).join(" ")
    }
}

/// NFKD, drop combining marks, lowercase, non-alphanumerics to spaces.
fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect()
}
