use crate::error::{MorseError, Result};
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const CTC_CODE_LEN: usize = 4;

/// Path of a table that replaces the embedded one for the whole process.
pub const CTC_TABLE_ENV: &str = "POLYMORSE_CTC_TABLE";

const UNIHAN_FIELD: &str = "kMainlandTelegraph";

const BUILTIN_TABLE: &str = include_str!("ctc.tsv");

/// Bidirectional Chinese Telegraph Code dictionary.
#[derive(Debug, Clone, Default)]
pub struct CtcTable {
    to_hanzi: HashMap<String, char>,
    to_code: HashMap<char, String>,
}

impl CtcTable {
    /// Process-wide default table: the file named by `POLYMORSE_CTC_TABLE`
    /// when it loads, the embedded table otherwise.
    pub fn builtin() -> &'static CtcTable {
        static TABLE: OnceLock<CtcTable> = OnceLock::new();
        TABLE.get_or_init(|| Self::resolve(std::env::var_os(CTC_TABLE_ENV).map(PathBuf::from)))
    }

    fn resolve(path: Option<PathBuf>) -> CtcTable {
        if let Some(path) = path {
            match CtcTable::load(&path) {
                Ok(table) => {
                    info!("Loaded {} telegraph codes from {}", table.len(), path.display());
                    return table;
                }
                Err(e) => warn!("Ignoring CTC table {}: {}", path.display(), e),
            }
        }

        CtcTable::parse(BUILTIN_TABLE).unwrap_or_else(|e| {
            error!("Built-in CTC table rejected: {}", e);
            CtcTable::default()
        })
    }

    /// Parses `code<TAB>character` lines. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = CtcTable::default();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (code, hanzi) = match (fields.next(), fields.next(), fields.next()) {
                (Some(code), Some(hanzi), None) => (code, hanzi),
                _ => {
                    return Err(MorseError::InvalidCtc(format!(
                        "line {}: expected `code<TAB>character`",
                        index + 1
                    )))
                }
            };

            if !is_ctc_code(code) {
                return Err(MorseError::InvalidCtc(format!(
                    "line {}: `{}` is not a four digit code",
                    index + 1,
                    code
                )));
            }

            let mut chars = hanzi.chars();
            let character = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(MorseError::InvalidCtc(format!(
                        "line {}: `{}` is not a single character",
                        index + 1,
                        hanzi
                    )))
                }
            };

            table.insert(code, character).map_err(|e| match e {
                MorseError::InvalidCtc(msg) => {
                    MorseError::InvalidCtc(format!("line {}: {}", index + 1, msg))
                }
                other => other,
            })?;
        }

        Ok(table)
    }

    /// Reads `kMainlandTelegraph` records from `Unihan_OtherMappings.txt`.
    ///
    /// Other fields are skipped. Unihan gives a few codes to more than one
    /// character; the first record wins and later ones are dropped.
    pub fn parse_unihan(text: &str) -> Result<Self> {
        let mut table = CtcTable::default();
        let mut dropped = 0;

        for (index, line) in text.lines().enumerate() {
            let mut fields = line.trim().split('\t');
            let (point, code) = match (fields.next(), fields.next(), fields.next()) {
                (Some(point), Some(UNIHAN_FIELD), Some(code)) => (point, code.trim()),
                _ => continue,
            };

            let character = point
                .strip_prefix("U+")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .and_then(char::from_u32)
                .ok_or_else(|| {
                    MorseError::InvalidCtc(format!(
                        "line {}: `{}` is not a code point",
                        index + 1,
                        point
                    ))
                })?;

            if !is_ctc_code(code) {
                return Err(MorseError::InvalidCtc(format!(
                    "line {}: `{}` is not a four digit code",
                    index + 1,
                    code
                )));
            }

            if table.insert(code, character).is_err() {
                dropped += 1;
            }
        }

        if dropped > 0 {
            warn!("Dropped {} Unihan records that reuse a code or character", dropped);
        }
        Ok(table)
    }

    /// Loads a tab separated table, or a Unihan mapping file when the first
    /// record starts with `U+`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let unihan = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .is_some_and(|line| line.starts_with("U+"));

        if unihan {
            Self::parse_unihan(&text)
        } else {
            Self::parse(&text)
        }
    }

    pub fn insert(&mut self, code: &str, character: char) -> Result<()> {
        if self.to_hanzi.contains_key(code) {
            return Err(MorseError::InvalidCtc(format!("duplicate code {}", code)));
        }
        if self.to_code.contains_key(&character) {
            return Err(MorseError::InvalidCtc(format!(
                "duplicate character {}",
                character
            )));
        }
        self.to_hanzi.insert(code.to_string(), character);
        self.to_code.insert(character, code.to_string());
        Ok(())
    }

    pub fn hanzi_to_code(&self, character: char) -> Option<&str> {
        self.to_code.get(&character).map(String::as_str)
    }

    pub fn code_to_hanzi(&self, code: &str) -> Option<char> {
        self.to_hanzi.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.to_hanzi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_hanzi.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, char)> {
        self.to_hanzi.iter().map(|(code, c)| (code.as_str(), *c))
    }

    /// Replaces isolated four digit runs with their Han character.
    ///
    /// A run must be exactly four ASCII digits with no word character
    /// (ASCII alphanumeric or `_`) on either side. Unknown codes stay as they are.
    pub fn decode_groups(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut output = String::with_capacity(text.len());
        let mut i = 0;

        while i < chars.len() {
            if !chars[i].is_ascii_digit() {
                output.push(chars[i]);
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let run: String = chars[start..i].iter().collect();

            let bounded = (start == 0 || !is_word_char(chars[start - 1]))
                && (i == chars.len() || !is_word_char(chars[i]));

            match self.code_to_hanzi(&run) {
                Some(hanzi) if bounded && run.len() == CTC_CODE_LEN => output.push(hanzi),
                _ => output.push_str(&run),
            }
        }

        output
    }
}

pub fn is_ctc_code(code: &str) -> bool {
    code.len() == CTC_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
