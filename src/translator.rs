use crate::ctc::CtcTable;
use crate::hangul;
use crate::kana;
use crate::options::Options;
use crate::resolver::{CharacterResolver, Characters};
use crate::tables::{self, ScriptSet};
use log::trace;

/// One encoded unit awaiting the final join.
#[derive(Debug, Clone, Copy)]
enum Piece<'p> {
    /// Canonical pattern, receives dot/dash symbols when joined.
    Pattern(&'p str),
    /// Copied verbatim.
    Literal(&'p str),
}

/// Text ⇄ Morse translator over a fixed set of script tables.
pub struct Translator<'a> {
    options: Options,
    resolver: CharacterResolver<'a>,
    ctc: &'a CtcTable,
}

impl Translator<'static> {
    pub fn new(options: Options) -> Self {
        Self::with_tables(tables::builtin(), CtcTable::builtin(), options)
    }
}

impl<'a> Translator<'a> {
    pub fn with_tables(sets: &'a [ScriptSet], ctc: &'a CtcTable, options: Options) -> Self {
        let resolver = CharacterResolver::new(sets, &options);
        Self {
            options,
            resolver,
            ctc,
        }
    }

    pub fn with_ctc<'b>(self, ctc: &'b CtcTable) -> Translator<'b>
    where
        'a: 'b,
    {
        Translator {
            options: self.options,
            resolver: self.resolver,
            ctc,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn encode(&self, text: &str) -> String {
        let upper = text.to_uppercase();
        let mut pieces = Vec::new();

        for (index, word) in upper.split_whitespace().enumerate() {
            if index > 0 {
                pieces.push(Piece::Literal(&self.options.space));
            }
            for c in word.chars() {
                self.encode_char(c, &mut pieces);
            }
        }

        pieces
            .iter()
            .map(|piece| match piece {
                Piece::Pattern(canonical) => self.resolver.render(canonical),
                Piece::Literal(text) => text.to_string(),
            })
            .collect::<Vec<_>>()
            .join(&self.options.separator)
    }

    fn encode_char<'s>(&'s self, c: char, pieces: &mut Vec<Piece<'s>>) {
        if let Some(jamo) = hangul::decompose(c) {
            self.push_all(c, &jamo, pieces);
            return;
        }

        let katakana = kana::to_katakana(c);
        if let Some(pattern) = self
            .resolver
            .lookup(katakana)
            .or_else(|| self.resolver.lookup(c))
        {
            pieces.push(Piece::Pattern(pattern));
            return;
        }

        let expanded = kana::expand(katakana)
            .or_else(|| hangul::split_compound(c).map(|pair| pair.to_vec()));
        if let Some(parts) = expanded {
            self.push_all(c, &parts, pieces);
            return;
        }

        if let Some(code) = self.ctc.hanzi_to_code(c) {
            trace!("{} encoded through CTC {}", c, code);
            let digits: Vec<char> = code.chars().collect();
            self.push_all(c, &digits, pieces);
            return;
        }

        trace!("No pattern for {:?}", c);
        pieces.push(Piece::Literal(&self.options.invalid));
    }

    // All parts resolve or the whole character becomes the invalid placeholder.
    fn push_all<'s>(&'s self, source: char, parts: &[char], pieces: &mut Vec<Piece<'s>>) {
        let resolved: Option<Vec<&'s str>> =
            parts.iter().map(|part| self.resolver.lookup(*part)).collect();

        match resolved {
            Some(patterns) => pieces.extend(patterns.into_iter().map(Piece::Pattern)),
            None => {
                trace!("{:?} decomposed into unmapped parts {:?}", source, parts);
                pieces.push(Piece::Literal(&self.options.invalid));
            }
        }
    }

    pub fn decode(&self, morse: &str) -> String {
        let separator = self.options.separator.as_str();
        let collapsed = collapse_whitespace(morse.trim(), separator);
        if collapsed.is_empty() {
            return String::new();
        }

        // Without a separator every symbol character stands alone.
        let tokens: Vec<&str> = if separator.is_empty() {
            collapsed
                .char_indices()
                .map(|(i, c)| &collapsed[i..i + c.len_utf8()])
                .collect()
        } else {
            collapsed.split(separator).collect()
        };

        tokens
            .into_iter()
            .map(|token| match self.resolver.decode_token(token) {
                Some(c) => c.to_string(),
                None => self.options.invalid.clone(),
            })
            .collect()
    }

    /// Turns isolated four digit groups of decoded text back into Han characters.
    pub fn decode_cn(&self, text: &str) -> String {
        self.ctc.decode_groups(text)
    }

    pub fn characters(&self, use_priority: bool) -> Characters {
        self.resolver.characters(use_priority)
    }
}

fn collapse_whitespace(text: &str, separator: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_run {
                collapsed.push_str(separator);
                in_run = true;
            }
        } else {
            collapsed.push(c);
            in_run = false;
        }
    }
    collapsed
}
