use crate::options::Options;
use crate::tables::ScriptSet;
use log::warn;
use std::collections::{BTreeMap, HashMap};

/// Rank → character → rendered pattern.
pub type Characters = BTreeMap<u8, BTreeMap<char, String>>;

pub const WORD_SPACE: char = ' ';

/// Rank of the set that carries the word space entry.
const WORD_SPACE_RANK: u8 = 1;

/// Substitutes dot/dash symbols into a canonical `0`/`1` pattern.
pub fn render_pattern(canonical: &str, dot: &str, dash: &str) -> String {
    let mut rendered = String::with_capacity(canonical.len() * dot.len().max(dash.len()));
    for c in canonical.chars() {
        match c {
            '0' => rendered.push_str(dot),
            '1' => rendered.push_str(dash),
            other => rendered.push(other),
        }
    }
    rendered
}

/// Merges script sets into lookup tables.
///
/// Both directions walk the sets in resolution order: the set ranked
/// `options.priority` first, then every set by rank. The first set holding a
/// character encodes it and the first character registered for a pattern
/// decodes it.
pub struct CharacterResolver<'a> {
    sets: &'a [ScriptSet],
    preferred: Option<&'a ScriptSet>,
    forward: HashMap<char, &'a str>,
    reverse: HashMap<String, char>,
    dot: String,
    dash: String,
    space: String,
}

impl<'a> CharacterResolver<'a> {
    pub fn new(sets: &'a [ScriptSet], options: &Options) -> Self {
        let preferred = sets.iter().find(|set| set.rank == options.priority);
        if preferred.is_none() {
            warn!(
                "No script set ranked {}, resolving in declared order",
                options.priority
            );
        }

        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();

        for set in preferred.into_iter().chain(sets.iter()) {
            for &(character, pattern) in set.entries {
                forward.entry(character).or_insert(pattern);
                reverse
                    .entry(render_pattern(pattern, &options.dot, &options.dash))
                    .or_insert(character);
            }
            if set.rank == WORD_SPACE_RANK {
                reverse.entry(options.space.clone()).or_insert(WORD_SPACE);
            }
        }

        Self {
            sets,
            preferred,
            forward,
            reverse,
            dot: options.dot.clone(),
            dash: options.dash.clone(),
            space: options.space.clone(),
        }
    }

    /// Canonical pattern for an already uppercased character.
    pub fn lookup(&self, character: char) -> Option<&'a str> {
        self.forward.get(&character).copied()
    }

    pub fn decode_token(&self, token: &str) -> Option<char> {
        self.reverse.get(token).copied()
    }

    pub fn render(&self, canonical: &str) -> String {
        render_pattern(canonical, &self.dot, &self.dash)
    }

    pub fn characters(&self, use_priority: bool) -> Characters {
        let mut mapped: Characters = self
            .sets
            .iter()
            .map(|set| (set.rank, self.rendered_set(set)))
            .collect();

        if use_priority {
            if let Some(preferred) = self.preferred {
                mapped.insert(0, self.rendered_set(preferred));
            }
        }

        mapped
    }

    fn rendered_set(&self, set: &ScriptSet) -> BTreeMap<char, String> {
        let mut rendered: BTreeMap<char, String> = set
            .entries
            .iter()
            .map(|&(character, pattern)| (character, self.render(pattern)))
            .collect();
        if set.rank == WORD_SPACE_RANK {
            rendered.insert(WORD_SPACE, self.space.clone());
        }
        rendered
    }
}
