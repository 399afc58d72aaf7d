const SYLLABLE_FIRST: u32 = 0xAC00;
const SYLLABLE_LAST: u32 = 0xD7A3;
const TRAILING_COUNT: u32 = 28;
const VOWEL_BLOCK: u32 = 21 * TRAILING_COUNT;

const LEADING: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ', 'ㅌ',
    'ㅍ', 'ㅎ',
];

const VOWELS: [char; 21] = [
    'ㅏ', 'ㅐ', 'ㅑ', 'ㅒ', 'ㅓ', 'ㅔ', 'ㅕ', 'ㅖ', 'ㅗ', 'ㅘ', 'ㅙ', 'ㅚ', 'ㅛ', 'ㅜ', 'ㅝ', 'ㅞ', 'ㅟ',
    'ㅠ', 'ㅡ', 'ㅢ', 'ㅣ',
];

// Index 0 is a syllable without a final consonant.
const TRAILING: [Option<char>; 28] = [
    None,
    Some('ㄱ'),
    Some('ㄲ'),
    Some('ㄳ'),
    Some('ㄴ'),
    Some('ㄵ'),
    Some('ㄶ'),
    Some('ㄷ'),
    Some('ㄹ'),
    Some('ㄺ'),
    Some('ㄻ'),
    Some('ㄼ'),
    Some('ㄽ'),
    Some('ㄾ'),
    Some('ㄿ'),
    Some('ㅀ'),
    Some('ㅁ'),
    Some('ㅂ'),
    Some('ㅄ'),
    Some('ㅅ'),
    Some('ㅆ'),
    Some('ㅇ'),
    Some('ㅈ'),
    Some('ㅊ'),
    Some('ㅋ'),
    Some('ㅌ'),
    Some('ㅍ'),
    Some('ㅎ'),
];

const COMPOUNDS: [(char, [char; 2]); 25] = [
    ('ㄲ', ['ㄱ', 'ㄱ']),
    ('ㄸ', ['ㄷ', 'ㄷ']),
    ('ㅃ', ['ㅂ', 'ㅂ']),
    ('ㅆ', ['ㅅ', 'ㅅ']),
    ('ㅉ', ['ㅈ', 'ㅈ']),
    ('ㄳ', ['ㄱ', 'ㅅ']),
    ('ㄵ', ['ㄴ', 'ㅈ']),
    ('ㄶ', ['ㄴ', 'ㅎ']),
    ('ㄺ', ['ㄹ', 'ㄱ']),
    ('ㄻ', ['ㄹ', 'ㅁ']),
    ('ㄼ', ['ㄹ', 'ㅂ']),
    ('ㄽ', ['ㄹ', 'ㅅ']),
    ('ㄾ', ['ㄹ', 'ㅌ']),
    ('ㄿ', ['ㄹ', 'ㅍ']),
    ('ㅀ', ['ㄹ', 'ㅎ']),
    ('ㅄ', ['ㅂ', 'ㅅ']),
    ('ㅒ', ['ㅑ', 'ㅣ']),
    ('ㅖ', ['ㅕ', 'ㅣ']),
    ('ㅘ', ['ㅗ', 'ㅏ']),
    ('ㅙ', ['ㅗ', 'ㅐ']),
    ('ㅚ', ['ㅗ', 'ㅣ']),
    ('ㅝ', ['ㅜ', 'ㅓ']),
    ('ㅞ', ['ㅜ', 'ㅔ']),
    ('ㅟ', ['ㅜ', 'ㅣ']),
    ('ㅢ', ['ㅡ', 'ㅣ']),
];

pub fn is_syllable(c: char) -> bool {
    (SYLLABLE_FIRST..=SYLLABLE_LAST).contains(&(c as u32))
}

/// Splits a compound jamo into its two simple jamo.
pub fn split_compound(jamo: char) -> Option<[char; 2]> {
    COMPOUNDS
        .iter()
        .find(|(compound, _)| *compound == jamo)
        .map(|(_, parts)| *parts)
}

/// Decomposes a precomposed syllable into simple compatibility jamo.
pub fn decompose(syllable: char) -> Option<Vec<char>> {
    if !is_syllable(syllable) {
        return None;
    }

    let index = syllable as u32 - SYLLABLE_FIRST;
    let leading = LEADING[(index / VOWEL_BLOCK) as usize];
    let vowel = VOWELS[((index % VOWEL_BLOCK) / TRAILING_COUNT) as usize];
    let trailing = TRAILING[(index % TRAILING_COUNT) as usize];

    let mut jamo = Vec::with_capacity(6);
    for part in std::iter::once(leading)
        .chain(std::iter::once(vowel))
        .chain(trailing)
    {
        match split_compound(part) {
            Some(pair) => jamo.extend_from_slice(&pair),
            None => jamo.push(part),
        }
    }

    Some(jamo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_simple() {
        assert_eq!(decompose('한'), Some(vec!['ㅎ', 'ㅏ', 'ㄴ']));
        assert_eq!(decompose('가'), Some(vec!['ㄱ', 'ㅏ']));
        assert_eq!(decompose('힣'), Some(vec!['ㅎ', 'ㅣ', 'ㅎ']));
    }

    #[test]
    fn test_decompose_expands_compounds() {
        assert_eq!(decompose('까'), Some(vec!['ㄱ', 'ㄱ', 'ㅏ']));
        assert_eq!(decompose('왜'), Some(vec!['ㅇ', 'ㅗ', 'ㅐ']));
        assert_eq!(decompose('닭'), Some(vec!['ㄷ', 'ㅏ', 'ㄹ', 'ㄱ']));
        assert_eq!(decompose('뷁'), Some(vec!['ㅂ', 'ㅜ', 'ㅔ', 'ㄹ', 'ㄱ']));
    }

    #[test]
    fn test_non_syllables() {
        assert_eq!(decompose('A'), None);
        assert_eq!(decompose('ㄱ'), None);
        assert_eq!(split_compound('ㄱ'), None);
        assert_eq!(split_compound('ㅘ'), Some(['ㅗ', 'ㅏ']));
    }
}
