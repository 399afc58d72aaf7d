const HIRAGANA_FIRST: u32 = 0x3041;
const HIRAGANA_LAST: u32 = 0x3096;
const KATAKANA_OFFSET: u32 = 0x60;

const VOICED: &str = "ガギグゲゴザジズゼゾダヂヅデドバビブベボヴヷヸヹヺ";
const VOICED_BASE: &str = "カキクケコサシスセソタチツテトハヒフヘホウワヰヱヲ";
const SEMI_VOICED: &str = "パピプペポ";
const SEMI_VOICED_BASE: &str = "ハヒフヘホ";
const SMALL: &str = "ァィゥェォッャュョヮヵヶ";
const SMALL_BASE: &str = "アイウエオツヤユヨワカケ";

pub const DAKUTEN: char = '゛';
pub const HANDAKUTEN: char = '゜';

/// Maps Hiragana onto the matching Katakana, other characters pass through.
pub fn to_katakana(c: char) -> char {
    match c {
        'ゝ' => 'ヽ',
        'ゞ' => 'ヾ',
        _ if (HIRAGANA_FIRST..=HIRAGANA_LAST).contains(&(c as u32)) => {
            char::from_u32(c as u32 + KATAKANA_OFFSET).unwrap_or(c)
        }
        _ => c,
    }
}

/// Rewrites a Katakana the Wabun table lacks into kana it has:
/// voiced kana become base + ゛, semi-voiced base + ゜, small kana full size.
pub fn expand(c: char) -> Option<Vec<char>> {
    if let Some(base) = paired(c, VOICED, VOICED_BASE) {
        return Some(vec![base, DAKUTEN]);
    }
    if let Some(base) = paired(c, SEMI_VOICED, SEMI_VOICED_BASE) {
        return Some(vec![base, HANDAKUTEN]);
    }
    paired(c, SMALL, SMALL_BASE).map(|base| vec![base])
}

fn paired(c: char, from: &str, to: &str) -> Option<char> {
    from.chars()
        .zip(to.chars())
        .find(|(source, _)| *source == c)
        .map(|(_, target)| target)
}
