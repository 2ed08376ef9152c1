//! Regional-indicator flag decoding.
//!
//! Flags in the instance list are written as two Unicode regional
//! indicator symbols (U+1F1E6 `🇦` .. U+1F1FF `🇿`). Shifting each
//! codepoint down by a fixed offset yields the ISO 3166 alpha-2 code.

/// Distance between a regional indicator and its ASCII capital letter.
const REGIONAL_INDICATOR_OFFSET: u32 = 0x1F1E6 - 'A' as u32;

/// Decode a two-codepoint flag into its region code (`"🇩🇪"` → `"DE"`).
///
/// Returns `None` for anything that is not exactly two regional
/// indicator symbols.
pub fn decode_region(flag: &str) -> Option<String> {
    let mut chars = flag.chars();
    let region: String = [chars.next()?, chars.next()?]
        .into_iter()
        .map(decode_indicator)
        .collect::<Option<_>>()?;

    if chars.next().is_some() {
        return None;
    }
    Some(region)
}

fn decode_indicator(c: char) -> Option<char> {
    let letter = char::from_u32((c as u32).checked_sub(REGIONAL_INDICATOR_OFFSET)?)?;
    letter.is_ascii_uppercase().then_some(letter)
}
