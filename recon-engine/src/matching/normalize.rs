//! Text normalization applied at the scoring boundary.
//!
//! Bank remittance text is loosely structured and, in this domain, mixes
//! Macedonian Cyrillic with Latin transliterations of varying quality.
//! Stored originals are never mutated; scoring works on normalized copies.

/// Case-fold and strip diacritics for name comparison.
///
/// Collapses whitespace runs to a single space and trims the ends.
pub fn fold_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lower in ch.to_lowercase() {
            out.push(strip_diacritic(lower));
        }
    }
    out
}

/// Reduce text to lowercase alphanumerics for reference matching.
///
/// "INV-2025/0042" and "inv 2025 0042" both become "inv20250042", so an
/// invoice number survives whatever punctuation the bank inserted.
pub fn fold_reference(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(strip_diacritic(lower));
            }
        }
    }
    out
}

/// Map one lowercase character to its base form.
///
/// Covers the Latin diacritics seen in transliterated counterparty names
/// and the two accented Macedonian Cyrillic letters; everything else passes
/// through untouched.
fn strip_diacritic(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' => 'g',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' => 'i',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        // Macedonian Cyrillic accented forms.
        'ѐ' => 'е',
        'ѝ' => 'и',
        _ => ch,
    }
}
