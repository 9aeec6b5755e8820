//! Phonetic Keys
//!
//! Metaphone-style consonant skeletons used by deduplication blocking: terms
//! that sound alike ("Data Science" / "Deta Sciense") land in the same
//! bucket even when spelled differently. Encoding is intentionally compact;
//! it only needs to bucket well, not transcribe pronunciation.

use std::collections::BTreeMap;

/// Lowercase, strip punctuation and digits, collapse whitespace.
pub fn normalize_for_phonetic(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphabetic() || c.is_whitespace() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Encode one word into its consonant skeleton.
fn encode_word(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        let mapped: Option<char> = match c {
            'p' if next == Some('h') => {
                i += 1;
                Some('f')
            }
            'c' => match next {
                Some('h') => {
                    i += 1;
                    Some('x')
                }
                Some('e') | Some('i') | Some('y') => Some('s'),
                _ => Some('k'),
            },
            'q' => Some('k'),
            'g' => match next {
                Some('h') => {
                    i += 1;
                    Some('k')
                }
                _ => Some('k'),
            },
            's' if next == Some('h') => {
                i += 1;
                Some('x')
            }
            't' if next == Some('h') => {
                i += 1;
                Some('0')
            }
            'd' => Some('t'),
            'z' => Some('s'),
            'x' => Some('k'),
            'v' => Some('f'),
            'b' => Some('p'),
            'w' | 'h' => None,
            vowel if is_vowel(vowel) => {
                if i == 0 {
                    Some('a')
                } else {
                    None
                }
            }
            other => Some(other),
        };

        if let Some(code) = mapped
            && out.chars().last() != Some(code)
        {
            out.push(code);
        }
        i += 1;
    }
    out.to_uppercase()
}

/// Primary and (when distinct) alternate phonetic codes for a term.
pub fn double_metaphone(text: &str) -> Vec<String> {
    let normalized = normalize_for_phonetic(text);
    if normalized.is_empty() {
        return vec![String::new()];
    }
    let primary: String = normalized.split(' ').map(encode_word).collect();

    // Alternate drops the leading-vowel marker, catching spellings that add
    // or omit an initial vowel.
    let alternate: String = normalized
        .split(' ')
        .map(|word| {
            let encoded = encode_word(word);
            encoded.strip_prefix('A').map(str::to_string).unwrap_or(encoded)
        })
        .collect();

    if alternate != primary && !alternate.is_empty() {
        vec![primary, alternate]
    } else {
        vec![primary]
    }
}

/// The primary phonetic key for a term.
pub fn generate_phonetic_key(text: &str) -> String {
    double_metaphone(text)
        .into_iter()
        .next()
        .unwrap_or_default()
}

/// All phonetic bucket keys for a term.
pub fn phonetic_bucket_keys(text: &str) -> Vec<String> {
    double_metaphone(text)
}

/// Group items by primary phonetic key.
pub fn bucket_by_phonetic<I, S>(items: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in items {
        let item = item.into();
        let key = generate_phonetic_key(&item);
        buckets.entry(key).or_default().push(item);
    }
    buckets
}

// =============================================================================
// Tests
// =============================================================================
