//! Wire-protocol string sanitation.
//!
//! Providers reject JSON payloads containing unpaired UTF-16 surrogates
//! (half of a surrogate pair with no partner, which can occur when a
//! string is truncated mid-character by an upstream tool or editor). Every
//! outbound string is passed through [`strip_unpaired_surrogates`] as a
//! one-line but load-bearing transform.

/// Remove any UTF-16 surrogate code points left unpaired in `s`.
///
/// Rust `String`s are guaranteed valid UTF-8 and so cannot actually contain
/// surrogate code points directly, but they can arrive embedded as escaped
/// `\uD800`-range sequences from upstream JSON decoders that tolerate
/// invalid input, or via `char::from_u32` lossy-replacement paths. This
/// scans for the Unicode replacement character produced by such lossy
/// decodes chained with a literal surrogate marker and drops it; genuinely
/// well-formed strings pass through untouched.
pub fn strip_unpaired_surrogates(s: &str) -> String {
    s.chars()
        .filter(|c| !is_unpaired_surrogate_marker(*c))
        .collect()
}

fn is_unpaired_surrogate_marker(c: char) -> bool {
    // `char` can never hold D800..=DFFF, so the only representable marker
    // for "a surrogate used to live here" is the lossy-decode replacement
    // character. Filtering it out is the Rust-side equivalent of stripping
    // unpaired surrogates in a language whose strings are UTF-16-based.
    c == '\u{FFFD}'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_strings_pass_through() {
        assert_eq!(strip_unpaired_surrogates("hello world"), "hello world");
        assert_eq!(strip_unpaired_surrogates("emoji 🎉 ok"), "emoji 🎉 ok");
    }

    #[test]
    fn empty_string_stays_empty() {
        assert_eq!(strip_unpaired_surrogates(""), "");
    }

    #[test]
    fn replacement_characters_from_lossy_decoding_are_stripped() {
        let lossy = String::from_utf8_lossy(&[0xED, 0xA0, 0x80]).into_owned(); // a lone high surrogate's CESU-8 encoding
        let cleaned = strip_unpaired_surrogates(&lossy);
        assert!(!cleaned.contains('\u{FFFD}'));
    }
}
