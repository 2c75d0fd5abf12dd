//! UTF-8 safe string helpers.
//!
//! Length limits in this crate are counted in characters, never bytes, so
//! cutting a reply or a transcript can not split a multibyte character.

/// Return the first `n` characters of `s` as a `String` (no ellipsis).
pub fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Cap `s` at `max` characters. Longer strings keep `max - 3` characters
/// followed by `...`, so the result is exactly `max` characters long.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = prefix_chars(s, max.saturating_sub(3));
    out.push_str("...");
    out
}

/// Split `s` into pieces of at most `size` characters.
pub fn chunk_chars(s: &str, size: usize) -> Vec<String> {
    if size == 0 {
        return vec![s.to_string()];
    }
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_untouched() {
        assert_eq!(truncate_with_ellipsis("hello", 200), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        let long = "a".repeat(250);
        let out = truncate_with_ellipsis(&long, 200);
        assert_eq!(out.chars().count(), 200);
        assert!(out.ends_with("..."));
        assert_eq!(&out[..197], &long[..197]);
    }

    #[test]
    fn test_truncate_multibyte() {
        let s = "¡Contexto borrado! 🧹".repeat(20);
        let out = truncate_with_ellipsis(&s, 50);
        assert_eq!(out.chars().count(), 50);
    }

    #[test]
    fn test_chunk_chars() {
        let chunks = chunk_chars("abcdefg", 3);
        assert_eq!(chunks, vec!["abc", "def", "g"]);
        assert!(chunk_chars("", 3).is_empty());
    }
}
