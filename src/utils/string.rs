//! UTF-8 safe string previews for log lines.

/// Return the first `n` characters of `s` (no ellipsis).
pub fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Return `s` cut to `n` characters, with a trailing `...` when something
/// was cut.
pub fn preview(s: &str, n: usize) -> String {
    let mut prefix = prefix_chars(s, n);
    if s.chars().nth(n).is_some() {
        prefix.push_str("...");
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_ascii() {
        assert_eq!(preview("hello world", 5), "hello...");
        assert_eq!(preview("hello world", 11), "hello world");
        assert_eq!(preview("", 3), "");
    }

    #[test]
    fn preview_multibyte() {
        let s = "日本語のテキスト";
        assert_eq!(preview(s, 3), "日本語...");
        assert_eq!(prefix_chars(s, 100), s);
    }
}
