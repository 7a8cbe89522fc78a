//! Small string helpers shared across the loader

/// Split off the first whitespace-delimited word.
///
/// Returns the word (if any) and the remainder with leading whitespace
/// trimmed. Both are slices of the input; nothing is mutated.
pub fn word_split(s: &str) -> (Option<&str>, &str) {
    let s = s.trim_start();
    if s.is_empty() {
        return (None, "");
    }
    match s.find(char::is_whitespace) {
        Some(at) => (Some(&s[..at]), s[at..].trim_start()),
        None => (Some(s), ""),
    }
}

/// Parse an unsigned integer the way `strtol(_, _, 0)` would: `0x` for
/// hex, leading `0` for octal, decimal otherwise. Returns the value and
/// the unconsumed tail; `None` when no digits were consumed.
pub fn parse_int(s: &str) -> Option<(u32, &str)> {
    let s = s.trim_start();
    let (radix, digits) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (16, hex)
    } else if s.starts_with('0') && s.len() > 1 {
        (8, &s[1..])
    } else {
        (10, s)
    };

    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        // "0" alone still counts
        if radix == 8 {
            return Some((0, &digits[end..]));
        }
        return None;
    }

    let value = u32::from_str_radix(&digits[..end], radix).ok()?;
    Some((value, &digits[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_words() {
        assert_eq!(word_split("one two three"), (Some("one"), "two three"));
        assert_eq!(word_split("  solo  "), (Some("solo"), ""));
        assert_eq!(word_split(""), (None, ""));
        assert_eq!(word_split("   "), (None, ""));
    }

    #[test]
    fn parses_integers() {
        assert_eq!(parse_int("42"), Some((42, "")));
        assert_eq!(parse_int("0x3f rest"), Some((0x3f, " rest")));
        assert_eq!(parse_int("010"), Some((8, "")));
        assert_eq!(parse_int("0"), Some((0, "")));
        assert_eq!(parse_int("5/boot"), Some((5, "/boot")));
        assert_eq!(parse_int("/boot"), None);
        assert_eq!(parse_int(""), None);
    }
}
