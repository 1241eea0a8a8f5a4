//! Text helpers behind the string builtins.
//!
//! Markers are glob patterns where `*` matches any run of characters. The
//! first character of a marker matches exactly; the rest match ASCII
//! case-insensitively. Offsets are byte offsets into UTF-8 text.

/// Move `pos` forward to the nearest char boundary of `text`.
pub fn ceil_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

fn literal_at(text: &[u8], at: usize, lit: &[u8], exact_first: bool) -> bool {
    if at + lit.len() > text.len() {
        return false;
    }
    lit.iter().enumerate().all(|(i, &b)| {
        let t = text[at + i];
        if i == 0 && exact_first { t == b } else { t.eq_ignore_ascii_case(&b) }
    })
}

fn find_literal(text: &[u8], from: usize, lit: &[u8]) -> Option<usize> {
    if lit.is_empty() {
        return Some(from);
    }
    (from..=text.len().saturating_sub(lit.len())).find(|&at| literal_at(text, at, lit, false))
}

/// Match `pattern` anchored at `at`; returns the end offset of the match.
pub fn match_at(text: &str, at: usize, pattern: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut parts = pattern.as_bytes().split(|&b| b == b'*');
    let head = parts.next().unwrap_or_default();
    if !literal_at(bytes, at, head, true) {
        return None;
    }
    let mut end = at + head.len();
    for part in parts {
        end = find_literal(bytes, end, part)? + part.len();
    }
    Some(end)
}

/// Leftmost match of `pattern` at or after `from` as a `(start, end)` range.
pub fn find(text: &str, from: usize, pattern: &str) -> Option<(usize, usize)> {
    if pattern.is_empty() {
        let at = ceil_boundary(text, from);
        return Some((at, at));
    }
    (ceil_boundary(text, from)..text.len())
        .filter(|&at| text.is_char_boundary(at))
        .find_map(|at| match_at(text, at, pattern).map(|end| (at, end)))
}

/// Like [`find`], but only considers positions outside quoted strings and at
/// the bracket depth where the search started. Stops when that level closes.
pub fn find_balanced(text: &str, from: usize, pattern: &str) -> Option<(usize, usize)> {
    if pattern.is_empty() {
        let at = ceil_boundary(text, from);
        return Some((at, at));
    }
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut at = ceil_boundary(text, from);
    while at < bytes.len() {
        let b = bytes[at];
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            at += 1;
            continue;
        }
        if depth == 0 && text.is_char_boundary(at) {
            if let Some(end) = match_at(text, at, pattern) {
                return Some((at, end));
            }
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
            }
            _ => {}
        }
        at += 1;
    }
    None
}

/// Text between `begin` and `end` markers, searching from `pos`.
///
/// Returns the extracted text and the position just after the end marker.
/// When nothing matches the text is empty and the position is `src.len()`.
pub fn extract(src: &str, pos: usize, begin: &str, end: &str) -> (String, usize) {
    let pos = ceil_boundary(src, pos);
    if pos >= src.len() {
        return (String::new(), src.len());
    }
    let Some((_, body_start)) = find(src, pos, begin) else {
        return (String::new(), src.len());
    };
    if end.is_empty() {
        return (src[body_start..].to_string(), src.len());
    }
    match find(src, body_start, end) {
        Some((body_end, next)) => (src[body_start..body_end].to_string(), next),
        None => (String::new(), src.len()),
    }
}

/// Decode the HTML entities that show up in scraped text.
pub fn dehtml(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(c) = rest.chars().next() {
        if c == '&' {
            if let Some(tail) = rest.strip_prefix("&#") {
                let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
                let decoded = digits.parse::<u32>().ok().and_then(char::from_u32);
                if let (Some(ch), true) = (decoded, tail[digits.len()..].starts_with(';')) {
                    out.push(ch);
                    rest = &tail[digits.len() + 1..];
                    continue;
                }
            }
            if let Some(tail) = rest.strip_prefix("&nbsp;") {
                out.push('\u{a0}');
                rest = tail;
                continue;
            }
            if let Some(tail) = rest.strip_prefix("&quot;") {
                out.push('"');
                rest = tail;
                continue;
            }
        }
        if let Some(tail) = rest.strip_prefix("<br/>") {
            out.push(' ');
            rest = tail;
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

pub fn substring(src: &str, pos: i64, len: i64) -> String {
    let start = ceil_boundary(src, pos.max(0) as usize);
    let end = ceil_boundary(src, start.saturating_add(len.max(0) as usize));
    src[start..end].to_string()
}

/// Decimal value of an all-digit string, or -1.
pub fn string_to_int(src: &str) -> i64 {
    if src.is_empty() || !src.bytes().all(|b| b.is_ascii_digit()) {
        return -1;
    }
    src.parse().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_plain_and_case() {
        assert_eq!(find("Hello World", 0, "world"), None);
        assert_eq!(find("Hello World", 0, "WORLD"), Some((6, 11)));
        assert_eq!(find("aXbx", 0, "xB"), None);
        assert_eq!(find("aXbx", 0, "Xb"), Some((1, 3)));
    }

    #[test]
    fn test_find_with_wildcards() {
        let html = r#"<a class="city" href="/msk/">Moscow</a>"#;
        let (start, end) = find(html, 0, "<a*href=\"").unwrap();
        assert_eq!(start, 0);
        assert_eq!(&html[end..end + 5], "/msk/");
    }

    #[test]
    fn test_extract_walks_matches() {
        let src = "<c>A</c><c>B</c>";
        let (first, pos) = extract(src, 0, "<c>", "</c>");
        assert_eq!(first, "A");
        assert_eq!(pos, 8);
        let (second, pos) = extract(src, pos, "<c>", "</c>");
        assert_eq!(second, "B");
        assert_eq!(pos, src.len());
        let (none, pos) = extract(src, pos, "<c>", "</c>");
        assert_eq!(none, "");
        assert_eq!(pos, src.len());
    }

    #[test]
    fn test_extract_empty_markers() {
        assert_eq!(extract("abc=def", 0, "=", ""), ("def".to_string(), 7));
        assert_eq!(extract("abc=def", 0, "", "="), ("abc".to_string(), 4));
        assert_eq!(extract("abc", 0, "x", "c"), (String::new(), 3));
    }

    #[test]
    fn test_extract_snaps_mid_character_position() {
        // byte 1 is inside the two-byte 'т'
        assert_eq!(extract("тест", 1, "", ""), ("ест".to_string(), 8));
        assert_eq!(extract("тест", 3, "", "т"), ("с".to_string(), 8));
        assert_eq!(extract("ёлка=ель;", 1, "=", ";"), ("ель".to_string(), 16));
        assert_eq!(find("тест", 5, ""), Some((6, 6)));
        assert_eq!(find_balanced("[\"ё\"]", 3, ""), Some((4, 4)));
    }

    #[test]
    fn test_find_balanced_skips_nested_and_quoted() {
        let json = r#""a",{"x":"}"},"b"}"#;
        let (start, _) = find_balanced(json, 4, "}").unwrap();
        assert_eq!(start, 17);
        assert_eq!(find_balanced("[1],2]", 0, "x"), None);
    }

    #[test]
    fn test_dehtml() {
        assert_eq!(dehtml("a&#65;b&nbsp;&quot;q&quot;<br/>z"), "aAb\u{a0}\"q\" z");
        assert_eq!(dehtml("&amp; &#x;"), "&amp; &#x;");
    }

    #[test]
    fn test_substring_clamps() {
        assert_eq!(substring("abcdef", 2, 3), "cde");
        assert_eq!(substring("abcdef", 4, 10), "ef");
        assert_eq!(substring("abc", 5, 1), "");
        assert_eq!(substring("abc", -1, 2), "ab");
    }

    #[test]
    fn test_string_to_int() {
        assert_eq!(string_to_int("042"), 42);
        assert_eq!(string_to_int("4x"), -1);
        assert_eq!(string_to_int(""), -1);
    }
}
