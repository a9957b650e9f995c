//! Text normalization helpers shared by the comparator, the executor, and
//! the SSH config writer.

use chrono::Local;

/// Placeholder tokens masked during comparison: values that legitimately
/// differ between the declaration and the live registry after per-user
/// substitution.
pub const DEFAULT_MASK_TOKENS: &[&str] = &["{username}", "{account}"];

/// Collapse whitespace for comparison: per line, trim and reduce internal
/// whitespace runs to single spaces; blank lines are dropped.
pub fn normalize_text(text: &str) -> String {
    text.lines()
        .filter_map(|line| {
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.is_empty() {
                None
            } else {
                Some(words.join(" "))
            }
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// Mask placeholder noise between two normalized strings.
///
/// For each token that appears in exactly one of the two strings: the token
/// is removed from the side that carries it, and the corresponding run in
/// the other side (from the token's byte position up to the next `/`,
/// newline, or space) is removed as well. Tokens present in both or neither
/// side are left alone.
pub fn mask_placeholders(a: &str, b: &str, tokens: &[&str]) -> (String, String) {
    let mut a = a.to_owned();
    let mut b = b.to_owned();
    for token in tokens {
        let in_a = a.contains(token);
        let in_b = b.contains(token);
        if in_a == in_b {
            continue;
        }
        if in_a {
            let (masked_a, masked_b) = mask_one(&a, &b, token);
            a = masked_a;
            b = masked_b;
        } else {
            let (masked_b, masked_a) = mask_one(&b, &a, token);
            a = masked_a;
            b = masked_b;
        }
    }
    (a, b)
}

/// `bearer` contains `token`; strip the token from it and the substituted
/// run from `other` at the same position.
fn mask_one(bearer: &str, other: &str, token: &str) -> (String, String) {
    let pos = match bearer.find(token) {
        Some(p) => p,
        None => return (bearer.to_owned(), other.to_owned()),
    };
    let masked_bearer = format!("{}{}", &bearer[..pos], &bearer[pos + token.len()..]);

    let cut = char_floor(other, pos.min(other.len()));
    let tail = &other[cut..];
    let rest = match tail.find(['/', '\n', ' ']) {
        Some(i) => &tail[i..],
        None => "",
    };
    (masked_bearer, format!("{}{}", &other[..cut], rest))
}

fn char_floor(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Archive label for a superseded registry entry: current local time as
/// `YYYYMMDDHHMM` prefixed to the label's portion before any `@`.
pub fn archive_label(label: &str) -> String {
    let name = label.split_once('@').map_or(label, |(n, _)| n);
    format!("{}_{}", Local::now().format("%Y%m%d%H%M"), name)
}

/// `snake_case` → `PascalCase`, used when rendering SSH config keys
/// (`proxy_jump` → `ProxyJump`).
pub fn to_pascal_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}

/// First whitespace-separated token of every line past the header line.
/// Used on tabular `uenv image` listings.
pub fn first_column(output: &str) -> std::collections::BTreeSet<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
