use std::fmt::{Display, Write};

use once_cell::sync::Lazy;
use regex::Regex;

/// Escapes the characters legacy telegram markdown treats as markup.
pub struct Escaped<'a>(pub &'a str);

impl<'a> Display for Escaped<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in self.0.chars() {
            match c {
                '*' => f.write_str("\\*")?,
                '_' => f.write_str("\\_")?,
                _ => f.write_char(c)?,
            }
        }

        Ok(())
    }
}

pub fn escape_markdown(text: &str) -> String {
    Escaped(text).to_string()
}

/// Cuts `text` to `length` characters, plus ellipsis if anything was cut.
pub fn truncate(text: &str, length: usize) -> String {
    match text.char_indices().nth(length) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

// reddit's own subreddit name rule. What may follow a name is checked in
// `is_name_end`, the regex crate has no lookahead.
static SUBREDDIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\br/[A-Za-z0-9][A-Za-z0-9_]{2,20}").unwrap());

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A name ends at whitespace, `/`, the end of text, or a symbol followed by a
/// space or the end of a line.
fn is_name_end(rest: &str) -> bool {
    let mut chars = rest.chars();
    match chars.next() {
        None => true,
        Some(c) if c.is_whitespace() || c == '/' => true,
        Some(c) if !is_word(c) => matches!(chars.next(), None | Some(' ' | '\n')),
        Some(_) => false,
    }
}

/// All `r/` prefixed subreddit names in `text`, in order.
pub fn subreddit_names(text: &str) -> Vec<&str> {
    SUBREDDIT_RE
        .find_iter(text)
        .filter(|m| is_name_end(&text[m.end()..]))
        .map(|m| m.as_str())
        .collect()
}

/// First subreddit name in `text`, or the last one if `reverse`.
pub fn subreddit_name(text: &str, reverse: bool) -> Option<&str> {
    let names = subreddit_names(text);
    if reverse {
        names.last().copied()
    } else {
        names.first().copied()
    }
}
