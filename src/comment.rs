//! Comments stored as metadata.
//!
//! A multi-line comment is stored one line per metadata entry, named as an
//! array below a comment prefix and holding the line behind a `# ` marker:
//!
//! ```text
//! comment/#0 = "# first line"
//! comment/#1 = "# second line"
//! ```
//!
//! Reading strips `# `, or a bare `#` for lines written by other tools.
//!
//! Older storage plugins use the `comments` prefix instead and keep an
//! additional `comments` entry with the highest line index. Whichever style
//! a key already uses is kept when its comment is rewritten.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::array::{array_suffix, decode_array_suffix};
use crate::store::Key;

/// Naming style of comment metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `comment/#<n>` entries.
    Comment,
    /// `comments/#<n>` entries plus a `comments` line counter.
    Comments,
}

impl CommentStyle {
    pub fn prefix(&self) -> &'static str {
        match self {
            CommentStyle::Comment => "comment",
            CommentStyle::Comments => "comments",
        }
    }

    /// Style already used by `key`, or `default` if it has no comment.
    pub fn detect(key: &Key, default: CommentStyle) -> CommentStyle {
        let mut found = None;
        for (name, _) in key.meta() {
            if name == "comments" || name.starts_with("comments/#") {
                return CommentStyle::Comments;
            }
            if name.starts_with("comment/#") {
                found = Some(CommentStyle::Comment);
            }
        }
        found.unwrap_or(default)
    }
}

fn comment_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(comments?)/(#_*[0-9]+)$").expect("valid comment entry regex"))
}

/// Style and line index of a comment line entry.
fn parse_entry(name: &str) -> Option<(CommentStyle, usize)> {
    let caps = comment_entry_regex().captures(name)?;
    let style = if &caps[1] == "comments" {
        CommentStyle::Comments
    } else {
        CommentStyle::Comment
    };
    decode_array_suffix(&caps[2]).map(|index| (style, index))
}

fn strip_marker(value: &str) -> &str {
    value
        .strip_prefix("# ")
        .or_else(|| value.strip_prefix('#'))
        .unwrap_or(value)
}

/// Reads and writes the comment of a key.
#[derive(Debug, Clone, Copy)]
pub struct CommentCodec {
    style: CommentStyle,
}

impl Default for CommentCodec {
    fn default() -> Self {
        Self {
            style: CommentStyle::Comment,
        }
    }
}

impl CommentCodec {
    pub fn new(style: CommentStyle) -> Self {
        Self { style }
    }

    /// A codec using the style `key` already uses, else the default style.
    pub fn for_key(key: &Key) -> Self {
        Self::new(CommentStyle::detect(key, CommentStyle::Comment))
    }

    pub fn style(&self) -> CommentStyle {
        self.style
    }

    /// The comment of `key`, lines joined with `\n`.
    pub fn read(&self, key: &Key) -> String {
        let mut lines: BTreeMap<usize, (CommentStyle, &str)> = BTreeMap::new();
        for (name, value) in key.meta() {
            if let Some((style, index)) = parse_entry(name) {
                let keep_existing = lines
                    .get(&index)
                    .is_some_and(|(existing, _)| *existing == self.style);
                if !keep_existing {
                    lines.insert(index, (style, strip_marker(value)));
                }
            }
        }
        lines
            .values()
            .map(|(_, line)| *line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace the comment of `key` with `comment`.
    ///
    /// An empty comment removes every comment line and the line counter.
    pub fn write(&self, key: &mut Key, comment: &str) {
        let lines: Vec<&str> = if comment.is_empty() {
            Vec::new()
        } else {
            comment.split('\n').collect()
        };

        let mut written = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            let name = format!("{}/{}", self.style.prefix(), array_suffix(index));
            key.set_meta(name.as_str(), format!("# {}", line));
            written.push(name);
        }

        for name in key.meta_names() {
            if parse_entry(&name).is_some() && !written.contains(&name) {
                key.del_meta(&name);
            }
        }

        if self.style == CommentStyle::Comments {
            match lines.len() {
                0 => {
                    key.del_meta("comments");
                }
                count => key.set_meta("comments", array_suffix(count - 1)),
            }
        }
    }
}
