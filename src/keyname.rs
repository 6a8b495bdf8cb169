//! Key name handling for the hierarchical key database.
//!
//! A key name is either *cascading* (`/app/setting`, resolved across
//! namespaces at lookup time) or bound to a namespace (`user/app/setting`).
//! Segments are separated by `/`; a literal slash inside a segment is
//! escaped as `\/`.
//!
//! Every managed key has a parallel *specification key* that holds its
//! validation rules. Its name is derived by replacing the leading namespace
//! token with `spec`, see [`spec_key_name`].

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Namespaces of the key database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Spec,
    Proc,
    Dir,
    User,
    System,
    /// No namespace: the name is resolved by cascading lookup.
    Cascading,
}

impl Namespace {
    /// Order in which a cascading name is resolved against stored keys.
    pub const LOOKUP_ORDER: [Namespace; 4] = [
        Namespace::Proc,
        Namespace::Dir,
        Namespace::User,
        Namespace::System,
    ];

    /// Namespaces in which a cascading mountpoint may live.
    pub const MOUNTABLE: [Namespace; 4] = [
        Namespace::System,
        Namespace::User,
        Namespace::Spec,
        Namespace::Dir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Spec => "spec",
            Namespace::Proc => "proc",
            Namespace::Dir => "dir",
            Namespace::User => "user",
            Namespace::System => "system",
            Namespace::Cascading => "",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "spec" => Some(Namespace::Spec),
            "proc" => Some(Namespace::Proc),
            "dir" => Some(Namespace::Dir),
            "user" => Some(Namespace::User),
            "system" => Some(Namespace::System),
            _ => None,
        }
    }
}

fn key_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:spec|proc|dir|user|system)(?:/.*)?|/.*)$").expect("valid key name regex")
    })
}

fn mountpoint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:spec|dir|user|system)?/.+$").expect("valid mountpoint regex")
    })
}

/// A validated key name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyName {
    namespace: Namespace,
    /// Everything after the namespace token, either empty or starting with `/`.
    path: String,
}

impl KeyName {
    /// Parse and validate a key name.
    ///
    /// # Examples
    ///
    /// ```
    /// use kdb_state::keyname::{KeyName, Namespace};
    ///
    /// let name = KeyName::parse("user/test/x1").unwrap();
    /// assert_eq!(name.namespace(), Namespace::User);
    /// assert_eq!(name.cascading(), "/test/x1");
    /// assert!(KeyName::parse("hello/world").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self> {
        if !key_name_regex().is_match(name) {
            return Err(Error::InvalidKeyName {
                name: name.to_string(),
                message: "expected a cascading name (/...) or one of the namespaces \
                          spec, proc, dir, user, system"
                    .to_string(),
            });
        }
        Ok(Self::split(name))
    }

    /// Parse and validate a mountpoint name.
    ///
    /// Mountpoints must name at least one segment below a namespace and may
    /// not live in the `proc` namespace.
    pub fn parse_mountpoint(name: &str) -> Result<Self> {
        if !mountpoint_regex().is_match(name) {
            return Err(Error::InvalidMountpoint {
                name: name.to_string(),
                message: "expected a cascading name (/...) or spec/, dir/, user/, system/ \
                          followed by a path"
                    .to_string(),
            });
        }
        Ok(Self::split(name))
    }

    /// Join `prefix` and `name`, then parse the result.
    pub fn with_prefix(prefix: &str, name: &str) -> Result<Self> {
        if !prefix.is_empty() {
            Self::parse(prefix)?;
        }
        Self::parse(&join_prefix(prefix, name))
    }

    fn split(name: &str) -> Self {
        let trimmed = trim_trailing_separator(name);
        if trimmed.starts_with('/') || trimmed.is_empty() {
            return Self {
                namespace: Namespace::Cascading,
                path: trimmed.to_string(),
            };
        }
        let (token, path) = match trimmed.find('/') {
            Some(pos) => (&trimmed[..pos], &trimmed[pos..]),
            None => (trimmed, ""),
        };
        Self {
            namespace: Namespace::from_token(token).unwrap_or(Namespace::Cascading),
            path: path.to_string(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn is_cascading(&self) -> bool {
        self.namespace == Namespace::Cascading
    }

    /// The namespace-independent part of the name, always starting with `/`.
    pub fn cascading(&self) -> String {
        if self.path.is_empty() {
            "/".to_string()
        } else {
            self.path.clone()
        }
    }

    /// The same path in another namespace.
    pub fn in_namespace(&self, namespace: Namespace) -> KeyName {
        KeyName {
            namespace,
            path: self.path.clone(),
        }
    }

    /// The specification key mirroring this key's validation rules.
    ///
    /// Fails for namespace roots, which have no path to mirror.
    pub fn spec_key(&self) -> Result<KeyName> {
        let derived = spec_key_name(&self.to_string())?;
        if self.segments().is_empty() {
            return Err(Error::InvalidKeyName {
                name: self.to_string(),
                message: "cannot derive a specification key from a namespace root".to_string(),
            });
        }
        Ok(Self::split(&derived))
    }

    /// Raw (still escaped) path segments.
    pub fn segments(&self) -> Vec<&str> {
        split_segments(&self.path)
    }

    /// Last segment of the name, empty for a namespace root.
    pub fn base_name(&self) -> &str {
        self.segments().last().copied().unwrap_or("")
    }

    /// Every mountpoint that could cover this key, outermost first.
    ///
    /// For a namespaced name this is each ancestor including the bare
    /// namespace. A cascading name may be served by any mountable namespace,
    /// so its ancestors are listed once per namespace.
    pub fn mountpoint_candidates(&self) -> Vec<String> {
        let segments = self.segments();
        let prefixes = |root: &str, with_root: bool| {
            let mut names = Vec::new();
            if with_root {
                names.push(root.to_string());
            }
            let mut current = root.to_string();
            for segment in &segments {
                current.push('/');
                current.push_str(segment);
                names.push(current.clone());
            }
            names
        };

        if self.is_cascading() {
            Namespace::MOUNTABLE
                .iter()
                .flat_map(|ns| prefixes(ns.as_str(), false))
                .collect()
        } else {
            prefixes(self.namespace.as_str(), true)
        }
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Namespace::Cascading => write!(f, "{}", self.cascading()),
            ns => write!(f, "{}{}", ns.as_str(), self.path),
        }
    }
}

fn trim_trailing_separator(name: &str) -> &str {
    let mut trimmed = name;
    while trimmed.len() > 1 && trimmed.ends_with('/') && !trimmed.ends_with("\\/") {
        trimmed = &trimmed[..trimmed.len() - 1];
    }
    trimmed
}

/// Derive the specification key name by replacing everything up to and
/// including the first `/` with `spec/`.
///
/// ```
/// use kdb_state::keyname::spec_key_name;
///
/// assert_eq!(spec_key_name("system/x1/x2").unwrap(), "spec/x1/x2");
/// assert_eq!(spec_key_name("/x1/x2").unwrap(), "spec/x1/x2");
/// assert!(spec_key_name("user").is_err());
/// ```
pub fn spec_key_name(name: &str) -> Result<String> {
    match name.find('/') {
        Some(pos) => Ok(format!("spec/{}", &name[pos + 1..])),
        None => Err(Error::InvalidKeyName {
            name: name.to_string(),
            message: "cannot derive a specification key from a name without '/'".to_string(),
        }),
    }
}

/// Join a name prefix and a name with exactly one separator.
pub fn join_prefix(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        return name.to_string();
    }
    let prefix = prefix.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (prefix.is_empty(), name.is_empty()) {
        (_, true) if !prefix.is_empty() => prefix.to_string(),
        (true, _) => format!("/{}", name),
        _ => format!("{}/{}", prefix, name),
    }
}

/// Split a path into segments on unescaped `/`, keeping escapes intact.
pub fn split_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (pos, ch) in path.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '/' => {
                if pos > start {
                    segments.push(&path[start..pos]);
                }
                start = pos + 1;
            }
            _ => {}
        }
    }
    if start < path.len() {
        segments.push(&path[start..]);
    }
    segments
}

/// Escape a string so it forms a single key name segment.
pub fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if ch == '\\' || ch == '/' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Reverse of [`escape_segment`].
pub fn unescape_segment(segment: &str) -> String {
    let mut unescaped = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                unescaped.push(next);
            }
        } else {
            unescaped.push(ch);
        }
    }
    unescaped
}

/// The namespace-independent path of a raw key name string.
pub fn path_of(name: &str) -> &str {
    if name.starts_with('/') {
        return name;
    }
    match name.find('/') {
        Some(pos) => &name[pos..],
        None => "",
    }
}

/// Whether `name` equals `root` or lies below it.
///
/// A cascading `root` matches keys of every namespace.
pub fn is_below_or_same(name: &str, root: &str) -> bool {
    let root = trim_trailing_separator(root);
    let (name, root) = if root.starts_with('/') {
        (path_of(name), root)
    } else {
        (name, root)
    };
    if root == "/" {
        return true;
    }
    name == root || (name.starts_with(root) && name[root.len()..].starts_with('/'))
}
