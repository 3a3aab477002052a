use std::collections::BTreeMap;
use std::path::Path;

use super::ConfigError;

/// Engine properties, as read from `.properties` files and `key=value` flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents))
    }

    /// Parses `.properties` syntax: one entry per line, the key ends at the
    /// first `=`, `:` or whitespace, and `#` and `!` start comments.
    pub fn parse(contents: &str) -> Self {
        let mut props = Self::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some(idx) = line.find(|c: char| c == '=' || c == ':' || c.is_whitespace()) else {
                props.insert(line, "");
                continue;
            };
            let key = &line[..idx];
            let rest = line[idx..].trim_start();
            let value = rest
                .strip_prefix(['=', ':'])
                .map(str::trim_start)
                .unwrap_or(rest);
            props.insert(key, value);
        }
        props
    }

    /// Parses inline `key=value` pairs, splitting on `=` and discarding
    /// trailing empty pieces (`k=v=` is `k` -> `v`). Anything left with other
    /// than two pieces, or with an empty key, is rejected.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self, ConfigError> {
        let mut props = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let mut pieces: Vec<&str> = pair.split('=').collect();
            while pieces.last().is_some_and(|piece| piece.is_empty()) {
                pieces.pop();
            }
            if pieces.len() != 2 || pieces[0].is_empty() {
                return Err(ConfigError::InvalidProperty(pair.to_string()));
            }
            props.insert(pieces[0], pieces[1]);
        }
        Ok(props)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Merges `other` into `self`; values from `other` win.
    pub fn extend(&mut self, other: Properties) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
