//! SU2 configuration file options and user overrides.
//!
//! SU2 `.cfg` files are line oriented: `KEY= VALUE`, with `%` or `#`
//! starting a comment line. Overrides rewrite the value of existing keys and
//! leave every other line untouched.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VandvError};

/// Parse the options of an SU2 configuration file, in file order.
///
/// Later duplicates win, matching how the solver reads the file.
pub fn parse_options(text: &str) -> Vec<(String, String)> {
    let mut options: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let Some((key, value)) = split_option(line) else {
            continue;
        };
        match options.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value.to_string(),
            None => options.push((key.to_string(), value.to_string())),
        }
    }
    options
}

/// Split a non-comment `KEY= VALUE` line.
fn split_option(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('%') || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// User-supplied option overrides, keyed by option name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ConfigOverrides(BTreeMap<String, String>);

impl ConfigOverrides {
    /// Parse `KEY=VALUE` pairs.
    pub fn parse<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut map = BTreeMap::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| VandvError::InvalidOverride(pair.to_string()))?;
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(VandvError::InvalidOverride(pair.to_string()));
            }
            map.insert(key.to_string(), value.trim().to_string());
        }
        Ok(Self(map))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Rewrite `text` with every override applied.
    ///
    /// `file` is only used in the error for a key the file does not define.
    pub fn apply(&self, text: &str, file: &Path) -> Result<String> {
        if self.is_empty() {
            return Ok(text.to_string());
        }

        let mut seen = std::collections::BTreeSet::new();
        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let body = line.trim_end_matches(['\n', '\r']);
            let ending = &line[body.len()..];
            match split_option(body).and_then(|(key, _)| self.0.get_key_value(key)) {
                Some((key, value)) => {
                    seen.insert(key.as_str());
                    out.push_str(&format!("{key}= {value}"));
                    out.push_str(ending);
                }
                None => out.push_str(line),
            }
        }

        if let Some(missing) = self.0.keys().find(|k| !seen.contains(k.as_str())) {
            return Err(VandvError::UnknownConfigOption {
                key: missing.clone(),
                file: file.to_path_buf(),
            });
        }
        Ok(out)
    }
}
