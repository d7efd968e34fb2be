//! Validation case identity and configuration selection.
//!
//! A [`ValidationCase`] is the `(category, case_code, turbulence_model)`
//! triple that roots a family of configurations. A [`ConfigurationSet`] is the
//! single internal representation of "which configurations to run": a
//! non-empty ordered list, built either from one named selector or from
//! directory discovery when the `All` sentinel is used.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VandvError};

/// Literal selector that expands to every discovered configuration.
pub const ALL_SENTINEL: &str = "All";

/// Validation case category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Basic,
    Extended,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Basic => "Basic",
            Category::Extended => "Extended",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = VandvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Category::Basic),
            "extended" => Ok(Category::Extended),
            other => Err(VandvError::InvalidCase(format!(
                "unknown category {other:?} (expected Basic or Extended)"
            ))),
        }
    }
}

/// Turbulence model tag (`SA`, `SST`, or any solver-defined token).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TurbulenceModel(String);

impl TurbulenceModel {
    pub fn new(model: &str) -> Result<Self> {
        let model = model.trim();
        if !is_path_component(model) {
            return Err(VandvError::InvalidCase(format!(
                "invalid turbulence model {model:?}"
            )));
        }
        Ok(Self(model.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurbulenceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `(category, case_code, turbulence_model)` triple.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ValidationCase {
    pub category: Category,
    pub case_code: String,
    pub model: TurbulenceModel,
}

impl ValidationCase {
    pub fn new(category: Category, case_code: &str, model: TurbulenceModel) -> Result<Self> {
        let case_code = case_code.trim();
        if !is_path_component(case_code) {
            return Err(VandvError::InvalidCase(format!(
                "invalid case code {case_code:?}"
            )));
        }
        Ok(Self {
            category,
            case_code: case_code.to_string(),
            model,
        })
    }

    /// Parse all three parts from user input.
    pub fn parse(category: &str, case_code: &str, model: &str) -> Result<Self> {
        Self::new(category.parse()?, case_code, TurbulenceModel::new(model)?)
    }
}

impl fmt::Display for ValidationCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category, self.case_code, self.model)
    }
}

/// Author name used in artifact and branch names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Author(String);

impl Author {
    /// Accepts ASCII letters, digits, `.`, `_` and `-` only, since the name
    /// ends up in git branch names and archive file names.
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        let valid = !name.is_empty()
            && !name.starts_with(['.', '-'])
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(VandvError::InvalidAuthor(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User-supplied configuration selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationSelector {
    /// Every configuration directory found under the case root.
    All,
    /// A single configuration; existence is checked at staging time.
    Named(String),
}

impl ConfigurationSelector {
    pub fn is_all(&self) -> bool {
        matches!(self, ConfigurationSelector::All)
    }

    /// The token used in artifact names: `All` or the configuration name.
    pub fn label(&self) -> &str {
        match self {
            ConfigurationSelector::All => ALL_SENTINEL,
            ConfigurationSelector::Named(name) => name,
        }
    }
}

impl FromStr for ConfigurationSelector {
    type Err = VandvError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(ALL_SENTINEL) {
            return Ok(ConfigurationSelector::All);
        }
        if !is_path_component(s) {
            return Err(VandvError::InvalidConfigurationName(s.to_string()));
        }
        Ok(ConfigurationSelector::Named(s.to_string()))
    }
}

impl fmt::Display for ConfigurationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Non-empty, ordered, deduplicated list of concrete configuration names
/// together with the selector that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigurationSet {
    selector: ConfigurationSelector,
    names: Vec<String>,
}

impl ConfigurationSet {
    /// Singleton set for a named selector.
    pub fn single(name: &str) -> Result<Self> {
        match name.parse()? {
            ConfigurationSelector::Named(name) => Ok(Self {
                names: vec![name.clone()],
                selector: ConfigurationSelector::Named(name),
            }),
            ConfigurationSelector::All => {
                Err(VandvError::InvalidConfigurationName(name.to_string()))
            }
        }
    }

    /// Set built from discovered names. Returns `None` when `names` is empty.
    ///
    /// Names are deduplicated and put in natural order, which is not
    /// lexicographic: `Configuration2` comes before `Configuration10`.
    pub fn discovered(mut names: Vec<String>) -> Option<Self> {
        names.sort_by(|a, b| natural_key(a).cmp(&natural_key(b)));
        names.dedup();
        if names.is_empty() {
            return None;
        }
        Some(Self {
            selector: ConfigurationSelector::All,
            names,
        })
    }

    pub fn selector(&self) -> &ConfigurationSelector {
        &self.selector
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Sort key splitting a trailing integer off the name, so that
/// `Configuration2` sorts before `Configuration10`.
fn natural_key(name: &str) -> (&str, Option<u64>, &str) {
    let digits_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(name.len());
    let (prefix, digits) = name.split_at(digits_start);
    (prefix, digits.parse().ok(), name)
}

/// True when `s` can be used as a single path component.
pub(crate) fn is_path_component(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && !s.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!("Basic".parse::<Category>().unwrap(), Category::Basic);
        assert_eq!("extended".parse::<Category>().unwrap(), Category::Extended);
        assert!("Advanced".parse::<Category>().is_err());
    }

    #[test]
    fn test_validation_case_parse() {
        let case = ValidationCase::parse("Basic", "2DML", "SA").unwrap();
        assert_eq!(case.category, Category::Basic);
        assert_eq!(case.case_code, "2DML");
        assert_eq!(case.model.as_str(), "SA");
        assert_eq!(case.to_string(), "Basic/2DML/SA");
    }

    #[test]
    fn test_validation_case_rejects_path_traversal() {
        assert!(ValidationCase::parse("Basic", "../etc", "SA").is_err());
        assert!(ValidationCase::parse("Basic", "2DML", "..").is_err());
        assert!(ValidationCase::parse("Basic", "", "SA").is_err());
    }

    #[test]
    fn test_author_validation() {
        assert_eq!(Author::new("alice").unwrap().as_str(), "alice");
        assert_eq!(Author::new(" j.doe-2 ").unwrap().as_str(), "j.doe-2");
        assert!(Author::new("").is_err());
        assert!(Author::new("John Doe").is_err());
        assert!(Author::new("a/b").is_err());
        assert!(Author::new("-rf").is_err());
    }

    #[test]
    fn test_selector_sentinel() {
        assert!("All".parse::<ConfigurationSelector>().unwrap().is_all());
        assert!("all".parse::<ConfigurationSelector>().unwrap().is_all());
        let named: ConfigurationSelector = "Configuration1".parse().unwrap();
        assert_eq!(named.label(), "Configuration1");
        assert!("a/b".parse::<ConfigurationSelector>().is_err());
    }

    #[test]
    fn test_single_set() {
        let set = ConfigurationSet::single("Configuration3").unwrap();
        assert_eq!(set.names(), ["Configuration3".to_string()]);
        assert_eq!(set.selector().label(), "Configuration3");
        assert!(ConfigurationSet::single("All").is_err());
    }

    #[test]
    fn test_discovered_set_natural_order_and_dedup() {
        let set = ConfigurationSet::discovered(vec![
            "Configuration10".to_string(),
            "Configuration2".to_string(),
            "Configuration1".to_string(),
            "Configuration2".to_string(),
        ])
        .unwrap();
        assert_eq!(
            set.names(),
            ["Configuration1", "Configuration2", "Configuration10"]
        );
        assert!(set.selector().is_all());
    }

    #[test]
    fn test_discovered_empty_is_none() {
        assert!(ConfigurationSet::discovered(Vec::new()).is_none());
    }
}
