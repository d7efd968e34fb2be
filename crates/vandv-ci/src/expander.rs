//! Configuration selector expansion.

use std::path::Path;

use regex::Regex;
use tracing::debug;
use vandv_core::{ConfigurationSelector, ConfigurationSet};

use crate::error::{PipelineError, PipelineResult};
use crate::fs_ops::list_subdirs;

/// Turns a selector into a concrete [`ConfigurationSet`].
#[derive(Debug, Clone)]
pub struct ConfigurationExpander {
    pattern: Regex,
}

impl ConfigurationExpander {
    pub fn new(pattern: &str) -> PipelineResult<Self> {
        let pattern = Regex::new(pattern).map_err(vandv_core::VandvError::from)?;
        Ok(Self { pattern })
    }

    /// Expand `selector` against the case root.
    ///
    /// A named selector becomes a singleton without touching the
    /// filesystem. `All` lists immediate subdirectories of `case_root` whose
    /// names match the pattern and fails with `NoConfigurationsFound` when
    /// none do.
    pub fn expand(
        &self,
        selector: &ConfigurationSelector,
        case_root: &Path,
    ) -> PipelineResult<ConfigurationSet> {
        match selector {
            ConfigurationSelector::Named(name) => Ok(ConfigurationSet::single(name)?),
            ConfigurationSelector::All => {
                let names: Vec<String> = list_subdirs(case_root)?
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .filter(|n| self.pattern.is_match(n))
                    .collect();
                debug!(case_root = %case_root.display(), found = names.len(), "Expanded All");
                ConfigurationSet::discovered(names).ok_or_else(|| {
                    PipelineError::NoConfigurationsFound {
                        case_root: case_root.to_path_buf(),
                    }
                })
            }
        }
    }
}
