//! Input staging with guaranteed teardown.
//!
//! [`StageManager::stage`] materialises a configuration's inputs into its
//! mesh directories and returns a [`StagedConfiguration`] guard. Dropping or
//! releasing the guard removes everything that appeared in those directories
//! after the guard was created (staged inputs and solver outputs alike), so
//! the primary repository returns to its pre-stage layout on every exit
//! path, including errors and timeouts.

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use vandv_core::{ConfigOverrides, ConfigurationSet, PathResolver, Repository, ValidationCase, PLOTS_DIR};

use crate::error::{PipelineError, PipelineResult};
use crate::fs_ops::{entry_names, list_files, list_subdirs, remove_path};

/// A mesh case whose inputs were staged.
#[derive(Debug, Clone)]
pub struct StagedMesh {
    pub name: String,
    pub dir: PathBuf,
    /// Path of the staged shared config file inside `dir`.
    pub config_file: PathBuf,
    /// Names of the files copied from the secondary repository.
    pub inputs: Vec<String>,
}

#[derive(Debug)]
struct MeshSnapshot {
    dir: PathBuf,
    pristine: BTreeSet<OsString>,
}

/// Scoped acquisition of a configuration's staged files.
#[derive(Debug)]
pub struct StagedConfiguration {
    configuration: String,
    config_dir: PathBuf,
    staged: Vec<StagedMesh>,
    warnings: Vec<PipelineError>,
    snapshots: Vec<MeshSnapshot>,
    plots_existed: bool,
    released: bool,
}

impl StagedConfiguration {
    pub fn configuration(&self) -> &str {
        &self.configuration
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn staged(&self) -> &[StagedMesh] {
        &self.staged
    }

    /// Non-fatal staging conditions, e.g. `MissingSecondaryData`.
    pub fn warnings(&self) -> &[PipelineError] {
        &self.warnings
    }

    /// Mesh cases that were skipped for lack of secondary data.
    pub fn skipped(&self) -> Vec<String> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                PipelineError::MissingSecondaryData { mesh, .. } => Some(mesh.clone()),
                _ => None,
            })
            .collect()
    }

    /// Tear down now and report every removal that failed.
    pub fn release(mut self) -> Vec<PipelineError> {
        let failures = self.teardown();
        self.released = true;
        failures
    }

    fn teardown(&mut self) -> Vec<PipelineError> {
        let mut failures = Vec::new();
        for snapshot in &self.snapshots {
            let current = match entry_names(&snapshot.dir) {
                Ok(names) => names,
                Err(PipelineError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    failures.push(PipelineError::CleanupFailed {
                        path: snapshot.dir.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            for name in current.difference(&snapshot.pristine) {
                let path = snapshot.dir.join(name);
                if let Err(e) = remove_path(&path) {
                    failures.push(PipelineError::CleanupFailed {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !self.plots_existed {
            let plots = self.config_dir.join(PLOTS_DIR);
            if let Err(e) = remove_path(&plots) {
                failures.push(PipelineError::CleanupFailed {
                    path: plots,
                    reason: e.to_string(),
                });
            }
        }

        debug!(
            configuration = %self.configuration,
            failures = failures.len(),
            "Unstaged configuration"
        );
        failures
    }
}

impl Drop for StagedConfiguration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for failure in self.teardown() {
            error!(configuration = %self.configuration, error = %failure, "Cleanup failed");
        }
    }
}

/// Stages and unstages configuration inputs.
#[derive(Debug, Clone, Copy)]
pub struct StageManager<'a> {
    resolver: &'a PathResolver,
    shared_config_file: &'a str,
    overrides: &'a ConfigOverrides,
}

impl<'a> StageManager<'a> {
    pub fn new(
        resolver: &'a PathResolver,
        shared_config_file: &'a str,
        overrides: &'a ConfigOverrides,
    ) -> Self {
        Self {
            resolver,
            shared_config_file,
            overrides,
        }
    }

    /// Mesh case directories of a configuration in the primary repository.
    pub fn mesh_cases(
        &self,
        case: &ValidationCase,
        configuration: &str,
    ) -> PipelineResult<Vec<PathBuf>> {
        let dir = self
            .resolver
            .configuration_dir(Repository::Primary, case, configuration);
        Ok(list_subdirs(&dir)?
            .into_iter()
            .filter(|p| p.file_name().is_some_and(|n| n != PLOTS_DIR))
            .collect())
    }

    /// Stage the shared config file and secondary data into every mesh case.
    ///
    /// Mesh cases without secondary data are skipped with a
    /// `MissingSecondaryData` warning. Any copy failure tears down whatever
    /// was already staged before the error is returned.
    pub fn stage(
        &self,
        case: &ValidationCase,
        configuration: &str,
    ) -> PipelineResult<StagedConfiguration> {
        let stage_failed = |reason: String| PipelineError::StageFailed {
            configuration: configuration.to_string(),
            reason,
        };

        let config_dir = self
            .resolver
            .configuration_dir(Repository::Primary, case, configuration);
        if !config_dir.is_dir() {
            return Err(stage_failed(format!(
                "configuration directory {} does not exist",
                config_dir.display()
            )));
        }

        let shared_config = config_dir.join(self.shared_config_file);
        let text = fs::read_to_string(&shared_config).map_err(|e| {
            stage_failed(format!("cannot read {}: {e}", shared_config.display()))
        })?;
        let config_text = self
            .overrides
            .apply(&text, &shared_config)
            .map_err(|e| stage_failed(e.to_string()))?;

        let meshes = self.mesh_cases(case, configuration)?;
        let mut snapshots = Vec::with_capacity(meshes.len());
        for dir in &meshes {
            snapshots.push(MeshSnapshot {
                dir: dir.clone(),
                pristine: entry_names(dir)?,
            });
        }

        // From here on the guard owns cleanup.
        let mut guard = StagedConfiguration {
            configuration: configuration.to_string(),
            plots_existed: config_dir.join(PLOTS_DIR).exists(),
            config_dir,
            staged: Vec::new(),
            warnings: Vec::new(),
            snapshots,
            released: false,
        };

        for (index, dir) in meshes.into_iter().enumerate() {
            let mesh = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let Some(source) = self.resolver.secondary_mesh_dir(case, configuration, &mesh)
            else {
                let warning = PipelineError::MissingSecondaryData {
                    configuration: configuration.to_string(),
                    mesh: mesh.clone(),
                };
                warn!(%warning, "Skipping mesh case");
                guard.warnings.push(warning);
                continue;
            };

            let staged = stage_mesh(
                &dir,
                &mesh,
                &source,
                self.shared_config_file,
                &config_text,
                &guard.snapshots[index].pristine,
            )
            .map_err(|e| stage_failed(format!("mesh {mesh}: {e}")))?;
            info!(
                configuration,
                mesh = %staged.name,
                inputs = staged.inputs.len(),
                "Staged mesh case"
            );
            guard.staged.push(staged);
        }

        Ok(guard)
    }

    /// Remove leftover staged inputs from every mesh case of `configurations`.
    ///
    /// Only the shared config file and files named like the secondary
    /// counterpart's files are removed, so the sweep is safe to repeat.
    pub fn sweep(
        &self,
        case: &ValidationCase,
        configurations: &ConfigurationSet,
    ) -> Vec<PipelineError> {
        let mut failures = Vec::new();
        for configuration in configurations.iter() {
            let meshes = match self.mesh_cases(case, configuration) {
                Ok(meshes) => meshes,
                Err(e) => {
                    failures.push(e);
                    continue;
                }
            };
            for dir in meshes {
                let mesh = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut names = vec![self.shared_config_file.to_string()];
                if let Some(source) = self.resolver.secondary_mesh_dir(case, configuration, &mesh)
                {
                    if let Ok(files) = list_files(&source) {
                        names.extend(
                            files
                                .iter()
                                .filter_map(|f| f.file_name())
                                .map(|n| n.to_string_lossy().into_owned()),
                        );
                    }
                }
                for name in names {
                    let path = dir.join(&name);
                    if !path.is_file() {
                        continue;
                    }
                    match fs::remove_file(&path) {
                        Ok(()) => debug!(path = %path.display(), "Swept leftover input"),
                        Err(e) => failures.push(PipelineError::CleanupFailed {
                            path,
                            reason: e.to_string(),
                        }),
                    }
                }
            }
        }
        failures
    }
}

/// Teardown only restores the entry set of a mesh directory, so an input
/// whose name is already in `pristine` is refused rather than overwritten.
/// The pipeline's recovery sweep runs first and removes such files as
/// leftovers of a killed run.
fn stage_mesh(
    dir: &Path,
    mesh: &str,
    source: &Path,
    shared_config_file: &str,
    config_text: &str,
    pristine: &BTreeSet<OsString>,
) -> PipelineResult<StagedMesh> {
    let files = list_files(source)?;
    let names = files
        .iter()
        .filter_map(|f| f.file_name())
        .chain(std::iter::once(OsStr::new(shared_config_file)));
    for name in names {
        if pristine.contains(name) {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!(
                    "{} already exists in the mesh directory",
                    name.to_string_lossy()
                ),
            )));
        }
    }

    let mut inputs = Vec::new();
    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        fs::copy(&file, dir.join(name))?;
        inputs.push(name.to_string_lossy().into_owned());
    }

    // Written after the secondary files so a same-named file there cannot
    // shadow the (possibly overridden) shared configuration.
    let config_file = dir.join(shared_config_file);
    fs::write(&config_file, config_text)?;

    Ok(StagedMesh {
        name: mesh.to_string(),
        dir: dir.to_path_buf(),
        config_file,
        inputs,
    })
}
