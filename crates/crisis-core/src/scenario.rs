//! Scenario catalog.
//!
//! Scenarios live under `<data>/Scenarios/<Scenario>/<NodeType>/`. Names are
//! matched case-insensitively by storing them lower-cased.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::CoreError;

/// One node type folder inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioNode {
    /// Folder name, e.g. `ElectricalNetwork`.
    pub node_type: String,
    /// Absolute or data-relative folder path.
    pub folder: PathBuf,
}

/// Available scenarios by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, Vec<ScenarioNode>>,
}

impl ScenarioCatalog {
    /// Scan `<data_folder>/Scenarios`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if a directory cannot be listed.
    pub fn scan(data_folder: &Path) -> Result<Self, CoreError> {
        let root = data_folder.join("Scenarios");
        let mut catalog = Self::default();
        for scenario_dir in subdirectories(&root)? {
            let Some(name) = dir_name(&scenario_dir) else {
                continue;
            };
            let nodes = subdirectories(&scenario_dir)?
                .into_iter()
                .filter_map(|folder| {
                    dir_name(&folder).map(|node_type| ScenarioNode { node_type, folder })
                })
                .collect();
            catalog.insert(&name, nodes);
        }
        info!(count = catalog.len(), folder = %root.display(), "Scanned scenario folders");
        Ok(catalog)
    }

    /// Add or replace a scenario.
    pub fn insert(&mut self, name: &str, mut nodes: Vec<ScenarioNode>) {
        nodes.sort_by(|a, b| a.node_type.cmp(&b.node_type));
        self.scenarios.insert(name.to_lowercase(), nodes);
    }

    /// Scenario names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    /// Node folders of a scenario. `name` must already be lower-cased.
    pub fn get(&self, name: &str) -> Option<&[ScenarioNode]> {
        self.scenarios.get(name).map(Vec::as_slice)
    }

    /// Number of scenarios.
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Returns true when no scenarios are known.
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
}
