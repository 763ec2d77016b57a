//! YAML definition loading.
//!
//! A definition document may carry any of the four entity lists. Documents in a
//! directory are read in path order (`*.yml` and `*.yaml` together) and their
//! lists concatenated before the model is validated as a whole.

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use serde::Deserialize;

use crate::error::{Result, SemgraphError};
use crate::model::{Dimension, Join, Metric, Relation};
use crate::registry::SemanticModel;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDefinitions {
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

impl ModelDefinitions {
    pub fn extend(&mut self, other: ModelDefinitions) {
        self.relations.extend(other.relations);
        self.joins.extend(other.joins);
        self.metrics.extend(other.metrics);
        self.dimensions.extend(other.dimensions);
    }

    pub fn into_model(self) -> Result<SemanticModel> {
        SemanticModel::new(self.relations, self.joins, self.metrics, self.dimensions)
    }
}

pub fn parse_definitions(contents: &str) -> Result<ModelDefinitions> {
    if contents.trim().is_empty() {
        return Ok(ModelDefinitions::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

pub fn load_from_yaml_str(contents: &str) -> Result<SemanticModel> {
    parse_definitions(contents)?.into_model()
}

fn definition_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SemgraphError::Config(format!(
            "model directory not found: {}",
            dir.display()
        )));
    }
    let mut files = Vec::new();
    for pattern in ["*.yml", "*.yaml"] {
        let pattern = dir.join(pattern);
        for entry in glob(&pattern.to_string_lossy())
            .map_err(|e| SemgraphError::Other(e.into()))?
            .flatten()
        {
            files.push(entry);
        }
    }
    files.sort();
    Ok(files)
}

pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<SemanticModel> {
    let dir = dir.as_ref();
    let mut definitions = ModelDefinitions::default();
    let files = definition_files(dir)?;
    for path in &files {
        let contents = fs::read_to_string(path)?;
        let parsed = parse_definitions(&contents).map_err(|e| {
            SemgraphError::Config(format!("failed to load {}: {e}", path.display()))
        })?;
        definitions.extend(parsed);
    }
    tracing::info!(dir = %dir.display(), files = files.len(), "loaded model definitions");
    definitions.into_model()
}
