// weiser-core/src/infrastructure/config/loader.rs

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::WeiserError;
use crate::infrastructure::config::model::BaseConfig;
use crate::infrastructure::config::template;
use crate::infrastructure::error::InfrastructureError;

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit `.env` path (`-e`). When set, its values win over the
    /// ambient environment; by default the ambient environment wins.
    pub env_file: Option<PathBuf>,
}

/// Load a configuration document: template-expand, parse, walk
/// `includes` (each visited once), merge, validate.
pub fn load_config(path: &Path, options: &LoadOptions) -> Result<BaseConfig, WeiserError> {
    let context = template::env_context(options.env_file.as_deref())?;

    let mut visited = HashSet::new();
    let mut config = load_one(path, &context, &mut visited)?;
    // The root keeps its include list for introspection; nested lists are
    // consumed during the walk.
    config.validate()?;
    info!(
        checks = config.checks.len(),
        datasources = config.datasources.len(),
        "Configuration loaded"
    );
    Ok(config)
}

fn load_one(
    path: &Path,
    context: &std::collections::HashMap<String, String>,
    visited: &mut HashSet<PathBuf>,
) -> Result<BaseConfig, WeiserError> {
    let canonical = path
        .canonicalize()
        .map_err(|_| InfrastructureError::ConfigNotFound(path.display().to_string()))?;
    if !visited.insert(canonical.clone()) {
        // Already merged through another include path.
        return Ok(BaseConfig {
            version: 1,
            datasources: Vec::new(),
            connections: Vec::new(),
            checks: Vec::new(),
            includes: Vec::new(),
            slack_url: None,
        });
    }
    debug!(path = %path.display(), "Reading config file");

    let raw = fs::read_to_string(&canonical)
        .map_err(InfrastructureError::Io)?;
    let rendered = template::render(&raw, context)?;
    let mut config: BaseConfig =
        serde_yaml::from_str(&rendered).map_err(InfrastructureError::Yaml)?;

    let root_dir = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    for include in config.includes.clone() {
        // Includes are relative to the including file; a leading slash is
        // tolerated and stripped.
        let relative = include.strip_prefix('/').unwrap_or(&include);
        let included = load_one(&root_dir.join(relative), context, visited)?;
        config.merge(included);
    }

    Ok(config)
}
