//! Command implementations

pub mod completions;
pub mod export;
pub mod import;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};

use uapf::sources::GitRepository;
use uapf::util::config::{self, Config};

/// Open the repository containing `path`.
pub fn open_repository(path: &Path) -> Result<GitRepository> {
    GitRepository::discover(path)
        .with_context(|| format!("cannot use {} as a repository", path.display()))
}

/// Global config overlaid with the repository's own `.uapf/config.toml`.
pub fn load_config(repo: &GitRepository) -> Config {
    let global = config::global_config_path();
    config::load_config(global.as_deref(), &config::project_config_path(repo.root()))
}
