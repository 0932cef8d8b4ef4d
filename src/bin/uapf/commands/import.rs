//! `uapf import` command

use std::fs::File;
use std::io::BufReader;

use anyhow::{bail, Context, Result};

use crate::cli::ImportArgs;
use crate::commands::{load_config, open_repository};
use uapf::ops::import::{import_package, ImportOptions};
use uapf::sources::{Actor, GitRepository};
use uapf::util::config::CommitConfig;

/// Pick the commit author: flags, then `[commit]` config, then git config.
fn resolve_actor(args: &ImportArgs, config: &CommitConfig, repo: &GitRepository) -> Result<Actor> {
    let fallback = repo.configured_actor();

    let name = args
        .author_name
        .clone()
        .or_else(|| config.author_name.clone())
        .or_else(|| fallback.as_ref().map(|a| a.name.clone()));
    let email = args
        .author_email
        .clone()
        .or_else(|| config.author_email.clone())
        .or_else(|| fallback.as_ref().map(|a| a.email.clone()));

    match (name, email) {
        (Some(name), Some(email)) => Ok(Actor::new(name, email)),
        _ => bail!(
            "no commit author configured\n\
             hint: pass --author-name and --author-email, or set user.name and user.email"
        ),
    }
}

pub fn execute(args: ImportArgs) -> Result<()> {
    let repo = open_repository(&args.repo)?;
    let config = load_config(&repo);
    let actor = resolve_actor(&args, &config.commit, &repo)?;

    let file = File::open(&args.archive)
        .with_context(|| format!("failed to open {}", args.archive.display()))?;
    let declared_size = file
        .metadata()
        .with_context(|| format!("failed to stat {}", args.archive.display()))?
        .len();

    let mut options = ImportOptions::from_config(&config.import);
    options.branch = args.branch;
    options.target_prefix = args.prefix;
    options.message = args.message;

    let mut reader = BufReader::new(file);
    let report = import_package(&repo, &repo, &actor, &mut reader, Some(declared_size), options)?;

    let package = match (&report.package_name, &report.package_version) {
        (Some(name), Some(version)) => format!("{}@{}", name, version),
        (Some(name), None) => name.clone(),
        _ => args.archive.display().to_string(),
    };
    eprintln!(
        "    Imported {} ({} files) into `{}` as {}",
        package,
        report.files.len(),
        report.branch,
        actor
    );
    println!("{}", report.commit);

    Ok(())
}
