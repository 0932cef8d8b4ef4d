//! `uapf validate` command

use anyhow::Result;

use crate::cli::ValidateArgs;
use uapf::ops::validate::validate_package_dir;

pub fn execute(args: ValidateArgs) -> Result<()> {
    let package = validate_package_dir(&args.dir)?;

    let name = package.manifest.package_name().unwrap_or("(unnamed)");
    eprintln!(
        "   Validated {} ({} references)",
        name,
        package.references.len()
    );
    for path in &package.references {
        println!("{}", path);
    }

    Ok(())
}
