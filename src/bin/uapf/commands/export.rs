//! `uapf export` command

use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::cli::ExportArgs;
use crate::commands::{load_config, open_repository};
use uapf::ops::export::{export_package, ExportOptions};
use uapf::ops::pipe::into_transfer_error;
use uapf::util::fs::ensure_dir;
use uapf::util::hash::HashingWriter;

/// Where the archive ends up: an explicit file, a file inside an explicit
/// directory, or the derived name in the current directory.
pub fn output_path(output: Option<&Path>, filename: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(filename),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(filename),
    }
}

pub fn execute(args: ExportArgs) -> Result<()> {
    let repo = open_repository(&args.repo)?;
    let config = load_config(&repo);

    let mut options = ExportOptions::from_config(&config.export);
    options.reference = args.reference;
    options.referenced_only |= args.referenced_only;

    let mut export = export_package(&repo, options)?;
    let dest = output_path(args.output.as_deref(), &export.filename);

    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir(&dir)?;

    // Stream into a sibling temp file so a failed export leaves nothing behind.
    let tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    let mut writer = HashingWriter::new(BufWriter::new(tmp));

    io::copy(&mut export, &mut writer).map_err(into_transfer_error)?;

    let size = writer.written();
    let (buffered, digest) = writer.finish();
    let tmp = buffered.into_inner().map_err(|e| e.into_error())?;
    tmp.persist(&dest)
        .with_context(|| format!("failed to write {}", dest.display()))?;

    eprintln!(
        "    Exported {} from {} ({} bytes)",
        dest.display(),
        &export.commit[..export.commit.len().min(12)],
        size
    );
    println!("{}  {}", digest, dest.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_path() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(output_path(None, "demo_1.0.uapf"), PathBuf::from("demo_1.0.uapf"));
        assert_eq!(
            output_path(Some(tmp.path()), "demo_1.0.uapf"),
            tmp.path().join("demo_1.0.uapf")
        );
        assert_eq!(
            output_path(Some(Path::new("out/pkg.uapf")), "demo_1.0.uapf"),
            PathBuf::from("out/pkg.uapf")
        );
    }
}
