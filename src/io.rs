use std::{io::Write, path::Path};

use miette::{Context, IntoDiagnostic};

use crate::result::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Write `contents` to `path` unless the file already holds exactly those bytes.
///
/// The data is first written to a temporary file of the same directory which then
/// replaces the target, so readers never observe a partially written file.
/// With `dry_run`, only the outcome is computed.
pub fn write_if_changed(path: &Path, contents: &[u8], dry_run: bool) -> Result<WriteOutcome> {
    let outcome = match std::fs::read(path) {
        Ok(existing) if existing == contents => return Ok(WriteOutcome::Unchanged),
        Ok(_) => WriteOutcome::Updated,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => WriteOutcome::Created,
        Err(err) => {
            return Err(crate::result::Error::from(err)
                .wrap_err_with(|| format!("Could not read {}", path.display())))
        }
    };

    if dry_run {
        return Ok(outcome);
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not create directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .into_diagnostic()
        .wrap_err("Could not create tempfile")?;
    tmp.write_all(contents).into_diagnostic()?;
    tmp.persist(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not write {}", path.display()))?;

    Ok(outcome)
}
