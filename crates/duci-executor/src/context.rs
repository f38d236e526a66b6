//! Build context packaging.

use bytes::Bytes;
use duci_core::{Error, Result};
use std::io;
use std::path::Path;

/// Preferred Dockerfile location, relative to the working directory.
pub const DUCI_DOCKERFILE: &str = ".duci/Dockerfile";

/// Fallback Dockerfile location, relative to the working directory.
pub const ROOT_DOCKERFILE: &str = "Dockerfile";

/// Dockerfile path to hand to the engine.
///
/// `.duci/Dockerfile` wins when it exists; otherwise the root `Dockerfile`
/// path is returned even if absent, leaving the engine to report it.
pub fn dockerfile_path(workdir: &Path) -> &'static str {
    if workdir.join(DUCI_DOCKERFILE).is_file() {
        DUCI_DOCKERFILE
    } else {
        ROOT_DOCKERFILE
    }
}

/// Tar `workdir` into an in-memory build context.
///
/// Entries are regular files with paths relative to `workdir`; directories
/// are walked but not emitted, anything else is skipped.
pub async fn build_context(workdir: &Path) -> Result<Bytes> {
    let workdir = workdir.to_path_buf();
    tokio::task::spawn_blocking(move || tar_directory(&workdir))
        .await
        .map_err(|e| Error::Internal(format!("build context task failed: {}", e)))?
        .map(Bytes::from)
        .map_err(|e| Error::Build(format!("failed to create build context: {}", e)))
}

fn tar_directory(root: &Path) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    append_dir(&mut builder, root, Path::new(""))?;
    builder.into_inner()
}

fn append_dir(builder: &mut tar::Builder<Vec<u8>>, root: &Path, rel: &Path) -> io::Result<()> {
    let mut entries = std::fs::read_dir(root.join(rel))?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = entry.file_type()?;
        let rel_path = rel.join(entry.file_name());
        if file_type.is_dir() {
            append_dir(builder, root, &rel_path)?;
        } else if file_type.is_file() {
            builder.append_path_with_name(entry.path(), &rel_path)?;
        }
    }
    Ok(())
}
