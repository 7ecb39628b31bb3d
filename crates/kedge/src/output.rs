//! Writing of generated manifests.
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use snafu::{ResultExt, Snafu};
use tracing::debug;

use crate::{transform::Transformed, yaml};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to write {kind} {name:?}"))]
    WriteObject {
        source: yaml::Error,
        kind: &'static str,
        name: String,
    },

    #[snafu(display("failed to read included resource {path:?}"))]
    ReadInclude {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write included resource {path:?}"))]
    WriteInclude { source: yaml::Error, path: PathBuf },
}

/// Resolves an `includeResources` entry. Relative paths are relative to the directory of
/// the application file they were declared in.
pub fn include_path(input_file: Option<&Path>, include: &str) -> PathBuf {
    let include = Path::new(include);
    match input_file.and_then(Path::parent) {
        Some(directory) if include.is_relative() => directory.join(include),
        _ => include.to_path_buf(),
    }
}

/// Writes every generated object followed by the content of every included file, each as
/// an explicit YAML document.
pub fn write_manifests<W: Write>(
    mut writer: W,
    transformed: &Transformed,
    input_file: Option<&Path>,
) -> Result<()> {
    for object in &transformed.objects {
        yaml::serialize_to_explicit_document(&mut writer, object).context(WriteObjectSnafu {
            kind: object.kind(),
            name: object.name(),
        })?;
    }

    for include in &transformed.include_resources {
        let path = include_path(input_file, include);
        debug!(path = %path.display(), "including resource file");
        let content = fs::read_to_string(&path).context(ReadIncludeSnafu { path: &path })?;
        yaml::write_raw_document(&mut writer, &content).context(WriteIncludeSnafu { path })?;
    }

    Ok(())
}
