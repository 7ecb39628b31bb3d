//! Command line arguments of the `kedge` binary.
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use clap::{Args, Parser, Subcommand};
use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;

use crate::{
    cluster::Operation,
    validation::{self, AppSchemaValidator, InputValidator, JsonSchemaValidator, NoopValidator},
};

const KUBECTL: &str = "kubectl";
const OC: &str = "oc";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to inspect input path {path:?}"))]
    InspectInput {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to list input directory {path:?}"))]
    ListDirectory {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("no *.yml or *.yaml files were found"))]
    NoInputFiles,
}

#[derive(Debug, Parser)]
#[command(
    name = "kedge",
    author,
    version,
    about = "Expands concise application definitions into Kubernetes manifests"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the generated manifests.
    Generate(InputArguments),

    /// Apply the generated manifests to the cluster.
    Apply(ClusterArguments),

    /// Create the generated objects in the cluster.
    Create(ClusterArguments),

    /// Delete the generated objects from the cluster.
    Delete(ClusterArguments),
}

impl Command {
    pub fn input(&self) -> &InputArguments {
        match self {
            Self::Generate(input) => input,
            Self::Apply(cluster) | Self::Create(cluster) | Self::Delete(cluster) => &cluster.input,
        }
    }

    /// The cluster operation to run, or `None` when the manifests are only printed.
    pub fn cluster_operation(&self) -> Option<(Operation, &ClusterArguments)> {
        match self {
            Self::Generate(_) => None,
            Self::Apply(cluster) => Some((Operation::Apply, cluster)),
            Self::Create(cluster) => Some((Operation::Create, cluster)),
            Self::Delete(cluster) => Some((Operation::Delete, cluster)),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct InputArguments {
    /// Application files, or directories whose *.yml and *.yaml files are read
    #[arg(long, short = 'f', value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Validate every application document against this JSON schema instead of the built-in one
    #[arg(long, value_name = "FILE", env = "KEDGE_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Decode application documents without validating them against a schema first
    #[arg(long, env = "KEDGE_SKIP_VALIDATION", conflicts_with = "schema")]
    pub skip_validation: bool,
}

impl InputArguments {
    /// The validator documents are checked with before decoding.
    pub fn validator(&self) -> Result<Box<dyn InputValidator>, validation::Error> {
        if self.skip_validation {
            debug!("skipping schema validation");
            return Ok(Box::new(NoopValidator));
        }
        Ok(match &self.schema {
            Some(schema) => Box::new(JsonSchemaValidator::from_file(schema)?),
            None => Box::new(AppSchemaValidator::new()?),
        })
    }
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct ClusterArguments {
    #[command(flatten)]
    pub input: InputArguments,

    /// The cluster tool the manifests are piped into. Defaults to `oc` when OpenShift
    /// objects were generated and to `kubectl` otherwise
    #[arg(long, value_name = "BINARY", env = "KEDGE_KUBECTL")]
    pub kubectl: Option<PathBuf>,

    /// Namespace or project to operate in, defaults to the one of the current context
    #[arg(long, short = 'n', env = "KEDGE_NAMESPACE")]
    pub namespace: Option<String>,
}

impl ClusterArguments {
    pub fn cluster_binary(&self, openshift: bool) -> &Path {
        match &self.kubectl {
            Some(binary) => binary,
            None if openshift => Path::new(OC),
            None => Path::new(KUBECTL),
        }
    }
}

/// Expands directories into the *.yml files they contain followed by their *.yaml files,
/// each group sorted by name. Other paths are taken as they are.
pub fn gather_input_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        let metadata = fs::metadata(path).context(InspectInputSnafu { path })?;
        if metadata.is_dir() {
            for extension in ["yml", "yaml"] {
                let mut matches = files_with_extension(path, extension)?;
                matches.sort();
                files.append(&mut matches);
            }
        } else {
            files.push(path.clone());
        }
    }

    ensure!(!files.is_empty(), NoInputFilesSnafu);
    debug!(?files, "gathered input files");
    Ok(files)
}

fn files_with_extension(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(directory).context(ListDirectorySnafu { path: directory })? {
        let path = entry.context(ListDirectorySnafu { path: directory })?.path();
        if path.is_file() && path.extension() == Some(OsStr::new(extension)) {
            files.push(path);
        }
    }
    Ok(files)
}
