// Worker launch description

use std::path::{Path, PathBuf};

use super::Assignment;

/// Flag the worker expects in front of the image path
pub const IMAGE_FLAG: &str = "--image";

/// Static part of the worker invocation (from configuration)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    /// Overrides the `--image` argument; defaults to the stored image's absolute path
    pub image_arg: Option<PathBuf>,
    /// Appended after the image argument
    pub extra_args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            image_arg: None,
            extra_args: Vec::new(),
        }
    }
}

/// Fully resolved process invocation for one supervision window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build `[target, "--image", <image>, ...extra]` for an assignment
    pub fn for_assignment(command: &WorkerCommand, assignment: &Assignment) -> Self {
        let image = match &command.image_arg {
            Some(path) => path.clone(),
            None => absolutize(assignment.image_path()),
        };

        let mut args = Vec::with_capacity(3 + command.extra_args.len());
        args.push(assignment.target.as_str().to_string());
        args.push(IMAGE_FLAG.to_string());
        args.push(image.to_string_lossy().into_owned());
        args.extend(command.extra_args.iter().cloned());

        Self::new(command.program.clone(), args)
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
