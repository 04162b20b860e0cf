//! Path resolution for the image root, the marked directory, and the log.
//!
//! All paths are computed once at startup and shared read-only for the
//! lifetime of the process. Every join of a client-supplied name goes through
//! [`safe_join`], which refuses anything that would land outside the root.
//!
//! Records in the sample log reference images relative to the log file's own
//! directory, so the log can be moved together with the image tree and read
//! without knowing where the marker was started from.

use std::path::{Component, Path, PathBuf};

use crate::error::StartupError;
use crate::models::{ImageName, NameError, MARKED_DIR_NAME};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error("{name:?} resolves outside of {root}")]
    Escapes { root: PathBuf, name: String },
}

/// Absolute, cleaned paths used by every component.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub image_root: PathBuf,
    pub marked_dir: PathBuf,
    pub output_file: PathBuf,
    /// `/`-separated path from the output file's directory to `marked_dir`.
    marked_from_output: String,
}

impl ResolvedPaths {
    /// Compute all paths. Fails if the image root does not exist or is not
    /// a directory. Does not touch the filesystem otherwise.
    pub fn resolve(image_root: &Path, output_file: &Path) -> Result<Self, StartupError> {
        let image_root = absolutize(image_root)?;
        match std::fs::metadata(&image_root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(StartupError::ImageRootNotDirectory(image_root)),
            Err(source) => {
                return Err(StartupError::ImageRootMissing {
                    path: image_root,
                    source,
                })
            }
        }

        let marked_dir = image_root.join(MARKED_DIR_NAME);
        let output_file = absolutize(output_file)?;
        let output_dir = output_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let relative = relative_path(&output_dir, &marked_dir).ok_or_else(|| {
            StartupError::NoRelativePath {
                from: output_dir.clone(),
                to: marked_dir.clone(),
            }
        })?;
        let marked_from_output = to_record_string(&relative)?;

        Ok(Self {
            image_root,
            marked_dir,
            output_file,
            marked_from_output,
        })
    }

    /// Create the marked directory. An existing directory is fine.
    pub fn ensure_marked_dir(&self) -> Result<(), StartupError> {
        match std::fs::create_dir(&self.marked_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && self.marked_dir.is_dir() => {
                Ok(())
            }
            Err(source) => Err(StartupError::MarkedDirCreate {
                path: self.marked_dir.clone(),
                source,
            }),
        }
    }

    /// Resolve and create the marked directory: the full startup step.
    pub fn prepare(image_root: &Path, output_file: &Path) -> Result<Self, StartupError> {
        let paths = Self::resolve(image_root, output_file)?;
        paths.ensure_marked_dir()?;
        Ok(paths)
    }

    /// `/`-separated path from the log file's directory to the marked directory.
    pub fn marked_from_output(&self) -> &str {
        &self.marked_from_output
    }

    /// Location of an unlabeled image in the image root.
    pub fn image_path(&self, name: &ImageName) -> Result<PathBuf, PathError> {
        safe_join(&self.image_root, name.as_str())
    }

    /// Where `name` lands once it is marked.
    pub fn marked_path(&self, name: &ImageName) -> Result<PathBuf, PathError> {
        safe_join(&self.marked_dir, name.as_str())
    }

    /// The path written as the first field of a log record.
    pub fn record_path(&self, name: &ImageName) -> String {
        if self.marked_from_output == "." {
            name.to_string()
        } else {
            format!("{}/{}", self.marked_from_output, name)
        }
    }

    /// Map a record path back to the image name, if it points into the
    /// marked directory.
    pub fn name_from_record_path(&self, record_path: &str) -> Option<ImageName> {
        let output_dir = self.output_file.parent()?;
        let resolved = clean(&output_dir.join(record_path));
        if resolved.parent()? != self.marked_dir {
            return None;
        }
        let file_name = resolved.file_name()?.to_str()?;
        ImageName::parse(file_name).ok()
    }
}

/// Join a single file name onto `root`, rejecting anything that does not
/// stay directly inside it.
pub fn safe_join(root: &Path, name: &str) -> Result<PathBuf, PathError> {
    let name = ImageName::parse(name)?;
    let mut components = Path::new(name.as_str()).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    let joined = clean(&root.join(name.as_str()));
    if !single_normal || joined.parent() != Some(root) {
        return Err(PathError::Escapes {
            root: root.to_path_buf(),
            name: name.to_string(),
        });
    }
    Ok(joined)
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent.
/// Symlinks are not resolved.
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Make `path` absolute against the current directory and clean it.
pub fn absolutize(path: &Path) -> Result<PathBuf, StartupError> {
    if path.is_absolute() {
        return Ok(clean(path));
    }
    let cwd = std::env::current_dir().map_err(|source| StartupError::Resolve {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(clean(&cwd.join(path)))
}

/// Relative path from directory `from` to `to`. Both must be absolute and
/// cleaned. Returns `None` when they share no root (e.g. different drives).
pub fn relative_path(from: &Path, to: &Path) -> Option<PathBuf> {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();

    if from.first() != to.first() {
        return None;
    }

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    Some(rel)
}

fn to_record_string(path: &Path) -> Result<String, StartupError> {
    let mut parts = Vec::new();
    for component in path.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| StartupError::UnrecordablePath(path.to_string_lossy().to_string()))?;
        parts.push(part);
    }
    let joined = parts.join("/");
    if joined.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(StartupError::UnrecordablePath(joined));
    }
    Ok(joined)
}
