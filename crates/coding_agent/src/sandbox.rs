use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Path must not be empty")]
    EmptyPath,

    #[error("Path escapes workspace root. Root={}, path={path}", root.display())]
    Escape { root: PathBuf, path: String },

    #[error("Failed to resolve path {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Workspace root must be an existing directory: {}", path.display())]
    NotADirectory { path: PathBuf },
}

impl SandboxError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The single directory tree every filesystem tool is confined to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Canonicalizes `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|_| SandboxError::NotADirectory {
                path: root.to_path_buf(),
            })?;

        if !canonical.is_dir() {
            return Err(SandboxError::NotADirectory { path: canonical });
        }

        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `user_path` to an absolute path inside the root.
    ///
    /// Relative input is joined to the root. Existing paths are canonicalized,
    /// following symlinks. A path that does not exist yet is walked component
    /// by component, so symlinks anywhere in it (dangling ones included) are
    /// followed before the containment check.
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf, SandboxError> {
        if user_path.trim().is_empty() {
            return Err(SandboxError::EmptyPath);
        }

        let candidate = self.absolute_candidate(user_path);
        let resolved = if candidate.exists() {
            candidate
                .canonicalize()
                .map_err(|error| SandboxError::io(&candidate, error))?
        } else {
            resolve_missing(&candidate)?
        };

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(SandboxError::Escape {
                root: self.root.clone(),
                path: user_path.to_string(),
            })
        }
    }

    /// Root-relative display form of an absolute path; `.` for the root itself.
    pub fn relative_display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
            Ok(relative) => relative.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }

    fn absolute_candidate(&self, user_path: &str) -> PathBuf {
        let path = Path::new(user_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

const MAX_SYMLINK_HOPS: usize = 40;

enum Step {
    Root(PathBuf),
    Parent,
    Name(OsString),
}

fn push_steps(pending: &mut Vec<Step>, path: &Path) {
    let steps: Vec<Step> = path
        .components()
        .filter_map(|component| match component {
            Component::Prefix(_) | Component::RootDir => {
                Some(Step::Root(PathBuf::from(component.as_os_str())))
            }
            Component::ParentDir => Some(Step::Parent),
            Component::Normal(part) => Some(Step::Name(part.to_os_string())),
            Component::CurDir => None,
        })
        .collect();
    pending.extend(steps.into_iter().rev());
}

/// Resolves a path whose leaf (or some ancestor) does not exist yet.
///
/// Walks one component at a time. Every existing component is checked with
/// `symlink_metadata`, and symlinks, dangling ones included, are expanded in
/// place so `..` always applies to the real parent.
fn resolve_missing(candidate: &Path) -> Result<PathBuf, SandboxError> {
    let mut pending = Vec::new();
    push_steps(&mut pending, candidate);

    let mut resolved = PathBuf::new();
    let mut hops = 0;
    while let Some(step) = pending.pop() {
        match step {
            Step::Root(root) => resolved.push(root),
            Step::Parent => {
                resolved.pop();
            }
            Step::Name(part) => {
                let next = resolved.join(&part);
                match fs::symlink_metadata(&next) {
                    Ok(metadata) if metadata.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(SandboxError::io(
                                candidate,
                                io::Error::other("too many levels of symbolic links"),
                            ));
                        }
                        let target =
                            fs::read_link(&next).map_err(|error| SandboxError::io(&next, error))?;
                        push_steps(&mut pending, &target);
                    }
                    Ok(_) => resolved = next,
                    Err(error) if error.kind() == io::ErrorKind::NotFound => resolved = next,
                    Err(error) => return Err(SandboxError::io(&next, error)),
                }
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = Sandbox::new(dir.path()).expect("sandbox");
        (dir, sandbox)
    }

    #[test]
    fn relative_paths_resolve_under_root() {
        let (_dir, sandbox) = sandbox();
        fs::write(sandbox.root().join("a.txt"), "a").expect("write");

        let resolved = sandbox.resolve("a.txt").expect("resolve");
        assert_eq!(resolved, sandbox.root().join("a.txt"));
    }

    #[test]
    fn missing_leaf_resolves_through_existing_ancestor() {
        let (_dir, sandbox) = sandbox();

        let resolved = sandbox.resolve("new/dir/file.txt").expect("resolve");
        assert_eq!(resolved, sandbox.root().join("new/dir/file.txt"));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let (_dir, sandbox) = sandbox();

        let error = sandbox.resolve("../etc/passwd").expect_err("escape");
        assert!(matches!(error, SandboxError::Escape { .. }));
        assert!(error.to_string().starts_with("Path escapes workspace root"));
    }

    #[test]
    fn missing_tail_cannot_climb_out() {
        let (_dir, sandbox) = sandbox();

        let error = sandbox.resolve("nope/../../outside.txt").expect_err("escape");
        assert!(matches!(error, SandboxError::Escape { .. }));
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let (_dir, sandbox) = sandbox();
        let other = tempfile::tempdir().expect("tempdir");

        let error = sandbox
            .resolve(&other.path().join("x").display().to_string())
            .expect_err("escape");
        assert!(matches!(error, SandboxError::Escape { .. }));
    }

    #[test]
    fn absolute_path_inside_root_is_accepted() {
        let (_dir, sandbox) = sandbox();
        let inside = sandbox.root().join("inside.txt");

        let resolved = sandbox
            .resolve(&inside.display().to_string())
            .expect("resolve");
        assert_eq!(resolved, inside);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_pointing_outside_is_rejected() {
        let (_dir, sandbox) = sandbox();
        let other = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(other.path(), sandbox.root().join("link")).expect("symlink");

        let error = sandbox.resolve("link/secret.txt").expect_err("escape");
        assert!(matches!(error, SandboxError::Escape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_after_missing_component_is_followed() {
        let (_dir, sandbox) = sandbox();
        let other = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(other.path(), sandbox.root().join("link")).expect("symlink");

        let error = sandbox
            .resolve("missing/../link/pwned.txt")
            .expect_err("escape");
        assert!(matches!(error, SandboxError::Escape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_resolved_to_its_target() {
        let (_dir, sandbox) = sandbox();
        let other = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(
            other.path().join("target.txt"),
            sandbox.root().join("dangling"),
        )
        .expect("symlink");

        let error = sandbox.resolve("dangling").expect_err("escape");
        assert!(matches!(error, SandboxError::Escape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_inside_root_resolves_to_target() {
        let (_dir, sandbox) = sandbox();
        std::os::unix::fs::symlink("real/new.txt", sandbox.root().join("alias")).expect("symlink");

        let resolved = sandbox.resolve("alias").expect("resolve");
        assert_eq!(resolved, sandbox.root().join("real/new.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_is_an_error() {
        let (_dir, sandbox) = sandbox();
        std::os::unix::fs::symlink("b", sandbox.root().join("a")).expect("symlink a");
        std::os::unix::fs::symlink("a", sandbox.root().join("b")).expect("symlink b");

        assert!(matches!(
            sandbox.resolve("a/file.txt"),
            Err(SandboxError::Io { .. })
        ));
    }

    #[test]
    fn relative_display_inverts_resolution() {
        let (_dir, sandbox) = sandbox();

        assert_eq!(sandbox.relative_display(sandbox.root()), ".");
        assert_eq!(
            sandbox.relative_display(&sandbox.root().join("src").join("lib.rs")),
            Path::new("src").join("lib.rs").display().to_string()
        );
    }

    #[test]
    fn root_must_be_a_directory() {
        let (_dir, sandbox) = sandbox();
        let file = sandbox.root().join("file.txt");
        fs::write(&file, "x").expect("write");

        assert!(matches!(
            Sandbox::new(&file),
            Err(SandboxError::NotADirectory { .. })
        ));
        assert!(Sandbox::new(sandbox.root().join("missing")).is_err());
    }
}
