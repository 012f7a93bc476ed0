use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context};

/// Enumerates the reasons why a requested name cannot be mapped onto a file below the root.
#[derive(Debug)]
pub enum PathError {
    /// The name itself is malformed or tries to leave the root (e.g. `../secret` or `/etc/passwd`).
    Rejected(&'static str),

    /// The name looked harmless but resolved to a location outside of the root (e.g. via a
    /// symbolic link).
    Escapes(PathBuf),

    /// The name cannot be resolved at all, most probably as there is no such file.
    Unresolvable(std::io::Error),
}

impl PathError {
    /// Determines if this error indicates an attempt to access files outside of the root.
    pub fn is_traversal(&self) -> bool {
        !matches!(self, PathError::Unresolvable(_))
    }
}

impl Display for PathError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PathError::Rejected(reason) => write!(f, "Rejected file name: {}", reason),
            PathError::Escapes(path) => {
                write!(f, "{} is outside of the serving root", path.display())
            }
            PathError::Unresolvable(error) => write!(f, "Cannot resolve file: {}", error),
        }
    }
}

impl Error for PathError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PathError::Unresolvable(error) => Some(error),
            _ => None,
        }
    }
}

/// Represents the directory below which all served files must reside.
///
/// The path is canonicalized once when the root is created, so that all later checks can compare
/// canonical paths.
#[derive(Debug)]
pub struct ServingRoot {
    path: PathBuf,
}

impl ServingRoot {
    /// Creates a serving root for the given directory.
    ///
    /// # Errors
    /// Fails if the directory doesn't exist or if it isn't a directory.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let canonical = std::fs::canonicalize(path)
            .with_context(|| format!("Cannot access {}", path.display()))?;

        if !canonical.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        Ok(ServingRoot { path: canonical })
    }

    /// Returns the canonical path of the root directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Performs a purely lexical check of the given name without touching the file system.
    ///
    /// This rejects empty names, names containing NUL bytes, absolute names (starting with `/`, `\`
    /// or a drive prefix) and every name which contains a `..` segment - no matter where. Both
    /// kinds of separators are taken into account so that `a\..\..\b` is rejected as well.
    pub fn check(&self, name: &str) -> Result<(), PathError> {
        if name.is_empty() {
            return Err(PathError::Rejected("empty name"));
        }
        if name.contains('\0') {
            return Err(PathError::Rejected("name contains a NUL byte"));
        }
        if name.starts_with('/') || name.starts_with('\\') {
            return Err(PathError::Rejected("absolute names are not permitted"));
        }
        if name.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(PathError::Rejected("parent directory segments are not permitted"));
        }

        let escapes = Path::new(name).components().any(|component| {
            matches!(
                component,
                Component::Prefix(_) | Component::RootDir | Component::ParentDir
            )
        });
        if escapes {
            return Err(PathError::Rejected("name is not relative to the serving root"));
        }

        Ok(())
    }

    /// Resolves the given name into the canonical path of a file below the root.
    ///
    /// Runs the lexical [check](ServingRoot::check) first, then canonicalizes the joined path
    /// (following all symbolic links) and verifies that the result is still located below the
    /// root.
    pub async fn resolve(&self, name: &str) -> Result<PathBuf, PathError> {
        self.check(name)?;

        let canonical = tokio::fs::canonicalize(self.path.join(name))
            .await
            .map_err(PathError::Unresolvable)?;

        if canonical.starts_with(&self.path) {
            Ok(canonical)
        } else {
            Err(PathError::Escapes(canonical))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::files::{PathError, ServingRoot};
    use crate::testing::test_async;

    fn root() -> (tempfile::TempDir, ServingRoot) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("a.txt"), "A").unwrap();
        std::fs::write(dir.path().join("test.txt"), "123456789\n").unwrap();
        let root = ServingRoot::new(dir.path()).unwrap();

        (dir, root)
    }

    #[test]
    fn harmless_names_pass_the_lexical_check() {
        let (_dir, root) = root();
        assert_eq!(root.check("test.txt").is_ok(), true);
        assert_eq!(root.check("docs/a.txt").is_ok(), true);
        assert_eq!(root.check("./docs/a.txt").is_ok(), true);
        assert_eq!(root.check("file..txt").is_ok(), true);
    }

    #[test]
    fn traversal_attempts_are_rejected_lexically() {
        let (_dir, root) = root();
        for name in [
            "",
            "../etc/passwd",
            "..",
            "docs/../../secret",
            "docs/..",
            "/etc/passwd",
            "\\windows\\system.ini",
            "docs\\..\\..\\secret",
            "a\0b",
        ] {
            match root.check(name) {
                Err(PathError::Rejected(_)) => (),
                other => panic!("{:?} should have been rejected but got {:?}", name, other),
            }
        }
    }

    #[test]
    fn names_are_resolved_below_the_root() {
        test_async(async {
            let (dir, root) = root();
            let resolved = root.resolve("docs/a.txt").await.unwrap();
            assert_eq!(
                resolved,
                std::fs::canonicalize(dir.path().join("docs").join("a.txt")).unwrap()
            );

            match root.resolve("missing.txt").await {
                Err(error @ PathError::Unresolvable(_)) => {
                    assert_eq!(error.is_traversal(), false)
                }
                other => panic!("Expected an unresolvable path but got {:?}", other),
            }
        });
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_leaving_the_root_are_rejected() {
        test_async(async {
            let (dir, root) = root();
            let outside = tempfile::tempdir().unwrap();
            std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
            std::os::unix::fs::symlink(
                outside.path().join("secret.txt"),
                dir.path().join("link.txt"),
            )
            .unwrap();
            std::os::unix::fs::symlink(dir.path().join("test.txt"), dir.path().join("inner.txt"))
                .unwrap();

            match root.resolve("link.txt").await {
                Err(error @ PathError::Escapes(_)) => assert_eq!(error.is_traversal(), true),
                other => panic!("Expected an escaping path but got {:?}", other),
            }

            // A link which stays within the root is fine...
            assert_eq!(root.resolve("inner.txt").await.is_ok(), true);
        });
    }

    #[test]
    fn a_file_cannot_be_used_as_root() {
        let (dir, _root) = root();
        assert_eq!(ServingRoot::new(dir.path().join("test.txt")).is_err(), true);
        assert_eq!(ServingRoot::new(dir.path().join("missing")).is_err(), true);
    }
}
