//! Path validation
//!
//! Confines every client-supplied path to the sandbox root. Containment is
//! checked segment by segment, first on the lexically normalised path and
//! again on the canonical one so symlinks cannot lead outside the root.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::SandboxError;

/// The single directory tree the server exposes.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    name: OsString,
}

impl Sandbox {
    /// Creates the root folder if needed and pins it in canonical form.
    pub fn open(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        let name = root
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| root.as_os_str().to_os_string());
        Ok(Self { root, name })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the root folder, as shown at the top of recursive listings.
    pub fn name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }

    /// Absolute paths are used as-is, relative ones are joined onto `cwd`.
    pub fn resolve(&self, cwd: &Path, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        }
    }

    /// Validates `raw` relative to `cwd` and returns its canonical path.
    pub fn validate(&self, cwd: &Path, raw: &str) -> Result<PathBuf, SandboxError> {
        check_text(raw)?;

        let normalized = normalize(&self.resolve(cwd, raw.trim()));
        if !normalized.starts_with(&self.root) {
            return Err(SandboxError::OutsideSandbox);
        }

        if !normalized.exists() {
            return Err(SandboxError::NotFound);
        }

        let canonical = normalized
            .canonicalize()
            .map_err(|_| SandboxError::NotFound)?;
        if !canonical.starts_with(&self.root) {
            return Err(SandboxError::OutsideSandbox);
        }

        Ok(canonical)
    }

    /// Like [`Sandbox::validate`], but an argument that starts with the root
    /// folder's own name (e.g. `ToShare/sub` copied from a recursive listing)
    /// is resolved against the root instead of the working directory.
    pub fn validate_with_rectify(&self, cwd: &Path, raw: &str) -> Result<PathBuf, SandboxError> {
        match self.validate(cwd, raw) {
            Ok(path) => Ok(path),
            Err(err) => match self.strip_root_name(raw.trim()) {
                Some(rest) if rest.is_empty() => Ok(self.root.clone()),
                Some(rest) => self.validate(&self.root, rest),
                None => Err(err),
            },
        }
    }

    /// Destination for an uploaded file or folder: only the final name
    /// component of `raw` is kept and placed under `cwd`.
    pub fn upload_target(&self, cwd: &Path, raw: &str) -> Result<PathBuf, SandboxError> {
        check_text(raw)?;

        let name = Path::new(raw.trim())
            .file_name()
            .ok_or(SandboxError::OutsideSandbox)?;
        let target = cwd.join(name);

        if !normalize(&target).starts_with(&self.root) {
            return Err(SandboxError::OutsideSandbox);
        }

        // An existing entry may be a symlink pointing elsewhere.
        if target.symlink_metadata().is_ok() {
            match target.canonicalize() {
                Ok(canonical) if canonical.starts_with(&self.root) => {}
                _ => return Err(SandboxError::OutsideSandbox),
            }
        }

        Ok(target)
    }

    fn strip_root_name<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let name = self.name.to_str()?;
        let rest = raw.strip_prefix(name)?;
        if rest.is_empty() {
            return Some(rest);
        }
        rest.strip_prefix(['/', '\\'])
    }
}

fn check_text(raw: &str) -> Result<(), SandboxError> {
    if raw.trim().is_empty() {
        return Err(SandboxError::EmptyPath);
    }
    if raw.chars().any(|c| c.is_ascii_control()) {
        return Err(SandboxError::InvalidCharacters);
    }
    Ok(())
}

/// Folds `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, Sandbox) {
        let tmp = TempDir::new().unwrap();
        let sandbox = Sandbox::open(&tmp.path().join("ToShare")).unwrap();
        fs::write(sandbox.root().join("a.txt"), b"0123456789").unwrap();
        fs::create_dir(sandbox.root().join("sub")).unwrap();
        (tmp, sandbox)
    }

    #[test]
    fn open_creates_missing_root() {
        let tmp = TempDir::new().unwrap();
        let sandbox = Sandbox::open(&tmp.path().join("ToShare")).unwrap();
        assert!(sandbox.root().is_dir());
        assert_eq!(sandbox.name(), "ToShare");
    }

    #[test]
    fn empty_and_blank_paths() {
        let (_tmp, sb) = sandbox();
        assert_eq!(sb.validate(sb.root(), ""), Err(SandboxError::EmptyPath));
        assert_eq!(sb.validate(sb.root(), "   "), Err(SandboxError::EmptyPath));
    }

    #[test]
    fn control_characters_rejected() {
        let (_tmp, sb) = sandbox();
        assert_eq!(
            sb.validate(sb.root(), "a\0.txt"),
            Err(SandboxError::InvalidCharacters)
        );
    }

    #[test]
    fn missing_entry_inside_root() {
        let (_tmp, sb) = sandbox();
        assert_eq!(
            sb.validate(sb.root(), "missing.txt"),
            Err(SandboxError::NotFound)
        );
    }

    #[test]
    fn relative_and_absolute_inside_root() {
        let (_tmp, sb) = sandbox();
        assert_eq!(sb.validate(sb.root(), "a.txt").unwrap(), sb.root().join("a.txt"));
        let abs = sb.root().join("sub");
        assert_eq!(sb.validate(sb.root(), abs.to_str().unwrap()).unwrap(), abs);
        assert_eq!(sb.validate(&abs, "..").unwrap(), sb.root());
    }

    #[test]
    fn parent_of_root_is_outside() {
        let (_tmp, sb) = sandbox();
        assert_eq!(sb.validate(sb.root(), ".."), Err(SandboxError::OutsideSandbox));
        let literal = format!("{}/..", sb.root().display());
        assert_eq!(
            sb.validate(sb.root(), &literal),
            Err(SandboxError::OutsideSandbox)
        );
    }

    #[test]
    fn sibling_sharing_prefix_is_outside() {
        let (tmp, sb) = sandbox();
        let sibling = tmp.path().join("ToShareEvil");
        fs::create_dir(&sibling).unwrap();
        let sibling = sibling.canonicalize().unwrap();
        assert_eq!(
            sb.validate(sb.root(), sibling.to_str().unwrap()),
            Err(SandboxError::OutsideSandbox)
        );
    }

    #[test]
    fn missing_path_outside_is_still_outside() {
        let (_tmp, sb) = sandbox();
        assert_eq!(
            sb.validate(sb.root(), "../nowhere/at/all"),
            Err(SandboxError::OutsideSandbox)
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_outside() {
        let (tmp, sb) = sandbox();
        let outside = tmp.path().join("secret");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, sb.root().join("link")).unwrap();
        assert_eq!(sb.validate(sb.root(), "link"), Err(SandboxError::OutsideSandbox));
        assert_eq!(
            sb.upload_target(sb.root(), "link"),
            Err(SandboxError::OutsideSandbox)
        );
    }

    #[test]
    fn rectify_strips_root_name() {
        let (_tmp, sb) = sandbox();
        let sub = sb.root().join("sub");
        assert_eq!(sb.validate_with_rectify(&sub, "ToShare/sub").unwrap(), sub);
        assert_eq!(sb.validate_with_rectify(&sub, "ToShare").unwrap(), sb.root());
        assert_eq!(
            sb.validate_with_rectify(&sub, "ToShare/nope"),
            Err(SandboxError::NotFound)
        );
        assert_eq!(
            sb.validate_with_rectify(&sub, "other"),
            Err(SandboxError::NotFound)
        );
    }

    #[test]
    fn upload_target_keeps_name_only() {
        let (_tmp, sb) = sandbox();
        let sub = sb.root().join("sub");
        assert_eq!(
            sb.upload_target(&sub, "/etc/passwd").unwrap(),
            sub.join("passwd")
        );
        assert_eq!(sb.upload_target(&sub, "x/y/foo.bin").unwrap(), sub.join("foo.bin"));
        assert_eq!(sb.upload_target(&sub, ".."), Err(SandboxError::OutsideSandbox));
        assert_eq!(sb.upload_target(&sub, ""), Err(SandboxError::EmptyPath));
    }
}
