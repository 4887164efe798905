//! Path validation and security for the agent server.
//!
//! Every file read must pass through [`validate_path`] to ensure the
//! requested path resolves to a regular file inside one of the server's
//! allowed directories.

use crate::roots::AllowedRoots;
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

/// Errors from path validation.
#[derive(Error, Debug)]
pub enum ValidateError {
    /// The raw path is unusable before any filesystem access.
    #[error("invalid path: {0}")]
    InvalidPath(&'static str),
    /// The resolved path is outside all allowed directories.
    #[error("access to {} is not allowed, files must be in one of the allowed directories", .0.display())]
    OutsideAllowedDirectories(PathBuf),
    /// The path does not refer to an existing regular file.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// An I/O error occurred during path resolution.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Validate that a path names an existing file within the allowed directories.
///
/// Steps:
/// 1. Reject empty paths and paths containing null bytes
/// 2. Expand `$VAR`, `${VAR}` and a leading `~`
/// 3. Make the path absolute and lexically resolve `.` and `..`
/// 4. Resolve symlinks of the deepest existing ancestor
/// 5. Verify the resolved path lies within one of the allowed directories
/// 6. Verify the resolved path is a regular file
///
/// Returns the resolved absolute path.
pub fn validate_path(path: &str, roots: &AllowedRoots) -> Result<PathBuf, ValidateError> {
    if path.is_empty() {
        return Err(ValidateError::InvalidPath("empty path"));
    }
    if path.contains('\0') {
        return Err(ValidateError::InvalidPath("path contains null byte"));
    }

    let normalized = normalize(&expand(path))?;
    let resolved = match resolve(&normalized) {
        Ok(resolved) => resolved,
        Err(_) if !roots.contains(&normalized) => {
            return Err(ValidateError::OutsideAllowedDirectories(normalized));
        }
        Err(e) => return Err(e.into()),
    };

    if !roots.contains(&resolved) {
        return Err(ValidateError::OutsideAllowedDirectories(normalized));
    }

    match std::fs::metadata(&resolved) {
        Ok(meta) if meta.is_file() => Ok(resolved),
        Ok(_) => Err(ValidateError::NotFound(normalized)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ValidateError::NotFound(normalized)),
        Err(e) => Err(e.into()),
    }
}

/// Expand environment variables and home-directory shorthand.
pub fn expand(path: &str) -> PathBuf {
    expand_home(&expand_vars(path, |name| std::env::var(name).ok()))
}

/// Replace `$NAME` and `${NAME}` with values from `lookup`.
///
/// Unknown variables and malformed references are left untouched.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };
        match Some(name).filter(|n| !n.is_empty()).and_then(&lookup) {
            Some(value) => {
                out.push_str(&value);
                rest = &after[consumed..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_home(path: &str) -> PathBuf {
    let home_relative = path
        .strip_prefix('~')
        .filter(|rest| rest.is_empty() || rest.starts_with(std::path::is_separator));
    match (home_relative, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(std::path::is_separator)),
        _ => PathBuf::from(path),
    }
}

/// Make a path absolute against the working directory and lexically
/// resolve `.` and `..` components.
///
/// `..` never climbs above the filesystem root.
pub fn normalize(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Ok(out)
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// components below it.
///
/// Existing paths come back fully canonical, symlinks included. A tail that
/// is missing or sits behind an unreadable directory stays lexical, so it can
/// still be compared against the allowed directories.
pub fn resolve(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                resolved.extend(missing.into_iter().rev());
                return Ok(resolved);
            }
            Err(e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name);
                    existing = parent;
                }
                _ => return Err(e),
            },
        }
    }
}

/// Whether `path` equals `root` or lies below it, compared by whole
/// components.
pub fn is_within(path: &Path, root: &Path) -> bool {
    #[cfg(windows)]
    {
        let fold = |p: &Path| PathBuf::from(p.to_string_lossy().to_lowercase());
        fold(path).starts_with(fold(root))
    }
    #[cfg(not(windows))]
    {
        path.starts_with(root)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        roots::AllowedRoots,
        validate::{ValidateError, expand, expand_vars, is_within, normalize, validate_path},
    };
    use std::{fs, path::Path};
    use tempfile::TempDir;

    /// A temp dir holding a `Documents` root and an `outside` sibling.
    fn sandbox() -> (TempDir, AllowedRoots) {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("Documents")).unwrap();
        fs::create_dir(tmp.path().join("outside")).unwrap();
        let roots = AllowedRoots::new([tmp.path().join("Documents")]);
        (tmp, roots)
    }

    #[test]
    fn allows_file_within_root() {
        let (tmp, roots) = sandbox();
        let file = tmp.path().join("Documents/notes.txt");
        fs::write(&file, "test").unwrap();
        let result = validate_path(file.to_str().unwrap(), &roots).unwrap();
        assert_eq!(result, file.canonicalize().unwrap());
    }

    #[test]
    fn allows_nested_file_with_dot_segments() {
        let (tmp, roots) = sandbox();
        fs::create_dir(tmp.path().join("Documents/sub")).unwrap();
        let file = tmp.path().join("Documents/sub/a.txt");
        fs::write(&file, "a").unwrap();
        let raw = tmp.path().join("Documents/./sub/../sub/a.txt");
        let result = validate_path(raw.to_str().unwrap(), &roots).unwrap();
        assert_eq!(result, file.canonicalize().unwrap());
    }

    #[test]
    fn rejects_path_outside_roots() {
        let (tmp, roots) = sandbox();
        let file = tmp.path().join("outside/secret.txt");
        fs::write(&file, "secret").unwrap();
        let result = validate_path(file.to_str().unwrap(), &roots);
        assert!(matches!(result, Err(ValidateError::OutsideAllowedDirectories(_))));
    }

    #[test]
    fn rejects_sibling_with_shared_prefix() {
        let (tmp, roots) = sandbox();
        fs::create_dir(tmp.path().join("Documents2")).unwrap();
        let file = tmp.path().join("Documents2/x.txt");
        fs::write(&file, "x").unwrap();
        let result = validate_path(file.to_str().unwrap(), &roots);
        assert!(matches!(result, Err(ValidateError::OutsideAllowedDirectories(_))));
    }

    #[test]
    fn rejects_parent_segments_escaping_root() {
        let (tmp, roots) = sandbox();
        fs::write(tmp.path().join("outside/secret.txt"), "secret").unwrap();
        let raw = tmp.path().join("Documents/../outside/secret.txt");
        let result = validate_path(raw.to_str().unwrap(), &roots);
        assert!(matches!(result, Err(ValidateError::OutsideAllowedDirectories(_))));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_pointing_outside_roots() {
        let (tmp, roots) = sandbox();
        let target = tmp.path().join("outside/secret.txt");
        fs::write(&target, "secret").unwrap();
        let link = tmp.path().join("Documents/link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let result = validate_path(link.to_str().unwrap(), &roots);
        assert!(matches!(result, Err(ValidateError::OutsideAllowedDirectories(_))));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_file_under_symlinked_directory_outside_roots() {
        let (tmp, roots) = sandbox();
        fs::write(tmp.path().join("outside/secret.txt"), "secret").unwrap();
        let link = tmp.path().join("Documents/escape");
        std::os::unix::fs::symlink(tmp.path().join("outside"), &link).unwrap();
        let result = validate_path(link.join("secret.txt").to_str().unwrap(), &roots);
        assert!(matches!(result, Err(ValidateError::OutsideAllowedDirectories(_))));
    }

    #[cfg(unix)]
    #[test]
    fn allows_symlink_within_roots() {
        let (tmp, roots) = sandbox();
        let target = tmp.path().join("Documents/real.txt");
        fs::write(&target, "real").unwrap();
        let link = tmp.path().join("Documents/alias.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let result = validate_path(link.to_str().unwrap(), &roots).unwrap();
        assert_eq!(result, target.canonicalize().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn rejects_outside_path_under_unreadable_directory() {
        use std::os::unix::fs::PermissionsExt;
        if crate::running_as_root() {
            return;
        }
        let (tmp, roots) = sandbox();
        let locked = tmp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("secret.txt"), "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = validate_path(locked.join("secret.txt").to_str().unwrap(), &roots);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result, Err(ValidateError::OutsideAllowedDirectories(_))));
    }

    #[cfg(unix)]
    #[test]
    fn reports_io_for_unreadable_directory_inside_root() {
        use std::os::unix::fs::PermissionsExt;
        if crate::running_as_root() {
            return;
        }
        let (tmp, roots) = sandbox();
        let locked = tmp.path().join("Documents/locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("notes.txt"), "notes").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = validate_path(locked.join("notes.txt").to_str().unwrap(), &roots);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result, Err(ValidateError::Io(_))));
    }

    #[test]
    fn reports_missing_file_inside_root() {
        let (tmp, roots) = sandbox();
        let missing = tmp.path().join("Documents/nope/missing.txt");
        let result = validate_path(missing.to_str().unwrap(), &roots);
        assert!(matches!(result, Err(ValidateError::NotFound(_))));
    }

    #[test]
    fn rejects_directory() {
        let (tmp, roots) = sandbox();
        let dir = tmp.path().join("Documents");
        let result = validate_path(dir.to_str().unwrap(), &roots);
        assert!(matches!(result, Err(ValidateError::NotFound(_))));
    }

    #[test]
    fn rejects_null_byte_and_empty_path() {
        let (_tmp, roots) = sandbox();
        assert!(matches!(
            validate_path("/tmp/foo\0bar", &roots),
            Err(ValidateError::InvalidPath(_))
        ));
        assert!(matches!(validate_path("", &roots), Err(ValidateError::InvalidPath(_))));
    }

    #[test]
    fn rejects_everything_without_roots() {
        let roots = AllowedRoots::new([]);
        let result = validate_path("/etc/passwd", &roots);
        assert!(matches!(result, Err(ValidateError::OutsideAllowedDirectories(_))));
    }

    #[test]
    fn normalize_resolves_dot_segments_lexically() {
        let path = normalize(Path::new("/a/./b/../c//d")).unwrap();
        assert_eq!(path, Path::new("/a/c/d"));
        let root = normalize(Path::new("/../../etc")).unwrap();
        assert_eq!(root, Path::new("/etc"));
    }

    #[test]
    fn normalize_makes_relative_paths_absolute() {
        let path = normalize(Path::new("notes.txt")).unwrap();
        assert_eq!(path, std::env::current_dir().unwrap().join("notes.txt"));
    }

    #[test]
    fn expands_variables() {
        let lookup = |name: &str| (name == "ROOT").then(|| "/data".to_string());
        assert_eq!(expand_vars("$ROOT/a.txt", lookup), "/data/a.txt");
        assert_eq!(expand_vars("${ROOT}x/a.txt", lookup), "/datax/a.txt");
        assert_eq!(expand_vars("$MISSING/a", lookup), "$MISSING/a");
        assert_eq!(expand_vars("${ROOT", lookup), "${ROOT");
        assert_eq!(expand_vars("cost$", lookup), "cost$");
    }

    #[test]
    fn expands_home_shorthand() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand("~"), home);
        assert_eq!(expand("~/Documents/a.txt"), home.join("Documents/a.txt"));
        assert_eq!(expand("~other/a.txt"), Path::new("~other/a.txt"));
    }

    #[test]
    fn is_within_matches_whole_components() {
        let root = Path::new("/home/user/Documents");
        assert!(is_within(Path::new("/home/user/Documents"), root));
        assert!(is_within(Path::new("/home/user/Documents/a.txt"), root));
        assert!(!is_within(Path::new("/home/user/Documents2/a.txt"), root));
        assert!(!is_within(Path::new("/home/user"), root));
    }
}
