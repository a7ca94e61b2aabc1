use crate::config::{CollisionPolicy, LinkMode};
use crate::utils::split_extension;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of placing one file.
#[derive(Debug)]
pub enum Placement {
    /// Written at this final path (after any collision renaming).
    Placed(PathBuf),
    /// Destination already existed and the policy was `skip`.
    Skipped(PathBuf),
    Failed(io::Error),
}

fn exists(path: &Path) -> bool {
    // symlink_metadata so that a dangling link still counts as occupied
    fs::symlink_metadata(path).is_ok()
}

/// First free `<stem>__N<ext>` next to `dst`, N counting from 1.
pub fn next_free_name(dst: &Path) -> PathBuf {
    let (stem, extension) = split_extension(dst);
    let parent = dst.parent().unwrap_or_else(|| Path::new(""));
    (1..)
        .map(|i| parent.join(format!("{}__{}{}", stem, i, extension)))
        .find(|candidate| !exists(candidate))
        .unwrap_or_else(|| dst.to_path_buf())
}

/// Places `src` at `dst` with the given link mode, resolving an existing
/// destination with `policy`. Link modes the filesystem rejects fall back
/// to a full copy at the same destination.
pub fn materialize(src: &Path, dst: &Path, mode: LinkMode, policy: CollisionPolicy) -> Placement {
    let mut dst = dst.to_path_buf();
    if exists(&dst) {
        match policy {
            CollisionPolicy::Skip => return Placement::Skipped(dst),
            CollisionPolicy::Overwrite => {
                if let Err(e) = fs::remove_file(&dst) {
                    if e.kind() != io::ErrorKind::NotFound {
                        return Placement::Failed(e);
                    }
                }
            }
            CollisionPolicy::Rename => dst = next_free_name(&dst),
        }
    }

    match place(src, &dst, mode) {
        Ok(()) => Placement::Placed(dst),
        Err(e) => Placement::Failed(e),
    }
}

/// Creates a hard or symbolic link from `src` at `dst`.
type LinkFn = fn(&Path, &Path, LinkMode) -> io::Result<()>;

fn place(src: &Path, dst: &Path, mode: LinkMode) -> io::Result<()> {
    place_with(src, dst, mode, link)
}

fn place_with(src: &Path, dst: &Path, mode: LinkMode, link: LinkFn) -> io::Result<()> {
    if !src.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source {} is not a file", src.display()),
        ));
    }
    if mode == LinkMode::Copy {
        return copy(src, dst);
    }
    match link(src, dst, mode) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("{} not possible for {} ({}), copying instead", mode, dst.display(), e);
            copy(src, dst)
        }
    }
}

fn link(src: &Path, dst: &Path, mode: LinkMode) -> io::Result<()> {
    match mode {
        LinkMode::Hardlink => fs::hard_link(src, dst),
        LinkMode::Symlink => symlink(src, dst),
        LinkMode::Copy => copy(src, dst),
    }
}

fn copy(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::canonicalize(src).unwrap_or_else(|_| src.to_path_buf());
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::canonicalize(src).unwrap_or_else(|_| src.to_path_buf());
    std::os::windows::fs::symlink_file(target, dst)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_src: &Path, _dst: &Path) -> io::Result<()> {
    tracing::warn!("Symbolic links are not supported on this platform");
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks unsupported"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("IM0001.dcm");
        fs::write(&src, b"new").unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        (tmp, src, out)
    }

    #[test]
    fn test_rename_appends_counter_and_keeps_original() {
        let (_tmp, src, out) = setup();
        fs::write(out.join("0001.dcm"), b"old").unwrap();

        let placement = materialize(&src, &out.join("0001.dcm"), LinkMode::Copy, CollisionPolicy::Rename);
        match placement {
            Placement::Placed(p) => assert_eq!(p, out.join("0001__1.dcm")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fs::read(out.join("0001.dcm")).unwrap(), b"old");
        assert_eq!(fs::read(out.join("0001__1.dcm")).unwrap(), b"new");

        let again = materialize(&src, &out.join("0001.dcm"), LinkMode::Copy, CollisionPolicy::Rename);
        assert!(matches!(again, Placement::Placed(p) if p == out.join("0001__2.dcm")));
    }

    #[test]
    fn test_skip_leaves_existing_file() {
        let (_tmp, src, out) = setup();
        fs::write(out.join("0001.dcm"), b"old").unwrap();
        let placement = materialize(&src, &out.join("0001.dcm"), LinkMode::Copy, CollisionPolicy::Skip);
        assert!(matches!(placement, Placement::Skipped(_)));
        assert_eq!(fs::read(out.join("0001.dcm")).unwrap(), b"old");
    }

    #[test]
    fn test_overwrite_replaces_destination() {
        let (_tmp, src, out) = setup();
        fs::write(out.join("0001.dcm"), b"old").unwrap();
        let placement = materialize(&src, &out.join("0001.dcm"), LinkMode::Copy, CollisionPolicy::Overwrite);
        assert!(matches!(placement, Placement::Placed(_)));
        assert_eq!(fs::read(out.join("0001.dcm")).unwrap(), b"new");
    }

    #[test]
    fn test_hardlink_and_symlink_produce_readable_files() {
        let (_tmp, src, out) = setup();
        for (mode, name) in [(LinkMode::Hardlink, "0001.dcm"), (LinkMode::Symlink, "0002.dcm")] {
            let placement = materialize(&src, &out.join(name), mode, CollisionPolicy::Skip);
            assert!(matches!(placement, Placement::Placed(_)));
            assert_eq!(fs::read(out.join(name)).unwrap(), b"new");
        }
    }

    #[test]
    fn test_missing_source_fails_without_panicking() {
        let (tmp, _src, out) = setup();
        let missing = tmp.path().join("gone.dcm");
        for mode in [LinkMode::Copy, LinkMode::Hardlink, LinkMode::Symlink] {
            let placement = materialize(&missing, &out.join("x.dcm"), mode, CollisionPolicy::Skip);
            assert!(matches!(placement, Placement::Failed(_)), "{:?}", mode);
        }
    }

    fn rejecting_link(_src: &Path, _dst: &Path, _mode: LinkMode) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "links not supported here"))
    }

    #[test]
    fn test_rejected_link_falls_back_to_copy() {
        for mode in [LinkMode::Hardlink, LinkMode::Symlink] {
            let (_tmp, src, out) = setup();
            let dst = out.join("0001.dcm");
            place_with(&src, &dst, mode, rejecting_link).unwrap();

            let meta = fs::symlink_metadata(&dst).unwrap();
            assert!(meta.file_type().is_file());
            assert_eq!(fs::read(&dst).unwrap(), b"new");
            assert_eq!(split_extension(&dst).1, ".dcm");

            // Source is untouched and not linked.
            fs::write(&src, b"changed").unwrap();
            assert_eq!(fs::read(&dst).unwrap(), b"new");
        }
    }
}
