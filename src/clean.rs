//! Removal of build output trees.

use std::fs;

use camino::Utf8Path;

use crate::error::CleanError;

/// Recursively removes each root that exists. An absent root is not an
/// error. Independent of the task graph: it neither has nor satisfies
/// dependencies.
pub fn clean<I, P>(roots: I) -> Result<(), CleanError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Utf8Path>,
{
    for root in roots {
        let root = root.as_ref();

        if fs::metadata(root).is_ok() {
            fs::remove_dir_all(root).map_err(|source| CleanError {
                path: root.to_owned(),
                source,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_removes_existing_roots() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();

        let dist = root.join("dist");
        fs::create_dir_all(dist.join("css")).unwrap();
        fs::write(dist.join("css/style.css"), "body{}").unwrap();

        clean([&dist]).unwrap();
        assert!(fs::metadata(&dist).is_err());
    }

    #[test]
    fn test_clean_absent_root_is_ok() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();

        clean([root.join("never-created")]).unwrap();
    }
}
