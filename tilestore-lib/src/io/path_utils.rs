//! Path utilities for naming tables and the files inside them.

use crate::Result;
use directories::BaseDirs;
use ohno::IntoAppError;
use std::path::{Component, Path, PathBuf};

/// Turn a table name into a normalized absolute path.
///
/// A leading `~` expands to the home directory, relative paths are resolved
/// against the current directory, and `.`/`..` components are collapsed
/// lexically (symlinks are not resolved). Applying it twice yields the same
/// result as applying it once.
pub fn absolute_name(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();

    let expanded = match path.strip_prefix("~") {
        Ok(rest) => {
            let dirs = BaseDirs::new().into_app_err("unable to determine the home directory")?;
            dirs.home_dir().join(rest)
        }
        Err(_) => path.to_path_buf(),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .into_app_err("unable to determine the current directory")?
            .join(expanded)
    };

    Ok(normalize_lexically(&absolute))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                let _ = result.pop();
            }
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => result.push(component),
        }
    }

    result
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call getcwd")]
    fn test_relative_name_becomes_absolute() {
        let name = absolute_name("some_table").unwrap();
        assert!(name.is_absolute());
        assert!(name.ends_with("some_table"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call getcwd")]
    fn test_dot_components_collapse() {
        let a = absolute_name("/data/tables/./x/../obs.tab").unwrap();
        assert_eq!(a, PathBuf::from("/data/tables/obs.tab"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call getcwd")]
    fn test_equivalent_spellings_normalize_equal() {
        let a = absolute_name("/data/obs.tab").unwrap();
        let b = absolute_name("/data/sub/../obs.tab").unwrap();
        let c = absolute_name("/data//./obs.tab").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call getcwd")]
    fn test_idempotent() {
        let once = absolute_name("a/b/../c").unwrap();
        let twice = absolute_name(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parent_of_root_is_root() {
        assert_eq!(normalize_lexically(Path::new("/../..")), PathBuf::from("/"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot read the home directory")]
    fn test_tilde_expands_to_home() {
        let Some(dirs) = BaseDirs::new() else {
            return;
        };
        let name = absolute_name("~/obs.tab").unwrap();
        assert_eq!(name, normalize_lexically(&dirs.home_dir().join("obs.tab")));
    }
}
