use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use super::sanitize_relative;
use crate::{domain::model::AppConfig, error::EngineError};

/// Removes the files rendered for `old` that `new` no longer declares, then prunes
/// directories left empty. `deploy_dir` itself is never removed.
///
/// Entries whose filename would escape `deploy_dir` are skipped. Returns the removed files.
pub fn cleanup(
    deploy_dir: &Path,
    old: Option<&AppConfig>,
    new: &AppConfig,
) -> Result<Vec<PathBuf>, EngineError> {
    let Some(old) = old else {
        return Ok(vec![]);
    };
    let kept: HashSet<&str> = new.files.iter().map(|f| f.filename.as_str()).collect();

    let mut removed = vec![];
    for file in old.files.iter().filter(|f| !kept.contains(f.filename.as_str())) {
        let relative = match sanitize_relative(&file.filename) {
            Ok(relative) => relative,
            Err(e) => {
                warn!("app_id={} skipping stale file: {}", old.id, e);
                continue;
            }
        };
        let path = deploy_dir.join(relative);
        match fs::symlink_metadata(&path) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Stale file {} already gone", path.display());
                continue;
            }
            Err(e) => {
                return Err(EngineError::Io {
                    context: format!("Can't stat {}", path.display()),
                    source: e,
                })
            }
            Ok(metadata) if metadata.is_dir() => {
                warn!("app_id={} stale entry {} is a directory, leaving it", old.id, path.display());
                continue;
            }
            Ok(_) => {}
        }
        fs::remove_file(&path)
            .map_err(EngineError::io(format!("Can't remove {}", path.display())))?;
        info!("app_id={} removed stale file {}", old.id, path.display());
        prune_empty_parents(deploy_dir, &path)?;
        removed.push(path);
    }
    Ok(removed)
}

fn prune_empty_parents(deploy_dir: &Path, removed: &Path) -> Result<(), EngineError> {
    let mut current = removed.parent();
    while let Some(dir) = current {
        if dir == deploy_dir || !dir.starts_with(deploy_dir) {
            break;
        }
        let is_empty = fs::read_dir(dir)
            .map_err(EngineError::io(format!("Can't list {}", dir.display())))?
            .next()
            .is_none();
        if !is_empty {
            break;
        }
        fs::remove_dir(dir).map_err(EngineError::io(format!("Can't remove {}", dir.display())))?;
        debug!("Pruned empty directory {}", dir.display());
        current = dir.parent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::AppFile;
    use tempfile::TempDir;

    fn config(filenames: &[&str]) -> AppConfig {
        AppConfig {
            id: "a1".to_string(),
            name: "wiki".to_string(),
            files: filenames
                .iter()
                .enumerate()
                .map(|(i, filename)| AppFile {
                    id: format!("f{}", i),
                    filename: filename.to_string(),
                    origin: None,
                })
                .collect(),
            variables: vec![],
            extension_values: vec![],
            extra: Default::default(),
        }
    }

    #[test]
    fn removes_only_dropped_files() {
        let temp = TempDir::new().unwrap();
        let deploy = temp.path();
        fs::write(deploy.join("a.txt"), "a").unwrap();
        fs::write(deploy.join("b.txt"), "b").unwrap();

        let removed = cleanup(
            deploy,
            Some(&config(&["a.txt", "b.txt"])),
            &config(&["b.txt", "c.txt"]),
        )
        .unwrap();

        assert_eq!(removed, vec![deploy.join("a.txt")]);
        assert!(!deploy.join("a.txt").exists());
        assert_eq!(fs::read_to_string(deploy.join("b.txt")).unwrap(), "b");
        assert!(!deploy.join("c.txt").exists());
    }

    #[test]
    fn without_prior_config_nothing_happens() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();

        let removed = cleanup(temp.path(), None, &config(&[])).unwrap();

        assert!(removed.is_empty());
        assert!(temp.path().join("a.txt").exists());
    }

    #[test]
    fn prunes_empty_directories_up_to_the_root() {
        let temp = TempDir::new().unwrap();
        let deploy = temp.path().join("wiki");
        fs::create_dir_all(deploy.join("conf/nginx/sites")).unwrap();
        fs::create_dir_all(deploy.join("conf/keep")).unwrap();
        fs::write(deploy.join("conf/nginx/sites/default.conf"), "").unwrap();
        fs::write(deploy.join("conf/keep/app.ini"), "").unwrap();

        cleanup(
            &deploy,
            Some(&config(&["conf/nginx/sites/default.conf", "conf/keep/app.ini"])),
            &config(&["conf/keep/app.ini"]),
        )
        .unwrap();

        assert!(!deploy.join("conf/nginx").exists());
        assert!(deploy.join("conf/keep/app.ini").exists());
    }

    #[test]
    fn never_removes_the_deployment_root() {
        let temp = TempDir::new().unwrap();
        let deploy = temp.path().join("wiki");
        fs::create_dir_all(&deploy).unwrap();
        fs::write(deploy.join("only.yml"), "").unwrap();

        cleanup(&deploy, Some(&config(&["only.yml"])), &config(&[])).unwrap();

        assert!(deploy.is_dir());
        assert!(!deploy.join("only.yml").exists());
    }

    #[test]
    fn traversal_entries_are_skipped() {
        let temp = TempDir::new().unwrap();
        let deploy = temp.path().join("wiki");
        fs::create_dir_all(&deploy).unwrap();
        fs::write(temp.path().join("secret"), "keep me").unwrap();
        fs::write(deploy.join("old.yml"), "").unwrap();

        let removed = cleanup(
            &deploy,
            Some(&config(&["../secret", "/etc/hostname", "", "old.yml"])),
            &config(&[]),
        )
        .unwrap();

        assert_eq!(removed, vec![deploy.join("old.yml")]);
        assert!(temp.path().join("secret").exists());
    }
}
