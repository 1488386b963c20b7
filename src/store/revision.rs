use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::warn;

use super::{single_segment, CONFIG_FILE, CURRENT_CONFIG_FILE};
use crate::{domain::model::AppConfig, error::EngineError};

/// Numbered template snapshots stored under `{root}/{app_id}/{n}`.
///
/// Revisions are written by the save path and only read here. A new revision may
/// appear at any time, so callers re-resolve instead of caching the latest one.
#[derive(Clone, Debug)]
pub struct RevisionStore {
    root: PathBuf,
}

impl RevisionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of `app_id`, which must name a single entry of the templates root.
    pub fn app_dir(&self, app_id: &str) -> Result<PathBuf, EngineError> {
        Ok(self.root.join(single_segment(app_id)?))
    }

    pub fn revision_dir(&self, app_id: &str, revision: u32) -> Result<PathBuf, EngineError> {
        Ok(self.app_dir(app_id)?.join(revision.to_string()))
    }

    pub fn current_config_path(&self, app_id: &str) -> Result<PathBuf, EngineError> {
        Ok(self.app_dir(app_id)?.join(CURRENT_CONFIG_FILE))
    }

    pub fn resolve_latest(&self, app_id: &str) -> Result<u32, EngineError> {
        let app_dir = self.app_dir(app_id)?;
        let entries = match fs::read_dir(&app_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::NoVersions {
                    app_id: app_id.to_string(),
                })
            }
            Err(e) => {
                return Err(EngineError::Io {
                    context: format!("Can't list revisions in {}", app_dir.display()),
                    source: e,
                })
            }
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .max()
            .ok_or_else(|| EngineError::NoVersions {
                app_id: app_id.to_string(),
            })
    }

    /// Application IDs with a directory under the templates root, sorted.
    pub fn list_app_ids(&self) -> Result<Vec<String>, EngineError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(EngineError::Io {
                    context: format!("Can't list applications in {}", self.root.display()),
                    source: e,
                })
            }
        };
        Ok(entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .sorted()
            .collect())
    }

    pub fn load_revision(&self, app_id: &str, revision: u32) -> Result<AppConfig, EngineError> {
        load_config(&self.revision_dir(app_id, revision)?.join(CONFIG_FILE))
    }

    /// Config of the revision last rendered for `app_id`, if any.
    ///
    /// A record that can't be parsed is reported and ignored: it only serves as a
    /// basis for cleanup and name resolution.
    pub fn load_current(&self, app_id: &str) -> Result<Option<AppConfig>, EngineError> {
        let path = self.current_config_path(app_id)?;
        if !path.exists() {
            return Ok(None);
        }
        match load_config(&path) {
            Ok(config) => Ok(Some(config)),
            Err(EngineError::ConfigUnreadable { reason, .. }) => {
                warn!("Ignoring unreadable {}: {}", path.display(), reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn save_current(&self, app_id: &str, config: &AppConfig) -> Result<(), EngineError> {
        write_config(&self.current_config_path(app_id)?, config)
    }

    pub fn clear_current(&self, app_id: &str) -> Result<(), EngineError> {
        let path = self.current_config_path(app_id)?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(EngineError::Io {
                context: format!("Can't remove {}", path.display()),
                source: e,
            }),
            _ => Ok(()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig, EngineError> {
    let content = fs::read(path).map_err(|e| EngineError::ConfigUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&content).map_err(|e| EngineError::ConfigUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Writes `config` next to its final location first, then moves it in place.
pub fn write_config(path: &Path, config: &AppConfig) -> Result<(), EngineError> {
    let content = serde_json::to_vec_pretty(config).map_err(|e| EngineError::Serialize {
        context: format!("Can't serialize config of application {}", config.id),
        source: e,
    })?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, content)
        .map_err(EngineError::io(format!("Can't write {}", staging.display())))?;
    fs::rename(&staging, path)
        .map_err(EngineError::io(format!("Can't replace {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(name: &str) -> String {
        format!(r#"{{"id": "a1", "name": "{}"}}"#, name)
    }

    #[test]
    fn latest_is_numeric_maximum() {
        let temp = TempDir::new().unwrap();
        let store = RevisionStore::new(temp.path());
        for revision in ["2", "10", "1", "3"] {
            fs::create_dir_all(store.app_dir("a1").unwrap().join(revision)).unwrap();
        }
        fs::create_dir_all(store.app_dir("a1").unwrap().join("draft")).unwrap();
        fs::write(store.app_dir("a1").unwrap().join("42"), "not a directory").unwrap();
        fs::write(store.current_config_path("a1").unwrap(), config("wiki")).unwrap();

        assert_eq!(store.resolve_latest("a1").unwrap(), 10);
    }

    #[test]
    fn no_versions() {
        let temp = TempDir::new().unwrap();
        let store = RevisionStore::new(temp.path());

        assert!(matches!(
            store.resolve_latest("missing"),
            Err(EngineError::NoVersions { .. })
        ));

        fs::create_dir_all(store.app_dir("empty").unwrap()).unwrap();
        assert!(matches!(
            store.resolve_latest("empty"),
            Err(EngineError::NoVersions { .. })
        ));
    }

    #[test]
    fn revision_dir_is_pure() {
        let store = RevisionStore::new("/srv/templates");
        assert_eq!(
            store.revision_dir("a1", 7).unwrap(),
            PathBuf::from("/srv/templates/a1/7")
        );
    }

    #[test]
    fn current_config_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = RevisionStore::new(temp.path());
        fs::create_dir_all(store.app_dir("a1").unwrap()).unwrap();
        assert_eq!(store.load_current("a1").unwrap(), None);

        let config: AppConfig = serde_json::from_str(&config("wiki")).unwrap();
        store.save_current("a1", &config).unwrap();
        assert_eq!(store.load_current("a1").unwrap(), Some(config));

        store.clear_current("a1").unwrap();
        store.clear_current("a1").unwrap();
        assert_eq!(store.load_current("a1").unwrap(), None);
    }

    #[test]
    fn corrupted_current_config_is_ignored() {
        let temp = TempDir::new().unwrap();
        let store = RevisionStore::new(temp.path());
        fs::create_dir_all(store.app_dir("a1").unwrap()).unwrap();
        fs::write(store.current_config_path("a1").unwrap(), "{ truncated").unwrap();

        assert_eq!(store.load_current("a1").unwrap(), None);
    }

    #[test]
    fn unreadable_revision_config() {
        let temp = TempDir::new().unwrap();
        let store = RevisionStore::new(temp.path());
        fs::create_dir_all(store.revision_dir("a1", 1).unwrap()).unwrap();

        assert!(matches!(
            store.load_revision("a1", 1),
            Err(EngineError::ConfigUnreadable { .. })
        ));
    }

    #[test]
    fn lists_apps_sorted() {
        let temp = TempDir::new().unwrap();
        let store = RevisionStore::new(temp.path().join("templates"));
        assert!(store.list_app_ids().unwrap().is_empty());

        for app in ["b2", "a1"] {
            fs::create_dir_all(store.app_dir(app).unwrap()).unwrap();
        }
        assert_eq!(store.list_app_ids().unwrap(), vec!["a1", "b2"]);
    }

    #[test]
    fn app_ids_cannot_leave_the_root() {
        let temp = TempDir::new().unwrap();
        let store = RevisionStore::new(temp.path().join("templates"));
        let outside = temp.path().join("outside");
        fs::create_dir_all(outside.join("7")).unwrap();
        fs::write(outside.join(CURRENT_CONFIG_FILE), config("wiki")).unwrap();

        for app_id in ["../outside", "..", "a1/7", "/tmp"] {
            assert!(
                matches!(
                    store.resolve_latest(app_id),
                    Err(EngineError::PathTraversal { .. })
                ),
                "{app_id} should be rejected"
            );
        }
        assert!(matches!(
            store.clear_current("../outside"),
            Err(EngineError::PathTraversal { .. })
        ));
        assert!(outside.join(CURRENT_CONFIG_FILE).exists());
    }
}
