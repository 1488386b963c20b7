use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use walkdir::WalkDir;

use super::{
    cleanup::cleanup,
    envfile,
    revision::{load_config, write_config},
    sanitize_relative, CONFIG_FILE, CURRENT_CONFIG_FILE, FILES_DIR, VALUES_FILE,
};
use crate::{domain::model::AppConfig, domain::project::ENV_FILE, error::EngineError};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z0-9_.\-]+)\s*\}").expect("placeholder pattern is valid")
});

/// Replaces every `${name}` token with its value. Unknown names become empty.
pub fn substitute<'a>(template: &'a str, vars: &BTreeMap<String, String>) -> Cow<'a, str> {
    PLACEHOLDER.replace_all(template, |caps: &Captures| {
        vars.get(&caps[1]).cloned().unwrap_or_default()
    })
}

/// Variable values of a revision, every value turned into its string form.
pub fn load_values(revision_dir: &Path) -> Result<BTreeMap<String, String>, EngineError> {
    let path = revision_dir.join(VALUES_FILE);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content =
        fs::read(&path).map_err(EngineError::io(format!("Can't read {}", path.display())))?;
    let values: HashMap<String, Value> =
        serde_json::from_slice(&content).map_err(|e| EngineError::ConfigUnreadable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    Ok(values
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (name, value)
        })
        .collect())
}

/// Materializes a revision into `deploy_dir`.
///
/// Stale files of the previously rendered revision are removed first. The record of
/// the rendered config, kept next to the revisions, is only replaced once every file
/// has been written, so an interrupted render is cleaned up against the last
/// successful one on the next attempt.
pub fn render(
    app_id: &str,
    revision_dir: &Path,
    deploy_dir: &Path,
) -> Result<AppConfig, EngineError> {
    let config = load_config(&revision_dir.join(CONFIG_FILE))?;
    let current_path = revision_dir
        .parent()
        .unwrap_or(revision_dir)
        .join(CURRENT_CONFIG_FILE);
    let prior = if current_path.exists() {
        match load_config(&current_path) {
            Ok(prior) => Some(prior),
            Err(e) => {
                warn!("app_id={} no cleanup basis: {}", app_id, e);
                None
            }
        }
    } else {
        None
    };

    cleanup(deploy_dir, prior.as_ref(), &config)?;
    fs::create_dir_all(deploy_dir)
        .map_err(EngineError::io(format!("Can't create {}", deploy_dir.display())))?;

    let vars = load_values(revision_dir)?;
    let rendered = render_tree(&revision_dir.join(FILES_DIR), deploy_dir, &config, &vars)?;

    let env_path = deploy_dir.join(ENV_FILE);
    fs::write(&env_path, envfile::encode(&vars))
        .map_err(EngineError::io(format!("Can't write {}", env_path.display())))?;

    write_config(&current_path, &config)?;
    info!(
        "app_id={} rendered {} file(s) from {} into {}",
        app_id,
        rendered,
        revision_dir.display(),
        deploy_dir.display()
    );
    Ok(config)
}

fn render_tree(
    files_dir: &Path,
    deploy_dir: &Path,
    config: &AppConfig,
    vars: &BTreeMap<String, String>,
) -> Result<usize, EngineError> {
    if !files_dir.is_dir() {
        return Ok(0);
    }
    let outputs: HashMap<&str, &str> = config
        .files
        .iter()
        .map(|f| (f.id.as_str(), f.filename.as_str()))
        .collect();

    let mut rendered = 0;
    for entry in WalkDir::new(files_dir).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| EngineError::Io {
            context: format!("Can't walk {}", files_dir.display()),
            source: e.into(),
        })?;
        let relative = entry
            .path()
            .strip_prefix(files_dir)
            .map_err(|_| EngineError::PathTraversal {
                filename: entry.path().display().to_string(),
            })?;

        if entry.file_type().is_dir() {
            let dir = deploy_dir.join(relative);
            fs::create_dir_all(&dir)
                .map_err(EngineError::io(format!("Can't create {}", dir.display())))?;
            continue;
        }

        let key = relative.to_string_lossy().replace('\\', "/");
        let target = match outputs.get(key.as_str()) {
            Some(filename) => deploy_dir.join(sanitize_relative(filename)?),
            None => deploy_dir.join(relative),
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(EngineError::io(format!("Can't create {}", parent.display())))?;
        }

        let content = fs::read(entry.path())
            .map_err(EngineError::io(format!("Can't read {}", entry.path().display())))?;
        let output = match String::from_utf8(content) {
            Ok(text) => substitute(&text, vars).into_owned().into_bytes(),
            // binary assets are copied verbatim
            Err(e) => e.into_bytes(),
        };
        fs::write(&target, output)
            .map_err(EngineError::io(format!("Can't write {}", target.display())))?;
        rendered += 1;
    }
    Ok(rendered)
}
