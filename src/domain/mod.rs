use std::{
    fs,
    path::{Path, PathBuf},
};

use futures::future::join_all;
use log::{info, warn};
use model::{AppStatus, ContainerStatusCode};
use port::{ContainerInspector, OrchestratorDriver};
use project::ProjectResolver;

use crate::{
    error::{EngineError, LifecycleError, Operation},
    store::{render::render, revision::RevisionStore, single_segment},
};

pub mod locks;
pub mod model;
pub mod port;
pub mod project;
pub mod status;

/// Drives applications from their latest revision to running containers.
///
/// Every operation on an application holds that application's lock: mutating
/// operations exclusively, status queries shared.
pub struct LifecycleService {
    pub revisions: RevisionStore,
    pub resolver: ProjectResolver,
    pub driver: Box<dyn OrchestratorDriver + 'static + Sync + Send>,
    pub inspector: Box<dyn ContainerInspector + 'static + Sync + Send>,
    pub apps_path: PathBuf,
    locks: locks::AppLocks,
}

pub enum Event {
    Deploy(String),
    Start(String),
    Stop(String),
    Restart(String),
    Update(String),
    Rename { app_id: String, name: String },
    Delete(String),
}

pub async fn reconcile(event: Event, service: &LifecycleService) -> Result<(), LifecycleError> {
    match event {
        Event::Deploy(app_id) => service.deploy(&app_id).await,
        Event::Start(app_id) => service.start(&app_id).await,
        Event::Stop(app_id) => service.stop(&app_id).await,
        Event::Restart(app_id) => service.restart(&app_id).await,
        Event::Update(app_id) => service.update(&app_id).await,
        Event::Rename { app_id, name } => service.rename(&app_id, &name).await,
        Event::Delete(app_id) => service.delete(&app_id).await,
    }
}

fn is_running(status: ContainerStatusCode) -> bool {
    !matches!(
        status,
        ContainerStatusCode::Stopped | ContainerStatusCode::Unknown
    )
}

fn move_dir(source: &Path, target: &Path) -> Result<(), EngineError> {
    fs::rename(source, target).map_err(EngineError::io(format!(
        "Can't move {} to {}",
        source.display(),
        target.display()
    )))
}

impl LifecycleService {
    pub fn new(
        revisions: RevisionStore,
        resolver: ProjectResolver,
        driver: Box<dyn OrchestratorDriver + 'static + Sync + Send>,
        inspector: Box<dyn ContainerInspector + 'static + Sync + Send>,
        apps_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            revisions,
            resolver,
            driver,
            inspector,
            apps_path: apps_path.into(),
            locks: Default::default(),
        }
    }

    /// Deployment directory of an application name. The name must be a single path segment.
    pub fn deploy_dir(&self, app_name: &str) -> Result<PathBuf, EngineError> {
        Ok(self.apps_path.join(single_segment(app_name)?))
    }

    fn ensure_apps_root(&self) -> Result<(), EngineError> {
        fs::create_dir_all(&self.apps_path).map_err(EngineError::io(format!(
            "Can't create {}",
            self.apps_path.display()
        )))
    }

    /// Name the application is deployed under, falling back to its latest revision.
    fn app_name(&self, app_id: &str) -> Result<String, EngineError> {
        if let Some(current) = self.revisions.load_current(app_id)? {
            return Ok(current.name);
        }
        let revision = self.revisions.resolve_latest(app_id)?;
        Ok(self.revisions.load_revision(app_id, revision)?.name)
    }

    async fn status_of(
        &self,
        app_id: &str,
        app_name: &str,
        deploy_dir: &Path,
    ) -> Result<AppStatus, EngineError> {
        status::aggregate(
            self.inspector.as_ref(),
            app_id,
            app_name,
            &self.driver.project_label(app_name),
            deploy_dir.is_dir(),
        )
        .await
    }

    pub async fn deploy(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.exclusive(app_id).await;
        self.deploy_locked(app_id)
            .await
            .map_err(|e| LifecycleError::new(app_id, Operation::Deploy, e))
    }

    pub async fn start(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.exclusive(app_id).await;
        self.start_locked(app_id)
            .await
            .map_err(|e| LifecycleError::new(app_id, Operation::Start, e))
    }

    pub async fn stop(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.exclusive(app_id).await;
        self.stop_locked(app_id)
            .await
            .map_err(|e| LifecycleError::new(app_id, Operation::Stop, e))
    }

    pub async fn restart(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.exclusive(app_id).await;
        self.restart_locked(app_id)
            .await
            .map_err(|e| LifecycleError::new(app_id, Operation::Restart, e))
    }

    pub async fn update(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.exclusive(app_id).await;
        self.update_locked(app_id)
            .await
            .map_err(|e| LifecycleError::new(app_id, Operation::Update, e))
    }

    pub async fn rename(&self, app_id: &str, new_name: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.exclusive(app_id).await;
        self.rename_locked(app_id, new_name)
            .await
            .map_err(|e| LifecycleError::new(app_id, Operation::Rename, e))
    }

    pub async fn delete(&self, app_id: &str) -> Result<(), LifecycleError> {
        let _guard = self.locks.exclusive(app_id).await;
        self.delete_locked(app_id)
            .await
            .map_err(|e| LifecycleError::new(app_id, Operation::Delete, e))
    }

    pub async fn status(&self, app_id: &str) -> Result<AppStatus, LifecycleError> {
        let _guard = self.locks.shared(app_id).await;
        let status = async {
            let name = self.app_name(app_id)?;
            let dir = self.deploy_dir(&name)?;
            self.status_of(app_id, &name, &dir).await
        };
        status
            .await
            .map_err(|e| LifecycleError::new(app_id, Operation::Status, e))
    }

    /// Status of every application known to the revision store.
    pub async fn list_statuses(&self) -> Result<Vec<AppStatus>, LifecycleError> {
        let app_ids = self
            .revisions
            .list_app_ids()
            .map_err(|e| LifecycleError::new("*", Operation::Status, e))?;
        Ok(join_all(app_ids.iter().map(|app_id| self.status(app_id)))
            .await
            .into_iter()
            .filter_map(|status| {
                status
                    .map_err(|e| warn!("Skipping application in listing: {}", e))
                    .ok()
            })
            .collect())
    }

    async fn deploy_locked(&self, app_id: &str) -> Result<(), EngineError> {
        self.ensure_apps_root()?;
        let revision = self.revisions.resolve_latest(app_id)?;
        let revision_dir = self.revisions.revision_dir(app_id, revision)?;
        let config = self.revisions.load_revision(app_id, revision)?;
        let deploy_dir = self.deploy_dir(&config.name)?;

        if let Some(current) = self.revisions.load_current(app_id)? {
            if current.name != config.name {
                self.relocate(app_id, &current.name, &deploy_dir).await?;
            }
        }

        if deploy_dir.is_dir() {
            let status = self.status_of(app_id, &config.name, &deploy_dir).await?;
            if is_running(status.status_code) {
                info!(
                    "app_id={} app={} is {:?}, bringing it down before rendering",
                    app_id, config.name, status.status_code
                );
                self.resolver.down(self.driver.as_ref(), &deploy_dir).await?;
            }
        }

        info!(
            "app_id={} app={} deploying revision {}",
            app_id, config.name, revision
        );
        render(app_id, &revision_dir, &deploy_dir)?;
        self.resolver.up(self.driver.as_ref(), &deploy_dir).await?;
        info!("app_id={} app={} deployed", app_id, config.name);
        Ok(())
    }

    /// Moves the deployment left under a previous name to `target` after bringing it down.
    ///
    /// The latest revision's name always wins on deploy. A name given through
    /// [`LifecycleService::rename`] only lives in `current.config.json`, so the next
    /// deploy moves the directory back unless a revision carrying the new name
    /// was saved in the meantime.
    async fn relocate(
        &self,
        app_id: &str,
        previous_name: &str,
        target: &Path,
    ) -> Result<(), EngineError> {
        let previous = self.deploy_dir(previous_name)?;
        if !previous.is_dir() {
            return Ok(());
        }
        if target.exists() {
            return Err(EngineError::AlreadyExists {
                path: target.to_path_buf(),
            });
        }
        info!(
            "app_id={} renamed from {} by a new revision, moving deployment",
            app_id, previous_name
        );
        if let Err(e) = self.resolver.down(self.driver.as_ref(), &previous).await {
            warn!(
                "app_id={} can't bring down {}: {}",
                app_id,
                previous.display(),
                e
            );
        }
        move_dir(&previous, target)
    }

    async fn start_locked(&self, app_id: &str) -> Result<(), EngineError> {
        self.ensure_apps_root()?;
        let name = self.app_name(app_id)?;
        let dir = self.deploy_dir(&name)?;
        if !dir.is_dir() {
            info!("app_id={} app={} first start, deploying", app_id, name);
            return self.deploy_locked(app_id).await;
        }
        self.resolver.up(self.driver.as_ref(), &dir).await
    }

    async fn stop_locked(&self, app_id: &str) -> Result<(), EngineError> {
        self.ensure_apps_root()?;
        let name = match self.app_name(app_id) {
            Err(EngineError::NoVersions { .. }) => {
                info!("app_id={} unknown, nothing to stop", app_id);
                return Ok(());
            }
            name => name?,
        };
        let dir = self.deploy_dir(&name)?;
        if !dir.is_dir() {
            info!("app_id={} app={} not deployed, nothing to stop", app_id, name);
            return Ok(());
        }
        self.resolver.down(self.driver.as_ref(), &dir).await
    }

    async fn restart_locked(&self, app_id: &str) -> Result<(), EngineError> {
        self.ensure_apps_root()?;
        let name = self.app_name(app_id)?;
        let dir = self.deploy_dir(&name)?;
        if !dir.is_dir() {
            info!("app_id={} app={} not deployed yet, deploying", app_id, name);
            return self.deploy_locked(app_id).await;
        }
        self.resolver.restart(self.driver.as_ref(), &dir).await
    }

    async fn update_locked(&self, app_id: &str) -> Result<(), EngineError> {
        self.ensure_apps_root()?;
        let name = self.app_name(app_id)?;
        let dir = self.deploy_dir(&name)?;
        if !dir.is_dir() {
            return Err(EngineError::NotDeployed {
                app_id: app_id.to_string(),
            });
        }
        self.resolver.pull(self.driver.as_ref(), &dir).await?;
        self.resolver.up(self.driver.as_ref(), &dir).await
    }

    async fn rename_locked(&self, app_id: &str, new_name: &str) -> Result<(), EngineError> {
        self.ensure_apps_root()?;
        let target = self.deploy_dir(new_name)?;
        let name = self.app_name(app_id)?;
        if name == new_name {
            return Ok(());
        }
        if target.exists() {
            return Err(EngineError::AlreadyExists { path: target });
        }
        let source = self.deploy_dir(&name)?;
        if !source.is_dir() {
            return Err(EngineError::NotDeployed {
                app_id: app_id.to_string(),
            });
        }

        let was_running = is_running(self.status_of(app_id, &name, &source).await?.status_code);
        self.resolver.down(self.driver.as_ref(), &source).await?;
        move_dir(&source, &target)?;
        if let Some(mut current) = self.revisions.load_current(app_id)? {
            current.name = new_name.to_string();
            self.revisions.save_current(app_id, &current)?;
        }
        info!("app_id={} renamed {} to {}", app_id, name, new_name);

        if was_running {
            self.resolver.up(self.driver.as_ref(), &target).await?;
        }
        Ok(())
    }

    async fn delete_locked(&self, app_id: &str) -> Result<(), EngineError> {
        self.ensure_apps_root()?;
        // Stop failures never block deletion.
        let stopped: Result<(), EngineError> = self.stop_locked(app_id).await;
        if let Err(e) = stopped {
            warn!("app_id={} stop before delete failed, ignoring: {}", app_id, e);
        }

        match self.app_name(app_id) {
            Ok(name) => {
                let dir = self.deploy_dir(&name)?;
                if dir.exists() {
                    fs::remove_dir_all(&dir)
                        .map_err(EngineError::io(format!("Can't remove {}", dir.display())))?;
                }
            }
            Err(EngineError::NoVersions { .. }) => {}
            Err(e) => return Err(e),
        }
        self.revisions.clear_current(app_id)?;
        info!("app_id={} deleted", app_id);
        Ok(())
    }
}
