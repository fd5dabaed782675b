//! In-memory project registry backed by `projects/{id}.json` files.
//!
//! Each project sits behind its own [`Mutex`]; the outer [`RwLock`] only
//! guards membership. [`ProjectStore::update`] applies a closure to a copy
//! of the project, and only when the closure succeeds and the file is
//! written does the copy replace the live value. A failed mutation leaves
//! both memory and disk untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use storyboard_core::batch_linker;
use storyboard_core::error::CoreError;
use storyboard_core::naming::project_output_dir;
use storyboard_core::project::{Project, ProjectSummary};
use storyboard_core::types::EntityId;

use crate::error::StoreError;

type Shared = Arc<Mutex<Project>>;

/// Outcome of loading the projects directory at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<PathBuf>,
    pub relinked: usize,
}

pub struct ProjectStore {
    dir: PathBuf,
    projects: RwLock<HashMap<EntityId, Shared>>,
}

impl ProjectStore {
    /// An empty store writing into `dir`. Nothing is read from disk.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            projects: RwLock::new(HashMap::new()),
        }
    }

    /// Open `dir`, loading every `*.json` project in it.
    ///
    /// Malformed files are logged and skipped. A project whose shot images
    /// no longer resolve is relinked once against its folder under
    /// `outputs_dir`, and saved if anything was linked.
    pub async fn open(
        dir: impl Into<PathBuf>,
        outputs_dir: &Path,
        batch_threshold: Duration,
    ) -> Result<(Self, LoadReport), StoreError> {
        let store = Self::new(dir);
        tokio::fs::create_dir_all(&store.dir)
            .await
            .map_err(|e| StoreError::io(&store.dir, e))?;

        let mut report = LoadReport::default();
        let mut entries = tokio::fs::read_dir(&store.dir)
            .await
            .map_err(|e| StoreError::io(&store.dir, e))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&store.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut map = HashMap::new();
        for path in paths {
            let mut project = match read_project(&path).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable project file");
                    report.skipped.push(path);
                    continue;
                }
            };

            let out = project_output_dir(outputs_dir, &project.name);
            match batch_linker::relink_if_dangling(&mut project, &out, batch_threshold) {
                Ok(Some(link)) if link.linked > 0 => {
                    tracing::info!(
                        project_id = %project.id,
                        linked = link.linked,
                        "Relinked dangling shot images on load"
                    );
                    store.write(&project).await?;
                    report.relinked += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(project_id = %project.id, error = %e, "Relink on load failed");
                }
            }

            map.insert(project.id, Arc::new(Mutex::new(project)));
            report.loaded += 1;
        }

        *store.projects.write().await = map;
        tracing::info!(
            loaded = report.loaded,
            skipped = report.skipped.len(),
            relinked = report.relinked,
            dir = %store.dir.display(),
            "Loaded projects"
        );
        Ok((store, report))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn project_path(&self, id: EntityId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Summaries of all projects, most recently updated first.
    pub async fn list(&self) -> Vec<ProjectSummary> {
        let handles: Vec<Shared> = self.projects.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.lock().await.summary());
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// A snapshot of the project.
    pub async fn get(&self, id: EntityId) -> Result<Project, StoreError> {
        let handle = self.handle(id).await?;
        let project = handle.lock().await.clone();
        Ok(project)
    }

    /// Persist and register a new project.
    pub async fn create(&self, project: Project) -> Result<Project, StoreError> {
        self.write(&project).await?;
        let snapshot = project.clone();
        self.projects
            .write()
            .await
            .insert(project.id, Arc::new(Mutex::new(project)));
        tracing::info!(project_id = %snapshot.id, name = %snapshot.name, "Created project");
        Ok(snapshot)
    }

    /// Run `f` against the project under its lock.
    ///
    /// With `expected_version`, a stale version is a [`CoreError::Conflict`].
    /// On success the version is bumped, `updated_at` refreshed and the file
    /// rewritten before the change becomes visible.
    pub async fn update<T, F>(
        &self,
        id: EntityId,
        expected_version: Option<u64>,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Project) -> Result<T, CoreError>,
    {
        let handle = self.handle(id).await?;
        let mut live = handle.lock().await;

        if let Some(expected) = expected_version {
            if expected != live.version {
                return Err(CoreError::Conflict(format!(
                    "project version is {}, request expected {expected}",
                    live.version
                ))
                .into());
            }
        }

        let mut draft = live.clone();
        let value = f(&mut draft)?;
        draft.touch();
        self.write(&draft).await?;
        *live = draft;
        Ok(value)
    }

    /// Remove the project and its file.
    pub async fn delete(&self, id: EntityId) -> Result<(), StoreError> {
        let removed = self.projects.write().await.remove(&id);
        if removed.is_none() {
            return Err(CoreError::not_found("Project", id).into());
        }
        let path = self.project_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(path, e)),
        }
        tracing::info!(project_id = %id, "Deleted project");
        Ok(())
    }

    async fn handle(&self, id: EntityId) -> Result<Shared, StoreError> {
        self.projects
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Project", id).into())
    }

    /// Write through a temp file and rename so readers never see a partial
    /// document.
    async fn write(&self, project: &Project) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;
        let body = serde_json::to_vec_pretty(project).map_err(StoreError::Serialize)?;
        let path = self.project_path(project.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }
}

async fn read_project(path: &Path) -> Result<Project, StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::SystemTime;

    use assert_matches::assert_matches;
    use storyboard_core::project::{Character, Shot};

    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(300);

    async fn open(dir: &Path) -> (ProjectStore, LoadReport) {
        ProjectStore::open(dir.join("projects"), &dir.join("outputs"), THRESHOLD)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_persists_and_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = open(tmp.path()).await;
        let created = store.create(Project::new("雨夜")).await.unwrap();
        assert!(store.project_path(created.id).is_file());

        let (reopened, report) = open(tmp.path()).await;
        assert_eq!(report.loaded, 1);
        assert_eq!(reopened.get(created.id).await.unwrap().name, "雨夜");
    }

    #[tokio::test]
    async fn update_bumps_version_and_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = open(tmp.path()).await;
        let id = store.create(Project::new("P")).await.unwrap().id;

        store
            .update(id, Some(0), |p| {
                p.add_entity(Character::new("Alice"))?;
                Ok(())
            })
            .await
            .unwrap();

        let project = store.get(id).await.unwrap();
        assert_eq!(project.version, 1);
        let on_disk: Project =
            serde_json::from_slice(&std::fs::read(store.project_path(id)).unwrap()).unwrap();
        assert_eq!(on_disk.characters.len(), 1);
        assert_eq!(on_disk.version, 1);
    }

    #[tokio::test]
    async fn stale_version_is_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = open(tmp.path()).await;
        let id = store.create(Project::new("P")).await.unwrap().id;
        store.update(id, None, |_| Ok(())).await.unwrap();

        let err = store.update(id, Some(0), |_| Ok(())).await.unwrap_err();
        assert_matches!(err, StoreError::Core(CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_mutation_leaves_project_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = open(tmp.path()).await;
        let id = store.create(Project::new("P")).await.unwrap().id;

        let err = store
            .update(id, None, |p| {
                p.add_entity(Character::new("Alice"))?;
                p.add_entity(Character::new("alice"))?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Core(CoreError::Conflict(_)));

        let project = store.get(id).await.unwrap();
        assert!(project.characters.is_empty());
        assert_eq!(project.version, 0);
    }

    #[tokio::test]
    async fn concurrent_updates_serialize() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = open(tmp.path()).await;
        let store = Arc::new(store);
        let id = store.create(Project::new("P")).await.unwrap().id;

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .update(id, None, |p| {
                        p.add_shot(Shot::default())?;
                        Ok(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let project = store.get(id).await.unwrap();
        assert_eq!(project.version, 10);
        let numbers: Vec<u32> = project.shots.iter().map(|s| s.shot_number).collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn malformed_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let projects = tmp.path().join("projects");
        std::fs::create_dir_all(&projects).unwrap();
        std::fs::write(projects.join("broken.json"), b"{ not json").unwrap();

        let (store, report) = open(tmp.path()).await;
        assert_eq!(report.loaded, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn dangling_images_relink_on_open() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = open(tmp.path()).await;
        let mut project = Project::new("Relink");
        for _ in 0..2 {
            project.add_shot(Shot {
                output_image: Some(tmp.path().join("gone.png")),
                ..Shot::default()
            })
            .unwrap();
        }
        let id = store.create(project).await.unwrap().id;

        let out = tmp.path().join("outputs").join("Relink");
        std::fs::create_dir_all(&out).unwrap();
        for (i, name) in ["a.png", "b.png"].iter().enumerate() {
            let f = File::create(out.join(name)).unwrap();
            f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + i as u64))
                .unwrap();
        }

        let (reopened, report) = open(tmp.path()).await;
        assert_eq!(report.relinked, 1);
        let project = reopened.get(id).await.unwrap();
        assert_eq!(project.shots[0].output_image, Some(out.join("a.png")));
        assert_eq!(project.shots[1].output_image, Some(out.join("b.png")));
    }

    #[tokio::test]
    async fn delete_removes_file_and_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = open(tmp.path()).await;
        let id = store.create(Project::new("P")).await.unwrap().id;
        store.delete(id).await.unwrap();
        assert!(!store.project_path(id).exists());
        assert_matches!(
            store.get(id).await,
            Err(StoreError::Core(CoreError::NotFound { .. }))
        );
        assert_matches!(
            store.delete(id).await,
            Err(StoreError::Core(CoreError::NotFound { .. }))
        );
    }
}
