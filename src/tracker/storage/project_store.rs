use std::{
    collections::HashSet,
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use fs4::tokio::AsyncFileExt;
use serde::Serialize;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, error, warn};

use super::{
    entities::{ProjectRecord, ProjectsDocument},
    StoreError,
};

/// Interface for abstracting where project records are kept. Implementations report failures;
/// deciding what a failure means is left to [ProjectStore].
pub trait ProjectStorage {
    /// Reads every persisted record. A missing source is not an error and yields no records.
    fn load(&self) -> impl Future<Output = Result<Vec<ProjectRecord>, StoreError>>;

    /// Replaces the persisted records with `records`.
    fn save(&self, records: &[ProjectRecord]) -> impl Future<Output = Result<(), StoreError>>;
}

impl<T: Deref> ProjectStorage for T
where
    T::Target: ProjectStorage,
{
    fn load(&self) -> impl Future<Output = Result<Vec<ProjectRecord>, StoreError>> {
        self.deref().load()
    }

    fn save(&self, records: &[ProjectRecord]) -> impl Future<Output = Result<(), StoreError>> {
        self.deref().save(records)
    }
}

#[derive(Serialize)]
struct ProjectsDocumentRef<'a> {
    projects: &'a [ProjectRecord],
}

/// The main realization of [ProjectStorage]: a single json document on disk.
pub struct JsonProjectStorage {
    path: PathBuf,
}

impl JsonProjectStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn sibling_path(&self, extension: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(extension);
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling_path(".tmp")
    }

    /// The document itself is replaced on every save, so readers and writers agree on a
    /// separate file that is never renamed or removed.
    fn lock_path(&self) -> PathBuf {
        self.sibling_path(".lock")
    }

    async fn open_lock(&self) -> Result<File, std::io::Error> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())
            .await
    }

    async fn read_document(&self) -> Result<Option<String>, std::io::Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_document(&self, buffer: &[u8]) -> Result<(), std::io::Error> {
        // Written next to the target and renamed over it, so readers never see half a document.
        let temp_path = self.temp_path();
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&temp_path)
            .await?;
        file.set_len(0).await?;
        file.write_all(buffer).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await
    }
}

impl ProjectStorage for JsonProjectStorage {
    async fn load(&self) -> Result<Vec<ProjectRecord>, StoreError> {
        debug!("Loading projects from {:?}", self.path);
        if let Err(e) = tokio::fs::metadata(&self.path).await {
            return match e.kind() {
                ErrorKind::NotFound => Ok(vec![]),
                _ => Err(e.into()),
            };
        }

        let lock = self.open_lock().await?;
        lock.lock_shared()?;
        let read = self.read_document().await;
        lock.unlock_async().await?;

        let Some(contents) = read? else {
            return Ok(vec![]);
        };
        // Empty file means empty collection.
        if contents.trim().is_empty() {
            return Ok(vec![]);
        }
        let document: ProjectsDocument = serde_json::from_str(&contents)?;
        Ok(document.projects)
    }

    async fn save(&self, records: &[ProjectRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let buffer = serde_json::to_vec_pretty(&ProjectsDocumentRef { projects: records })?;

        let lock = self.open_lock().await?;
        lock.lock_exclusive()?;
        let written = self.write_document(&buffer).await;
        lock.unlock_async().await?;
        written?;

        debug!("Saved {} projects to {:?}", records.len(), self.path);
        Ok(())
    }
}

/// Owns the in-memory project records and keeps them in sync with a [ProjectStorage].
/// Persistence failures are logged and swallowed: tracking carries on with the in-memory state.
pub struct ProjectStore<S: ProjectStorage> {
    storage: S,
    records: Vec<ProjectRecord>,
}

impl<S: ProjectStorage> ProjectStore<S> {
    pub async fn open(storage: S) -> Self {
        let mut store = Self {
            storage,
            records: vec![],
        };
        store.load().await;
        store
    }

    /// Replaces in-memory records with the persisted ones. Any failure results in no records.
    pub async fn load(&mut self) -> &[ProjectRecord] {
        self.records = match self.storage.load().await {
            Ok(records) => normalize(records),
            Err(e) => {
                error!("Failed to load projects, starting with an empty store: {e}");
                vec![]
            }
        };
        &self.records
    }

    /// Persists every record, overwriting what was stored before.
    pub async fn save(&self) {
        if let Err(e) = self.storage.save(&self.records).await {
            error!("Failed to save {} projects: {e}", self.records.len());
        }
    }

    pub fn records(&self) -> &[ProjectRecord] {
        &self.records
    }

    pub fn get(&self, project_id: &str) -> Option<&ProjectRecord> {
        self.position(project_id).map(|i| &self.records[i])
    }

    /// Returns the record for `project_id`, creating and saving a fresh one when missing.
    /// A non-empty `display_name` that differs from the stored one replaces it.
    pub async fn find_or_create(
        &mut self,
        project_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> &ProjectRecord {
        match self.position(project_id) {
            Some(index) => {
                if !display_name.is_empty() && *self.records[index].display_name != *display_name
                {
                    self.records[index].display_name = display_name.into();
                    self.save().await;
                }
                &self.records[index]
            }
            None => {
                let index = self.records.len();
                let display_name = if display_name.is_empty() {
                    project_id
                } else {
                    display_name
                };
                self.records.push(ProjectRecord::new(
                    project_id.into(),
                    display_name.into(),
                    now,
                ));
                self.save().await;
                &self.records[index]
            }
        }
    }

    /// Adds closed session time to a record and stamps it as opened at `now`.
    pub async fn add_minutes(
        &mut self,
        project_id: &str,
        minutes: u64,
        now: DateTime<Utc>,
    ) -> &ProjectRecord {
        let index = match self.position(project_id) {
            Some(index) => index,
            None => {
                warn!("No record for {project_id} while closing a session, creating one");
                self.records.push(ProjectRecord::new(
                    project_id.into(),
                    project_id.into(),
                    now,
                ));
                self.records.len() - 1
            }
        };

        let record = &mut self.records[index];
        record.total_minutes += minutes as f64;
        record.last_opened = now;
        self.save().await;
        &self.records[index]
    }

    fn position(&self, project_id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| &*r.project_id == project_id)
    }
}

/// Repairs what an external edit could have broken: duplicate ids and impossible totals.
fn normalize(records: Vec<ProjectRecord>) -> Vec<ProjectRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|mut record| {
            if !seen.insert(record.project_id.clone()) {
                warn!("Dropping duplicate project record {}", record.project_id);
                return None;
            }
            if !(record.total_minutes.is_finite() && record.total_minutes >= 0.) {
                warn!(
                    "Project {} has invalid total {}, resetting",
                    record.project_id, record.total_minutes
                );
                record.total_minutes = 0.;
            }
            Some(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::tracker::storage::{entities::ProjectRecord, StoreError, PROJECTS_FILE};

    use fs4::tokio::AsyncFileExt;

    use super::{JsonProjectStorage, ProjectStorage, ProjectStore};

    fn test_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap()
    }

    /// Storage that refuses every operation but remembers how often it was asked to save.
    #[derive(Default)]
    struct BrokenStorage {
        save_attempts: Mutex<usize>,
    }

    impl ProjectStorage for BrokenStorage {
        async fn load(&self) -> Result<Vec<ProjectRecord>, StoreError> {
            Err(io::Error::other("disk is gone").into())
        }

        async fn save(&self, _records: &[ProjectRecord]) -> Result<(), StoreError> {
            *self.save_attempts.lock().unwrap() += 1;
            Err(io::Error::other("disk is gone").into())
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonProjectStorage::new(dir.path().join(PROJECTS_FILE));
        assert!(storage.load().await?.is_empty());

        let store = ProjectStore::open(storage).await;
        assert!(store.records().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_file_loads_empty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(PROJECTS_FILE);
        std::fs::write(&path, "{\"projects\": [{\"projectId\": ")?;

        let storage = JsonProjectStorage::new(path);
        assert!(matches!(
            storage.load().await,
            Err(StoreError::Malformed(_))
        ));

        let store = ProjectStore::open(storage).await;
        assert!(store.records().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_file_loads_empty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(PROJECTS_FILE);
        std::fs::write(&path, "  \n")?;

        let storage = JsonProjectStorage::new(path);
        assert!(storage.load().await?.is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_held_lock_blocks_save() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(PROJECTS_FILE);
        let storage = JsonProjectStorage::new(path.clone());

        let held = storage.open_lock().await?;
        held.lock_exclusive()?;

        let record = ProjectRecord {
            project_id: "git@x/a.git".into(),
            display_name: "a".into(),
            total_minutes: 12.,
            last_opened: test_start(),
        };
        let saving = tokio::spawn(async move { storage.save(&[record]).await });

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!saving.is_finished());
        assert!(!path.exists());
        assert!(!path.with_file_name("projects.json.tmp").exists());

        held.unlock_async().await?;
        saving.await??;

        let records = JsonProjectStorage::new(path).load().await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_minutes, 12.);
        Ok(())
    }

    #[tokio::test]
    async fn test_saved_records_survive_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join(PROJECTS_FILE);

        let mut store = ProjectStore::open(JsonProjectStorage::new(path.clone())).await;
        store.find_or_create("git@x/a.git", "a", test_start()).await;
        store.find_or_create("git@x/b.git", "b", test_start()).await;
        store
            .add_minutes("git@x/a.git", 7, test_start() + Duration::minutes(7))
            .await;

        let reopened = ProjectStore::open(JsonProjectStorage::new(path.clone())).await;
        assert_eq!(reopened.records(), store.records());
        assert_eq!(reopened.records()[0].total_minutes, 7.);
        assert!(!path.with_file_name("projects.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let mut store =
            ProjectStore::open(JsonProjectStorage::new(dir.path().join(PROJECTS_FILE))).await;

        let first = store
            .find_or_create("git@x/y.git", "y", test_start())
            .await
            .clone();
        let second = store
            .find_or_create("git@x/y.git", "y", test_start() + Duration::hours(1))
            .await
            .clone();

        assert_eq!(first, second);
        assert_eq!(first.total_minutes, 0.);
        assert_eq!(first.last_opened, test_start());
        assert_eq!(store.records().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_or_create_renames_existing() -> Result<()> {
        let dir = tempdir()?;
        let mut store =
            ProjectStore::open(JsonProjectStorage::new(dir.path().join(PROJECTS_FILE))).await;

        store.find_or_create("git@x/y.git", "", test_start()).await;
        assert_eq!(&*store.records()[0].display_name, "git@x/y.git");

        store.find_or_create("git@x/y.git", "y", test_start()).await;
        store.find_or_create("git@x/y.git", "", test_start()).await;
        assert_eq!(&*store.records()[0].display_name, "y");
        Ok(())
    }

    #[tokio::test]
    async fn test_add_minutes_only_touches_target() -> Result<()> {
        let dir = tempdir()?;
        let mut store =
            ProjectStore::open(JsonProjectStorage::new(dir.path().join(PROJECTS_FILE))).await;
        store.find_or_create("a", "a", test_start()).await;
        store.find_or_create("b", "b", test_start()).await;

        let later = test_start() + Duration::minutes(30);
        let updated = store.add_minutes("b", 30, later).await.clone();

        assert_eq!(updated.total_minutes, 30.);
        assert_eq!(updated.last_opened, later);
        let untouched = store.get("a").unwrap();
        assert_eq!(untouched.total_minutes, 0.);
        assert_eq!(untouched.last_opened, test_start());
        Ok(())
    }

    #[tokio::test]
    async fn test_add_minutes_creates_missing_record() -> Result<()> {
        let dir = tempdir()?;
        let mut store =
            ProjectStore::open(JsonProjectStorage::new(dir.path().join(PROJECTS_FILE))).await;

        store.add_minutes("git@x/z.git", 3, test_start()).await;
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.get("git@x/z.git").unwrap().total_minutes, 3.);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_repairs_external_edits() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(PROJECTS_FILE);
        std::fs::write(
            &path,
            r#"{"projects": [
                {"projectId": "a", "displayName": "a", "totalMinutes": -4, "lastOpened": "2018-07-04T00:00:00Z"},
                {"projectId": "b", "displayName": "b", "totalMinutes": 10.5, "lastOpened": "2018-07-04T00:00:00Z"},
                {"projectId": "a", "displayName": "copy", "totalMinutes": 99, "lastOpened": "2018-07-04T00:00:00Z"}
            ]}"#,
        )?;

        let store = ProjectStore::open(JsonProjectStorage::new(path)).await;
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.get("a").unwrap().total_minutes, 0.);
        assert_eq!(&*store.get("a").unwrap().display_name, "a");
        assert_eq!(store.get("b").unwrap().total_minutes, 10.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_broken_storage_keeps_memory_state() -> Result<()> {
        let storage = Arc::new(BrokenStorage::default());
        let mut store = ProjectStore::open(storage.clone()).await;
        assert!(store.records().is_empty());

        store.find_or_create("a", "a", test_start()).await;
        store.add_minutes("a", 5, test_start()).await;

        assert_eq!(store.get("a").unwrap().total_minutes, 5.);
        assert_eq!(*storage.save_attempts.lock().unwrap(), 2);
        Ok(())
    }
}
