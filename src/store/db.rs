use super::models::{AppRecord, DropletRecord, PackageRecord, SpaceRecord, StagingTaskRecord};
use crate::error::{StagerError, StagerResult};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use std::path::Path;

/// sled-backed storage for every record the staging core reads or writes.
///
/// Each record kind lives in its own tree. Row updates made while applying a
/// staging result go through [`StagingDb::modify`], which reads, mutates and
/// writes a single row inside one transaction.
#[derive(Clone)]
pub struct StagingDb {
    db: sled::Db,
    pub(crate) apps_tree: sled::Tree,
    pub(crate) droplets_tree: sled::Tree,
    pub(crate) packages_tree: sled::Tree,
    pub(crate) spaces_tree: sled::Tree,
    pub(crate) staging_tasks_tree: sled::Tree,
    pub(crate) jobs_tree: sled::Tree,
}

impl StagingDb {
    pub fn new(db: sled::Db) -> StagerResult<Self> {
        Ok(Self {
            apps_tree: db.open_tree("apps")?,
            droplets_tree: db.open_tree("droplets")?,
            packages_tree: db.open_tree("packages")?,
            spaces_tree: db.open_tree("spaces")?,
            staging_tasks_tree: db.open_tree("staging_tasks")?,
            jobs_tree: db.open_tree("jobs")?,
            db,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> StagerResult<Self> {
        Self::new(sled::open(path)?)
    }

    /// Temporary database removed on drop.
    pub fn temporary() -> StagerResult<Self> {
        Self::new(sled::Config::new().temporary(true).open()?)
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    pub fn flush(&self) -> StagerResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Store a serializable item under `key`
    pub fn store_in_tree<T: Serialize>(&self, tree: &sled::Tree, key: &str, item: &T) -> StagerResult<()> {
        let bytes = serde_json::to_vec(item)?;
        tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Retrieve a deserializable item stored under `key`
    pub fn get_from_tree<T: DeserializeOwned>(&self, tree: &sled::Tree, key: &str) -> StagerResult<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove `key`, returning whether it existed
    pub fn delete_from_tree(&self, tree: &sled::Tree, key: &str) -> StagerResult<bool> {
        Ok(tree.remove(key.as_bytes())?.is_some())
    }

    /// Atomically read, mutate and write back the row under `key`.
    ///
    /// Returns `Ok(None)` without writing when the row does not exist. An
    /// error from `mutate` aborts the transaction and leaves the row untouched.
    /// `mutate` may run more than once if a concurrent writer conflicts, so it
    /// must only touch the record it is given.
    pub fn modify<T, R, F>(&self, tree: &sled::Tree, key: &str, mutate: F) -> StagerResult<Option<R>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&mut T) -> StagerResult<R>,
    {
        let result = tree.transaction(|tx| -> ConflictableTransactionResult<Option<R>, StagerError> {
            let bytes = match tx.get(key.as_bytes())? {
                Some(bytes) => bytes,
                None => return Ok(None),
            };
            let mut record: T = serde_json::from_slice(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(StagerError::from(e)))?;
            let outcome = mutate(&mut record).map_err(ConflictableTransactionError::Abort)?;
            let bytes = serde_json::to_vec(&record)
                .map_err(|e| ConflictableTransactionError::Abort(StagerError::from(e)))?;
            tx.insert(key.as_bytes(), bytes)?;
            Ok(Some(outcome))
        });

        match result {
            Ok(outcome) => Ok(outcome),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    /// Atomically remove the row under `key` if `check` accepts it.
    ///
    /// Returns the removed record, or `Ok(None)` if there was no row.
    pub fn remove_if<T, F>(&self, tree: &sled::Tree, key: &str, check: F) -> StagerResult<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> StagerResult<()>,
    {
        let result = tree.transaction(|tx| -> ConflictableTransactionResult<Option<T>, StagerError> {
            let bytes = match tx.get(key.as_bytes())? {
                Some(bytes) => bytes,
                None => return Ok(None),
            };
            let record: T = serde_json::from_slice(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(StagerError::from(e)))?;
            check(&record).map_err(ConflictableTransactionError::Abort)?;
            tx.remove(key.as_bytes())?;
            Ok(Some(record))
        });

        match result {
            Ok(record) => Ok(record),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    pub fn store_app(&self, app: &AppRecord) -> StagerResult<()> {
        self.store_in_tree(&self.apps_tree, &app.guid, app)
    }

    pub fn get_app(&self, guid: &str) -> StagerResult<Option<AppRecord>> {
        self.get_from_tree(&self.apps_tree, guid)
    }

    pub fn delete_app(&self, guid: &str) -> StagerResult<bool> {
        self.delete_from_tree(&self.apps_tree, guid)
    }

    pub fn modify_app<R, F>(&self, guid: &str, mutate: F) -> StagerResult<Option<R>>
    where
        F: Fn(&mut AppRecord) -> StagerResult<R>,
    {
        self.modify(&self.apps_tree, guid, mutate)
    }

    pub fn store_droplet(&self, droplet: &DropletRecord) -> StagerResult<()> {
        self.store_in_tree(&self.droplets_tree, &droplet.guid, droplet)
    }

    pub fn get_droplet(&self, guid: &str) -> StagerResult<Option<DropletRecord>> {
        self.get_from_tree(&self.droplets_tree, guid)
    }

    pub fn modify_droplet<R, F>(&self, guid: &str, mutate: F) -> StagerResult<Option<R>>
    where
        F: Fn(&mut DropletRecord) -> StagerResult<R>,
    {
        self.modify(&self.droplets_tree, guid, mutate)
    }

    pub fn store_package(&self, package: &PackageRecord) -> StagerResult<()> {
        self.store_in_tree(&self.packages_tree, &package.guid, package)
    }

    pub fn get_package(&self, guid: &str) -> StagerResult<Option<PackageRecord>> {
        self.get_from_tree(&self.packages_tree, guid)
    }

    pub fn delete_package(&self, guid: &str) -> StagerResult<bool> {
        self.delete_from_tree(&self.packages_tree, guid)
    }

    pub fn remove_package_if<F>(&self, guid: &str, check: F) -> StagerResult<Option<PackageRecord>>
    where
        F: Fn(&PackageRecord) -> StagerResult<()>,
    {
        self.remove_if(&self.packages_tree, guid, check)
    }

    pub fn modify_package<R, F>(&self, guid: &str, mutate: F) -> StagerResult<Option<R>>
    where
        F: Fn(&mut PackageRecord) -> StagerResult<R>,
    {
        self.modify(&self.packages_tree, guid, mutate)
    }

    pub fn store_space(&self, space: &SpaceRecord) -> StagerResult<()> {
        self.store_in_tree(&self.spaces_tree, &space.guid, space)
    }

    pub fn get_space(&self, guid: &str) -> StagerResult<Option<SpaceRecord>> {
        self.get_from_tree(&self.spaces_tree, guid)
    }

    pub fn store_staging_task(&self, task: &StagingTaskRecord) -> StagerResult<()> {
        self.store_in_tree(&self.staging_tasks_tree, &task.correlation_id, task)
    }

    pub fn get_staging_task(&self, correlation_id: &str) -> StagerResult<Option<StagingTaskRecord>> {
        self.get_from_tree(&self.staging_tasks_tree, correlation_id)
    }

    pub fn delete_staging_task(&self, correlation_id: &str) -> StagerResult<bool> {
        self.delete_from_tree(&self.staging_tasks_tree, correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::StagingStatus;

    #[test]
    fn records_round_trip_through_their_trees() {
        let db = StagingDb::temporary().unwrap();
        let app = AppRecord::new("app-1", "dora", "space-1");
        db.store_app(&app).unwrap();

        assert_eq!(db.get_app("app-1").unwrap(), Some(app));
        assert_eq!(db.get_droplet("app-1").unwrap(), None);
        assert!(db.delete_app("app-1").unwrap());
        assert!(!db.delete_app("app-1").unwrap());
    }

    #[test]
    fn modify_writes_only_what_the_closure_changes() {
        let db = StagingDb::temporary().unwrap();
        let mut app = AppRecord::new("app-1", "dora", "space-1");
        app.instances = 3;
        db.store_app(&app).unwrap();

        let changed = db
            .modify_app("app-1", |app| {
                app.staging_status = StagingStatus::Staged;
                Ok(app.instances)
            })
            .unwrap();

        assert_eq!(changed, Some(3));
        let stored = db.get_app("app-1").unwrap().unwrap();
        assert_eq!(stored.staging_status, StagingStatus::Staged);
        assert_eq!(stored.instances, 3);
    }

    #[test]
    fn aborted_modify_leaves_row_untouched() {
        let db = StagingDb::temporary().unwrap();
        db.store_app(&AppRecord::new("app-1", "dora", "space-1")).unwrap();

        let result = db.modify_app("app-1", |app| -> StagerResult<()> {
            app.staging_status = StagingStatus::Failed;
            Err(StagerError::Conflict("stale".into()))
        });

        assert!(matches!(result, Err(StagerError::Conflict(_))));
        assert_eq!(
            db.get_app("app-1").unwrap().unwrap().staging_status,
            StagingStatus::Pending
        );
    }

    #[test]
    fn refused_removal_keeps_the_row() {
        let db = StagingDb::temporary().unwrap();
        db.store_app(&AppRecord::new("app-1", "dora", "space-1")).unwrap();

        let refused = db.remove_if(&db.apps_tree, "app-1", |_: &AppRecord| {
            Err(StagerError::Unauthorized("no".into()))
        });
        assert!(matches!(refused, Err(StagerError::Unauthorized(_))));
        assert!(db.get_app("app-1").unwrap().is_some());

        let removed: Option<AppRecord> = db.remove_if(&db.apps_tree, "app-1", |_| Ok(())).unwrap();
        assert_eq!(removed.map(|app| app.guid), Some("app-1".to_string()));
        assert!(db.get_app("app-1").unwrap().is_none());
    }

    #[test]
    fn modify_of_missing_row_is_none() {
        let db = StagingDb::temporary().unwrap();
        let outcome = db.modify_app("ghost", |_| Ok(())).unwrap();
        assert_eq!(outcome, None);
    }
}
