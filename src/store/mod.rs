//! The concurrent, per-user record store.
//!
//! Every (user, record kind) pair owns one [`Collection`]: an ordered `Vec` of records
//! behind its own mutex. All collections are created when the store is opened, from one
//! directory per user under the storage root, and live as long as the store.
//!
//! A mutation locks the collection, changes it in memory and then *hands the lock over* to
//! a background persistence job together with the collection. The job rewrites the user's
//! file and releases the lock when the file is on disk. The caller returns as soon as the
//! job is queued, so it never waits on disk IO, yet the next mutation of the same
//! collection waits at the lock until the previous write is finished. This serializes the
//! writes of a collection without a dedicated write queue:
//!
//! ```text
//! Idle -> Locked(mutating) -> Locked(persisting) -> Idle
//! ```
//!
//! Collections of different users or kinds never share a lock and proceed in parallel.
use std::io;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::crate_version;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, MutexGuard, RawMutex};
use tracing::{debug, error, info, instrument};

use crate::config::{Config, RECORD_WEIGHT};
use crate::record::{Occurrence, Quick, Record, RecordKind, Skull};
use crate::serialize::{to_json_array, write_json_chunks};
use crate::thread_pool::{SharedQueueThreadPool, ThreadPool};
use crate::user::{scan_users, User};
use crate::{Result, SkullError};

mod load;
mod persist;

pub use self::load::load;

/// The records of one kind belonging to one user, guarded by an exclusive lock.
///
/// The record count is mirrored outside the lock so size estimates never wait.
pub struct Collection<T> {
    records: Arc<Mutex<Vec<T>>>,
    len: Arc<AtomicUsize>,
}

impl<T: Record> Collection<T> {
    fn new(records: Vec<T>) -> Self {
        Collection {
            len: Arc::new(AtomicUsize::new(records.len())),
            records: Arc::new(Mutex::new(records)),
        }
    }

    /// number of records as of the last released lock
    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// a lock for reading, released at the end of the caller's scope
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.records.lock()
    }

    /// a lock that can be sent to and released by another thread
    fn lock_owned(&self) -> LockedCollection<T> {
        LockedCollection {
            guard: self.records.lock_arc(),
            len: Arc::clone(&self.len),
        }
    }
}

/// Exclusive access to a [`Collection`] that is not tied to the locking thread.
///
/// The mirrored record count is refreshed right before the lock is released.
pub(crate) struct LockedCollection<T> {
    guard: ArcMutexGuard<RawMutex, Vec<T>>,
    len: Arc<AtomicUsize>,
}

impl<T> Deref for LockedCollection<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.guard
    }
}

impl<T> DerefMut for LockedCollection<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.guard
    }
}

impl<T> Drop for LockedCollection<T> {
    fn drop(&mut self) {
        // runs before `guard` is dropped, i.e. while the lock is still held
        self.len.store(self.guard.len(), Ordering::Release);
    }
}

/// All collections of one user, one per [`RecordKind`].
pub struct UserCollections {
    pub(crate) skulls: Collection<Skull>,
    pub(crate) quicks: Collection<Quick>,
    pub(crate) occurrences: Collection<Occurrence>,
}

impl UserCollections {
    fn load(config: &Config, user: &User) -> Result<Self> {
        Ok(UserCollections {
            skulls: Collection::new(load(&config.file_path(user, RecordKind::Skull))?),
            quicks: Collection::new(load(&config.file_path(user, RecordKind::Quick))?),
            occurrences: Collection::new(load(&config.file_path(user, RecordKind::Occurrence))?),
        })
    }

    /// blocks until no job holds any of these collections, locking them in the global order
    fn wait_idle(&self) {
        drop(self.skulls.lock());
        drop(self.quicks.lock());
        drop(self.occurrences.lock());
    }
}

/// The record store shared by every request handler.
///
/// Cloning is cheap and every clone refers to the same collections.
///
/// # Example
/// ```rust
/// use skull::{Config, Occurrence, Store, User};
/// # fn main() -> skull::Result<()> {
/// let store = Store::open(Config::new("/data"))?;
/// let alice = User::new("alice");
/// store.add(&alice, Occurrence::new(1, 2, 1.0, 1_000)?)?;
/// println!("{}", store.get::<Occurrence>(&alice));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    users: DashMap<User, Arc<UserCollections>>,
    persister: SharedQueueThreadPool,
}

impl Store {
    /// opens the store found under `config.root()`: every sub-directory is a user, and all
    /// of their collections are loaded before this returns.
    ///
    /// # Errors
    /// returns [`SkullError::Config`] if two record kinds share a file, an IO error if the
    /// root or a user's file could not be read, and [`SkullError::Pool`] if the persistence
    /// threads could not be started
    #[instrument(skip(config), fields(root = ?config.root()))]
    pub fn open(config: Config) -> Result<Store> {
        info!("opening skull store version {}", crate_version!());
        config.check()?;
        let users = DashMap::new();
        for user in scan_users(config.root())? {
            let collections = UserCollections::load(&config, &user)?;
            users.insert(user, Arc::new(collections));
        }
        info!("loaded {} users", users.len());

        let persister = SharedQueueThreadPool::bounded(
            "persist",
            config.persist_threads(),
            config.persist_queue(),
        )?;

        Ok(Store {
            inner: Arc::new(Inner {
                config,
                users,
                persister,
            }),
        })
    }

    /// the configuration this store was opened with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// returns `true` if `user` is not the unknown sentinel and has a directory in the store
    pub fn authorized(&self, user: &User) -> bool {
        !user.is_unknown() && self.inner.users.contains_key(user)
    }

    /// every registered user, sorted by name
    pub fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.inner.users.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// registers users whose directory was created after the store was opened and loads
    /// their collections. Users already known are left untouched.
    ///
    /// Returns the number of newly registered users.
    ///
    /// # Errors
    /// returns an IO error if the root or a new user's file could not be read
    pub fn discover(&self) -> Result<usize> {
        let mut added = 0;
        for user in scan_users(self.inner.config.root())? {
            if self.inner.users.contains_key(&user) {
                continue;
            }
            let collections = UserCollections::load(&self.inner.config, &user)?;
            if let Entry::Vacant(entry) = self.inner.users.entry(user) {
                info!("registered new user {}", entry.key());
                entry.insert(Arc::new(collections));
                added += 1;
            }
        }
        Ok(added)
    }

    /// renders `user`'s records of kind `T` as a JSON array. The collection is locked only
    /// while it is rendered. An unknown user or an empty collection renders as `[]`.
    pub fn get<T: Record>(&self, user: &User) -> String {
        match self.collections(user) {
            Some(collections) => {
                let records = T::collection(&collections).lock();
                to_json_array::<T>(&records)
            }
            None => "[]".to_string(),
        }
    }

    /// a cheap estimate of the size in bytes of [`Store::get`]'s output, read without
    /// locking. It only serves to choose between a buffered and a streamed response.
    pub fn estimate_size<T: Record>(&self, user: &User) -> usize {
        self.collections(user)
            .map(|collections| T::collection(&collections).len() * RECORD_WEIGHT)
            .unwrap_or(0)
    }

    /// writes the same JSON as [`Store::get`] into `sink`, chunk by chunk. The collection
    /// stays locked until the whole array has been written.
    ///
    /// # Errors
    /// returns any IO error raised by `sink`
    pub fn stream<T: Record, W: Write>(&self, user: &User, sink: &mut W) -> io::Result<()> {
        let chunk_bytes = self.inner.config.chunk_bytes();
        match self.collections(user) {
            Some(collections) => {
                let records = T::collection(&collections).lock();
                write_json_chunks::<T, W>(&records, sink, chunk_bytes)
            }
            None => write_json_chunks::<T, W>(&[], sink, chunk_bytes),
        }
    }

    /// appends `record` to `user`'s collection and schedules the collection to be saved
    ///
    /// # Errors
    /// returns [`SkullError::UnknownUser`] if `user` is not [authorized](Store::authorized)
    pub fn add<T: Record>(&self, user: &User, record: T) -> Result<()> {
        let collections = self.authorized_collections(user)?;
        let mut locked = T::collection(&collections).lock_owned();
        locked.push(record);
        debug!("{} added a {}, now {}", user, T::KIND, locked.len());
        self.save(user, locked);
        Ok(())
    }

    /// replaces the record at `position` and schedules the collection to be saved
    ///
    /// # Errors
    /// returns [`SkullError::UnknownUser`] if `user` is not [authorized](Store::authorized),
    /// [`SkullError::NotFound`] if `position` is out of bounds
    pub fn edit<T: Record>(&self, user: &User, record: T, position: usize) -> Result<()> {
        let collections = self.authorized_collections(user)?;
        let mut locked = T::collection(&collections).lock_owned();
        match locked.get_mut(position) {
            Some(slot) => *slot = record,
            None => return Err(out_of_bounds::<T>(position, locked.len())),
        }
        debug!("{} edited {} #{}", user, T::KIND, position);
        self.save(user, locked);
        Ok(())
    }

    /// removes the first record equal to `matcher`, using the equality rule of `T`, and
    /// schedules the collection to be saved
    ///
    /// # Errors
    /// returns [`SkullError::UnknownUser`] if `user` is not [authorized](Store::authorized),
    /// [`SkullError::NotFound`] if no record matches
    pub fn remove<T: Record>(&self, user: &User, matcher: &T) -> Result<()> {
        let collections = self.authorized_collections(user)?;
        let mut locked = T::collection(&collections).lock_owned();
        let position = locked
            .iter()
            .position(|record| record == matcher)
            .ok_or_else(|| SkullError::NotFound(format!("no {} matching {}", T::KIND, matcher.to_json())))?;
        locked.remove(position);
        debug!("{} removed {} #{}", user, T::KIND, position);
        self.save(user, locked);
        Ok(())
    }

    /// removes the record at `position` and schedules the collection to be saved
    ///
    /// # Errors
    /// returns [`SkullError::UnknownUser`] if `user` is not [authorized](Store::authorized),
    /// [`SkullError::NotFound`] if `position` is out of bounds
    pub fn remove_at<T: Record>(&self, user: &User, position: usize) -> Result<()> {
        let collections = self.authorized_collections(user)?;
        let mut locked = T::collection(&collections).lock_owned();
        if position >= locked.len() {
            return Err(out_of_bounds::<T>(position, locked.len()));
        }
        locked.remove(position);
        debug!("{} removed {} #{}", user, T::KIND, position);
        self.save(user, locked);
        Ok(())
    }

    /// schedules all of `user`'s collections to be replaced by the content of their files.
    ///
    /// The locks are taken here, in [`RecordKind::ALL`] order, and handed to a background
    /// job that reads the files. Returning `Ok` means the reload is scheduled, not done.
    ///
    /// # Errors
    /// returns [`SkullError::UnknownUser`] if `user` is not [authorized](Store::authorized)
    pub fn reload(&self, user: &User) -> Result<()> {
        let collections = self.authorized_collections(user)?;
        let skulls = collections.skulls.lock_owned();
        let quicks = collections.quicks.lock_owned();
        let occurrences = collections.occurrences.lock_owned();

        let config = &self.inner.config;
        let skull_path = config.file_path(user, RecordKind::Skull);
        let quick_path = config.file_path(user, RecordKind::Quick);
        let occurrence_path = config.file_path(user, RecordKind::Occurrence);

        let job = move || {
            load::reload_into(&skull_path, skulls);
            load::reload_into(&quick_path, quicks);
            load::reload_into(&occurrence_path, occurrences);
        };
        if let Err(e) = self.inner.persister.spawn(job) {
            error!("could not schedule the reload of {}: {}", user, e);
            return Err(e);
        }
        debug!("scheduled reload of {}", user);
        Ok(())
    }

    /// blocks until every save and reload scheduled before this call has finished
    pub fn sync(&self) {
        let all: Vec<Arc<UserCollections>> =
            self.inner.users.iter().map(|e| Arc::clone(e.value())).collect();
        for collections in all {
            collections.wait_idle();
        }
    }

    /// hands the locked collection over to a persistence thread
    fn save<T: Record>(&self, user: &User, locked: LockedCollection<T>) {
        let path: PathBuf = self.inner.config.file_path(user, T::KIND);
        if let Err(e) = self
            .inner
            .persister
            .spawn(move || persist::write_collection(path, locked))
        {
            // the job, and with it the lock, is dropped. Memory stays ahead of the disk.
            error!("could not schedule saving {}'s {} records: {}", user, T::KIND, e);
        }
    }

    fn collections(&self, user: &User) -> Option<Arc<UserCollections>> {
        if user.is_unknown() {
            return None;
        }
        self.inner.users.get(user).map(|entry| Arc::clone(entry.value()))
    }

    fn authorized_collections(&self, user: &User) -> Result<Arc<UserCollections>> {
        self.collections(user)
            .ok_or_else(|| SkullError::UnknownUser(user.name().to_string()))
    }
}

fn out_of_bounds<T: Record>(position: usize, len: usize) -> SkullError {
    SkullError::NotFound(format!("no {} at position {}, there are {}", T::KIND, position, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store_with(users: &[&str]) -> (TempDir, Store) {
        let root = TempDir::new().unwrap();
        for user in users {
            fs::create_dir(root.path().join(user)).unwrap();
        }
        let store = Store::open(Config::new(root.path())).unwrap();
        (root, store)
    }

    #[test]
    fn estimate_follows_record_count() {
        let (_root, store) = store_with(&["alice"]);
        let alice = User::new("alice");
        assert_eq!(store.estimate_size::<Quick>(&alice), 0);

        store.add(&alice, Quick::new(1, 1.0).unwrap()).unwrap();
        store.add(&alice, Quick::new(2, 1.0).unwrap()).unwrap();
        store.sync();
        assert_eq!(store.estimate_size::<Quick>(&alice), 2 * RECORD_WEIGHT);
        assert_eq!(store.estimate_size::<Skull>(&alice), 0);
        assert_eq!(store.estimate_size::<Quick>(&User::new("bob")), 0);
    }

    #[test]
    fn failed_edit_does_not_touch_the_disk() {
        let (root, store) = store_with(&["alice"]);
        let alice = User::new("alice");
        let result = store.edit(&alice, Quick::new(1, 1.0).unwrap(), 0);
        assert!(matches!(result, Err(SkullError::NotFound(_))));
        store.sync();
        assert!(!root.path().join("alice").join("quick.tsv").exists());
    }

    #[test]
    fn sentinel_is_never_authorized() {
        let (_root, store) = store_with(&["alice"]);
        assert!(store.authorized(&User::new("alice")));
        assert!(!store.authorized(&User::unknown()));
        assert!(matches!(
            store.add(&User::unknown(), Quick::new(1, 1.0).unwrap()),
            Err(SkullError::UnknownUser(_))
        ));
    }

    #[test]
    fn mutation_keeps_the_lock_until_its_write_is_done() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("alice")).unwrap();
        let store = Store::open(Config::new(root.path()).with_persist_threads(1)).unwrap();
        let alice = User::new("alice");
        let path = root.path().join("alice").join("quick.tsv");

        // occupy the only persistence thread
        let (release, blocked) = channel::bounded::<()>(0);
        store
            .inner
            .persister
            .spawn(move || {
                let _ = blocked.recv();
            })
            .unwrap();

        store.add(&alice, Quick::new(1, 2.0).unwrap()).unwrap();
        assert!(!path.exists());

        let (done_tx, done_rx) = channel::bounded(1);
        let reader = store.clone();
        let reader_user = alice.clone();
        let handle = thread::spawn(move || {
            done_tx.send(reader.get::<Quick>(&reader_user)).unwrap();
        });
        assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(!path.exists());

        release.send(()).unwrap();
        let json = done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(json, r#"[{"skull":1,"amount":2.0}]"#);
        handle.join().unwrap();

        // the reader only got the lock after the write released it
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\t2\n");
        store.sync();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\t2\n");
    }

    #[test]
    fn locked_collection_refreshes_count_on_release() {
        let collection = Collection::new(vec![Quick::new(1, 1.0).unwrap()]);
        {
            let mut locked = collection.lock_owned();
            locked.clear();
            assert_eq!(collection.len(), 1);
        }
        assert_eq!(collection.len(), 0);
    }
}
