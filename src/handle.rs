use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::backend::{CacheMode, GeoDatabase, MmdbDatabase};
use crate::edition::Edition;
use crate::error::{Error, Result};

/// Owns one open region-capable geo database.
///
/// The database is shared read-only by every lookup against the handle.
/// [`DatabaseHandle::close`] detaches it; the resource itself is released
/// once the last outstanding [`HandlePin`] is dropped.
pub struct DatabaseHandle {
    path: Utf8PathBuf,
    edition: Edition,
    db: RwLock<Option<Arc<dyn GeoDatabase>>>,
    in_flight: AtomicUsize,
}

impl fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("path", &self.path)
            .field("edition", &self.edition)
            .field("open", &self.is_open())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl DatabaseHandle {
    /// Open the MMDB file at `path` and check that it carries region data.
    pub fn open(path: impl AsRef<Utf8Path>, mode: CacheMode) -> Result<Self> {
        let path = path.as_ref();
        let db = MmdbDatabase::open(path, mode)?;
        Self::from_database(path, db)
    }

    /// Wrap an already open database, applying the same edition check as
    /// [`DatabaseHandle::open`].
    ///
    /// On rejection the database is dropped before the error is returned.
    pub fn from_database<D>(path: impl Into<Utf8PathBuf>, db: D) -> Result<Self>
    where
        D: GeoDatabase + 'static,
    {
        let path = path.into();
        let edition = db.edition();
        if !edition.is_region() {
            drop(db);
            debug!(%path, %edition, "released non-region database");
            return Err(Error::NotRegionDatabase { path, edition });
        }

        Ok(Self {
            path,
            edition,
            db: RwLock::new(Some(Arc::new(db))),
            in_flight: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn edition(&self) -> Edition {
        self.edition
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.db.read().is_some()
    }

    /// Number of asynchronous lookups currently holding a [`HandlePin`].
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// A shared reference to the open database.
    pub fn database(&self) -> Result<Arc<dyn GeoDatabase>> {
        self.db.read().as_ref().cloned().ok_or(Error::HandleClosed)
    }

    /// Take a pinning reference that keeps both the handle and its database
    /// alive until the returned [`HandlePin`] is dropped.
    pub fn pin(self: &Arc<Self>) -> Result<HandlePin> {
        let db = self.database()?;
        let pins = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(path = %self.path, pins, "pinned handle");
        Ok(HandlePin {
            handle: Arc::clone(self),
            db,
        })
    }

    /// Detach the database from this handle. Safe to call more than once.
    pub fn close(&self) {
        let Some(db) = self.db.write().take() else {
            return;
        };
        let pending = self.in_flight();
        if pending > 0 {
            debug!(
                path = %self.path,
                pending,
                "closed handle; database released after in-flight lookups finish"
            );
        } else {
            debug!(path = %self.path, "closed handle");
        }
        drop(db);
    }
}

/// Pinning reference held by one in-flight lookup.
pub struct HandlePin {
    handle: Arc<DatabaseHandle>,
    db: Arc<dyn GeoDatabase>,
}

impl HandlePin {
    pub fn database(&self) -> &dyn GeoDatabase {
        self.db.as_ref()
    }

    pub fn handle(&self) -> &DatabaseHandle {
        &self.handle
    }
}

impl fmt::Debug for HandlePin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlePin").field("path", &self.handle.path).finish()
    }
}

impl Drop for HandlePin {
    fn drop(&mut self) {
        let left = self.handle.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        trace!(path = %self.handle.path, pins = left, "released pin");
    }
}
