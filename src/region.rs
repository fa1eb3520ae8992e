use std::sync::Arc;

use camino::Utf8Path;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, trace};

use crate::backend::{CacheMode, RegionResult};
use crate::edition::Edition;
use crate::error::{Error, Result};
use crate::handle::DatabaseHandle;
use crate::resolve::{AddressResolver, SystemResolver};
use crate::task::{Callback, LookupOptions, LookupTask};

/// Region lookups against one open database.
///
/// Cloning is cheap and every clone shares the same [`DatabaseHandle`], so
/// closing through one clone closes it for all of them.
///
/// ```rust,no_run
/// # async fn demo() -> georegion::Result<()> {
/// let region = georegion::Region::open("/usr/share/GeoIP/GeoLite2-City.mmdb", true)?;
///
/// if let Some(found) = region.lookup_sync("8.8.8.8")? {
///     println!("{} {}", found.country_code, found.region);
/// }
///
/// region.lookup("8.8.8.8", |found| println!("{found:?}"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Region {
    handle: Arc<DatabaseHandle>,
    resolver: Arc<dyn AddressResolver>,
    options: LookupOptions,
}

impl Region {
    /// Open a region database, memory-cached or disk-backed.
    pub fn open(path: impl AsRef<Utf8Path>, use_memory_cache: bool) -> Result<Self> {
        let handle = DatabaseHandle::open(path, CacheMode::from_flag(use_memory_cache))?;
        Ok(Self::new(handle))
    }

    pub fn new(handle: DatabaseHandle) -> Self {
        Self {
            handle: Arc::new(handle),
            resolver: Arc::new(SystemResolver),
            options: LookupOptions::default(),
        }
    }

    pub fn with_resolver<R>(mut self, resolver: R) -> Self
    where
        R: AddressResolver + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_options(mut self, options: LookupOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn edition(&self) -> Edition {
        self.handle.edition()
    }

    pub fn handle(&self) -> &Arc<DatabaseHandle> {
        &self.handle
    }

    pub fn options(&self) -> LookupOptions {
        self.options
    }

    /// Blocking lookup on the caller's thread.
    ///
    /// An unresolvable host is `Ok(None)`. A resolvable host without a region
    /// record is [`Error::NoMatchFound`].
    pub fn lookup_sync(&self, host: &str) -> Result<Option<RegionResult>> {
        let db = self.handle.database()?;
        let ipnum = self.resolver.resolve(host);
        if ipnum == 0 {
            trace!(host, "unresolvable host");
            return Ok(None);
        }

        match db.region_by_numeric_address(ipnum)? {
            Some(found) => Ok(Some(found)),
            None => Err(Error::NoMatchFound {
                host: host.to_string(),
            }),
        }
    }

    /// Schedule a lookup on the blocking pool and return immediately.
    ///
    /// `callback` runs exactly once on the runtime once the lookup finishes.
    /// It receives `None` both for unresolvable hosts and for hosts the
    /// database has no record for. Must be called from within a tokio
    /// runtime.
    pub fn lookup<F>(&self, host: &str, callback: F) -> Result<()>
    where
        F: FnOnce(Option<RegionResult>) + Send + 'static,
    {
        self.lookup_boxed(host, Some(Box::new(callback)))
    }

    /// Like [`Region::lookup`], for callers whose callback may be absent.
    pub fn lookup_boxed(&self, host: &str, callback: Option<Callback>) -> Result<()> {
        let callback = callback.ok_or(Error::MissingCallback)?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let pin = self.handle.pin()?;

        let task = LookupTask::new(
            pin,
            Arc::clone(&self.resolver),
            host,
            self.options,
            callback,
        )
        .enqueued();
        let host = task.host().to_string();

        let background = runtime.spawn_blocking(move || task.run());
        runtime.spawn(async move {
            match background.await {
                Ok(task) => task.deliver(),
                // the task, its pin and its callback went down with the pool
                Err(err) => error!(%host, error = %err, "lookup task lost before completion"),
            }
        });
        Ok(())
    }

    /// Await a lookup instead of passing a callback.
    ///
    /// Same outcome policy as [`Region::lookup`].
    pub async fn lookup_async(&self, host: &str) -> Result<Option<RegionResult>> {
        let (tx, rx) = oneshot::channel();
        self.lookup(host, move |found| {
            let _ = tx.send(found);
        })?;
        Ok(rx.await.unwrap_or(None))
    }

    /// Close the underlying handle. Lookups issued afterwards fail with
    /// [`Error::HandleClosed`]; lookups already in flight finish normally.
    pub fn close(&self) {
        self.handle.close();
    }
}
