use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use camino::Utf8Path;
use maxminddb::{MaxMindDbError, Mmap, Reader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::edition::Edition;
use crate::error::{Error, Result};

/// Country and region codes for one address.
///
/// Produced fresh by every lookup; nothing in this crate holds on to one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionResult {
    pub country_code: String,
    pub region: String,
}

impl RegionResult {
    pub fn new(country_code: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            region: region.into(),
        }
    }
}

/// How the database file is brought into memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Memory-map the file; pages are read from disk on demand.
    #[default]
    Standard,
    /// Read the whole file into memory up front.
    MemoryCache,
}

impl CacheMode {
    #[inline]
    pub fn from_flag(use_memory_cache: bool) -> Self {
        if use_memory_cache {
            CacheMode::MemoryCache
        } else {
            CacheMode::Standard
        }
    }
}

/// An open geo database.
///
/// Implementations are shared read-only between every in-flight lookup, so
/// they must tolerate concurrent reads. Dropping the value releases the
/// underlying resource.
pub trait GeoDatabase: Send + Sync + fmt::Debug {
    /// The edition tag of the open database.
    fn edition(&self) -> Edition;

    /// Look up the region record for a numeric IPv4 address.
    ///
    /// `Ok(None)` means the database has no record for the address.
    fn region_by_numeric_address(&self, ipnum: u32) -> Result<Option<RegionResult>>;
}

/// Subset of the GeoIP2 City layout needed for a region lookup.
#[derive(Deserialize)]
struct RegionRecord {
    #[serde(default)]
    country: Option<IsoCoded>,
    #[serde(default)]
    subdivisions: Option<Vec<IsoCoded>>,
}

#[derive(Deserialize)]
struct IsoCoded {
    #[serde(default)]
    iso_code: Option<String>,
}

impl RegionRecord {
    fn into_result(self) -> Option<RegionResult> {
        let country_code = self.country.and_then(|c| c.iso_code);
        // the most specific subdivision is last, the top-level region first
        let region = self
            .subdivisions
            .and_then(|subs| subs.into_iter().next())
            .and_then(|s| s.iso_code);

        if country_code.is_none() && region.is_none() {
            return None;
        }
        Some(RegionResult {
            country_code: country_code.unwrap_or_default(),
            region: region.unwrap_or_default(),
        })
    }
}

enum Source {
    Mapped(Reader<Mmap>),
    Cached(Reader<Vec<u8>>),
}

/// MaxMind DB backed implementation of [`GeoDatabase`].
pub struct MmdbDatabase {
    source: Source,
    edition: Edition,
}

impl fmt::Debug for MmdbDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.source {
            Source::Mapped(_) => CacheMode::Standard,
            Source::Cached(_) => CacheMode::MemoryCache,
        };
        f.debug_struct("MmdbDatabase")
            .field("mode", &mode)
            .field("edition", &self.edition)
            .finish()
    }
}

impl MmdbDatabase {
    /// Open a database file in the given mode.
    pub fn open(path: &Utf8Path, mode: CacheMode) -> Result<Self> {
        let cannot_open = |source: MaxMindDbError| Error::CannotOpenDatabase {
            path: path.to_owned(),
            source,
        };

        let source = match mode {
            // SAFETY: the mapping is only read, and database files are replaced
            // by rename during updates rather than rewritten in place.
            CacheMode::Standard => {
                Source::Mapped(unsafe { Reader::open_mmap(path) }.map_err(cannot_open)?)
            }
            CacheMode::MemoryCache => {
                Source::Cached(Reader::open_readfile(path).map_err(cannot_open)?)
            }
        };

        let database_type = match &source {
            Source::Mapped(r) => r.metadata.database_type.as_str(),
            Source::Cached(r) => r.metadata.database_type.as_str(),
        };
        let edition = Edition::from_database_type(database_type);
        debug!(%path, ?mode, database_type, %edition, "opened database");

        Ok(Self { source, edition })
    }
}

fn region_from<S: AsRef<[u8]>>(
    reader: &Reader<S>,
    ip: IpAddr,
) -> std::result::Result<Option<RegionResult>, MaxMindDbError> {
    let result = reader.lookup(ip)?;
    Ok(result
        .decode::<RegionRecord>()?
        .and_then(RegionRecord::into_result))
}

impl GeoDatabase for MmdbDatabase {
    fn edition(&self) -> Edition {
        self.edition
    }

    fn region_by_numeric_address(&self, ipnum: u32) -> Result<Option<RegionResult>> {
        let ip = IpAddr::V4(Ipv4Addr::from(ipnum));
        let found = match &self.source {
            Source::Mapped(r) => region_from(r, ip),
            Source::Cached(r) => region_from(r, ip),
        };
        found.map_err(|source| Error::LookupFailed {
            host: ip.to_string(),
            source,
        })
    }
}

/// In-memory range table implementing [`GeoDatabase`].
///
/// Useful for tests, benchmarks, and small static mappings.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    edition: Edition,
    // range start -> (inclusive range end, record)
    ranges: BTreeMap<u32, (u32, RegionResult)>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new(Edition::REGION_REV1)
    }
}

impl MemoryDatabase {
    pub fn new(edition: Edition) -> Self {
        Self {
            edition,
            ranges: BTreeMap::new(),
        }
    }

    /// Map every address in `start..=end` to the given codes.
    ///
    /// Ranges are expected not to overlap; a range starting at the same
    /// address as an existing one replaces it.
    pub fn insert_range(
        &mut self,
        start: Ipv4Addr,
        end: Ipv4Addr,
        country_code: &str,
        region: &str,
    ) -> &mut Self {
        let (start, end) = (u32::from(start), u32::from(end));
        self.ranges.insert(
            start.min(end),
            (start.max(end), RegionResult::new(country_code, region)),
        );
        self
    }

    /// Map a single address.
    pub fn insert(&mut self, addr: Ipv4Addr, country_code: &str, region: &str) -> &mut Self {
        self.insert_range(addr, addr, country_code, region)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl GeoDatabase for MemoryDatabase {
    fn edition(&self) -> Edition {
        self.edition
    }

    fn region_by_numeric_address(&self, ipnum: u32) -> Result<Option<RegionResult>> {
        Ok(self
            .ranges
            .range(..=ipnum)
            .next_back()
            .filter(|(_, (end, _))| ipnum <= *end)
            .map(|(_, (_, record))| record.clone()))
    }
}
