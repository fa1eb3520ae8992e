//! The georegion library: country and region lookups for IPv4 hosts.
//!
//! A [`Region`] wraps one open region-capable geo database. Lookups come in
//! two flavors: [`Region::lookup_sync`] blocks the caller, while
//! [`Region::lookup`] moves the work onto tokio's blocking pool and delivers
//! the result to a callback on the runtime.
//!
//! # Examples
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use georegion::{DatabaseHandle, Edition, MemoryDatabase, Region, RegionResult};
//!
//! let mut db = MemoryDatabase::new(Edition::REGION_REV1);
//! db.insert(Ipv4Addr::new(8, 8, 8, 8), "US", "CA");
//!
//! let region = Region::new(DatabaseHandle::from_database("memory", db)?);
//! assert_eq!(
//!     region.lookup_sync("8.8.8.8")?,
//!     Some(RegionResult::new("US", "CA"))
//! );
//! assert_eq!(region.lookup_sync("0.0.0.0")?, None);
//! # Ok::<(), georegion::Error>(())
//! ```

pub mod backend;
pub mod edition;
pub mod error;
pub mod handle;
pub mod input;
pub mod region;
pub mod resolve;
pub mod task;
pub mod unhandled;

pub use crate::backend::{CacheMode, GeoDatabase, MemoryDatabase, MmdbDatabase, RegionResult};
pub use crate::edition::Edition;
pub use crate::error::{Error, Result};
pub use crate::handle::{DatabaseHandle, HandlePin};
pub use crate::region::Region;
pub use crate::resolve::{AddressResolver, SystemResolver};
pub use crate::task::{Callback, LookupOptions, MAX_HOST_LEN};
