use std::fmt;

use serde::Serialize;

/// Integer tag identifying which kind of data a geo database carries.
///
/// The numbering follows the legacy GeoIP edition constants so that tags
/// reported by this crate line up with the ones operators already know.
/// Only [`Edition::REGION_REV0`] and [`Edition::REGION_REV1`] carry
/// sub-country region codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Edition(pub i32);

impl Edition {
    pub const UNKNOWN: Edition = Edition(0);
    pub const COUNTRY: Edition = Edition(1);
    pub const CITY_REV1: Edition = Edition(2);
    pub const REGION_REV1: Edition = Edition(3);
    pub const ISP: Edition = Edition(4);
    pub const ORG: Edition = Edition(5);
    pub const CITY_REV0: Edition = Edition(6);
    pub const REGION_REV0: Edition = Edition(7);
    pub const ASN: Edition = Edition(9);

    /// Map an MMDB `database_type` metadata string onto an edition tag.
    ///
    /// The free City database is treated as the first region revision and the
    /// commercial City/Enterprise databases as the second. Everything that is
    /// not recognized maps to [`Edition::UNKNOWN`].
    pub fn from_database_type(database_type: &str) -> Edition {
        match database_type {
            "GeoLite2-City" => Edition::REGION_REV0,
            "GeoIP2-Enterprise" => Edition::REGION_REV1,
            t if t.starts_with("GeoIP2-City") => Edition::REGION_REV1,
            t if t.ends_with("-Country") => Edition::COUNTRY,
            t if t.ends_with("-ASN") => Edition::ASN,
            "GeoIP2-ISP" => Edition::ISP,
            _ => Edition::UNKNOWN,
        }
    }

    /// True for the two region-capable editions.
    #[inline]
    pub fn is_region(self) -> bool {
        self == Edition::REGION_REV0 || self == Edition::REGION_REV1
    }

    pub fn name(self) -> &'static str {
        match self {
            Edition::COUNTRY => "country",
            Edition::CITY_REV1 => "city-rev1",
            Edition::REGION_REV1 => "region-rev1",
            Edition::ISP => "isp",
            Edition::ORG => "org",
            Edition::CITY_REV0 => "city-rev0",
            Edition::REGION_REV0 => "region-rev0",
            Edition::ASN => "asn",
            _ => "unknown",
        }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}
