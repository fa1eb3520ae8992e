//! Writes small MaxMind DB (format 2.0) files for tests.
//!
//! Only what the region lookup needs is supported: an IPv4 search tree with
//! 24-bit records and City-layout data records.
#![allow(dead_code)]

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::Path;

const METADATA_MARKER: &[u8] = b"\xab\xcd\xefMaxMind.com";
const SEPARATOR_LEN: usize = 16;

/// A value in the MaxMind DB data section.
enum Value {
    Str(String),
    U16(u16),
    U32(u32),
    U64(u64),
    Map(Vec<(&'static str, Value)>),
    Array(Vec<Value>),
}

impl Value {
    fn str(s: &str) -> Self {
        Value::Str(s.to_string())
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Str(s) => {
                control(buf, 2, s.len());
                buf.extend_from_slice(s.as_bytes());
            }
            Value::U16(n) => uint(buf, 5, u64::from(*n)),
            Value::U32(n) => uint(buf, 6, u64::from(*n)),
            Value::U64(n) => uint(buf, 9, *n),
            Value::Map(pairs) => {
                control(buf, 7, pairs.len());
                for (key, value) in pairs {
                    Value::str(key).encode(buf);
                    value.encode(buf);
                }
            }
            Value::Array(items) => {
                control(buf, 11, items.len());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }
}

fn control(buf: &mut Vec<u8>, type_num: u8, size: usize) {
    let (first, extended) = if type_num <= 7 {
        (type_num << 5, None)
    } else {
        (0, Some(type_num - 7))
    };
    let (size_bits, extra): (u8, Vec<u8>) = match size {
        0..=28 => (size as u8, vec![]),
        29..=284 => (29, vec![(size - 29) as u8]),
        285..=65_820 => (30, ((size - 285) as u16).to_be_bytes().to_vec()),
        _ => (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec()),
    };
    buf.push(first | size_bits);
    buf.extend(extended);
    buf.extend(extra);
}

fn uint(buf: &mut Vec<u8>, type_num: u8, n: u64) {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    control(buf, type_num, bytes.len() - skip);
    buf.extend_from_slice(&bytes[skip..]);
}

#[derive(Clone, Copy)]
enum Record {
    Empty,
    Node(usize),
    Data(usize),
}

/// Builder for an IPv4-only MaxMind DB file.
pub struct MmdbWriter {
    database_type: String,
    nodes: Vec<[Record; 2]>,
    data: Vec<u8>,
}

impl MmdbWriter {
    pub fn new(database_type: &str) -> Self {
        Self {
            database_type: database_type.to_string(),
            nodes: vec![[Record::Empty; 2]],
            data: Vec::new(),
        }
    }

    /// Map `network/prefix` to a City-layout record.
    ///
    /// Networks must not overlap. An empty `region` leaves out `subdivisions`.
    pub fn insert(
        &mut self,
        network: Ipv4Addr,
        prefix: u8,
        country: &str,
        region: &str,
    ) -> &mut Self {
        assert!((1..=32).contains(&prefix), "prefix out of range: {prefix}");

        let mut record = vec![
            ("continent", Value::Map(vec![("code", Value::str("XX"))])),
            ("country", Value::Map(vec![("iso_code", Value::str(country))])),
        ];
        if !region.is_empty() {
            record.push((
                "subdivisions",
                Value::Array(vec![Value::Map(vec![("iso_code", Value::str(region))])]),
            ));
        }
        let offset = self.data.len();
        Value::Map(record).encode(&mut self.data);

        let bits = u32::from(network);
        let mut node = 0;
        for depth in 0..prefix {
            let bit = ((bits >> (31 - depth)) & 1) as usize;
            if depth + 1 == prefix {
                self.nodes[node][bit] = Record::Data(offset);
                break;
            }
            node = match self.nodes[node][bit] {
                Record::Node(next) => next,
                Record::Empty => {
                    self.nodes.push([Record::Empty; 2]);
                    let next = self.nodes.len() - 1;
                    self.nodes[node][bit] = Record::Node(next);
                    next
                }
                Record::Data(_) => panic!("network {network}/{prefix} overlaps an existing one"),
            };
        }
        self
    }

    fn to_bytes(&self) -> Vec<u8> {
        let node_count = self.nodes.len();
        let mut out = Vec::new();

        for pair in &self.nodes {
            for record in pair {
                let value = match *record {
                    Record::Empty => node_count,
                    Record::Node(next) => next,
                    Record::Data(offset) => node_count + SEPARATOR_LEN + offset,
                };
                assert!(value < (1 << 24), "record does not fit in 24 bits");
                out.extend_from_slice(&(value as u32).to_be_bytes()[1..]);
            }
        }
        out.extend_from_slice(&[0; SEPARATOR_LEN]);
        out.extend_from_slice(&self.data);

        out.extend_from_slice(METADATA_MARKER);
        Value::Map(vec![
            ("binary_format_major_version", Value::U16(2)),
            ("binary_format_minor_version", Value::U16(0)),
            ("build_epoch", Value::U64(1_700_000_000)),
            ("database_type", Value::str(&self.database_type)),
            (
                "description",
                Value::Map(vec![("en", Value::str("georegion test database"))]),
            ),
            ("ip_version", Value::U16(4)),
            ("languages", Value::Array(vec![Value::str("en")])),
            ("node_count", Value::U32(node_count as u32)),
            ("record_size", Value::U16(24)),
        ])
        .encode(&mut out);
        out
    }

    pub fn write_to(&self, path: &Path) {
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(&self.to_bytes()).unwrap();
    }
}

/// City-layout database with a few well-known networks.
pub fn city_database(database_type: &str) -> MmdbWriter {
    let mut db = MmdbWriter::new(database_type);
    db.insert(Ipv4Addr::new(8, 8, 8, 0), 24, "US", "CA")
        .insert(Ipv4Addr::new(81, 2, 69, 160), 27, "GB", "ENG")
        .insert(Ipv4Addr::new(89, 160, 20, 112), 28, "SE", "E")
        .insert(Ipv4Addr::new(67, 43, 156, 0), 24, "BT", "");
    db
}

/// Write `db` into a fresh temporary directory, returning both so the
/// directory outlives the test's use of the file.
pub fn write_temp(db: &MmdbWriter, file_name: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file_name);
    db.write_to(&path);
    (dir, path.to_str().unwrap().to_string())
}
