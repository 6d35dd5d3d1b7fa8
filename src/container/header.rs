use std::{collections::BTreeMap, fmt, sync::Arc};

use derive_more::{Deref, Display, From, Into};
use itertools::Itertools;
use rustc_hash::FxHashMap as HashMap;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, MapAccess, Visitor},
};

use super::error::FormatError;
use crate::num::DataType;

/// Key of the free-form string map a header may carry besides tensor entries.
pub const METADATA_KEY: &str = "__metadata__";

/// Dimensions of a tensor, outermost first.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deref, From, Into, Display, Serialize)]
#[display("[{}]", _0.iter().format(", "))]
pub struct Shape(Arc<[usize]>);

impl From<Vec<usize>> for Shape {
    #[inline]
    fn from(value: Vec<usize>) -> Self {
        Self(value.into())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    #[inline]
    fn from(value: [usize; N]) -> Self {
        Self(value.into())
    }
}

impl Shape {
    /// Number of elements, or `None` if the product overflows.
    /// A scalar (empty shape) has one element.
    #[inline]
    pub fn element_count(&self) -> Option<usize> {
        self.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }
}

/// Metadata of one stored tensor. Offsets are relative to the payload base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorDescriptor {
    name: String,
    #[serde(rename = "dtype")]
    r#type: DataType,
    shape: Shape,
    data_offsets: (u64, u64),
}

impl TensorDescriptor {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.r#type
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The `[start, end)` byte range within the payload.
    #[inline]
    pub fn data_offsets(&self) -> (u64, u64) {
        self.data_offsets
    }

    #[inline]
    pub fn data_size(&self) -> u64 {
        self.data_offsets.1 - self.data_offsets.0
    }
}

/// Tensor entry as written in the header, before validation.
#[derive(Debug, Deserialize)]
struct RawEntry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [u64; 2],
}

#[derive(Debug, Default)]
struct RawHeader {
    metadata: Option<BTreeMap<String, String>>,
    entries: Vec<(String, RawEntry)>,
}

struct RawHeaderVisitor;

impl<'de> Visitor<'de> for RawHeaderVisitor {
    type Value = RawHeader;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from tensor names to tensor entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut header = RawHeader::default();
        while let Some(key) = map.next_key::<String>()? {
            if key == METADATA_KEY {
                if header.metadata.is_some() {
                    return Err(de::Error::duplicate_field(METADATA_KEY));
                }
                header.metadata = Some(map.next_value()?);
                continue;
            }
            // duplicates are kept here and rejected while building the table
            let entry = map.next_value()?;
            header.entries.push((key, entry));
        }
        Ok(header)
    }
}

impl<'de> Deserialize<'de> for RawHeader {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RawHeaderVisitor)
    }
}

/// Validated tensor descriptors in header order.
#[derive(Debug, Default, Clone)]
pub struct HeaderTable {
    descriptors: Vec<TensorDescriptor>,
    index: HashMap<String, usize>,
    metadata: BTreeMap<String, String>,
}

impl HeaderTable {
    /// Decodes the JSON header and checks every descriptor against a payload of `payload_size` bytes.
    /// With `contiguous`, the tensors must also cover the payload without gaps.
    pub fn parse(header: &[u8], payload_size: u64, contiguous: bool) -> Result<Self, FormatError> {
        let header = std::str::from_utf8(header)?;
        let RawHeader { metadata, entries } = serde_json::from_str(header)?;

        let mut table = Self {
            descriptors: Vec::with_capacity(entries.len()),
            index: HashMap::default(),
            metadata: metadata.unwrap_or_default(),
        };
        for (name, entry) in entries {
            let descriptor = validate_entry(name, entry, payload_size)?;
            if table.index.contains_key(&descriptor.name) {
                return Err(FormatError::Duplicate(descriptor.name));
            }
            table
                .index
                .insert(descriptor.name.clone(), table.descriptors.len());
            table.descriptors.push(descriptor);
        }
        table.check_layout(payload_size, contiguous)?;
        Ok(table)
    }

    /// Checks that no two non-empty ranges overlap, and optionally that there are no gaps.
    fn check_layout(&self, payload_size: u64, contiguous: bool) -> Result<(), FormatError> {
        let sorted = self
            .descriptors
            .iter()
            .filter(|descriptor| descriptor.data_size() > 0)
            .sorted_by_key(|descriptor| descriptor.data_offsets)
            .collect_vec();

        for (prev, next) in sorted.iter().tuple_windows() {
            if next.data_offsets.0 < prev.data_offsets.1 {
                return Err(FormatError::Overlap(prev.name.clone(), next.name.clone()));
            }
        }
        if contiguous {
            let mut cursor = 0;
            for descriptor in &sorted {
                let (start, end) = descriptor.data_offsets;
                if start != cursor {
                    return Err(FormatError::Gap(cursor, start));
                }
                cursor = end;
            }
            if cursor != payload_size {
                return Err(FormatError::Gap(cursor, payload_size));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&TensorDescriptor> {
        self.index.get(name).map(|&index| &self.descriptors[index])
    }

    /// Descriptors in header order.
    #[inline]
    pub fn descriptors(&self) -> &[TensorDescriptor] {
        &self.descriptors
    }

    /// The free-form `__metadata__` map; empty if the header has none.
    #[inline]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

fn validate_entry(
    name: String,
    entry: RawEntry,
    payload_size: u64,
) -> Result<TensorDescriptor, FormatError> {
    let RawEntry {
        dtype,
        shape,
        data_offsets: [start, end],
    } = entry;

    let r#type = match dtype.parse::<DataType>() {
        Ok(r#type) => r#type,
        Err(_) => return Err(FormatError::DataType(name, dtype)),
    };
    if start > end {
        return Err(FormatError::Offsets(name, start, end));
    }
    if end > payload_size {
        return Err(FormatError::Bounds(name, start, end, payload_size));
    }

    let shape = Shape::from(shape);
    let expected = shape
        .element_count()
        .and_then(|count| count.checked_mul(r#type.size()))
        .and_then(|size| u64::try_from(size).ok());
    let Some(expected) = expected else {
        return Err(FormatError::Overflow(name, shape));
    };
    let found = end - start;
    if expected != found {
        return Err(FormatError::Size {
            name,
            shape,
            data_type: r#type,
            expected,
            found,
        });
    }

    Ok(TensorDescriptor {
        name,
        r#type,
        shape,
        data_offsets: (start, end),
    })
}

#[cfg(test)]
mod tests {
    use super::{HeaderTable, Shape};
    use crate::{container::error::FormatError, num::DataType};

    fn parse(header: &str, payload_size: u64) -> Result<HeaderTable, FormatError> {
        HeaderTable::parse(header.as_bytes(), payload_size, false)
    }

    #[test]
    fn test_parse_in_header_order() -> Result<(), FormatError> {
        let header = r#"{
            "z": {"dtype": "F32", "shape": [2, 3], "data_offsets": [8, 32]},
            "__metadata__": {"format": "pt"},
            "a": {"dtype": "I64", "shape": [], "data_offsets": [0, 8]}
        }"#;
        let table = parse(header, 32)?;
        let names: Vec<_> = table.descriptors().iter().map(|d| d.name()).collect();
        assert_eq!(names, ["z", "a"]);

        let z = table.get("z").unwrap();
        assert_eq!(z.data_type(), DataType::F32);
        assert_eq!(z.shape(), &Shape::from([2, 3]));
        assert_eq!(z.data_offsets(), (8, 32));
        assert_eq!(z.data_size(), 24);
        assert_eq!(table.metadata()["format"], "pt");
        assert!(table.get(super::METADATA_KEY).is_none());
        Ok(())
    }

    #[test]
    fn test_reject_duplicate() {
        let header = r#"{
            "w": {"dtype": "U8", "shape": [1], "data_offsets": [0, 1]},
            "w": {"dtype": "U8", "shape": [1], "data_offsets": [1, 2]}
        }"#;
        assert!(matches!(parse(header, 2), Err(FormatError::Duplicate(name)) if name == "w"));
    }

    #[test]
    fn test_reject_unknown_type() {
        let header = r#"{"w": {"dtype": "F128", "shape": [1], "data_offsets": [0, 16]}}"#;
        assert!(matches!(
            parse(header, 16),
            Err(FormatError::DataType(name, tag)) if name == "w" && tag == "F128"
        ));
    }

    #[test]
    fn test_reject_bad_ranges() {
        let inverted = r#"{"w": {"dtype": "U8", "shape": [0], "data_offsets": [4, 2]}}"#;
        assert!(matches!(parse(inverted, 8), Err(FormatError::Offsets(..))));

        let bounds = r#"{"w": {"dtype": "U8", "shape": [4], "data_offsets": [6, 10]}}"#;
        assert!(matches!(parse(bounds, 8), Err(FormatError::Bounds(_, 6, 10, 8))));

        let overlap = r#"{
            "a": {"dtype": "F32", "shape": [2], "data_offsets": [0, 8]},
            "b": {"dtype": "F32", "shape": [2], "data_offsets": [4, 12]}
        }"#;
        assert!(matches!(parse(overlap, 12), Err(FormatError::Overlap(a, b)) if a == "a" && b == "b"));

        let size = r#"{"w": {"dtype": "F16", "shape": [3], "data_offsets": [0, 4]}}"#;
        assert!(matches!(
            parse(size, 4),
            Err(FormatError::Size { expected: 6, found: 4, .. })
        ));

        let overflow = format!(
            r#"{{"w": {{"dtype": "U8", "shape": [{0}, {0}], "data_offsets": [0, 0]}}}}"#,
            u64::MAX
        );
        assert!(matches!(parse(&overflow, 0), Err(FormatError::Overflow(..))));
    }

    #[test]
    fn test_empty_tensors_never_overlap() -> Result<(), FormatError> {
        let header = r#"{
            "a": {"dtype": "F32", "shape": [2], "data_offsets": [0, 8]},
            "empty": {"dtype": "F32", "shape": [0, 4], "data_offsets": [4, 4]}
        }"#;
        let table = parse(header, 8)?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("empty").unwrap().data_size(), 0);
        Ok(())
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse("{", 0), Err(FormatError::Json(_))));
        assert!(matches!(parse("[1, 2]", 0), Err(FormatError::Json(_))));
        let negative = r#"{"w": {"dtype": "U8", "shape": [-1], "data_offsets": [0, 1]}}"#;
        assert!(matches!(parse(negative, 1), Err(FormatError::Json(_))));
        let short = r#"{"w": {"dtype": "U8", "shape": [1], "data_offsets": [0]}}"#;
        assert!(matches!(parse(short, 1), Err(FormatError::Json(_))));
        assert!(matches!(
            HeaderTable::parse(&[b'{', 0xff, b'}'], 0, false),
            Err(FormatError::Utf8(_))
        ));
    }

    #[test]
    fn test_contiguous() {
        let header = r#"{
            "a": {"dtype": "U8", "shape": [2], "data_offsets": [0, 2]},
            "b": {"dtype": "U8", "shape": [2], "data_offsets": [4, 6]}
        }"#;
        assert!(HeaderTable::parse(header.as_bytes(), 6, false).is_ok());
        assert!(matches!(
            HeaderTable::parse(header.as_bytes(), 6, true),
            Err(FormatError::Gap(2, 4))
        ));
        assert!(matches!(
            HeaderTable::parse(header.as_bytes(), 8, true),
            Err(FormatError::Gap(2, 4))
        ));

        let tight = r#"{
            "a": {"dtype": "U8", "shape": [2], "data_offsets": [0, 2]},
            "b": {"dtype": "U8", "shape": [2], "data_offsets": [2, 4]}
        }"#;
        assert!(HeaderTable::parse(tight.as_bytes(), 4, true).is_ok());
        assert!(matches!(
            HeaderTable::parse(tight.as_bytes(), 6, true),
            Err(FormatError::Gap(4, 6))
        ));
    }
}
