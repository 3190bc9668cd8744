use std::collections::BTreeMap;

use thiserror::Error;

/// Leading bytes of every device snapshot blob.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"NVIO";

/// Version of the container layout itself (not of any device payload).
pub const SNAPSHOT_FORMAT_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

const HEADER_LEN: usize = 4 + 4 + 4 + 4;
const FIELD_HEADER_LEN: usize = 2 + 4;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("unexpected end of snapshot data")]
    UnexpectedEof,

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported snapshot format version {0}")]
    UnsupportedFormatVersion(SnapshotVersion),

    #[error("snapshot belongs to device {found:?}, expected {expected:?}")]
    DeviceIdMismatch { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported device major version {found} (expected {expected})")]
    UnsupportedDeviceMajorVersion { expected: u16, found: u16 },

    #[error("duplicate field tag {0}")]
    DuplicateFieldTag(u16),

    #[error("invalid field encoding: {0}")]
    InvalidFieldEncoding(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub format_version: SnapshotVersion,
    pub device_id: [u8; 4],
    pub device_version: SnapshotVersion,
}

/// Builds a snapshot blob. Fields may be added in any order; [`SnapshotWriter::finish`] emits
/// them sorted by tag so equal device state always yields equal bytes.
pub struct SnapshotWriter {
    device_id: [u8; 4],
    device_version: SnapshotVersion,
    fields: Vec<(u16, Vec<u8>)>,
}

impl SnapshotWriter {
    pub fn new(device_id: [u8; 4], device_version: SnapshotVersion) -> Self {
        Self {
            device_id,
            device_version,
            fields: Vec::new(),
        }
    }

    pub fn field_bytes(&mut self, tag: u16, bytes: Vec<u8>) {
        debug_assert!(
            self.fields.iter().all(|(t, _)| *t != tag),
            "snapshot field tag {tag} written twice"
        );
        self.fields.push((tag, bytes));
    }

    pub fn field_u8(&mut self, tag: u16, v: u8) {
        self.field_bytes(tag, vec![v]);
    }

    pub fn field_u16(&mut self, tag: u16, v: u16) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_u32(&mut self, tag: u16, v: u32) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_u64(&mut self, tag: u16, v: u64) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_i64(&mut self, tag: u16, v: i64) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_bool(&mut self, tag: u16, v: bool) {
        self.field_u8(tag, u8::from(v));
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.fields.sort_by_key(|(tag, _)| *tag);

        let payload: usize = self
            .fields
            .iter()
            .map(|(_, data)| FIELD_HEADER_LEN + data.len())
            .sum();
        let mut out = Vec::with_capacity(HEADER_LEN + payload);

        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.major.to_le_bytes());
        out.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.minor.to_le_bytes());
        out.extend_from_slice(&self.device_id);
        out.extend_from_slice(&self.device_version.major.to_le_bytes());
        out.extend_from_slice(&self.device_version.minor.to_le_bytes());

        for (tag, data) in &self.fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
        out
    }
}

/// Parsed view over a snapshot blob.
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    header: SnapshotHeader,
    fields: BTreeMap<u16, &'a [u8]>,
}

fn read_u16(bytes: &[u8], at: usize) -> SnapshotResult<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(SnapshotError::UnexpectedEof)
}

fn read_u32(bytes: &[u8], at: usize) -> SnapshotResult<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(SnapshotError::UnexpectedEof)
}

fn read_id(bytes: &[u8], at: usize) -> SnapshotResult<[u8; 4]> {
    bytes
        .get(at..at + 4)
        .map(|b| [b[0], b[1], b[2], b[3]])
        .ok_or(SnapshotError::UnexpectedEof)
}

impl<'a> SnapshotReader<'a> {
    pub fn parse(bytes: &'a [u8], expected_device_id: [u8; 4]) -> SnapshotResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::UnexpectedEof);
        }
        if read_id(bytes, 0)? != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }

        let format_version = SnapshotVersion::new(read_u16(bytes, 4)?, read_u16(bytes, 6)?);
        if format_version.major != SNAPSHOT_FORMAT_VERSION.major {
            return Err(SnapshotError::UnsupportedFormatVersion(format_version));
        }

        let device_id = read_id(bytes, 8)?;
        if device_id != expected_device_id {
            return Err(SnapshotError::DeviceIdMismatch {
                expected: expected_device_id,
                found: device_id,
            });
        }
        let device_version = SnapshotVersion::new(read_u16(bytes, 12)?, read_u16(bytes, 14)?);

        let mut fields = BTreeMap::new();
        let mut pos = HEADER_LEN;
        while pos < bytes.len() {
            let tag = read_u16(bytes, pos)?;
            let len = read_u32(bytes, pos + 2)? as usize;
            let start = pos + FIELD_HEADER_LEN;
            let end = start.checked_add(len).ok_or(SnapshotError::UnexpectedEof)?;
            let data = bytes.get(start..end).ok_or(SnapshotError::UnexpectedEof)?;
            if fields.insert(tag, data).is_some() {
                return Err(SnapshotError::DuplicateFieldTag(tag));
            }
            pos = end;
        }

        Ok(Self {
            header: SnapshotHeader {
                format_version,
                device_id,
                device_version,
            },
            fields,
        })
    }

    pub fn header(&self) -> SnapshotHeader {
        self.header
    }

    pub fn ensure_device_major(&self, major: u16) -> SnapshotResult<()> {
        let found = self.header.device_version.major;
        if found != major {
            return Err(SnapshotError::UnsupportedDeviceMajorVersion {
                expected: major,
                found,
            });
        }
        Ok(())
    }

    pub fn iter_fields(&self) -> impl Iterator<Item = (u16, &'a [u8])> + '_ {
        self.fields.iter().map(|(tag, data)| (*tag, *data))
    }

    pub fn bytes(&self, tag: u16) -> Option<&'a [u8]> {
        self.fields.get(&tag).copied()
    }

    fn fixed<const N: usize>(
        &self,
        tag: u16,
        what: &'static str,
    ) -> SnapshotResult<Option<[u8; N]>> {
        match self.bytes(tag) {
            None => Ok(None),
            Some(data) => data
                .try_into()
                .map(Some)
                .map_err(|_| SnapshotError::InvalidFieldEncoding(what)),
        }
    }

    pub fn u8(&self, tag: u16) -> SnapshotResult<Option<u8>> {
        Ok(self.fixed::<1>(tag, "u8")?.map(|b| b[0]))
    }

    pub fn u16(&self, tag: u16) -> SnapshotResult<Option<u16>> {
        Ok(self.fixed::<2>(tag, "u16")?.map(u16::from_le_bytes))
    }

    pub fn u32(&self, tag: u16) -> SnapshotResult<Option<u32>> {
        Ok(self.fixed::<4>(tag, "u32")?.map(u32::from_le_bytes))
    }

    pub fn u64(&self, tag: u16) -> SnapshotResult<Option<u64>> {
        Ok(self.fixed::<8>(tag, "u64")?.map(u64::from_le_bytes))
    }

    pub fn i64(&self, tag: u16) -> SnapshotResult<Option<i64>> {
        Ok(self.fixed::<8>(tag, "i64")?.map(i64::from_le_bytes))
    }

    pub fn bool(&self, tag: u16) -> SnapshotResult<Option<bool>> {
        match self.u8(tag)? {
            None => Ok(None),
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            Some(_) => Err(SnapshotError::InvalidFieldEncoding("bool")),
        }
    }
}
