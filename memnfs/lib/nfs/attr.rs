//! fattr4 attribute encoding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use memfs::{Attributes, FileHandle, InodeKind, SetAttributes, SetTime};

use crate::xdr::{helpers, XdrDecode, XdrEncode};
use crate::{NfsError, NfsResult};

use super::NfsStat4;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

#[allow(missing_docs)]
pub mod bits {
    pub const SUPPORTED_ATTRS: u32 = 0;
    pub const TYPE: u32 = 1;
    pub const FH_EXPIRE_TYPE: u32 = 2;
    pub const CHANGE: u32 = 3;
    pub const SIZE: u32 = 4;
    pub const LINK_SUPPORT: u32 = 5;
    pub const SYMLINK_SUPPORT: u32 = 6;
    pub const NAMED_ATTR: u32 = 7;
    pub const FSID: u32 = 8;
    pub const UNIQUE_HANDLES: u32 = 9;
    pub const LEASE_TIME: u32 = 10;
    pub const RDATTR_ERROR: u32 = 11;
    pub const ACL: u32 = 12;
    pub const ACLSUPPORT: u32 = 13;
    pub const ARCHIVE: u32 = 14;
    pub const CANSETTIME: u32 = 15;
    pub const CASE_INSENSITIVE: u32 = 16;
    pub const CASE_PRESERVING: u32 = 17;
    pub const CHOWN_RESTRICTED: u32 = 18;
    pub const FILEHANDLE: u32 = 19;
    pub const FILEID: u32 = 20;
    pub const FILES_AVAIL: u32 = 21;
    pub const FILES_FREE: u32 = 22;
    pub const FILES_TOTAL: u32 = 23;
    pub const FS_LOCATIONS: u32 = 24;
    pub const HIDDEN: u32 = 25;
    pub const HOMOGENEOUS: u32 = 26;
    pub const MAXFILESIZE: u32 = 27;
    pub const MAXLINK: u32 = 28;
    pub const MAXNAME: u32 = 29;
    pub const MAXREAD: u32 = 30;
    pub const MAXWRITE: u32 = 31;
    pub const MIMETYPE: u32 = 32;
    pub const MODE: u32 = 33;
    pub const NO_TRUNC: u32 = 34;
    pub const NUMLINKS: u32 = 35;
    pub const OWNER: u32 = 36;
    pub const OWNER_GROUP: u32 = 37;
    pub const QUOTA_AVAIL_HARD: u32 = 38;
    pub const QUOTA_AVAIL_SOFT: u32 = 39;
    pub const QUOTA_USED: u32 = 40;
    pub const RAWDEV: u32 = 41;
    pub const SPACE_AVAIL: u32 = 42;
    pub const SPACE_FREE: u32 = 43;
    pub const SPACE_TOTAL: u32 = 44;
    pub const SPACE_USED: u32 = 45;
    pub const SYSTEM: u32 = 46;
    pub const TIME_ACCESS: u32 = 47;
    pub const TIME_ACCESS_SET: u32 = 48;
    pub const TIME_BACKUP: u32 = 49;
    pub const TIME_CREATE: u32 = 50;
    pub const TIME_DELTA: u32 = 51;
    pub const TIME_METADATA: u32 = 52;
    pub const TIME_MODIFY: u32 = 53;
    pub const TIME_MODIFY_SET: u32 = 54;
    pub const MOUNTED_ON_FILEID: u32 = 55;
}

/// Every attribute the server can report.
const SUPPORTED: &[u32] = &[
    bits::SUPPORTED_ATTRS,
    bits::TYPE,
    bits::FH_EXPIRE_TYPE,
    bits::CHANGE,
    bits::SIZE,
    bits::LINK_SUPPORT,
    bits::SYMLINK_SUPPORT,
    bits::NAMED_ATTR,
    bits::FSID,
    bits::UNIQUE_HANDLES,
    bits::LEASE_TIME,
    bits::RDATTR_ERROR,
    bits::ACLSUPPORT,
    bits::CANSETTIME,
    bits::CASE_INSENSITIVE,
    bits::CASE_PRESERVING,
    bits::CHOWN_RESTRICTED,
    bits::FILEHANDLE,
    bits::FILEID,
    bits::FILES_AVAIL,
    bits::FILES_FREE,
    bits::FILES_TOTAL,
    bits::HOMOGENEOUS,
    bits::MAXFILESIZE,
    bits::MAXLINK,
    bits::MAXNAME,
    bits::MAXREAD,
    bits::MAXWRITE,
    bits::MODE,
    bits::NO_TRUNC,
    bits::NUMLINKS,
    bits::OWNER,
    bits::OWNER_GROUP,
    bits::RAWDEV,
    bits::SPACE_AVAIL,
    bits::SPACE_FREE,
    bits::SPACE_TOTAL,
    bits::SPACE_USED,
    bits::TIME_ACCESS,
    bits::TIME_ACCESS_SET,
    bits::TIME_DELTA,
    bits::TIME_METADATA,
    bits::TIME_MODIFY,
    bits::TIME_MODIFY_SET,
    bits::MOUNTED_ON_FILEID,
];

/// Attributes a client may set.
const WRITABLE: &[u32] = &[
    bits::SIZE,
    bits::MODE,
    bits::OWNER,
    bits::OWNER_GROUP,
    bits::TIME_ACCESS_SET,
    bits::TIME_MODIFY_SET,
];

/// Largest bitmap accepted off the wire, in words.
const MAX_BITMAP_WORDS: usize = 8;

/// Largest attribute value block accepted off the wire.
const MAX_ATTR_VALUES: usize = 64 * 1024;

/// Largest owner string accepted in a SETATTR.
const MAX_OWNER_LEN: usize = 1024;

/// `fsid` reported for every object: the whole tree is a single file system.
const FSID: (u64, u64) = (0x6d65_6d6e_6673, 1);

/// `fh_expire_type` value for handles that stay valid while their object exists.
const FH4_PERSISTENT: u32 = 0;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A set of attribute numbers, sent as an array of 32-bit words.
///
/// Trailing zero words do not change the set, so two bitmaps compare equal whatever their
/// length on the wire.
#[derive(Debug, Clone, Default)]
pub struct Bitmap4(Vec<u32>);

/// Attribute values: a bitmap and the XDR-encoded values of the attributes it names, in
/// ascending attribute order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fattr4 {
    /// Attributes present
    pub mask: Bitmap4,
    /// Encoded values
    pub values: Bytes,
}

/// File system wide figures reported through the `files_*` and `space_*` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    /// Number of live inodes
    pub files_used: u64,
    /// Inodes the server is willing to hold
    pub files_total: u64,
    /// Bytes held by file content
    pub bytes_used: u64,
    /// Bytes the server is willing to hold
    pub bytes_total: u64,
}

/// Everything needed to encode the attributes of one object.
#[derive(Debug, Clone, Copy)]
pub struct AttrContext<'a> {
    /// Per-object attributes from the store
    pub attrs: &'a Attributes,
    /// Handle of the object
    pub handle: &'a FileHandle,
    /// File system wide figures
    pub stats: FsStats,
    /// Lease time in seconds
    pub lease_time: u32,
    /// Largest READ the server serves
    pub max_read: u64,
    /// Largest WRITE the server accepts
    pub max_write: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Bitmap4 {
    /// Creates an empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bitmap holding the given attribute numbers.
    pub fn from_bits(attrs: &[u32]) -> Self {
        let mut bitmap = Self::new();
        for attr in attrs {
            bitmap.insert(*attr);
        }
        bitmap
    }

    /// Returns `true` if `attr` is in the set.
    pub fn contains(&self, attr: u32) -> bool {
        self.0
            .get((attr / 32) as usize)
            .is_some_and(|word| word & (1 << (attr % 32)) != 0)
    }

    /// Adds `attr` to the set.
    pub fn insert(&mut self, attr: u32) {
        let word = (attr / 32) as usize;
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1 << (attr % 32);
    }

    /// Returns `true` if no attribute is in the set.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }

    /// Iterates the attribute numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().enumerate().flat_map(|(index, word)| {
            (0..32)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| index as u32 * 32 + bit)
        })
    }

    /// Returns the words up to the last non-zero one.
    fn significant(&self) -> &[u32] {
        let used = self
            .0
            .iter()
            .rposition(|word| *word != 0)
            .map_or(0, |last| last + 1);
        &self.0[..used]
    }

    /// Returns the attributes present in both sets.
    pub fn intersection(&self, other: &Bitmap4) -> Bitmap4 {
        Bitmap4(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| a & b)
                .collect(),
        )
    }

    /// Returns the attributes of this set missing from `other`.
    pub fn difference(&self, other: &Bitmap4) -> Bitmap4 {
        Bitmap4(
            self.0
                .iter()
                .enumerate()
                .map(|(i, word)| word & !other.0.get(i).copied().unwrap_or(0))
                .collect(),
        )
    }
}

impl Fattr4 {
    /// Returns the value of `attr` as a u64, when present and 8 bytes wide.
    ///
    /// Handy for reading `size`, `change` or `fileid` out of a reply.
    pub fn get_u64(&self, attr: u32) -> Option<u64> {
        self.value_offset(attr).and_then(|offset| {
            let mut values = self.values.slice(offset..);
            u64::decode(&mut values).ok()
        })
    }

    /// Returns the value of `attr` as a u32, when present and 4 bytes wide.
    pub fn get_u32(&self, attr: u32) -> Option<u32> {
        self.value_offset(attr).and_then(|offset| {
            let mut values = self.values.slice(offset..);
            u32::decode(&mut values).ok()
        })
    }

    /// Walks the values up to `attr`, skipping the ones before it.
    fn value_offset(&self, attr: u32) -> Option<usize> {
        if !self.mask.contains(attr) {
            return None;
        }

        let mut values = self.values.clone();
        for present in self.mask.iter() {
            if present == attr {
                return Some(self.values.len() - values.remaining());
            }
            skip_value(present, &mut values).ok()?;
        }
        None
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the set of attributes the server supports.
pub fn supported_attrs() -> Bitmap4 {
    Bitmap4::from_bits(SUPPORTED)
}

/// Encodes the requested attributes that are supported; unsupported requests are left out of
/// the returned mask.
pub fn encode_attrs(requested: &Bitmap4, ctx: &AttrContext<'_>) -> Fattr4 {
    let wanted = requested.intersection(&supported_attrs());
    let mut mask = Bitmap4::new();
    let mut values = BytesMut::new();

    for attr in wanted.iter() {
        if encode_attr(attr, ctx, &mut values) {
            mask.insert(attr);
        }
    }

    Fattr4 {
        mask,
        values: values.freeze(),
    }
}

fn encode_attr<B: BufMut>(attr: u32, ctx: &AttrContext<'_>, buf: &mut B) -> bool {
    let attrs = ctx.attrs;
    match attr {
        bits::SUPPORTED_ATTRS => supported_attrs().encode(buf),
        bits::TYPE => match attrs.get_kind() {
            InodeKind::File => 1u32.encode(buf),
            InodeKind::Directory => 2u32.encode(buf),
        },
        bits::FH_EXPIRE_TYPE => FH4_PERSISTENT.encode(buf),
        bits::CHANGE => attrs.get_change().encode(buf),
        bits::SIZE => attrs.get_size().encode(buf),
        bits::LINK_SUPPORT | bits::SYMLINK_SUPPORT | bits::NAMED_ATTR => false.encode(buf),
        bits::FSID => {
            FSID.0.encode(buf);
            FSID.1.encode(buf);
        }
        bits::UNIQUE_HANDLES => true.encode(buf),
        bits::LEASE_TIME => ctx.lease_time.encode(buf),
        bits::RDATTR_ERROR => NfsStat4::Ok.encode(buf),
        bits::ACLSUPPORT => 0u32.encode(buf),
        bits::CANSETTIME => true.encode(buf),
        bits::CASE_INSENSITIVE => false.encode(buf),
        bits::CASE_PRESERVING => true.encode(buf),
        bits::CHOWN_RESTRICTED => true.encode(buf),
        bits::FILEHANDLE => helpers::encode_opaque(ctx.handle.as_bytes(), buf),
        bits::FILEID | bits::MOUNTED_ON_FILEID => attrs.get_id().as_u64().encode(buf),
        bits::FILES_AVAIL | bits::FILES_FREE => ctx
            .stats
            .files_total
            .saturating_sub(ctx.stats.files_used)
            .encode(buf),
        bits::FILES_TOTAL => ctx.stats.files_total.encode(buf),
        bits::HOMOGENEOUS => true.encode(buf),
        bits::MAXFILESIZE => memfs::defaults::MAX_FILE_SIZE.encode(buf),
        bits::MAXLINK => 1u32.encode(buf),
        bits::MAXNAME => (memfs::MAX_NAME_LEN as u32).encode(buf),
        bits::MAXREAD => ctx.max_read.encode(buf),
        bits::MAXWRITE => ctx.max_write.encode(buf),
        bits::MODE => attrs.get_mode().encode(buf),
        bits::NO_TRUNC => true.encode(buf),
        bits::NUMLINKS => attrs.get_nlink().encode(buf),
        bits::OWNER => helpers::encode_string(&attrs.get_uid().to_string(), buf),
        bits::OWNER_GROUP => helpers::encode_string(&attrs.get_gid().to_string(), buf),
        bits::RAWDEV => {
            0u32.encode(buf);
            0u32.encode(buf);
        }
        bits::SPACE_AVAIL | bits::SPACE_FREE => ctx
            .stats
            .bytes_total
            .saturating_sub(ctx.stats.bytes_used)
            .encode(buf),
        bits::SPACE_TOTAL => ctx.stats.bytes_total.encode(buf),
        bits::SPACE_USED => attrs.get_space_used().encode(buf),
        bits::TIME_ACCESS => encode_time(attrs.get_accessed_at(), buf),
        bits::TIME_DELTA => {
            0i64.encode(buf);
            1u32.encode(buf);
        }
        bits::TIME_METADATA => encode_time(attrs.get_changed_at(), buf),
        bits::TIME_MODIFY => encode_time(attrs.get_modified_at(), buf),
        // Write-only attributes have no value to report.
        _ => return false,
    }
    true
}

/// Decodes the attributes of a SETATTR, OPEN or CREATE.
///
/// ## Returns
///
/// The changes to apply and the mask of attributes they cover.
///
/// ## Errors
///
/// * `NfsStat4::AttrNotSupp` - For an attribute the server does not know
/// * `NfsStat4::Inval` - For a read-only attribute or an invalid time
/// * `NfsStat4::BadOwner` - For an owner that is not a numeric id
/// * `NfsStat4::BadXdr` - For values that do not decode
pub fn decode_settable(fattr: &Fattr4) -> Result<(SetAttributes, Bitmap4), NfsStat4> {
    let mut changes = SetAttributes::default();
    let mut values = fattr.values.clone();

    for attr in fattr.mask.iter() {
        if !WRITABLE.contains(&attr) {
            return Err(if SUPPORTED.contains(&attr) {
                NfsStat4::Inval
            } else {
                NfsStat4::AttrNotSupp
            });
        }

        let bad_xdr = |_| NfsStat4::BadXdr;
        match attr {
            bits::SIZE => changes.size = Some(u64::decode(&mut values).map_err(bad_xdr)?),
            bits::MODE => changes.mode = Some(u32::decode(&mut values).map_err(bad_xdr)?),
            bits::OWNER => {
                let owner = helpers::decode_string(&mut values, MAX_OWNER_LEN).map_err(bad_xdr)?;
                changes.uid = Some(parse_owner(&owner)?);
            }
            bits::OWNER_GROUP => {
                let group = helpers::decode_string(&mut values, MAX_OWNER_LEN).map_err(bad_xdr)?;
                changes.gid = Some(parse_owner(&group)?);
            }
            bits::TIME_ACCESS_SET => changes.accessed_at = Some(decode_settime(&mut values)?),
            bits::TIME_MODIFY_SET => changes.modified_at = Some(decode_settime(&mut values)?),
            _ => return Err(NfsStat4::AttrNotSupp),
        }
    }

    Ok((changes, fattr.mask.clone()))
}

/// Accepts `1000` as well as `1000@domain`.
fn parse_owner(owner: &str) -> Result<u32, NfsStat4> {
    let id = owner.split_once('@').map_or(owner, |(id, _)| id);
    id.parse().map_err(|_| NfsStat4::BadOwner)
}

fn decode_settime(values: &mut Bytes) -> Result<SetTime, NfsStat4> {
    match u32::decode(values).map_err(|_| NfsStat4::BadXdr)? {
        0 => Ok(SetTime::ServerTime),
        1 => Ok(SetTime::ClientTime(decode_time(values)?)),
        _ => Err(NfsStat4::BadXdr),
    }
}

fn decode_time(values: &mut Bytes) -> Result<DateTime<Utc>, NfsStat4> {
    let seconds = i64::decode(values).map_err(|_| NfsStat4::BadXdr)?;
    let nseconds = u32::decode(values).map_err(|_| NfsStat4::BadXdr)?;
    if nseconds >= 1_000_000_000 {
        return Err(NfsStat4::Inval);
    }
    DateTime::from_timestamp(seconds, nseconds).ok_or(NfsStat4::Inval)
}

fn encode_time<B: BufMut>(time: &DateTime<Utc>, buf: &mut B) {
    time.timestamp().encode(buf);
    time.timestamp_subsec_nanos().encode(buf);
}

/// Skips one encoded value of `attr`.
fn skip_value(attr: u32, values: &mut Bytes) -> NfsResult<()> {
    let fixed = match attr {
        bits::SUPPORTED_ATTRS => {
            Bitmap4::decode(values)?;
            return Ok(());
        }
        bits::FILEHANDLE | bits::OWNER | bits::OWNER_GROUP => {
            helpers::decode_opaque(values, MAX_ATTR_VALUES)?;
            return Ok(());
        }
        bits::TIME_ACCESS_SET | bits::TIME_MODIFY_SET => {
            if u32::decode(values)? == 1 {
                12
            } else {
                0
            }
        }
        bits::TYPE
        | bits::FH_EXPIRE_TYPE
        | bits::LINK_SUPPORT
        | bits::SYMLINK_SUPPORT
        | bits::NAMED_ATTR
        | bits::UNIQUE_HANDLES
        | bits::LEASE_TIME
        | bits::RDATTR_ERROR
        | bits::ACLSUPPORT
        | bits::CANSETTIME
        | bits::CASE_INSENSITIVE
        | bits::CASE_PRESERVING
        | bits::CHOWN_RESTRICTED
        | bits::HOMOGENEOUS
        | bits::MAXLINK
        | bits::MAXNAME
        | bits::MODE
        | bits::NO_TRUNC
        | bits::NUMLINKS => 4,
        bits::FSID | bits::RAWDEV => 16,
        bits::TIME_ACCESS | bits::TIME_DELTA | bits::TIME_METADATA | bits::TIME_MODIFY => 12,
        bits::CHANGE
        | bits::SIZE
        | bits::FILEID
        | bits::FILES_AVAIL
        | bits::FILES_FREE
        | bits::FILES_TOTAL
        | bits::MAXFILESIZE
        | bits::MAXREAD
        | bits::MAXWRITE
        | bits::SPACE_AVAIL
        | bits::SPACE_FREE
        | bits::SPACE_TOTAL
        | bits::SPACE_USED
        | bits::MOUNTED_ON_FILEID => 8,
        other => return Err(NfsError::Xdr(format!("cannot skip attribute {other}"))),
    };

    helpers::ensure(values, fixed)?;
    values.advance(fixed);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for Bitmap4 {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for Bitmap4 {}

impl XdrEncode for Bitmap4 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        helpers::encode_array(self.significant(), buf);
    }
}

impl XdrDecode for Bitmap4 {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        Ok(Bitmap4(helpers::decode_array(buf, MAX_BITMAP_WORDS)?))
    }
}

impl XdrEncode for Fattr4 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.mask.encode(buf);
        helpers::encode_opaque(&self.values, buf);
    }
}

impl XdrDecode for Fattr4 {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        Ok(Fattr4 {
            mask: Bitmap4::decode(buf)?,
            values: helpers::decode_opaque(buf, MAX_ATTR_VALUES)?,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
