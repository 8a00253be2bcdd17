//! NFSv4.0 protocol types, RFC 7530

mod attr;
mod ops;

use bytes::{Buf, BufMut};
use memfs::FsError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::xdr::{helpers, XdrDecode, XdrEncode};
use crate::NfsResult;

pub use attr::*;
pub use ops::*;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Maximum size of a file handle on the wire.
pub const NFS4_FHSIZE: usize = 128;

/// Maximum length of an opaque owner or client id.
pub const NFS4_OPAQUE_LIMIT: usize = 1024;

/// Maximum length of a component name accepted off the wire. Longer names are rejected by the
/// store with `NFS4ERR_NAMETOOLONG` rather than at decode time.
pub const MAX_COMPONENT_LEN: usize = 4096;

/// Maximum length of a compound tag.
pub const MAX_TAG_LEN: usize = 1024;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// NFS version 4 operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum NfsOpcode {
    /// Check access rights
    Access = 3,
    /// Close file
    Close = 4,
    /// Commit cached data
    Commit = 5,
    /// Create a non-regular file object
    Create = 6,
    /// Purge delegations awaiting recovery
    DelegPurge = 7,
    /// Return delegation
    DelegReturn = 8,
    /// Get attributes
    GetAttr = 9,
    /// Get current filehandle
    GetFh = 10,
    /// Create link to an object
    Link = 11,
    /// Create lock
    Lock = 12,
    /// Test for lock
    LockT = 13,
    /// Unlock file
    LockU = 14,
    /// Look up filename
    Lookup = 15,
    /// Look up parent directory
    LookupP = 16,
    /// Verify difference in attributes
    NVerify = 17,
    /// Open a regular file
    Open = 18,
    /// Open named attribute directory
    OpenAttr = 19,
    /// Confirm open
    OpenConfirm = 20,
    /// Reduce open file access
    OpenDowngrade = 21,
    /// Set current filehandle
    PutFh = 22,
    /// Set public filehandle
    PutPubFh = 23,
    /// Set root filehandle
    PutRootFh = 24,
    /// Read from file
    Read = 25,
    /// Read directory
    ReadDir = 26,
    /// Read symbolic link
    ReadLink = 27,
    /// Remove file system object
    Remove = 28,
    /// Rename directory entry
    Rename = 29,
    /// Renew a lease
    Renew = 30,
    /// Restore saved filehandle
    RestoreFh = 31,
    /// Save current filehandle
    SaveFh = 32,
    /// Obtain available security
    SecInfo = 33,
    /// Set attributes
    SetAttr = 34,
    /// Negotiate client ID
    SetClientId = 35,
    /// Confirm client ID
    SetClientIdConfirm = 36,
    /// Verify same attributes
    Verify = 37,
    /// Write to file
    Write = 38,
    /// Release lock-owner state
    ReleaseLockOwner = 39,
    /// Illegal operation
    Illegal = 10044,
}

/// NFSv4 status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum NfsStat4 {
    Ok = 0,
    Perm = 1,
    NoEnt = 2,
    Io = 5,
    NxIo = 6,
    Access = 13,
    Exist = 17,
    XDev = 18,
    NotDir = 20,
    IsDir = 21,
    Inval = 22,
    FBig = 27,
    NoSpc = 28,
    RoFs = 30,
    MLink = 31,
    NameTooLong = 63,
    NotEmpty = 66,
    DQuot = 69,
    Stale = 70,
    BadHandle = 10001,
    BadCookie = 10003,
    NotSupp = 10004,
    TooSmall = 10005,
    ServerFault = 10006,
    BadType = 10007,
    Delay = 10008,
    Same = 10009,
    Denied = 10010,
    Expired = 10011,
    Locked = 10012,
    Grace = 10013,
    FhExpired = 10014,
    ShareDenied = 10015,
    WrongSec = 10016,
    ClidInUse = 10017,
    Resource = 10018,
    Moved = 10019,
    NoFileHandle = 10020,
    MinorVersMismatch = 10021,
    StaleClientId = 10022,
    StaleStateId = 10023,
    OldStateId = 10024,
    BadStateId = 10025,
    BadSeqId = 10026,
    NotSame = 10027,
    LockRange = 10028,
    SymLink = 10029,
    RestoreFh = 10030,
    LeaseMoved = 10031,
    AttrNotSupp = 10032,
    NoGrace = 10033,
    ReclaimBad = 10034,
    ReclaimConflict = 10035,
    BadXdr = 10036,
    LocksHeld = 10037,
    OpenMode = 10038,
    BadOwner = 10039,
    BadChar = 10040,
    BadName = 10041,
    BadRange = 10042,
    LockNotSupp = 10043,
    OpIllegal = 10044,
    Deadlock = 10045,
    FileOpen = 10046,
    AdminRevoked = 10047,
    CbPathDown = 10048,
}

/// Identifies open state: a sequence number and 12 opaque bytes chosen by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Stateid4 {
    /// Bumped on every change of the state
    pub seqid: u32,
    /// Server-chosen identifier
    pub other: [u8; 12],
}

/// Directory change counters reported by operations that modify a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeInfo4 {
    /// Whether `before` and `after` were sampled atomically with the change
    pub atomic: bool,
    /// Change attribute before the operation
    pub before: u64,
    /// Change attribute after the operation
    pub after: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Stateid4 {
    /// The anonymous stateid, all zeros.
    pub const ANONYMOUS: Stateid4 = Stateid4 {
        seqid: 0,
        other: [0; 12],
    };

    /// The READ bypass stateid, all ones.
    pub const BYPASS: Stateid4 = Stateid4 {
        seqid: u32::MAX,
        other: [0xff; 12],
    };

    /// Returns `true` for the two special stateids that name no open state.
    pub fn is_special(&self) -> bool {
        *self == Self::ANONYMOUS || *self == Self::BYPASS
    }
}

impl From<memfs::DirChange> for ChangeInfo4 {
    fn from(change: memfs::DirChange) -> Self {
        Self {
            atomic: true,
            before: change.get_before(),
            after: change.get_after(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<FsError> for NfsStat4 {
    fn from(error: FsError) -> Self {
        match error {
            FsError::NotFound(_) => NfsStat4::NoEnt,
            FsError::AlreadyExists(_) => NfsStat4::Exist,
            FsError::NotADirectory(_) => NfsStat4::NotDir,
            FsError::IsADirectory(_) => NfsStat4::IsDir,
            FsError::NotEmpty(_) => NfsStat4::NotEmpty,
            FsError::StaleHandle(_) => NfsStat4::Stale,
            FsError::BadHandle(_) => NfsStat4::BadHandle,
            FsError::InvalidOffset { .. } => NfsStat4::FBig,
            FsError::InvalidArgument(_) => NfsStat4::Inval,
            FsError::BadCookie { .. } => NfsStat4::BadCookie,
            FsError::EmptyPathSegment => NfsStat4::Inval,
            FsError::InvalidPathComponent(_) => NfsStat4::BadName,
            FsError::NameTooLong(_) => NfsStat4::NameTooLong,
            FsError::ResourceBusy(_) => NfsStat4::Delay,
            FsError::LockPoisoned(_) => NfsStat4::ServerFault,
        }
    }
}

impl XdrEncode for NfsStat4 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        u32::from(*self).encode(buf);
    }
}

impl XdrEncode for Stateid4 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.seqid.encode(buf);
        helpers::encode_fixed(&self.other, buf);
    }
}

impl XdrDecode for Stateid4 {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        Ok(Stateid4 {
            seqid: u32::decode(buf)?,
            other: helpers::decode_fixed(buf)?,
        })
    }
}

impl XdrEncode for ChangeInfo4 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.atomic.encode(buf);
        self.before.encode(buf);
        self.after.encode(buf);
    }
}
