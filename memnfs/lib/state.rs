//! Client and open state for NFSv4.0

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use getset::{CopyGetters, Getters};
use memfs::InodeId;

use crate::nfs::{NfsStat4, Stateid4};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Share access: read
pub const OPEN4_SHARE_ACCESS_READ: u32 = 1;

/// Share access: write
pub const OPEN4_SHARE_ACCESS_WRITE: u32 = 2;

/// Share access: read and write
pub const OPEN4_SHARE_ACCESS_BOTH: u32 = 3;

/// Share deny: nothing
pub const OPEN4_SHARE_DENY_NONE: u32 = 0;

/// Share deny: read and write
pub const OPEN4_SHARE_DENY_BOTH: u32 = 3;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Identifies the connection that created a piece of open state.
pub type SessionId = u64;

/// Result of a state operation, failing with the status to report.
pub type StateResult<T> = Result<T, NfsStat4>;

/// Tracks clients, open owners and open files.
///
/// All tables sit behind one lock that is never held across an await point, so it does not
/// contend with the inode locks of the file system.
#[derive(Debug, CopyGetters)]
pub struct StateManager {
    /// Identifies this server instance inside client ids and stateids
    #[getset(get_copy = "pub with_prefix")]
    boot: u32,

    /// How long a client stays valid without renewing
    #[getset(get_copy = "pub with_prefix")]
    lease_duration: Duration,

    tables: RwLock<StateTables>,
    next_client: AtomicU64,
    next_state: AtomicU64,
}

/// The open state of one owner on one file.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct OpenState {
    /// Current stateid
    #[getset(get_copy = "pub with_prefix")]
    stateid: Stateid4,

    /// Client the owner belongs to
    #[getset(get_copy = "pub with_prefix")]
    clientid: u64,

    /// Opaque open owner
    #[getset(get = "pub with_prefix")]
    owner: Bytes,

    /// File that is open
    #[getset(get_copy = "pub with_prefix")]
    inode: InodeId,

    /// Share access bits
    #[getset(get_copy = "pub with_prefix")]
    access: u32,

    /// Share deny bits
    #[getset(get_copy = "pub with_prefix")]
    deny: u32,

    /// Connection that opened the file
    #[getset(get_copy = "pub with_prefix")]
    session: SessionId,
}

/// What an OPEN was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct OpenGrant {
    /// Stateid to use for I/O
    stateid: Stateid4,

    /// Whether the open owner must be confirmed with OPEN_CONFIRM
    needs_confirm: bool,

    /// Access and deny bits held before this open widened them, `None` for a new open
    #[getset(skip)]
    previous: Option<(u32, u32)>,
}

/// A request to open a file on behalf of an open owner.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Connection making the request
    pub session: SessionId,
    /// Client the owner belongs to
    pub clientid: u64,
    /// Opaque open owner
    pub owner: Bytes,
    /// File to open
    pub inode: InodeId,
    /// Share access bits
    pub access: u32,
    /// Share deny bits
    pub deny: u32,
}

#[derive(Debug, Default)]
struct StateTables {
    clients: HashMap<u64, ClientRecord>,
    owners: HashMap<(u64, Bytes), OwnerRecord>,
    opens: HashMap<[u8; 12], OpenState>,
}

#[derive(Debug)]
struct ClientRecord {
    id: Bytes,
    verifier: [u8; 8],
    confirm: [u8; 8],
    confirmed: bool,
    last_renewal: Instant,
}

#[derive(Debug, Default)]
struct OwnerRecord {
    confirmed: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StateManager {
    /// Creates an empty state manager.
    ///
    /// ## Arguments
    ///
    /// * `boot` - Distinguishes the ids of this server instance from earlier ones
    /// * `lease_duration` - How long a client stays valid without renewing
    pub fn new(boot: u32, lease_duration: Duration) -> Self {
        Self {
            boot,
            lease_duration,
            tables: RwLock::new(StateTables::default()),
            next_client: AtomicU64::new(1),
            next_state: AtomicU64::new(1),
        }
    }

    /// Registers a client, or a new incarnation of one.
    ///
    /// ## Returns
    ///
    /// The client id and the verifier the client must echo in SETCLIENTID_CONFIRM.
    pub fn set_client_id(&self, verifier: [u8; 8], id: Bytes) -> StateResult<(u64, [u8; 8])> {
        let mut tables = self.tables()?;
        let confirm = self.next_state.fetch_add(1, Ordering::Relaxed).to_be_bytes();

        let existing = tables
            .clients
            .iter_mut()
            .find(|(_, record)| record.id == id && record.verifier == verifier);

        if let Some((clientid, record)) = existing {
            record.confirm = confirm;
            record.last_renewal = Instant::now();
            return Ok((*clientid, confirm));
        }

        let clientid = self.new_clientid();
        tables.clients.insert(
            clientid,
            ClientRecord {
                id,
                verifier,
                confirm,
                confirmed: false,
                last_renewal: Instant::now(),
            },
        );

        tracing::debug!(clientid, "registered client");
        Ok((clientid, confirm))
    }

    /// Confirms a client id. Earlier incarnations of the same client are dropped with their
    /// state.
    ///
    /// ## Errors
    ///
    /// * `NfsStat4::StaleClientId` - If the client id or the verifier is unknown
    pub fn confirm_client(&self, clientid: u64, confirm: [u8; 8]) -> StateResult<()> {
        let mut tables = self.tables()?;
        let record = tables
            .clients
            .get_mut(&clientid)
            .filter(|record| record.confirm == confirm)
            .ok_or(NfsStat4::StaleClientId)?;

        record.confirmed = true;
        record.last_renewal = Instant::now();
        let id = record.id.clone();

        let replaced: Vec<u64> = tables
            .clients
            .iter()
            .filter(|(other, record)| **other != clientid && record.id == id)
            .map(|(other, _)| *other)
            .collect();
        for old in replaced {
            tables.drop_client(old);
        }

        tracing::debug!(clientid, "confirmed client");
        Ok(())
    }

    /// Renews the lease of a client.
    ///
    /// ## Errors
    ///
    /// * `NfsStat4::StaleClientId` - If the client is unknown or unconfirmed
    pub fn renew(&self, clientid: u64) -> StateResult<()> {
        let mut tables = self.tables()?;
        tables.touch_client(clientid)
    }

    /// Opens a file for an open owner, enforcing share reservations.
    ///
    /// A second open by the same owner of the same file widens the existing state.
    ///
    /// ## Errors
    ///
    /// * `NfsStat4::StaleClientId` - If the client is unknown or unconfirmed
    /// * `NfsStat4::Inval` - For share bits outside the protocol
    /// * `NfsStat4::ShareDenied` - If another owner's reservation conflicts
    pub fn open(&self, request: OpenRequest) -> StateResult<OpenGrant> {
        if !(OPEN4_SHARE_ACCESS_READ..=OPEN4_SHARE_ACCESS_BOTH).contains(&request.access)
            || request.deny > OPEN4_SHARE_DENY_BOTH
        {
            return Err(NfsStat4::Inval);
        }

        let mut tables = self.tables()?;
        tables.touch_client(request.clientid)?;

        let same_owner =
            |open: &OpenState| open.clientid == request.clientid && open.owner == request.owner;

        let conflict = tables.opens.values().any(|open| {
            open.inode == request.inode
                && !same_owner(open)
                && (open.access & request.deny != 0 || open.deny & request.access != 0)
        });
        if conflict {
            return Err(NfsStat4::ShareDenied);
        }

        let needs_confirm = !tables
            .owners
            .entry((request.clientid, request.owner.clone()))
            .or_default()
            .confirmed;

        let existing = tables
            .opens
            .values_mut()
            .find(|open| open.inode == request.inode && same_owner(open));

        let (stateid, previous) = match existing {
            Some(open) => {
                let previous = (open.access, open.deny);
                open.access |= request.access;
                open.deny |= request.deny;
                open.stateid.seqid = open.stateid.seqid.wrapping_add(1);
                (open.stateid, Some(previous))
            }
            None => {
                let stateid = self.new_stateid();
                tables.opens.insert(
                    stateid.other,
                    OpenState {
                        stateid,
                        clientid: request.clientid,
                        owner: request.owner,
                        inode: request.inode,
                        access: request.access,
                        deny: request.deny,
                        session: request.session,
                    },
                );
                (stateid, None)
            }
        };

        Ok(OpenGrant {
            stateid,
            needs_confirm,
            previous,
        })
    }

    /// Takes back an open that could not be completed. A new open is dropped; a widened one gets
    /// its earlier share bits back.
    pub fn abandon_open(&self, grant: &OpenGrant) -> StateResult<()> {
        let mut tables = self.tables()?;
        match grant.previous {
            None => {
                tables.opens.remove(&grant.stateid.other);
            }
            Some((access, deny)) => {
                if let Some(open) = tables.opens.get_mut(&grant.stateid.other) {
                    open.access = access;
                    open.deny = deny;
                }
            }
        }
        Ok(())
    }

    /// Confirms the open owner of a stateid.
    ///
    /// ## Returns
    ///
    /// The stateid with its sequence bumped.
    pub fn confirm_open(&self, stateid: &Stateid4) -> StateResult<Stateid4> {
        let mut tables = self.tables()?;
        let open = self.lookup(&mut tables, stateid)?;
        let key = (open.clientid, open.owner.clone());
        let bumped = open.bump();

        tables.owners.entry(key).or_default().confirmed = true;
        Ok(bumped)
    }

    /// Narrows the share reservation of an open.
    ///
    /// ## Errors
    ///
    /// * `NfsStat4::Inval` - If the new bits are not a subset of the current ones
    pub fn downgrade(&self, stateid: &Stateid4, access: u32, deny: u32) -> StateResult<Stateid4> {
        let mut tables = self.tables()?;
        let open = self.lookup(&mut tables, stateid)?;

        if access == 0 || access & !open.access != 0 || deny & !open.deny != 0 {
            return Err(NfsStat4::Inval);
        }

        open.access = access;
        open.deny = deny;
        Ok(open.bump())
    }

    /// Releases an open.
    ///
    /// ## Returns
    ///
    /// The final stateid, with its sequence bumped.
    pub fn close(&self, stateid: &Stateid4) -> StateResult<Stateid4> {
        let mut tables = self.tables()?;
        let closed = self.lookup(&mut tables, stateid)?.bump();
        tables.opens.remove(&stateid.other);
        Ok(closed)
    }

    /// Checks that a stateid permits I/O on `inode`. The anonymous and bypass stateids always
    /// do.
    ///
    /// ## Errors
    ///
    /// * `NfsStat4::BadStateId` - If the stateid is unknown or names another file
    /// * `NfsStat4::StaleStateId` - If the stateid comes from an earlier server instance
    /// * `NfsStat4::OldStateId` - If the stateid has been superseded
    /// * `NfsStat4::OpenMode` - For a write through a read-only open
    pub fn check_io(&self, stateid: &Stateid4, inode: InodeId, write: bool) -> StateResult<()> {
        if stateid.is_special() {
            return Ok(());
        }

        let mut tables = self.tables()?;
        let open = self.lookup(&mut tables, stateid)?;
        if open.inode != inode {
            return Err(NfsStat4::BadStateId);
        }
        if write && open.access & OPEN4_SHARE_ACCESS_WRITE == 0 {
            return Err(NfsStat4::OpenMode);
        }

        let clientid = open.clientid;
        tables.touch_client(clientid)
    }

    /// Accepts a RELEASE_LOCKOWNER. There are no byte-range locks to release.
    pub fn release_lock_owner(&self, clientid: u64) -> StateResult<()> {
        let mut tables = self.tables()?;
        tables.touch_client(clientid)
    }

    /// Drops the open state created by a connection.
    ///
    /// ## Returns
    ///
    /// The number of opens released.
    pub fn release_session(&self, session: SessionId) -> StateResult<usize> {
        let mut tables = self.tables()?;
        let before = tables.opens.len();
        tables.opens.retain(|_, open| open.session != session);
        Ok(before - tables.opens.len())
    }

    /// Drops the open state of a removed file.
    pub fn forget_inode(&self, inode: InodeId) -> StateResult<()> {
        let mut tables = self.tables()?;
        tables.opens.retain(|_, open| open.inode != inode);
        Ok(())
    }

    /// Drops every client whose lease has lapsed, with its state.
    ///
    /// ## Returns
    ///
    /// The client ids that expired.
    pub fn expire_clients(&self) -> StateResult<Vec<u64>> {
        let mut tables = self.tables()?;
        let expired: Vec<u64> = tables
            .clients
            .iter()
            .filter(|(_, record)| record.last_renewal.elapsed() > self.lease_duration)
            .map(|(clientid, _)| *clientid)
            .collect();

        for clientid in &expired {
            tables.drop_client(*clientid);
        }
        Ok(expired)
    }

    /// Returns a snapshot of the open state.
    pub fn opens(&self) -> StateResult<Vec<OpenState>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| NfsStat4::ServerFault)?;
        Ok(tables.opens.values().cloned().collect())
    }

    fn lookup<'a>(
        &self,
        tables: &'a mut StateTables,
        stateid: &Stateid4,
    ) -> StateResult<&'a mut OpenState> {
        if stateid.other[..4] != self.boot.to_be_bytes() {
            return Err(NfsStat4::StaleStateId);
        }

        let open = tables
            .opens
            .get_mut(&stateid.other)
            .ok_or(NfsStat4::BadStateId)?;

        match stateid.seqid.cmp(&open.stateid.seqid) {
            std::cmp::Ordering::Equal => Ok(open),
            std::cmp::Ordering::Less => Err(NfsStat4::OldStateId),
            std::cmp::Ordering::Greater => Err(NfsStat4::BadStateId),
        }
    }

    fn new_clientid(&self) -> u64 {
        let counter = self.next_client.fetch_add(1, Ordering::Relaxed);
        (u64::from(self.boot) << 32) | (counter & 0xffff_ffff)
    }

    fn new_stateid(&self) -> Stateid4 {
        let counter = self.next_state.fetch_add(1, Ordering::Relaxed);
        let mut other = [0; 12];
        other[..4].copy_from_slice(&self.boot.to_be_bytes());
        other[4..].copy_from_slice(&counter.to_be_bytes());
        Stateid4 { seqid: 1, other }
    }

    fn tables(&self) -> StateResult<RwLockWriteGuard<'_, StateTables>> {
        self.tables.write().map_err(|_| {
            tracing::error!("state table lock poisoned");
            NfsStat4::ServerFault
        })
    }
}

impl OpenState {
    fn bump(&mut self) -> Stateid4 {
        self.stateid.seqid = self.stateid.seqid.wrapping_add(1);
        self.stateid
    }
}

impl StateTables {
    fn touch_client(&mut self, clientid: u64) -> StateResult<()> {
        match self.clients.get_mut(&clientid) {
            Some(record) if record.confirmed => {
                record.last_renewal = Instant::now();
                Ok(())
            }
            _ => Err(NfsStat4::StaleClientId),
        }
    }

    fn drop_client(&mut self, clientid: u64) {
        self.clients.remove(&clientid);
        self.owners.retain(|(owner_client, _), _| *owner_client != clientid);
        self.opens.retain(|_, open| open.clientid != clientid);
        tracing::debug!(clientid, "dropped client state");
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
