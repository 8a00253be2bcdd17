//! Builders shared by the integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use memfs::MemFs;
use memnfs::{
    nfs::{
        Bitmap4, Compound4Args, Compound4Res, CreateHow, Fattr4, NfsArgOp, NfsResOp, OpenArgs,
        OpenClaim, OpenHow, ResBody, Stateid4,
    },
    state::{OPEN4_SHARE_ACCESS_BOTH, OPEN4_SHARE_DENY_NONE},
    Dispatcher, ServerConfig,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A seeded file system behind a dispatcher, driven one COMPOUND at a time.
pub struct Harness {
    pub fs: MemFs,
    pub dispatcher: Dispatcher,
    pub session: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Harness {
    /// Serves the default tree: `home`, `init` and `etc` below the root.
    pub async fn new() -> Self {
        let fs = MemFs::new();
        ServerConfig::default().seed(&fs).await.unwrap();
        Self {
            dispatcher: Dispatcher::new(fs.clone(), 60),
            fs,
            session: 1,
        }
    }

    /// Runs a COMPOUND made of `ops`.
    pub async fn run(&self, ops: Vec<NfsArgOp>) -> Compound4Res {
        self.run_raw(Compound4Args::new(ops).to_bytes()).await
    }

    /// Runs an already encoded COMPOUND.
    pub async fn run_raw(&self, args: Bytes) -> Compound4Res {
        self.dispatcher.compound(args, self.session).await.unwrap()
    }

    /// Runs `ops` and fails the test unless every operation succeeds.
    pub async fn run_ok(&self, ops: Vec<NfsArgOp>) -> Compound4Res {
        let res = self.run(ops).await;
        assert_eq!(
            res.status,
            memnfs::nfs::NfsStat4::Ok,
            "compound failed: {:?}",
            res.last()
        );
        res
    }

    /// Negotiates a confirmed client id.
    pub async fn client(&self, name: &'static str) -> u64 {
        let res = self
            .run_ok(vec![NfsArgOp::SetClientId {
                verifier: *b"clientv1",
                id: Bytes::from_static(name.as_bytes()),
                callback: memnfs::nfs::ClientCallback {
                    program: 0x4000_0000,
                    netid: "tcp".into(),
                    addr: "127.0.0.1.3.255".into(),
                },
                callback_ident: 1,
            }])
            .await;

        let ResBody::SetClientId { clientid, verifier } = res.results[0].body else {
            panic!("unexpected SETCLIENTID result");
        };
        self.run_ok(vec![NfsArgOp::SetClientIdConfirm { clientid, verifier }])
            .await;
        clientid
    }

    /// Creates `name` under the directory at `dir`, opens it for reading and writing and confirms
    /// the open. Returns the confirmed stateid.
    pub async fn create_file(&self, clientid: u64, dir: &[&str], name: &str) -> Stateid4 {
        let mut ops = walk(dir);
        ops.push(open(clientid, "owner", name, create_unchecked()));
        let res = self.run_ok(ops).await;
        let ResBody::Open(opened) = &res.last().unwrap().body else {
            panic!("unexpected OPEN result");
        };

        let mut ops = walk(dir);
        ops.push(lookup(name));
        ops.push(NfsArgOp::OpenConfirm {
            stateid: opened.stateid,
            seqid: 2,
        });
        let res = self.run(ops).await;
        match &res.last().unwrap().body {
            ResBody::Stateid(stateid) => *stateid,
            // The owner was confirmed by an earlier open.
            _ => opened.stateid,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// PUTROOTFH followed by one LOOKUP per component.
pub fn walk(path: &[&str]) -> Vec<NfsArgOp> {
    let mut ops = vec![NfsArgOp::PutRootFh];
    ops.extend(path.iter().map(|name| lookup(name)));
    ops
}

pub fn lookup(name: &str) -> NfsArgOp {
    NfsArgOp::Lookup(Bytes::copy_from_slice(name.as_bytes()))
}

pub fn remove(name: &str) -> NfsArgOp {
    NfsArgOp::Remove(Bytes::copy_from_slice(name.as_bytes()))
}

pub fn mkdir(name: &str) -> NfsArgOp {
    NfsArgOp::Create {
        kind: memnfs::nfs::CreateKind::Directory,
        name: Bytes::copy_from_slice(name.as_bytes()),
        attrs: Fattr4::default(),
    }
}

pub fn create_unchecked() -> OpenHow {
    OpenHow::Create(CreateHow::Unchecked(Fattr4::default()))
}

pub fn open(clientid: u64, owner: &str, name: &str, how: OpenHow) -> NfsArgOp {
    NfsArgOp::Open(OpenArgs {
        seqid: 1,
        share_access: OPEN4_SHARE_ACCESS_BOTH,
        share_deny: OPEN4_SHARE_DENY_NONE,
        clientid,
        owner: Bytes::copy_from_slice(owner.as_bytes()),
        how,
        claim: OpenClaim::Null(Bytes::copy_from_slice(name.as_bytes())),
    })
}

pub fn write(stateid: Stateid4, offset: u64, stable: u32, data: &[u8]) -> NfsArgOp {
    NfsArgOp::Write {
        stateid,
        offset,
        stable,
        data: Bytes::copy_from_slice(data),
    }
}

pub fn read(stateid: Stateid4, offset: u64, count: u32) -> NfsArgOp {
    NfsArgOp::Read {
        stateid,
        offset,
        count,
    }
}

pub fn readdir(cookie: u64, maxcount: u32, mask: &[u32]) -> NfsArgOp {
    NfsArgOp::ReadDir {
        cookie,
        verifier: [0; 8],
        dircount: maxcount,
        maxcount,
        attr_request: Bitmap4::from_bits(mask),
    }
}

pub fn getattr(mask: &[u32]) -> NfsArgOp {
    NfsArgOp::GetAttr(Bitmap4::from_bits(mask))
}

/// Names of a READDIR result, in cookie order.
pub fn entry_names(result: &NfsResOp) -> Vec<String> {
    match &result.body {
        ResBody::ReadDir { entries, .. } => entries.iter().map(|e| e.name.clone()).collect(),
        other => panic!("not a READDIR result: {other:?}"),
    }
}

/// Lists the directory at `path` in one READDIR and returns the names sorted.
pub async fn list(harness: &Harness, path: &[&str]) -> Vec<String> {
    let mut ops = walk(path);
    ops.push(readdir(0, 64 * 1024, &[]));
    let res = harness.run_ok(ops).await;
    let mut names = entry_names(res.last().unwrap());
    names.sort();
    names
}

/// The attributes of a GETATTR result.
pub fn fattr(result: &NfsResOp) -> &Fattr4 {
    match &result.body {
        ResBody::GetAttr(attrs) => attrs,
        other => panic!("not a GETATTR result: {other:?}"),
    }
}
