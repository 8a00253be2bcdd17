mod common;

use bytes::{BufMut, Bytes, BytesMut};
use common::*;
use memnfs::{
    nfs::{
        bits, Bitmap4, CreateHow, CreateKind, Fattr4, NfsArgOp, NfsOpcode, NfsStat4, OpenHow,
        ResBody, Stateid4, OPEN4_RESULT_CONFIRM,
    },
    xdr::{helpers, XdrEncode},
};

//--------------------------------------------------------------------------------------------------
// Tests: Scenarios
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_compound_root_lists_seed() {
    let harness = Harness::new().await;
    assert_eq!(list(&harness, &[]).await, vec!["etc", "home", "init"]);
}

#[test_log::test(tokio::test)]
async fn test_compound_file_lifecycle() {
    let harness = Harness::new().await;
    let clientid = harness.client("lifecycle").await;

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            open(clientid, "owner", "file1", create_unchecked()),
            NfsArgOp::GetFh,
        ])
        .await;
    let ResBody::Open(opened) = &res.results[1].body else {
        panic!("unexpected OPEN result");
    };
    assert_ne!(opened.rflags & OPEN4_RESULT_CONFIRM, 0);
    assert!(opened.cinfo.after > opened.cinfo.before);

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("file1"),
            NfsArgOp::OpenConfirm {
                stateid: opened.stateid,
                seqid: 2,
            },
        ])
        .await;
    let ResBody::Stateid(stateid) = res.results[2].body else {
        panic!("unexpected OPEN_CONFIRM result");
    };

    harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("file1"),
            write(stateid, 0, 2, b"Hello world"),
        ])
        .await;
    assert_eq!(
        list(&harness, &[]).await,
        vec!["etc", "file1", "home", "init"]
    );

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("file1"),
            read(stateid, 0, 1024),
            getattr(&[bits::SIZE]),
        ])
        .await;
    assert_eq!(
        res.results[2].body,
        ResBody::Read {
            eof: true,
            data: Bytes::from_static(b"Hello world"),
        }
    );
    assert_eq!(fattr(&res.results[3]).get_u64(bits::SIZE), Some(11));

    harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("file1"),
            NfsArgOp::Close { seqid: 3, stateid },
            NfsArgOp::PutRootFh,
            remove("file1"),
        ])
        .await;
    assert_eq!(list(&harness, &[]).await, vec!["etc", "home", "init"]);
}

#[test_log::test(tokio::test)]
async fn test_compound_unusual_directory_names() {
    let harness = Harness::new().await;
    harness.run_ok(vec![NfsArgOp::PutRootFh, mkdir("mydir")]).await;

    for name in ["mydir2", ".mydir2", "_+-*mydir3"] {
        harness
            .run_ok(vec![NfsArgOp::PutRootFh, lookup("mydir"), mkdir(name)])
            .await;
    }

    assert_eq!(
        list(&harness, &["mydir"]).await,
        vec![".mydir2", "_+-*mydir3", "mydir2"]
    );
}

#[test_log::test(tokio::test)]
async fn test_compound_ten_million_bytes() {
    const TOTAL: usize = 10_000_000;
    const CHUNK: usize = 1024 * 1024;

    let harness = Harness::new().await;
    let clientid = harness.client("big").await;
    harness.run_ok(vec![NfsArgOp::PutRootFh, mkdir("big")]).await;
    let stateid = harness.create_file(clientid, &["big"], "blob").await;

    let data = vec![0xab; CHUNK];
    let mut offset = 0;
    while offset < TOTAL {
        let len = CHUNK.min(TOTAL - offset);
        let res = harness
            .run_ok(vec![
                NfsArgOp::PutRootFh,
                lookup("big"),
                lookup("blob"),
                write(stateid, offset as u64, 0, &data[..len]),
            ])
            .await;
        let ResBody::Write { count, .. } = res.results[3].body else {
            panic!("unexpected WRITE result");
        };
        assert_eq!(count as usize, len);
        offset += len;
    }

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("big"),
            lookup("blob"),
            getattr(&[bits::SIZE]),
        ])
        .await;
    let size = fattr(&res.results[3]).get_u64(bits::SIZE).unwrap();
    assert_eq!(size, TOTAL as u64);
    assert_eq!(size / 1_048_576, 9);
}

//--------------------------------------------------------------------------------------------------
// Tests: Compound evaluation
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_compound_stops_at_first_failure() {
    let harness = Harness::new().await;
    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("missing"),
            getattr(&[bits::SIZE]),
        ])
        .await;

    assert_eq!(res.status, NfsStat4::NoEnt);
    assert_eq!(res.results.len(), 2);
    assert_eq!(res.results[1].opcode, NfsOpcode::Lookup);
    assert_eq!(res.results[1].status, NfsStat4::NoEnt);
}

#[test_log::test(tokio::test)]
async fn test_compound_requires_a_filehandle() {
    let harness = Harness::new().await;

    for op in [getattr(&[bits::TYPE]), lookup("home"), NfsArgOp::GetFh, NfsArgOp::SaveFh] {
        let res = harness.run(vec![op]).await;
        assert_eq!(res.status, NfsStat4::NoFileHandle);
    }

    let res = harness
        .run(vec![NfsArgOp::PutRootFh, NfsArgOp::RestoreFh])
        .await;
    assert_eq!(res.status, NfsStat4::RestoreFh);
}

#[test_log::test(tokio::test)]
async fn test_compound_stale_handle_after_remove() {
    let harness = Harness::new().await;
    let res = harness
        .run_ok(vec![NfsArgOp::PutRootFh, mkdir("gone"), NfsArgOp::GetFh])
        .await;
    let ResBody::GetFh(handle) = res.results[2].body.clone() else {
        panic!("unexpected GETFH result");
    };

    harness
        .run_ok(vec![NfsArgOp::PutRootFh, remove("gone")])
        .await;

    let res = harness.run(vec![NfsArgOp::PutFh(handle)]).await;
    assert_eq!(res.status, NfsStat4::Stale);

    let res = harness
        .run(vec![NfsArgOp::PutFh(Bytes::from_static(b"short"))])
        .await;
    assert_eq!(res.status, NfsStat4::BadHandle);
}

#[test_log::test(tokio::test)]
async fn test_compound_saved_filehandle() {
    let harness = Harness::new().await;
    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("init"),
            NfsArgOp::SaveFh,
            NfsArgOp::PutRootFh,
            NfsArgOp::RestoreFh,
            NfsArgOp::LookupP,
            getattr(&[bits::FILEID]),
        ])
        .await;
    assert_eq!(
        fattr(&res.results[6]).get_u64(bits::FILEID),
        Some(memfs::InodeId::ROOT.as_u64())
    );

    let res = harness.run(vec![NfsArgOp::PutRootFh, NfsArgOp::LookupP]).await;
    assert_eq!(res.status, NfsStat4::NoEnt);
}

#[test_log::test(tokio::test)]
async fn test_compound_undecodable_operations() {
    let harness = Harness::new().await;

    let header = |count: u32| {
        let mut buf = BytesMut::new();
        helpers::encode_opaque(b"tag", &mut buf);
        0u32.encode(&mut buf);
        count.encode(&mut buf);
        buf
    };

    let mut illegal = header(2);
    NfsArgOp::PutRootFh.encode(&mut illegal);
    illegal.put_u32(4242);
    let res = harness.run_raw(illegal.freeze()).await;
    assert_eq!(res.tag, Bytes::from_static(b"tag"));
    assert_eq!(res.status, NfsStat4::OpIllegal);
    assert_eq!(res.results[1].opcode, NfsOpcode::Illegal);

    let mut unsupported = header(1);
    unsupported.put_u32(NfsOpcode::Rename.into());
    let res = harness.run_raw(unsupported.freeze()).await;
    assert_eq!(res.status, NfsStat4::NotSupp);
    assert_eq!(res.results[0].opcode, NfsOpcode::Rename);

    let mut truncated = header(1);
    truncated.put_u32(NfsOpcode::Lookup.into());
    truncated.put_u32(100);
    let res = harness.run_raw(truncated.freeze()).await;
    assert_eq!(res.status, NfsStat4::BadXdr);

    let mut minor = BytesMut::new();
    helpers::encode_opaque(b"", &mut minor);
    1u32.encode(&mut minor);
    1u32.encode(&mut minor);
    NfsArgOp::PutRootFh.encode(&mut minor);
    let res = harness.run_raw(minor.freeze()).await;
    assert_eq!(res.status, NfsStat4::MinorVersMismatch);
    assert!(res.results.is_empty());
}

//--------------------------------------------------------------------------------------------------
// Tests: Operations
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_compound_write_stability_and_commit() {
    let harness = Harness::new().await;
    let clientid = harness.client("stable").await;
    let stateid = harness.create_file(clientid, &["home"], "f").await;

    let mut verifiers = Vec::new();
    for stable in 0..=2 {
        let res = harness
            .run_ok(vec![
                NfsArgOp::PutRootFh,
                lookup("home"),
                lookup("f"),
                write(stateid, 0, stable, b"data"),
            ])
            .await;
        let ResBody::Write {
            count,
            committed,
            verifier,
        } = res.results[3].body
        else {
            panic!("unexpected WRITE result");
        };
        assert_eq!(count, 4);
        assert!(committed >= stable);
        verifiers.push(verifier);
    }

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("home"),
            lookup("f"),
            NfsArgOp::Commit { offset: 0, count: 0 },
        ])
        .await;
    verifiers.push(match res.results[3].body {
        ResBody::Commit(verifier) => verifier,
        _ => panic!("unexpected COMMIT result"),
    });
    assert!(verifiers.windows(2).all(|pair| pair[0] == pair[1]));

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("home"),
            NfsArgOp::Commit { offset: 0, count: 0 },
        ])
        .await;
    assert_eq!(res.status, NfsStat4::IsDir);
}

#[test_log::test(tokio::test)]
async fn test_compound_anonymous_stateid_io() {
    let harness = Harness::new().await;
    harness.run_ok(vec![NfsArgOp::PutRootFh, mkdir("d")]).await;
    let clientid = harness.client("anon").await;
    harness.create_file(clientid, &["d"], "f").await;

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("d"),
            lookup("f"),
            write(Stateid4::ANONYMOUS, 4, 2, b"tail"),
            read(Stateid4::BYPASS, 0, 100),
        ])
        .await;
    assert_eq!(
        res.results[4].body,
        ResBody::Read {
            eof: true,
            data: Bytes::from_static(b"\0\0\0\0tail"),
        }
    );

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("d"),
            read(Stateid4::ANONYMOUS, 0, 10),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::IsDir);
}

#[test_log::test(tokio::test)]
async fn test_compound_readdir_resumes_from_cookie() {
    let harness = Harness::new().await;
    harness.run_ok(vec![NfsArgOp::PutRootFh, mkdir("d")]).await;
    for name in ["f0", "f1", "f2", "f3", "f4"] {
        harness
            .run_ok(vec![NfsArgOp::PutRootFh, lookup("d"), mkdir(name)])
            .await;
    }

    // Each entry without attributes takes 28 bytes; the reply frame takes 16.
    let res = harness
        .run_ok(vec![NfsArgOp::PutRootFh, lookup("d"), readdir(0, 16 + 2 * 28, &[])])
        .await;
    let ResBody::ReadDir { entries, eof, .. } = &res.results[2].body else {
        panic!("unexpected READDIR result");
    };
    assert!(!eof);
    assert_eq!(entry_names(&res.results[2]), vec!["f0", "f1"]);
    let cookie = entries[1].cookie;

    harness
        .run_ok(vec![NfsArgOp::PutRootFh, lookup("d"), remove("f0"), remove("f2")])
        .await;

    let res = harness
        .run_ok(vec![NfsArgOp::PutRootFh, lookup("d"), readdir(cookie, 4096, &[])])
        .await;
    assert_eq!(entry_names(&res.results[2]), vec!["f3", "f4"]);

    for (cookie, maxcount, status) in [
        (0, 20, NfsStat4::TooSmall),
        (1, 4096, NfsStat4::BadCookie),
        (999, 4096, NfsStat4::BadCookie),
    ] {
        let res = harness
            .run(vec![
                NfsArgOp::PutRootFh,
                lookup("d"),
                readdir(cookie, maxcount, &[]),
            ])
            .await;
        assert_eq!(res.status, status);
    }
}

#[test_log::test(tokio::test)]
async fn test_compound_readdir_attributes() {
    let harness = Harness::new().await;
    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            readdir(0, 64 * 1024, &[bits::TYPE, bits::FILEID, bits::ACL]),
        ])
        .await;
    let ResBody::ReadDir { entries, eof, .. } = &res.results[1].body else {
        panic!("unexpected READDIR result");
    };
    assert!(*eof);
    for entry in entries {
        assert_eq!(entry.attrs.mask, Bitmap4::from_bits(&[bits::TYPE, bits::FILEID]));
        assert_eq!(entry.attrs.get_u32(bits::TYPE), Some(2));
    }
}

#[test_log::test(tokio::test)]
async fn test_compound_create_types() {
    let harness = Harness::new().await;

    let create = |kind| NfsArgOp::Create {
        kind,
        name: Bytes::from_static(b"node"),
        attrs: Fattr4::default(),
    };

    let res = harness
        .run(vec![NfsArgOp::PutRootFh, create(CreateKind::Other(1))])
        .await;
    assert_eq!(res.status, NfsStat4::BadType);

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            create(CreateKind::Symlink(Bytes::from_static(b"/etc"))),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::NotSupp);

    let res = harness.run(vec![NfsArgOp::PutRootFh, mkdir("home")]).await;
    assert_eq!(res.status, NfsStat4::Exist);

    let res = harness.run(vec![NfsArgOp::PutRootFh, mkdir("..")]).await;
    assert_eq!(res.status, NfsStat4::BadName);

    let res = harness
        .run(vec![NfsArgOp::PutRootFh, mkdir(&"x".repeat(256))])
        .await;
    assert_eq!(res.status, NfsStat4::NameTooLong);

    let res = harness
        .run_ok(vec![NfsArgOp::PutRootFh, mkdir("made"), getattr(&[bits::TYPE])])
        .await;
    assert_eq!(fattr(&res.results[2]).get_u32(bits::TYPE), Some(2));
}

#[test_log::test(tokio::test)]
async fn test_compound_remove_non_empty_directory() {
    let harness = Harness::new().await;
    harness
        .run_ok(vec![NfsArgOp::PutRootFh, lookup("init"), mkdir("rc.d")])
        .await;

    let res = harness.run(vec![NfsArgOp::PutRootFh, remove("init")]).await;
    assert_eq!(res.status, NfsStat4::NotEmpty);

    let res = harness.run(vec![NfsArgOp::PutRootFh, remove("nothing")]).await;
    assert_eq!(res.status, NfsStat4::NoEnt);
    assert_eq!(list(&harness, &[]).await, vec!["etc", "home", "init"]);
}

#[test_log::test(tokio::test)]
async fn test_compound_setattr_reports_applied_attributes() {
    let harness = Harness::new().await;
    let clientid = harness.client("setattr").await;
    let stateid = harness.create_file(clientid, &[], "f").await;

    harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            write(stateid, 0, 2, b"Hello world"),
        ])
        .await;

    let mut values = BytesMut::new();
    5u64.encode(&mut values);
    0o600u32.encode(&mut values);
    let attrs = Fattr4 {
        mask: Bitmap4::from_bits(&[bits::SIZE, bits::MODE]),
        values: values.freeze(),
    };

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            NfsArgOp::SetAttr {
                stateid,
                attrs: attrs.clone(),
            },
            getattr(&[bits::SIZE, bits::MODE]),
        ])
        .await;
    assert_eq!(res.results[2].body, ResBody::SetAttr(attrs.mask.clone()));
    assert_eq!(fattr(&res.results[3]).get_u64(bits::SIZE), Some(5));
    assert_eq!(fattr(&res.results[3]).get_u32(bits::MODE), Some(0o600));

    let read_only = Fattr4 {
        mask: Bitmap4::from_bits(&[bits::TYPE]),
        values: Bytes::from_static(&[0, 0, 0, 1]),
    };
    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            NfsArgOp::SetAttr {
                stateid,
                attrs: read_only,
            },
        ])
        .await;
    assert_eq!(res.status, NfsStat4::Inval);
    assert_eq!(res.results[2].body, ResBody::SetAttr(Bitmap4::new()));
}

#[test_log::test(tokio::test)]
async fn test_compound_verify_and_nverify() {
    let harness = Harness::new().await;
    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("etc"),
            getattr(&[bits::TYPE, bits::FILEID]),
        ])
        .await;
    let attrs = fattr(&res.results[2]).clone();

    harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("etc"),
            NfsArgOp::Verify(attrs.clone()),
        ])
        .await;

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("etc"),
            NfsArgOp::NVerify(attrs.clone()),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::Same);

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("home"),
            NfsArgOp::Verify(attrs),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::NotSame);

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            NfsArgOp::Verify(Fattr4 {
                mask: Bitmap4::from_bits(&[bits::ACL]),
                values: Bytes::new(),
            }),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::AttrNotSupp);
}

#[test_log::test(tokio::test)]
async fn test_compound_access_by_object_type() {
    let harness = Harness::new().await;
    let clientid = harness.client("access").await;
    harness.create_file(clientid, &[], "f").await;

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            NfsArgOp::Access(0x3f),
            lookup("f"),
            NfsArgOp::Access(0x3f),
        ])
        .await;
    assert_eq!(
        res.results[1].body,
        ResBody::Access {
            supported: 0x1f,
            access: 0x1f,
        }
    );
    assert_eq!(
        res.results[3].body,
        ResBody::Access {
            supported: 0x2d,
            access: 0x2d,
        }
    );
}

#[test_log::test(tokio::test)]
async fn test_compound_open_create_modes() {
    let harness = Harness::new().await;
    let clientid = harness.client("modes").await;
    harness.create_file(clientid, &[], "f").await;

    let guarded = OpenHow::Create(CreateHow::Guarded(Fattr4::default()));
    let res = harness
        .run(vec![NfsArgOp::PutRootFh, open(clientid, "owner", "f", guarded)])
        .await;
    assert_eq!(res.status, NfsStat4::Exist);

    let exclusive = |verifier: &[u8; 8]| OpenHow::Create(CreateHow::Exclusive(*verifier));
    harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            open(clientid, "owner", "x", exclusive(b"attempt1")),
        ])
        .await;
    harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            open(clientid, "owner", "x", exclusive(b"attempt1")),
        ])
        .await;
    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            open(clientid, "owner", "x", exclusive(b"attempt2")),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::Exist);

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            open(clientid, "owner", "missing", OpenHow::NoCreate),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::NoEnt);

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            open(clientid, "owner", "home", OpenHow::NoCreate),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::IsDir);

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            open(clientid + 1, "owner", "f", OpenHow::NoCreate),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::StaleClientId);
}

#[test_log::test(tokio::test)]
async fn test_compound_read_only_open_rejects_writes() {
    let harness = Harness::new().await;
    let clientid = harness.client("readonly").await;
    harness.create_file(clientid, &[], "f").await;

    let NfsArgOp::Open(mut args) = open(clientid, "reader", "f", OpenHow::NoCreate) else {
        unreachable!();
    };
    args.share_access = memnfs::state::OPEN4_SHARE_ACCESS_READ;
    let res = harness
        .run_ok(vec![NfsArgOp::PutRootFh, NfsArgOp::Open(args)])
        .await;
    let ResBody::Open(opened) = &res.results[1].body else {
        panic!("unexpected OPEN result");
    };

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            write(opened.stateid, 0, 2, b"nope"),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::OpenMode);
}

#[test_log::test(tokio::test)]
async fn test_compound_denied_open_keeps_file_content() {
    let harness = Harness::new().await;
    let writer = harness.client("writer").await;
    let stateid = harness.create_file(writer, &[], "f").await;
    harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            write(stateid, 0, 2, b"Hello world"),
        ])
        .await;

    // The writer now denies writes to everyone else.
    let NfsArgOp::Open(mut args) = open(writer, "owner", "f", OpenHow::NoCreate) else {
        unreachable!();
    };
    args.share_deny = 2;
    harness
        .run_ok(vec![NfsArgOp::PutRootFh, NfsArgOp::Open(args)])
        .await;
    let opens = harness.dispatcher.get_state().opens().unwrap().len();

    let other = harness.client("other").await;
    let mut values = BytesMut::new();
    0u64.encode(&mut values);
    let truncate = OpenHow::Create(CreateHow::Unchecked(Fattr4 {
        mask: Bitmap4::from_bits(&[bits::SIZE]),
        values: values.freeze(),
    }));
    let res = harness
        .run(vec![NfsArgOp::PutRootFh, open(other, "other", "f", truncate)])
        .await;
    assert_eq!(res.status, NfsStat4::ShareDenied);
    assert_eq!(harness.dispatcher.get_state().opens().unwrap().len(), opens);

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            getattr(&[bits::SIZE]),
            read(Stateid4::BYPASS, 0, 64),
        ])
        .await;
    assert_eq!(fattr(&res.results[2]).get_u64(bits::SIZE), Some(11));
    assert_eq!(
        res.results[3].body,
        ResBody::Read {
            eof: true,
            data: Bytes::from_static(b"Hello world"),
        }
    );
}

#[test_log::test(tokio::test)]
async fn test_compound_rejects_sizes_past_the_limit() {
    let harness = Harness::new().await;
    let clientid = harness.client("huge").await;
    let stateid = harness.create_file(clientid, &[], "f").await;
    harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            write(stateid, 0, 2, b"Hello"),
        ])
        .await;

    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            write(stateid, i64::MAX as u64, 2, b"x"),
        ])
        .await;
    assert_eq!(res.status, NfsStat4::FBig);

    let huge = || {
        let mut values = BytesMut::new();
        (i64::MAX as u64).encode(&mut values);
        Fattr4 {
            mask: Bitmap4::from_bits(&[bits::SIZE]),
            values: values.freeze(),
        }
    };
    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            NfsArgOp::SetAttr {
                stateid,
                attrs: huge(),
            },
        ])
        .await;
    assert_eq!(res.status, NfsStat4::FBig);

    // A failed OPEN leaves no open state behind.
    let opens = harness.dispatcher.get_state().opens().unwrap().len();
    let how = OpenHow::Create(CreateHow::Unchecked(huge()));
    let res = harness
        .run(vec![NfsArgOp::PutRootFh, open(clientid, "sizer", "f", how)])
        .await;
    assert_eq!(res.status, NfsStat4::FBig);
    assert_eq!(harness.dispatcher.get_state().opens().unwrap().len(), opens);

    let res = harness
        .run_ok(vec![
            NfsArgOp::PutRootFh,
            lookup("f"),
            getattr(&[bits::SIZE, bits::MAXFILESIZE]),
        ])
        .await;
    let attrs = fattr(&res.results[2]);
    assert_eq!(attrs.get_u64(bits::SIZE), Some(5));
    assert_eq!(
        attrs.get_u64(bits::MAXFILESIZE),
        Some(memfs::defaults::MAX_FILE_SIZE)
    );
}

#[test_log::test(tokio::test)]
async fn test_compound_session_release_drops_open_state() {
    let harness = Harness::new().await;
    let clientid = harness.client("session").await;
    let stateid = harness.create_file(clientid, &[], "f").await;
    assert_eq!(harness.dispatcher.get_state().opens().unwrap().len(), 1);

    let released = harness
        .dispatcher
        .get_state()
        .release_session(harness.session)
        .unwrap();
    assert_eq!(released, 1);

    let res = harness
        .run(vec![NfsArgOp::PutRootFh, lookup("f"), read(stateid, 0, 10)])
        .await;
    assert_eq!(res.status, NfsStat4::BadStateId);
}

#[test_log::test(tokio::test)]
async fn test_compound_remove_releases_open_state() {
    let harness = Harness::new().await;
    let clientid = harness.client("remove").await;
    harness.create_file(clientid, &[], "f").await;

    harness.run_ok(vec![NfsArgOp::PutRootFh, remove("f")]).await;
    assert!(harness.dispatcher.get_state().opens().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_compound_secinfo_consumes_filehandle() {
    let harness = Harness::new().await;
    let res = harness
        .run(vec![
            NfsArgOp::PutRootFh,
            NfsArgOp::SecInfo(Bytes::from_static(b"home")),
            NfsArgOp::GetFh,
        ])
        .await;
    assert_eq!(res.results[1].body, ResBody::SecInfo(vec![1, 0]));
    assert_eq!(res.status, NfsStat4::NoFileHandle);
}

#[test_log::test(tokio::test)]
async fn test_compound_client_lease_operations() {
    let harness = Harness::new().await;
    let clientid = harness.client("lease").await;

    harness
        .run_ok(vec![
            NfsArgOp::Renew(clientid),
            NfsArgOp::ReleaseLockOwner {
                clientid,
                owner: Bytes::from_static(b"owner"),
            },
        ])
        .await;

    let res = harness.run(vec![NfsArgOp::Renew(clientid ^ 0xff)]).await;
    assert_eq!(res.status, NfsStat4::StaleClientId);
}
