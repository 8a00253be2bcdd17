//! NFSv4.0 server over TCP

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use getset::Getters;
use memfs::MemFs;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::codec::RecordCodec;
use crate::dispatch::Dispatcher;
use crate::rpc::{ReplyBody, RpcCall, RpcReply};
use crate::state::SessionId;
use crate::xdr::XdrDecode;
use crate::{NfsResult, ServerConfig};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Replies queued for a connection's writer before request tasks wait.
const REPLY_QUEUE_DEPTH: usize = 64;

/// Shortest interval between lease sweeps.
const MIN_REAP_INTERVAL: Duration = Duration::from_secs(1);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Serves a [`MemFs`] to NFSv4.0 clients.
///
/// Each TCP connection is a session. Every request on it runs as its own task and replies are
/// funnelled back through a single writer, so a slow COMPOUND does not hold up the others.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct NfsServer {
    /// Server configuration
    config: ServerConfig,

    /// Executes requests
    dispatcher: Dispatcher,

    #[getset(skip)]
    next_session: Arc<AtomicU64>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NfsServer {
    /// Creates a server for `fs`.
    pub fn new(config: ServerConfig, fs: MemFs) -> Self {
        let dispatcher = Dispatcher::new(fs, *config.get_lease_time());
        Self {
            config,
            dispatcher,
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Binds the configured address and serves forever.
    pub async fn run(&self) -> NfsResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Binds the configured address and serves until `shutdown` completes.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> NfsResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!(addr = %listener.local_addr()?, "nfs server listening");
        self.serve(listener, shutdown).await
    }

    /// Accepts connections on `listener` until `shutdown` completes. Open connections are
    /// dropped on shutdown.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> NfsResult<()> {
        let mut connections = JoinSet::new();
        let reaper = tokio::spawn(reap_expired(self.dispatcher.clone()));
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("nfs server shutting down");
                    break Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(error) => break Err(error.into()),
                    };

                    let session = self.next_session.fetch_add(1, Ordering::Relaxed);
                    let dispatcher = self.dispatcher.clone();
                    let max_record_size = *self.config.get_max_record_size();
                    info!(%peer, session, "accepted connection");

                    connections.spawn(async move {
                        if let Err(error) =
                            handle_connection(stream, peer, session, dispatcher, max_record_size).await
                        {
                            warn!(%peer, session, %error, "connection failed");
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        };

        reaper.abort();
        connections.shutdown().await;
        result
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs one session. When the client goes away its in-flight requests are aborted and the open
/// state it created is released.
#[instrument(skip(stream, dispatcher, max_record_size))]
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    session: SessionId,
    dispatcher: Dispatcher,
    max_record_size: usize,
) -> NfsResult<()> {
    let (mut sink, mut records) = Framed::new(stream, RecordCodec::new(max_record_size)).split();
    let (replies, mut outbox) = mpsc::channel::<Bytes>(REPLY_QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(reply) = outbox.recv().await {
            sink.send(reply).await?;
        }
        NfsResult::Ok(())
    });

    let mut requests = JoinSet::new();
    let result = loop {
        tokio::select! {
            record = records.next() => match record {
                Some(Ok(record)) => {
                    let dispatcher = dispatcher.clone();
                    let replies = replies.clone();
                    requests.spawn(async move {
                        if let Some(reply) = handle_record(&dispatcher, record, session).await {
                            // The writer is gone only when the connection is.
                            let _ = replies.send(reply.to_bytes()).await;
                        }
                    });
                }
                Some(Err(error)) => break Err(error),
                None => break Ok(()),
            },
            Some(joined) = requests.join_next(), if !requests.is_empty() => {
                if let Err(error) = joined {
                    warn!(%error, "request task failed");
                }
            }
        }
    };

    requests.shutdown().await;
    drop(replies);
    match writer.await {
        Ok(Err(error)) => debug!(%error, "reply writer stopped"),
        Err(error) => warn!(%error, "reply writer failed"),
        Ok(Ok(())) => {}
    }

    match dispatcher.get_state().release_session(session) {
        Ok(released) => info!(released, "connection closed"),
        Err(status) => warn!(?status, "could not release session state"),
    }

    result
}

/// Decodes and answers one RPC record. Records that are not calls get no reply.
async fn handle_record(
    dispatcher: &Dispatcher,
    mut record: Bytes,
    session: SessionId,
) -> Option<RpcReply> {
    let xid = record
        .get(..4)
        .map(|xid| u32::from_be_bytes([xid[0], xid[1], xid[2], xid[3]]));

    match RpcCall::decode(&mut record) {
        Ok(call) => {
            debug!(xid = call.xid, procedure = call.procedure, "rpc call");
            Some(dispatcher.handle_call(&call, record, session).await)
        }
        Err(error) => {
            warn!(?xid, %error, "undecodable rpc call");
            xid.map(|xid| RpcReply::new(xid, ReplyBody::GarbageArgs))
        }
    }
}

/// Expires clients whose lease lapsed, twice per lease period.
async fn reap_expired(dispatcher: Dispatcher) {
    let lease = dispatcher.get_state().get_lease_duration();
    let mut interval = tokio::time::interval((lease / 2).max(MIN_REAP_INTERVAL));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match dispatcher.get_state().expire_clients() {
            Ok(expired) if !expired.is_empty() => info!(?expired, "expired client leases"),
            Ok(_) => {}
            Err(status) => warn!(?status, "lease sweep failed"),
        }
    }
}
