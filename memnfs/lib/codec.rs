//! ONC RPC record marking over TCP, RFC 5531 section 11

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::NfsError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Set in a fragment header when the fragment ends the record.
const LAST_FRAGMENT: u32 = 0x8000_0000;

/// Largest fragment length a header can carry.
const MAX_FRAGMENT_LEN: usize = 0x7fff_ffff;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Splits a TCP byte stream into RPC records and frames outgoing records.
///
/// Incoming records may span any number of fragments; they are reassembled before being handed
/// out. A record that would grow past `max_record_size` is a protocol error.
#[derive(Debug)]
pub struct RecordCodec {
    max_record_size: usize,
    record: BytesMut,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RecordCodec {
    /// Creates a codec accepting records of up to `max_record_size` bytes.
    pub fn new(max_record_size: usize) -> Self {
        Self {
            max_record_size,
            record: BytesMut::new(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Decoder for RecordCodec {
    type Item = Bytes;
    type Error = NfsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 4 {
                return Ok(None);
            }

            let header = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
            let last = header & LAST_FRAGMENT != 0;
            let len = (header & !LAST_FRAGMENT) as usize;

            let size = self.record.len() + len;
            if size > self.max_record_size {
                return Err(NfsError::RecordTooLarge {
                    size,
                    limit: self.max_record_size,
                });
            }

            if src.len() < 4 + len {
                src.reserve(4 + len - src.len());
                return Ok(None);
            }

            src.advance(4);
            self.record.extend_from_slice(&src.split_to(len));

            if last {
                return Ok(Some(self.record.split().freeze()));
            }
        }
    }
}

impl Encoder<Bytes> for RecordCodec {
    type Error = NfsError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 4 * (item.len() / MAX_FRAGMENT_LEN + 1));

        let mut chunks = item.chunks(MAX_FRAGMENT_LEN).peekable();
        if chunks.peek().is_none() {
            dst.put_u32(LAST_FRAGMENT);
            return Ok(());
        }

        while let Some(chunk) = chunks.next() {
            let last = if chunks.peek().is_none() { LAST_FRAGMENT } else { 0 };
            dst.put_u32(last | chunk.len() as u32);
            dst.put_slice(chunk);
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
