//! XDR (External Data Representation) encoding, RFC 4506

use bytes::{Buf, BufMut, Bytes};

use crate::{NfsError, NfsResult};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Trait for types that can be encoded to XDR format
pub trait XdrEncode {
    /// Encode self into XDR format
    fn encode<B: BufMut>(&self, buf: &mut B);
}

/// Trait for types that can be decoded from XDR format
pub trait XdrDecode: Sized {
    /// Decode self from XDR format. Fails instead of panicking on truncated input.
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self>;
}

//--------------------------------------------------------------------------------------------------
// Modules
//--------------------------------------------------------------------------------------------------

/// Helper functions for XDR encoding/decoding
pub mod helpers {
    use super::*;

    /// Number of zero bytes that pad `len` to a 4-byte boundary.
    pub fn padding(len: usize) -> usize {
        (4 - (len % 4)) % 4
    }

    /// Fails unless `buf` holds at least `len` more bytes.
    pub fn ensure<B: Buf>(buf: &B, len: usize) -> NfsResult<()> {
        if buf.remaining() < len {
            return Err(NfsError::Xdr(format!(
                "need {len} bytes, {} remaining",
                buf.remaining()
            )));
        }
        Ok(())
    }

    /// Encode fixed-length opaque data, padded to a 4-byte boundary
    pub fn encode_fixed<B: BufMut>(bytes: &[u8], buf: &mut B) {
        buf.put_slice(bytes);
        buf.put_bytes(0, padding(bytes.len()));
    }

    /// Decode fixed-length opaque data
    pub fn decode_fixed<const N: usize, B: Buf>(buf: &mut B) -> NfsResult<[u8; N]> {
        ensure(buf, N + padding(N))?;
        let mut bytes = [0; N];
        buf.copy_to_slice(&mut bytes);
        buf.advance(padding(N));
        Ok(bytes)
    }

    /// Encode variable-length opaque data
    pub fn encode_opaque<B: BufMut>(bytes: &[u8], buf: &mut B) {
        buf.put_u32(bytes.len() as u32);
        encode_fixed(bytes, buf);
    }

    /// Decode variable-length opaque data of at most `max` bytes
    pub fn decode_opaque<B: Buf>(buf: &mut B, max: usize) -> NfsResult<Bytes> {
        let len = u32::decode(buf)? as usize;
        if len > max {
            return Err(NfsError::Xdr(format!("opaque of {len} bytes exceeds {max}")));
        }

        ensure(buf, len + padding(len))?;
        let bytes = buf.copy_to_bytes(len);
        buf.advance(padding(len));
        Ok(bytes)
    }

    /// Encode a string to XDR format
    pub fn encode_string<B: BufMut>(s: &str, buf: &mut B) {
        encode_opaque(s.as_bytes(), buf);
    }

    /// Decode a UTF-8 string of at most `max` bytes from XDR format
    pub fn decode_string<B: Buf>(buf: &mut B, max: usize) -> NfsResult<String> {
        let bytes = decode_opaque(buf, max)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| NfsError::Xdr(format!("invalid utf-8: {e}")))
    }

    /// Encode a counted array
    pub fn encode_array<T: XdrEncode, B: BufMut>(items: &[T], buf: &mut B) {
        buf.put_u32(items.len() as u32);
        for item in items {
            item.encode(buf);
        }
    }

    /// Decode a counted array of at most `max` elements
    pub fn decode_array<T: XdrDecode, B: Buf>(buf: &mut B, max: usize) -> NfsResult<Vec<T>> {
        let len = u32::decode(buf)? as usize;
        if len > max {
            return Err(NfsError::Xdr(format!("array of {len} elements exceeds {max}")));
        }

        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::decode(buf)?);
        }
        Ok(items)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl XdrEncode for u32 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(*self);
    }
}

impl XdrDecode for u32 {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        helpers::ensure(buf, 4)?;
        Ok(buf.get_u32())
    }
}

impl XdrEncode for i32 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(*self);
    }
}

impl XdrDecode for i32 {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        helpers::ensure(buf, 4)?;
        Ok(buf.get_i32())
    }
}

impl XdrEncode for u64 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64(*self);
    }
}

impl XdrDecode for u64 {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        helpers::ensure(buf, 8)?;
        Ok(buf.get_u64())
    }
}

impl XdrEncode for i64 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64(*self);
    }
}

impl XdrDecode for i64 {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        helpers::ensure(buf, 8)?;
        Ok(buf.get_i64())
    }
}

impl XdrEncode for bool {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(u32::from(*self));
    }
}

impl XdrDecode for bool {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        match u32::decode(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(NfsError::Xdr(format!("invalid boolean {other}"))),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
