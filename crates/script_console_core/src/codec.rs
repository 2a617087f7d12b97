//! Length-prefixed payload decoding and raw body marshalling.

use crate::bus::MessageArgs;
use crate::{ConsoleError, Result};
use serde::{Deserialize, Serialize};

pub const LENGTH_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    pub fn decode_u32(self, raw: [u8; 4]) -> u32 {
        match self {
            Endianness::Little => u32::from_le_bytes(raw),
            Endianness::Big => u32::from_be_bytes(raw),
        }
    }

    pub fn decode_u16(self, raw: [u8; 2]) -> u16 {
        match self {
            Endianness::Little => u16::from_le_bytes(raw),
            Endianness::Big => u16::from_be_bytes(raw),
        }
    }

    pub fn encode_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        }
    }

    pub fn encode_u16(self, value: u16) -> [u8; 2] {
        match self {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        }
    }
}

/// Streams exactly `len` bytes out of `args`, handing each transport
/// fragment to `sink` as it arrives.
pub fn stream_payload<A, F>(args: &mut A, len: usize, mut sink: F) -> Result<()>
where
    A: MessageArgs + ?Sized,
    F: FnMut(&[u8]) -> Result<()>,
{
    let mut remaining = len;
    while remaining > 0 {
        let chunk = args.unmarshal_raw(remaining)?;
        if chunk.is_empty() {
            return Err(ConsoleError::truncated(len, len - remaining));
        }
        let taken = chunk.len().min(remaining);
        sink(&chunk[..taken])?;
        remaining -= taken;
    }
    Ok(())
}

pub fn read_exact_raw<A: MessageArgs + ?Sized>(args: &mut A, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    stream_payload(args, buf.len(), |chunk| {
        buf[filled..filled + chunk.len()].copy_from_slice(chunk);
        filled += chunk.len();
        Ok(())
    })
}

/// Reads the 4-byte length prefix of a byte-array argument, correcting for
/// the sender's byte order.
pub fn read_length_prefix<A: MessageArgs + ?Sized>(
    args: &mut A,
    endianness: Endianness,
) -> Result<u32> {
    let mut raw = [0u8; LENGTH_PREFIX_LEN];
    read_exact_raw(args, &mut raw)?;
    Ok(endianness.decode_u32(raw))
}

pub fn read_payload<A: MessageArgs + ?Sized>(args: &mut A, len: usize) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(len);
    stream_payload(args, len, |chunk| {
        payload.extend_from_slice(chunk);
        Ok(())
    })?;
    Ok(payload)
}

/// Consumes and discards `len` payload bytes so the argument stream stays
/// aligned after a rejected payload.
pub fn drain_payload<A: MessageArgs + ?Sized>(args: &mut A, len: usize) -> Result<()> {
    stream_payload(args, len, |_| Ok(()))
}

pub fn strip_trailing_nuls(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    &bytes[..end]
}

/// Outbound body whose total size is declared before any bytes are
/// marshalled.
#[derive(Debug)]
pub struct RawBody {
    declared: usize,
    bytes: Vec<u8>,
}

impl RawBody {
    pub fn with_declared_len(declared: usize) -> Self {
        Self {
            declared,
            bytes: Vec::with_capacity(declared),
        }
    }

    pub fn marshal_raw(&mut self, data: &[u8]) -> Result<()> {
        let remaining = self.declared - self.bytes.len();
        if data.len() > remaining {
            return Err(ConsoleError::CapacityExceeded {
                needed: data.len(),
                remaining,
            });
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        if self.bytes.len() != self.declared {
            return Err(ConsoleError::truncated(self.declared, self.bytes.len()));
        }
        Ok(self.bytes)
    }
}

/// In-memory argument stream, tagged with the sender's byte order and
/// handed out in fragments of at most `fragment_size` bytes.
///
/// Strings are a `u32` length, the bytes and a NUL; byte arrays are a `u32`
/// length followed by the bytes.
#[derive(Debug, Clone)]
pub struct WireArgs {
    bytes: Vec<u8>,
    pos: usize,
    fragment_size: usize,
    endianness: Endianness,
}

impl WireArgs {
    pub fn new(endianness: Endianness) -> Self {
        Self {
            bytes: Vec::new(),
            pos: 0,
            fragment_size: usize::MAX,
            endianness,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, endianness: Endianness) -> Self {
        Self {
            bytes,
            ..Self::new(endianness)
        }
    }

    pub fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size.max(1);
        self
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn push_u8(mut self, value: u8) -> Self {
        self.bytes.push(value);
        self
    }

    pub fn push_u16(mut self, value: u16) -> Self {
        let raw = self.endianness.encode_u16(value);
        self.bytes.extend_from_slice(&raw);
        self
    }

    pub fn push_u32(mut self, value: u32) -> Self {
        let raw = self.endianness.encode_u32(value);
        self.bytes.extend_from_slice(&raw);
        self
    }

    pub fn push_string(self, value: &str) -> Self {
        let mut this = self.push_u32(value.len() as u32);
        this.bytes.extend_from_slice(value.as_bytes());
        this.bytes.push(0);
        this
    }

    pub fn push_bytes(self, value: &[u8]) -> Self {
        let mut this = self.push_u32(value.len() as u32);
        this.bytes.extend_from_slice(value);
        this
    }

    /// Appends raw bytes with no length prefix, e.g. a lying prefix followed
    /// by a short body.
    pub fn push_raw(mut self, value: &[u8]) -> Self {
        self.bytes.extend_from_slice(value);
        self
    }

    fn take_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut raw = [0u8; N];
        read_exact_raw(self, &mut raw)?;
        Ok(raw)
    }
}

impl MessageArgs for WireArgs {
    fn unmarshal_raw(&mut self, max: usize) -> Result<&[u8]> {
        let take = max.min(self.fragment_size).min(self.remaining());
        let start = self.pos;
        self.pos += take;
        Ok(&self.bytes[start..start + take])
    }

    fn unmarshal_u8(&mut self) -> Result<u8> {
        let [value] = self.take_exact::<1>()?;
        Ok(value)
    }

    fn unmarshal_u16(&mut self) -> Result<u16> {
        let raw = self.take_exact::<2>()?;
        Ok(self.endianness.decode_u16(raw))
    }

    fn unmarshal_u32(&mut self) -> Result<u32> {
        let raw = self.take_exact::<4>()?;
        Ok(self.endianness.decode_u32(raw))
    }

    fn unmarshal_string(&mut self) -> Result<String> {
        let len = self.unmarshal_u32()? as usize;
        let bytes = read_payload(self, len)?;
        let terminator = self.unmarshal_u8()?;
        if terminator != 0 {
            return Err(ConsoleError::InvalidArgument(
                "string argument is not NUL terminated".into(),
            ));
        }
        String::from_utf8(bytes)
            .map_err(|e| ConsoleError::InvalidArgument(format!("string is not UTF-8: {e}")))
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}
