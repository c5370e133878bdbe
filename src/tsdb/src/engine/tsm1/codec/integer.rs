//! Integer encoding uses two different strategies depending on the range of
//! values in the uncompressed data.  Encoded values are first encoded using
//! delta encoding, then zigzagged to handle negative deltas.  Equal deltas
//! are run-length encoded; deltas below 1 << 60 are packed with simple8b;
//! anything else is stored raw, 8 bytes each.
//!
//! The 4 high bits of the 1 byte header hold the encoding type.

use bytes::BufMut;

use crate::engine::tsm1::codec::varint::VarInt;
use crate::engine::tsm1::codec::zigzag::{zig_zag_decode, zig_zag_encode};
use crate::engine::tsm1::codec::{simple8b, Decoder, Encoder};

/// INT_UNCOMPRESSED is an uncompressed format using 8 bytes per value
pub const INT_UNCOMPRESSED: u8 = 0;
/// INT_COMPRESSED_SIMPLE is a bit-packed format using simple8b encoding
pub const INT_COMPRESSED_SIMPLE: u8 = 1;
/// INT_COMPRESSED_RLE is a run-length encoding format
pub const INT_COMPRESSED_RLE: u8 = 2;

/// IntegerEncoder encodes int64 values to a block payload.
pub struct IntegerEncoder {
    prev: i64,
    rle: bool,
    values: Vec<u64>,
}

impl IntegerEncoder {
    pub fn new(sz: usize) -> Self {
        Self {
            prev: 0,
            rle: true,
            values: Vec::with_capacity(sz),
        }
    }

    fn encode_rle(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(31);

        bytes.push(INT_COMPRESSED_RLE << 4);

        let mut tmp = [0_u8; 10];

        // The first value
        bytes.put_u64(self.values[0]);
        // The delta
        let mut sz = self.values[1].encode_var(&mut tmp);
        bytes.extend_from_slice(&tmp[..sz]);
        // The number of times the delta is repeated
        sz = ((self.values.len() - 1) as u64).encode_var(&mut tmp);
        bytes.extend_from_slice(&tmp[..sz]);

        Ok(bytes)
    }

    fn encode_packed(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut enc = simple8b::Encoder::new();
        for v in &self.values[1..] {
            enc.write(*v)?;
        }
        let deltas = enc.bytes()?;

        let mut bytes = Vec::with_capacity(1 + 8 + deltas.len());
        bytes.push(INT_COMPRESSED_SIMPLE << 4);

        // The first value, stored uncompressed
        bytes.put_u64(self.values[0]);
        bytes.extend_from_slice(&deltas);

        Ok(bytes)
    }

    fn encode_raw(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(1 + self.values.len() * 8);

        bytes.push(INT_UNCOMPRESSED << 4);
        for v in &self.values {
            bytes.put_u64(*v);
        }

        Ok(bytes)
    }
}

impl Encoder<i64> for IntegerEncoder {
    fn write(&mut self, v: i64) {
        // Delta-encode, then zigzag to fold negative deltas into the
        // unsigned range.
        let delta = v.wrapping_sub(self.prev);
        self.prev = v;
        let enc = zig_zag_encode(delta);
        if self.values.len() > 1 {
            self.rle = self.rle && self.values[self.values.len() - 1] == enc;
        }
        self.values.push(enc);
    }

    fn flush(&mut self) {}

    fn bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        if self.values.is_empty() {
            return Ok(vec![]);
        }

        // Only run-length encode if it could reduce storage size.
        if self.rle && self.values.len() > 2 {
            return self.encode_rle();
        }

        if self.values[1..].iter().any(|&v| v > simple8b::MAX_VALUE) {
            return self.encode_raw();
        }

        self.encode_packed()
    }
}

pub enum IntegerDecoder<'a> {
    Rle(RleDecoder),
    Packed(PackedDecoder<'a>),
    Uncompressed(UncompressedDecoder<'a>),
    Empty,
}

impl<'a> IntegerDecoder<'a> {
    pub fn new(b: &'a [u8]) -> anyhow::Result<Self> {
        if b.is_empty() {
            return Ok(IntegerDecoder::Empty);
        }

        let encoding = b[0] >> 4;
        let b = &b[1..];
        match encoding {
            INT_UNCOMPRESSED => Ok(IntegerDecoder::Uncompressed(UncompressedDecoder::new(b)?)),
            INT_COMPRESSED_SIMPLE => Ok(IntegerDecoder::Packed(PackedDecoder::new(b)?)),
            INT_COMPRESSED_RLE => Ok(IntegerDecoder::Rle(RleDecoder::new(b)?)),
            _ => Err(anyhow!("unknown integer encoding {}", encoding)),
        }
    }
}

impl<'a> Decoder<i64> for IntegerDecoder<'a> {
    fn next(&mut self) -> bool {
        match self {
            Self::Rle(d) => d.next(),
            Self::Packed(d) => d.next(),
            Self::Uncompressed(d) => d.next(),
            Self::Empty => false,
        }
    }

    fn read(&self) -> i64 {
        match self {
            Self::Rle(d) => d.read(),
            Self::Packed(d) => d.read(),
            Self::Uncompressed(d) => d.read(),
            Self::Empty => 0,
        }
    }

    fn err(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Rle(d) => d.err(),
            Self::Packed(d) => d.err(),
            Self::Uncompressed(d) => d.err(),
            Self::Empty => None,
        }
    }
}

pub struct RleDecoder {
    first: i64,
    delta: i64,
    repeat: u64,

    step: i64,
}

impl RleDecoder {
    pub fn new(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < 8 {
            return Err(anyhow!(
                "IntegerDecoder: not enough data to decode RLE starting value"
            ));
        }

        let mut i = 0;

        let first = u64::from_be_bytes(bytes[i..i + 8].try_into().unwrap());
        i += 8;

        let (delta, n) = u64::decode_var(&bytes[i..])
            .ok_or_else(|| anyhow!("IntegerDecoder: invalid delta in decodeRLE"))?;
        i += n;

        let (repeat, _n) = u64::decode_var(&bytes[i..])
            .ok_or_else(|| anyhow!("IntegerDecoder: invalid repeat value in decodeRLE"))?;

        Ok(Self {
            first: zig_zag_decode(first),
            delta: zig_zag_decode(delta),
            // repeat encodes how often the delta recurs after the first value
            repeat: repeat + 1,
            step: -1,
        })
    }
}

impl Decoder<i64> for RleDecoder {
    fn next(&mut self) -> bool {
        self.step += 1;

        if self.step >= self.repeat as i64 {
            return false;
        }

        if self.step > 0 {
            (self.first, _) = self.first.overflowing_add(self.delta);
        }

        true
    }

    fn read(&self) -> i64 {
        self.first
    }

    fn err(&self) -> Option<&anyhow::Error> {
        None
    }
}

pub struct PackedDecoder<'a> {
    value: i64,

    bytes: &'a [u8],
    b_step: usize,

    values: [u64; 240],
    v_step: usize,
    v_len: usize,

    err: Option<anyhow::Error>,
}

impl<'a> PackedDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> anyhow::Result<Self> {
        if bytes.len() < 8 {
            return Err(anyhow!(
                "IntegerDecoder: not enough data to decode packed starting value"
            ));
        }

        let first = u64::from_be_bytes(bytes[0..8].try_into().unwrap());

        Ok(Self {
            value: zig_zag_decode(first),
            bytes,
            b_step: 0,
            values: [0; 240],
            v_step: 0,
            v_len: 0,
            err: None,
        })
    }
}

impl<'a> Decoder<i64> for PackedDecoder<'a> {
    fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        if self.b_step == 0 {
            self.b_step = 8;
            return true;
        }

        if self.v_len > 0 && self.v_step < self.v_len - 1 {
            self.v_step += 1;
            self.value = self
                .value
                .wrapping_add(zig_zag_decode(self.values[self.v_step]));
            return true;
        }

        if self.b_step == self.bytes.len() {
            return false;
        } else if self.b_step + 8 > self.bytes.len() {
            self.err = Some(anyhow!(
                "IntegerDecoder: not enough data to decode packed value"
            ));
            return false;
        }

        let word = u64::from_be_bytes(self.bytes[self.b_step..self.b_step + 8].try_into().unwrap());
        match simple8b::decode(self.values.as_mut(), word) {
            Ok(0) => {
                self.err = Some(anyhow!("IntegerDecoder: simple8b length is 0"));
                return false;
            }
            Ok(n) => self.v_len = n,
            Err(e) => {
                self.err = Some(anyhow!(
                    "IntegerDecoder: failed to decode word {}: {}",
                    word,
                    e
                ));
                return false;
            }
        }

        self.v_step = 0;
        self.value = self
            .value
            .wrapping_add(zig_zag_decode(self.values[self.v_step]));
        self.b_step += 8;

        true
    }

    fn read(&self) -> i64 {
        self.value
    }

    fn err(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}

pub struct UncompressedDecoder<'a> {
    value: i64,

    bytes: &'a [u8],
    b_step: usize,

    err: Option<anyhow::Error>,
}

impl<'a> UncompressedDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> anyhow::Result<Self> {
        if bytes.len() < 8 {
            return Err(anyhow!(
                "IntegerDecoder: not enough data to decode raw starting value"
            ));
        }

        let first = u64::from_be_bytes(bytes[..8].try_into().unwrap());

        Ok(Self {
            value: zig_zag_decode(first),
            bytes,
            b_step: 0,
            err: None,
        })
    }
}

impl<'a> Decoder<i64> for UncompressedDecoder<'a> {
    fn next(&mut self) -> bool {
        if self.b_step == 0 {
            self.b_step += 8;
            return true;
        }

        if self.b_step == self.bytes.len() {
            return false;
        } else if self.b_step + 8 > self.bytes.len() {
            self.err = Some(anyhow!(
                "IntegerDecoder: not enough data to decode raw value"
            ));
            return false;
        }

        let v = u64::from_be_bytes(self.bytes[self.b_step..self.b_step + 8].try_into().unwrap());
        self.value = self.value.wrapping_add(zig_zag_decode(v));
        self.b_step += 8;

        true
    }

    fn read(&self) -> i64 {
        self.value
    }

    fn err(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}

/// Unsigned values are reinterpreted as int64 and stored with the integer
/// codec; the wrappers only cast at the boundary.
pub struct UnsignedEncoder {
    enc: IntegerEncoder,
}

impl UnsignedEncoder {
    pub fn new(sz: usize) -> Self {
        Self {
            enc: IntegerEncoder::new(sz),
        }
    }
}

impl Encoder<u64> for UnsignedEncoder {
    fn write(&mut self, v: u64) {
        self.enc.write(v as i64);
    }

    fn flush(&mut self) {
        self.enc.flush();
    }

    fn bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        self.enc.bytes()
    }
}

pub struct UnsignedDecoder<'a> {
    dec: IntegerDecoder<'a>,
}

impl<'a> UnsignedDecoder<'a> {
    pub fn new(b: &'a [u8]) -> anyhow::Result<Self> {
        IntegerDecoder::new(b).map(|dec| Self { dec })
    }
}

impl<'a> Decoder<u64> for UnsignedDecoder<'a> {
    fn next(&mut self) -> bool {
        self.dec.next()
    }

    fn read(&self) -> u64 {
        self.dec.read() as u64
    }

    fn err(&self) -> Option<&anyhow::Error> {
        self.dec.err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[i64]) -> Vec<u8> {
        let mut enc = IntegerEncoder::new(values.len());
        for &v in values {
            enc.write(v);
        }
        let b = enc.bytes().unwrap();

        let mut dec = IntegerDecoder::new(&b).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert!(dec.next(), "next == false at item {}", i);
            assert_eq!(dec.read(), v, "item {} mismatch", i);
        }
        assert!(!dec.next(), "unexpected extra value");
        assert!(dec.err().is_none());
        b
    }

    #[test]
    fn test_integer_encoder_no_values() {
        let mut enc = IntegerEncoder::new(0);
        let b = enc.bytes().unwrap();

        let mut dec = IntegerDecoder::new(&b).unwrap();
        assert!(!dec.next(), "unexpected next value: got true, exp false");
    }

    #[test]
    fn test_integer_encoder_one() {
        let b = round_trip(&[42]);
        assert_eq!(b[0] >> 4, INT_COMPRESSED_SIMPLE);
    }

    #[test]
    fn test_integer_encoder_rle() {
        let values: Vec<i64> = (0..100).map(|i| i * 10).collect();
        let b = round_trip(&values);
        assert_eq!(b[0] >> 4, INT_COMPRESSED_RLE);
    }

    #[test]
    fn test_integer_encoder_packed() {
        let b = round_trip(&[15, 30, 45, 46, 47, 60]);
        assert_eq!(b[0] >> 4, INT_COMPRESSED_SIMPLE);
    }

    #[test]
    fn test_integer_encoder_negative() {
        round_trip(&[-10, 0, 10, -20, 30]);
    }

    #[test]
    fn test_integer_encoder_raw() {
        let b = round_trip(&[0, i64::MAX, 0, i64::MIN]);
        assert_eq!(b[0] >> 4, INT_UNCOMPRESSED);
    }

    #[test]
    fn test_integer_encoder_extremes() {
        round_trip(&[i64::MIN, i64::MAX, i64::MIN, i64::MAX]);
    }

    #[test]
    fn test_unsigned_round_trip() {
        let values = [0_u64, 45, 60, u64::MAX, 1 << 63];

        let mut enc = UnsignedEncoder::new(values.len());
        for &v in &values {
            enc.write(v);
        }
        let b = enc.bytes().unwrap();

        let mut dec = UnsignedDecoder::new(&b).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert!(dec.next(), "next == false at item {}", i);
            assert_eq!(dec.read(), v, "item {} mismatch", i);
        }
        assert!(!dec.next());
    }
}
