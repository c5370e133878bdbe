//! Timestamp encoding is adaptive and based on structure of the timestamps
//! that are encoded.  Values are first delta encoded.  If the deltas share a
//! largest common divisor that is a power of ten they are scaled down by it.
//! Equal deltas are run-length encoded; small deltas are packed with
//! simple8b; anything else is stored raw, 8 bytes each.
//!
//! Each payload has a 1 byte header: the 4 high bits hold the encoding type,
//! the 4 low bits the log10 of the scaling factor.

use bytes::BufMut;

use crate::engine::tsm1::codec::varint::VarInt;
use crate::engine::tsm1::codec::{simple8b, Decoder, Encoder};

/// TIME_UNCOMPRESSED is an uncompressed format using 8 bytes per timestamp
pub const TIME_UNCOMPRESSED: u8 = 0;
/// TIME_COMPRESSED_PACKED_SIMPLE is a bit-packed format using simple8b encoding
pub const TIME_COMPRESSED_PACKED_SIMPLE: u8 = 1;
/// TIME_COMPRESSED_RLE is a run-length encoding format
pub const TIME_COMPRESSED_RLE: u8 = 2;

/// TimeEncoder encodes unix nanosecond timestamps to a block payload.
pub struct TimeEncoder {
    ts: Vec<u64>,
    enc: simple8b::Encoder,
}

impl TimeEncoder {
    pub fn new(sz: usize) -> Self {
        Self {
            ts: Vec::with_capacity(sz),
            enc: simple8b::Encoder::new(),
        }
    }

    /// reduce delta-encodes the buffered timestamps in place and returns the
    /// maximum delta, the largest power-of-ten divisor common to all deltas,
    /// and whether the deltas are all equal.
    fn reduce(&mut self) -> (u64, u64, bool) {
        let deltas = self.ts.as_mut_slice();

        let mut max = 0_u64;
        let mut divisor = 1_000_000_000_000_u64; // 1e12
        let mut rle = true;

        // Iterate in reverse so we can apply deltas in place
        for i in (1..deltas.len()).rev() {
            (deltas[i], _) = deltas[i].overflowing_sub(deltas[i - 1]);

            let v = deltas[i];
            if v > max {
                max = v;
            }

            while divisor > 1 && v % divisor != 0 {
                divisor /= 10;
            }

            rle = i == deltas.len() - 1 || rle && (deltas[i + 1] == deltas[i]);
        }

        (max, divisor, rle)
    }

    fn encode_packed(&mut self, div: u64) -> anyhow::Result<Vec<u8>> {
        // Only apply the divisor if it's greater than 1 since division is expensive.
        if div > 1 {
            for v in &self.ts[1..] {
                self.enc.write(*v / div)?;
            }
        } else {
            for v in &self.ts[1..] {
                self.enc.write(*v)?;
            }
        }

        let deltas = self.enc.bytes()?;

        let mut bytes = Vec::with_capacity(8 + 1 + deltas.len());

        // 4 high bits hold the encoding type, 4 low bits the log10 divisor
        bytes.push((TIME_COMPRESSED_PACKED_SIMPLE << 4) | ((div as f64).log10()) as u8);

        // The first timestamp, stored uncompressed
        bytes.put_u64(self.ts[0]);
        bytes.extend_from_slice(&deltas);

        Ok(bytes)
    }

    fn encode_raw(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(1 + self.ts.len() * 8);

        bytes.push(TIME_UNCOMPRESSED << 4);
        for v in &self.ts {
            bytes.put_u64(*v);
        }

        Ok(bytes)
    }

    fn encode_rle(&mut self, first: u64, delta: u64, div: u64) -> anyhow::Result<Vec<u8>> {
        // Large varints can take up to 10 bytes, we're encoding 2 + 1 byte type
        let mut bytes = Vec::with_capacity(31);

        bytes.push((TIME_COMPRESSED_RLE << 4) | ((div as f64).log10()) as u8);

        let mut tmp = [0_u8; 10];

        // The first timestamp
        bytes.put_u64(first);
        // The scaled-down delta
        let mut sz = (delta / div).encode_var(&mut tmp);
        bytes.extend_from_slice(&tmp[..sz]);
        // The total number of timestamps
        sz = (self.ts.len() as u64).encode_var(&mut tmp);
        bytes.extend_from_slice(&tmp[..sz]);

        Ok(bytes)
    }
}

impl Encoder<i64> for TimeEncoder {
    fn write(&mut self, v: i64) {
        self.ts.push(v as u64);
    }

    fn flush(&mut self) {}

    fn bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        if self.ts.is_empty() {
            return Ok(vec![]);
        }

        let (max, div, rle) = self.reduce();

        if rle && self.ts.len() > 1 {
            return self.encode_rle(self.ts[0], self.ts[1], div);
        }

        if max > simple8b::MAX_VALUE {
            return self.encode_raw();
        }

        self.encode_packed(div)
    }
}

pub enum TimeDecoder<'a> {
    Rle(RleDecoder),
    Packed(PackedDecoder<'a>),
    Uncompressed(UncompressedDecoder<'a>),
    Empty(EmptyDecoder),
}

impl<'a> TimeDecoder<'a> {
    pub fn new(b: &'a [u8]) -> anyhow::Result<Self> {
        if b.is_empty() {
            return Ok(TimeDecoder::Empty(EmptyDecoder {}));
        }

        let encoding = b[0] >> 4;
        // Lower 4 bits hold the 10 based exponent so we can scale the values back up
        let div = u64::pow(10, (b[0] & 0xF) as u32);

        let b = &b[1..];
        match encoding {
            TIME_UNCOMPRESSED => Ok(TimeDecoder::Uncompressed(UncompressedDecoder::new(b)?)),
            TIME_COMPRESSED_PACKED_SIMPLE => Ok(TimeDecoder::Packed(PackedDecoder::new(b, div)?)),
            TIME_COMPRESSED_RLE => Ok(TimeDecoder::Rle(RleDecoder::new(b, div)?)),
            _ => Err(anyhow!("unknown timestamp encoding {}", encoding)),
        }
    }
}

impl<'a> Decoder<i64> for TimeDecoder<'a> {
    fn next(&mut self) -> bool {
        match self {
            Self::Rle(d) => d.next(),
            Self::Packed(d) => d.next(),
            Self::Uncompressed(d) => d.next(),
            Self::Empty(d) => d.next(),
        }
    }

    fn read(&self) -> i64 {
        match self {
            Self::Rle(d) => d.read(),
            Self::Packed(d) => d.read(),
            Self::Uncompressed(d) => d.read(),
            Self::Empty(d) => d.read(),
        }
    }

    fn err(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Rle(d) => d.err(),
            Self::Packed(d) => d.err(),
            Self::Uncompressed(d) => d.err(),
            Self::Empty(d) => d.err(),
        }
    }
}

pub struct EmptyDecoder {}

impl Decoder<i64> for EmptyDecoder {
    fn next(&mut self) -> bool {
        false
    }

    fn read(&self) -> i64 {
        0
    }

    fn err(&self) -> Option<&anyhow::Error> {
        None
    }
}

pub struct RleDecoder {
    first: i64,
    delta: i64,
    repeat: u64,

    step: i64,
}

impl RleDecoder {
    pub fn new(bytes: &[u8], div: u64) -> anyhow::Result<Self> {
        if bytes.len() < 8 {
            return Err(anyhow!(
                "TimeDecoder: not enough data to decode RLE starting value"
            ));
        }

        let mut i = 0;

        // Next 8 bytes is the starting timestamp
        let first = u64::from_be_bytes(bytes[i..i + 8].try_into().unwrap());
        i += 8;

        // Next 1-10 bytes is the delta value
        let (mut delta, n) = u64::decode_var(&bytes[i..])
            .ok_or_else(|| anyhow!("TimeDecoder: invalid run length in decodeRLE"))?;
        delta *= div;
        i += n;

        // Last 1-10 bytes is how many times the value repeats
        let (repeat, _n) = u64::decode_var(&bytes[i..])
            .ok_or_else(|| anyhow!("TimeDecoder: invalid repeat value in decodeRLE"))?;

        Ok(Self {
            first: first as i64,
            delta: delta as i64,
            repeat,
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
    first: i64,
    div: u64,

    bytes: &'a [u8],
    b_step: usize,

    values: [u64; 240],
    v_step: usize,
    v_len: usize,

    err: Option<anyhow::Error>,
}

impl<'a> PackedDecoder<'a> {
    pub fn new(bytes: &'a [u8], div: u64) -> anyhow::Result<Self> {
        if bytes.len() < 8 {
            return Err(anyhow!(
                "TimeDecoder: not enough data to decode packed starting value"
            ));
        }

        let first = u64::from_be_bytes(bytes[0..8].try_into().unwrap());

        Ok(Self {
            first: first as i64,
            div,
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
            self.first = self
                .first
                .wrapping_add((self.values[self.v_step] * self.div) as i64);
            return true;
        }

        if self.b_step == self.bytes.len() {
            return false;
        } else if self.b_step + 8 > self.bytes.len() {
            self.err = Some(anyhow!(
                "TimeDecoder: not enough data to decode packed value"
            ));
            return false;
        }

        let word = u64::from_be_bytes(self.bytes[self.b_step..self.b_step + 8].try_into().unwrap());
        match simple8b::decode(self.values.as_mut(), word) {
            Ok(0) => {
                self.err = Some(anyhow!("TimeDecoder: simple8b length is 0"));
                return false;
            }
            Ok(n) => self.v_len = n,
            Err(e) => {
                self.err = Some(anyhow!("TimeDecoder: failed to decode word {}: {}", word, e));
                return false;
            }
        }

        self.v_step = 0;
        self.first = self
            .first
            .wrapping_add((self.values[self.v_step] * self.div) as i64);
        self.b_step += 8;

        true
    }

    fn read(&self) -> i64 {
        self.first
    }

    fn err(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}

pub struct UncompressedDecoder<'a> {
    first: i64,

    bytes: &'a [u8],
    b_step: usize,

    err: Option<anyhow::Error>,
}

impl<'a> UncompressedDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> anyhow::Result<Self> {
        if bytes.len() < 8 {
            return Err(anyhow!(
                "TimeDecoder: not enough data to decode raw starting value"
            ));
        }

        let first = u64::from_be_bytes(bytes[..8].try_into().unwrap());

        Ok(Self {
            first: first as i64,
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
            self.err = Some(anyhow!("TimeDecoder: not enough data to decode raw value"));
            return false;
        }

        let v = u64::from_be_bytes(self.bytes[self.b_step..self.b_step + 8].try_into().unwrap());
        (self.first, _) = self.first.overflowing_add(v as i64);
        self.b_step += 8;

        true
    }

    fn read(&self) -> i64 {
        self.first
    }

    fn err(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}

/// count_timestamps returns the number of timestamps encoded in a payload
/// without decoding them.
pub fn count_timestamps(b: &[u8]) -> anyhow::Result<usize> {
    if b.is_empty() {
        return Err(anyhow!("count_timestamps: no data found"));
    }

    let encoding = b[0] >> 4;
    match encoding {
        TIME_UNCOMPRESSED => {
            // Uncompressed timestamps are just 8 bytes each
            Ok((b.len() - 1) / 8)
        }
        TIME_COMPRESSED_RLE => {
            // First 9 bytes are the starting timestamp and scaling factor, skip over them
            let mut i = 9;
            let (_, n) = u64::decode_var(&b[i..])
                .ok_or_else(|| anyhow!("count_timestamps: can not decode delta"))?;
            i += n;
            let (count, _) = u64::decode_var(&b[i..])
                .ok_or_else(|| anyhow!("count_timestamps: can not decode repeat"))?;

            Ok(count as usize)
        }
        TIME_COMPRESSED_PACKED_SIMPLE => {
            // First 9 bytes are the starting timestamp and scaling factor, skip over them
            let count = simple8b::count_bytes(&b[9..])?;
            // +1 for the uncompressed starting timestamp in b[1:9]
            Ok(count + 1)
        }
        _ => Err(anyhow!(
            "count_timestamps: unsupported encoding {}",
            encoding
        )),
    }
}
