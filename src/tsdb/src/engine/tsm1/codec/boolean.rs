//! Boolean encoding uses 1 bit per value.  Each compressed byte slice has a
//! 1 byte header indicating the compression type, followed by a variable
//! byte encoded count of the values, followed by the packed bits.

use crate::engine::tsm1::codec::varint::{VarInt, MAX_VARINT_LEN64};
use crate::engine::tsm1::codec::{Decoder, Encoder};

/// BOOLEAN_COMPRESSED_BIT_PACKED is a bit-packed format.
const BOOLEAN_COMPRESSED_BIT_PACKED: u8 = 1;

/// BooleanEncoder encodes a series of booleans to a block payload.
pub struct BooleanEncoder {
    bytes: Vec<u8>,
    // The current byte being bit-packed
    b: u8,
    // The number of bits in b
    i: u32,
    // The total number of bools written
    n: u64,
}

impl BooleanEncoder {
    pub fn new(sz: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(sz / 8 + 1),
            b: 0,
            i: 0,
            n: 0,
        }
    }
}

impl Encoder<bool> for BooleanEncoder {
    fn write(&mut self, v: bool) {
        if v {
            self.b |= 128 >> self.i;
        }

        self.i += 1;
        self.n += 1;
        if self.i == 8 {
            self.bytes.push(self.b);
            self.b = 0;
            self.i = 0;
        }
    }

    fn flush(&mut self) {
        if self.i > 0 {
            self.bytes.push(self.b);
            self.b = 0;
            self.i = 0;
        }
    }

    fn bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        self.flush();

        let mut tmp = [0_u8; MAX_VARINT_LEN64];
        let sz = self.n.encode_var(&mut tmp);

        let mut out = Vec::with_capacity(1 + sz + self.bytes.len());
        out.push(BOOLEAN_COMPRESSED_BIT_PACKED << 4);
        out.extend_from_slice(&tmp[..sz]);
        out.extend_from_slice(&self.bytes);

        Ok(out)
    }
}

/// BooleanDecoder decodes a block payload of packed booleans.
pub struct BooleanDecoder<'a> {
    bytes: &'a [u8],
    i: i64,
    n: i64,

    err: Option<anyhow::Error>,
}

impl<'a> BooleanDecoder<'a> {
    pub fn new(b: &'a [u8]) -> anyhow::Result<Self> {
        if b.is_empty() {
            return Err(anyhow!("BooleanDecoder: no data found"));
        }

        // First byte stores the encoding type, only have 1 bit-packed format
        // currently so ignore for now.
        let b = &b[1..];
        let (count, n) = u64::decode_var(b)
            .ok_or_else(|| anyhow!("BooleanDecoder: invalid count"))?;

        Ok(Self {
            bytes: &b[n..],
            i: -1,
            n: count as i64,
            err: None,
        })
    }
}

impl<'a> Decoder<bool> for BooleanDecoder<'a> {
    fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        self.i += 1;
        if self.i >= self.n {
            return false;
        }

        if (self.i >> 3) as usize >= self.bytes.len() {
            self.err = Some(anyhow!("BooleanDecoder: not enough data"));
            return false;
        }

        true
    }

    fn read(&self) -> bool {
        // The mask to select the bit
        let mask = 128 >> (self.i & 7) as u8;

        // The packed byte
        let v = self.bytes[(self.i >> 3) as usize];

        v & mask == mask
    }

    fn err(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}
