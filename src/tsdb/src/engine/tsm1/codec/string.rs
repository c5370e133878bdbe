//! String encoding uses snappy compression to compress each string.  Each
//! string is appended to a byte slice prefixed with a variable byte length
//! followed by the string bytes.  The slice is compressed as one snappy
//! block and a 1 byte header indicates the type of encoding.

use crate::engine::tsm1::codec::varint::VarInt;
use crate::engine::tsm1::codec::{Decoder, Encoder};

/// STRING_COMPRESSED_SNAPPY is a compressed encoding using Snappy compression
const STRING_COMPRESSED_SNAPPY: u8 = 1;

/// StringEncoder encodes multiple strings into a block payload.
pub struct StringEncoder {
    // The accumulated uncompressed bytes
    bytes: Vec<u8>,
}

impl StringEncoder {
    pub fn new(sz: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(sz),
        }
    }
}

impl<'a> Encoder<&'a [u8]> for StringEncoder {
    fn write(&mut self, s: &'a [u8]) {
        let mut b = [0_u8; 10];

        // Append the length of the string using variable byte encoding
        let i = (s.len() as u64).encode_var(&mut b);
        self.bytes.extend_from_slice(&b[..i]);

        // Append the string bytes
        self.bytes.extend_from_slice(s);
    }

    fn flush(&mut self) {}

    fn bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        let max_encoded_len = snap::raw::max_compress_len(self.bytes.len());
        if max_encoded_len == 0 {
            return Err(anyhow!("StringEncoder: source length too large"));
        }

        let mut compressed = vec![0_u8; max_encoded_len + 1];
        compressed[0] = STRING_COMPRESSED_SNAPPY << 4;

        let mut encoder = snap::raw::Encoder::new();
        let n = encoder
            .compress(self.bytes.as_slice(), &mut compressed[1..])
            .map_err(|e| anyhow!(e))?;

        compressed.truncate(1 + n);
        Ok(compressed)
    }
}

/// StringDecoder decodes a block payload into strings.
pub struct StringDecoder {
    b: Vec<u8>,
    l: usize,
    i: usize,

    lower: usize,
    upper: usize,

    err: Option<anyhow::Error>,
}

impl StringDecoder {
    pub fn new(b: &[u8]) -> anyhow::Result<Self> {
        if b.is_empty() {
            return Err(anyhow!("StringDecoder: no data found"));
        }

        // First byte stores the encoding type, only have snappy format
        // currently so ignore for now.
        let mut decoder = snap::raw::Decoder::new();
        let decoded = decoder.decompress_vec(&b[1..]).map_err(|e| anyhow!(e))?;

        Ok(Self {
            b: decoded,
            l: 0,
            i: 0,
            lower: 0,
            upper: 0,
            err: None,
        })
    }

    fn read_range(&mut self) -> anyhow::Result<(usize, usize)> {
        // Read the length of the string
        let (length, n) = u64::decode_var(&self.b[self.i..])
            .ok_or_else(|| anyhow!("StringDecoder: invalid encoded string length"))?;

        // The length of this string plus the length of the variable byte encoded length
        self.l = (length as usize) + n;

        let lower = self.i + n;
        let upper = lower + (length as usize);
        if upper < lower {
            return Err(anyhow!("StringDecoder: length overflow"));
        }
        if upper > self.b.len() {
            return Err(anyhow!(
                "StringDecoder: not enough data to represent encoded string"
            ));
        }

        Ok((lower, upper))
    }
}

impl Decoder<Vec<u8>> for StringDecoder {
    fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        self.i += self.l;
        if self.i >= self.b.len() {
            return false;
        }

        match self.read_range() {
            Ok((lower, upper)) => {
                self.lower = lower;
                self.upper = upper;
                true
            }
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    fn read(&self) -> Vec<u8> {
        self.b[self.lower..self.upper].to_vec()
    }

    fn err(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}
