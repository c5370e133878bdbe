//! Float encoding uses the Facebook Gorilla XOR scheme.  Each value is
//! XORed against the previous one; a zero XOR is stored as a single bit,
//! otherwise the meaningful bits are stored either inside the previous
//! leading/trailing window or preceded by a new 5-bit leading-zero count and
//! 6-bit significant-bit count.  The stream is terminated by an encoded NaN
//! sentinel.

use crate::engine::tsm1::codec::bit;
use crate::engine::tsm1::codec::{Decoder, Encoder};

/// FLOAT_COMPRESSED_GORILLA is a compressed format using the gorilla paper encoding
pub const FLOAT_COMPRESSED_GORILLA: u8 = 1;

/// The sentinel NaN bit pattern that terminates a gorilla stream.
const UVNAN: u64 = 0x7FF8000000000001;

/// FloatEncoder encodes multiple float64s to a block payload.
pub struct FloatEncoder {
    val: u64,
    leading: u32,
    trailing: u32,

    buf: bit::Writer,

    first: bool,
    finished: bool,
}

impl FloatEncoder {
    pub fn new() -> Self {
        let mut buf = bit::Writer::with_capacity(64);
        // The first byte of the payload holds the compression type.
        buf.write_bits((FLOAT_COMPRESSED_GORILLA << 4) as u64, 8);

        Self {
            val: 0,
            leading: u32::MAX,
            trailing: 0,
            buf,
            first: true,
            finished: false,
        }
    }

    fn push(&mut self, v: f64) {
        let vbits = v.to_bits();

        if self.first {
            self.val = vbits;
            self.first = false;
            self.buf.write_bits(vbits, 64);
            return;
        }

        let delta = vbits ^ self.val;
        if delta == 0 {
            self.buf.write_bit(false);
        } else {
            self.buf.write_bit(true);

            let mut leading = delta.leading_zeros();
            let trailing = delta.trailing_zeros();

            // Clamp so the count fits in 5 bits.
            if leading >= 32 {
                leading = 31;
            }

            if self.leading != u32::MAX && leading >= self.leading && trailing >= self.trailing {
                self.buf.write_bit(false);
                self.buf
                    .write_bits(delta >> self.trailing, 64 - self.leading - self.trailing);
            } else {
                self.leading = leading;
                self.trailing = trailing;

                self.buf.write_bit(true);
                self.buf.write_bits(leading as u64, 5);

                // A value of 64 significant bits is stored as 0 since the
                // count field is only 6 bits wide.
                let sigbits = 64 - leading - trailing;
                self.buf.write_bits(sigbits as u64, 6);
                self.buf.write_bits(delta >> trailing, sigbits);
            }
        }

        self.val = vbits;
    }
}

impl Default for FloatEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<f64> for FloatEncoder {
    fn write(&mut self, v: f64) {
        if !self.finished {
            self.push(v);
        }
    }

    fn flush(&mut self) {
        if !self.finished {
            // write an end-of-stream record
            self.push(f64::from_bits(UVNAN));
            self.finished = true;
        }
    }

    fn bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        self.flush();
        Ok(self.buf.as_slice().to_vec())
    }
}

/// FloatDecoder decodes a block payload of gorilla-encoded floats.
pub struct FloatDecoder<'a> {
    val: u64,
    leading: u32,
    trailing: u32,

    r: bit::Reader<'a>,

    first: bool,
    finished: bool,
    err: Option<anyhow::Error>,
}

impl<'a> FloatDecoder<'a> {
    pub fn new(b: &'a [u8]) -> anyhow::Result<Self> {
        if b.is_empty() {
            return Err(anyhow!("FloatDecoder: no data found"));
        }

        // First byte stores the encoding type, only have the gorilla format
        // currently so ignore for now.
        let mut r = bit::Reader::new(&b[1..]);
        let val = r
            .read_bits(64)
            .map_err(|e| anyhow!("FloatDecoder: {}", e))?;

        Ok(Self {
            val,
            leading: 0,
            trailing: 0,
            r,
            first: true,
            finished: false,
            err: None,
        })
    }
}

impl<'a> FloatDecoder<'a> {
    /// step decodes one compressed record.  Ok(false) marks the end of the
    /// stream.
    fn step(&mut self) -> anyhow::Result<bool> {
        let same = !self
            .r
            .read_bit()
            .map_err(|e| anyhow!("FloatDecoder: {}", e))?;
        if same {
            // a zero control bit repeats the previous value
            return Ok(true);
        }

        let new_window = self
            .r
            .read_bit()
            .map_err(|e| anyhow!("FloatDecoder: {}", e))?;
        if new_window {
            self.leading = self
                .r
                .read_bits(5)
                .map_err(|e| anyhow!("FloatDecoder: {}", e))? as u32;
            let mut sigbits = self
                .r
                .read_bits(6)
                .map_err(|e| anyhow!("FloatDecoder: {}", e))? as u32;
            if sigbits == 0 {
                sigbits = 64;
            }
            if self.leading + sigbits > 64 {
                return Err(anyhow!("FloatDecoder: invalid leading/significant bits"));
            }
            self.trailing = 64 - self.leading - sigbits;
        }

        let sigbits = 64 - self.leading - self.trailing;
        let bits = self
            .r
            .read_bits(sigbits)
            .map_err(|e| anyhow!("FloatDecoder: {}", e))?;
        let vbits = self.val ^ (bits << self.trailing);
        if vbits == UVNAN {
            return Ok(false);
        }
        self.val = vbits;
        Ok(true)
    }
}

impl<'a> Decoder<f64> for FloatDecoder<'a> {
    fn next(&mut self) -> bool {
        if self.err.is_some() || self.finished {
            return false;
        }

        if self.first {
            self.first = false;
            // An empty block is a lone sentinel.
            if self.val == UVNAN {
                self.finished = true;
                return false;
            }
            return true;
        }

        match self.step() {
            Ok(true) => true,
            Ok(false) => {
                self.finished = true;
                false
            }
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    fn read(&self) -> f64 {
        f64::from_bits(self.val)
    }

    fn err(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[f64]) {
        let mut enc = FloatEncoder::new();
        for &v in values {
            enc.write(v);
        }
        let b = enc.bytes().unwrap();

        let mut dec = FloatDecoder::new(&b).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert!(dec.next(), "next == false at item {}", i);
            assert_eq!(dec.read(), v, "item {} mismatch", i);
        }
        assert!(!dec.next(), "unexpected extra value");
        assert!(dec.err().is_none());
    }

    #[test]
    fn test_float_encoder_empty() {
        let mut enc = FloatEncoder::new();
        let b = enc.bytes().unwrap();

        let mut dec = FloatDecoder::new(&b).unwrap();
        assert!(!dec.next());
    }

    #[test]
    fn test_float_encoder_single() {
        round_trip(&[1.5]);
    }

    #[test]
    fn test_float_encoder_similar() {
        round_trip(&[6.00065e+06, 6.000656e+06, 6.000657e+06, 6.000659e+06]);
    }

    #[test]
    fn test_float_encoder_repeats() {
        round_trip(&[3.0, 3.0, 3.0, 2.5, 2.5, 7.125]);
    }

    #[test]
    fn test_float_encoder_extremes() {
        round_trip(&[0.0, f64::MAX, f64::MIN, f64::MIN_POSITIVE, -0.0]);
    }
}
