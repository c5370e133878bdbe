//! Simple8b packs multiple integers into a single 64-bit word.  The 4 high
//! bits of each word hold a selector that determines how many values the
//! word carries and how wide each value is.  Values must be smaller than
//! 1 << 60.  The two zero-bit selectors encode runs of the value one.

use bytes::BufMut;

/// MAX_VALUE is the largest value that can be simple8b encoded.
pub const MAX_VALUE: u64 = (1 << 60) - 1;

/// (values per word, bits per value) for each of the 16 selectors.
const SELECTORS: [(usize, u32); 16] = [
    (240, 0),
    (120, 0),
    (60, 1),
    (30, 2),
    (20, 3),
    (15, 4),
    (12, 5),
    (10, 6),
    (8, 7),
    (7, 8),
    (6, 10),
    (5, 12),
    (4, 15),
    (3, 20),
    (2, 30),
    (1, 60),
];

/// Encoder packs unsigned integers into 64-bit words.
pub struct Encoder {
    values: Vec<u64>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn write(&mut self, v: u64) -> anyhow::Result<()> {
        if v > MAX_VALUE {
            return Err(anyhow!("simple8b: value {} out of range", v));
        }
        self.values.push(v);
        Ok(())
    }

    pub fn bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::with_capacity((self.values.len() / 2 + 1) * 8);
        let mut i = 0;

        while i < self.values.len() {
            let remaining = &self.values[i..];
            let (sel, n, bits) = Self::select(remaining)?;

            let mut word = (sel as u64) << 60;
            if bits > 0 {
                for (j, v) in remaining[..n].iter().enumerate() {
                    word |= v << (j as u32 * bits);
                }
            }
            out.put_u64(word);
            i += n;
        }

        self.values.clear();
        Ok(out)
    }

    /// select picks the widest selector whose full value count fits the
    /// front of src.
    fn select(src: &[u64]) -> anyhow::Result<(usize, usize, u32)> {
        for (sel, &(n, bits)) in SELECTORS.iter().enumerate() {
            if src.len() < n {
                continue;
            }
            let fits = if bits == 0 {
                src[..n].iter().all(|&v| v == 1)
            } else {
                src[..n].iter().all(|&v| v < (1 << bits))
            };
            if fits {
                return Ok((sel, n, bits));
            }
        }
        Err(anyhow!("simple8b: value out of range"))
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// decode unpacks the values of one word into dst, returning how many were
/// written.  dst must hold at least 240 entries.
pub fn decode(dst: &mut [u64], v: u64) -> anyhow::Result<usize> {
    let sel = (v >> 60) as usize;
    let (n, bits) = SELECTORS[sel];
    if dst.len() < n {
        return Err(anyhow!("simple8b: dst too small for selector {}", sel));
    }

    if bits == 0 {
        for slot in dst[..n].iter_mut() {
            *slot = 1;
        }
    } else {
        let mask = (1_u64 << bits) - 1;
        for (j, slot) in dst[..n].iter_mut().enumerate() {
            *slot = (v >> (j as u32 * bits)) & mask;
        }
    }

    Ok(n)
}

/// count_bytes returns the number of values encoded in a sequence of
/// simple8b words without decoding them.
pub fn count_bytes(b: &[u8]) -> anyhow::Result<usize> {
    if b.len() % 8 != 0 {
        return Err(anyhow!("simple8b: truncated word stream"));
    }

    let mut count = 0;
    for chunk in b.chunks_exact(8) {
        let word = u64::from_be_bytes(chunk.try_into().unwrap());
        count += SELECTORS[(word >> 60) as usize].0;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[u64]) {
        let mut enc = Encoder::new();
        for &v in values {
            enc.write(v).unwrap();
        }
        let b = enc.bytes().unwrap();

        assert_eq!(count_bytes(&b).unwrap(), values.len());

        let mut got = Vec::with_capacity(values.len());
        let mut buf = [0_u64; 240];
        for chunk in b.chunks_exact(8) {
            let word = u64::from_be_bytes(chunk.try_into().unwrap());
            let n = decode(&mut buf, word).unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got.as_slice(), values);
    }

    #[test]
    fn test_mixed_sizes() {
        round_trip(&[7, 6, 256, 4, 3, 2, 1]);
    }

    #[test]
    fn test_ones_run() {
        round_trip(&vec![1_u64; 240]);
        round_trip(&vec![1_u64; 1000]);
    }

    #[test]
    fn test_large_values() {
        round_trip(&[MAX_VALUE, 0, MAX_VALUE]);
    }

    #[test]
    fn test_too_big() {
        let mut enc = Encoder::new();
        assert!(enc.write(MAX_VALUE + 1).is_err());
    }
}
