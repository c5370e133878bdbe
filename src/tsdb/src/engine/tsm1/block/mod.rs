pub mod decoder;
pub mod encoder;

use crate::engine::tsm1::codec::varint::VarInt;

/// BLOCK_FLOAT64 designates a block that encodes float64 values.
pub const BLOCK_FLOAT64: u8 = 0;

/// BLOCK_INTEGER designates a block that encodes int64 values.
pub const BLOCK_INTEGER: u8 = 1;

/// BLOCK_BOOLEAN designates a block that encodes boolean values.
pub const BLOCK_BOOLEAN: u8 = 2;

/// BLOCK_STRING designates a block that encodes string values.
pub const BLOCK_STRING: u8 = 3;

/// BLOCK_UNSIGNED designates a block that encodes uint64 values.
pub const BLOCK_UNSIGNED: u8 = 4;

/// ENCODED_BLOCK_HEADER_SIZE is the size of the header for an encoded block.
/// There is one byte encoding the type of the block.
pub const ENCODED_BLOCK_HEADER_SIZE: usize = 1;

/// pack_block appends the packed form of a block to dst: the type byte, the
/// varint length of the timestamp payload, the timestamp payload and the
/// value payload.
pub fn pack_block(dst: &mut Vec<u8>, typ: u8, ts: &[u8], values: &[u8]) {
    dst.reserve(1 + 10 + ts.len() + values.len());
    dst.push(typ);

    let mut b = [0_u8; 10];
    let i = (ts.len() as u64).encode_var(&mut b);
    dst.extend_from_slice(&b[..i]);

    dst.extend_from_slice(ts);
    dst.extend_from_slice(values);
}

/// unpack_block splits a packed block into its type, timestamp payload and
/// value payload.
pub fn unpack_block(buf: &[u8]) -> anyhow::Result<(u8, &[u8], &[u8])> {
    if buf.is_empty() {
        return Err(anyhow!("unpack_block: no data found"));
    }

    // Unpack the type
    let typ = buf[0];

    // Unpack the timestamp block length
    let (ts_len, n) = u64::decode_var(&buf[1..])
        .ok_or_else(|| anyhow!("unpack_block: unable to read timestamp block length"))?;

    // Unpack the timestamp bytes
    let ts_idx = 1 + n + ts_len as usize;
    if ts_idx > buf.len() {
        return Err(anyhow!("unpack_block: not enough data for timestamp"));
    }
    let ts = &buf[1 + n..ts_idx];

    // The value bytes are the remainder
    let values = &buf[ts_idx..];

    Ok((typ, ts, values))
}

/// block_type returns the type of values encoded in a block or an error if
/// the block type is unknown.
pub fn block_type(block: &[u8]) -> anyhow::Result<u8> {
    if block.is_empty() {
        return Err(anyhow!("block_type: no data found"));
    }
    match block[0] {
        BLOCK_FLOAT64 | BLOCK_INTEGER | BLOCK_BOOLEAN | BLOCK_STRING | BLOCK_UNSIGNED => {
            Ok(block[0])
        }
        other => Err(anyhow!("unknown block type: {}", other)),
    }
}

/// block_count returns the number of timestamps encoded in a block.
pub fn block_count(block: &[u8]) -> anyhow::Result<usize> {
    if block.len() <= ENCODED_BLOCK_HEADER_SIZE {
        return Err(anyhow!(
            "decode of short block: got {}, exp {}",
            block.len(),
            ENCODED_BLOCK_HEADER_SIZE
        ));
    }

    let (_typ, tb, _vb) = unpack_block(block)?;
    crate::engine::tsm1::codec::timestamp::count_timestamps(tb)
}
