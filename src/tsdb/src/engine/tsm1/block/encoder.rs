use crate::engine::tsm1::block::{
    pack_block, BLOCK_BOOLEAN, BLOCK_FLOAT64, BLOCK_INTEGER, BLOCK_STRING, BLOCK_UNSIGNED,
};
use crate::engine::tsm1::codec::boolean::BooleanEncoder;
use crate::engine::tsm1::codec::float::FloatEncoder;
use crate::engine::tsm1::codec::integer::{IntegerEncoder, UnsignedEncoder};
use crate::engine::tsm1::codec::string::StringEncoder;
use crate::engine::tsm1::codec::timestamp::TimeEncoder;
use crate::engine::tsm1::codec::Encoder;
use crate::engine::tsm1::value::Values;

/// encode_block appends the encoded form of values to dst.  The values must
/// all belong to one series/field and be sorted by timestamp.
pub fn encode_block(dst: &mut Vec<u8>, values: &Values) -> anyhow::Result<()> {
    if values.is_empty() {
        return Err(anyhow!("encode_block: no values to encode"));
    }

    match values {
        Values::Float(values) => {
            let mut ts_enc = TimeEncoder::new(values.len());
            let mut v_enc = FloatEncoder::new();
            for v in values {
                ts_enc.write(v.unix_nano);
                v_enc.write(v.value);
            }
            let (tb, vb) = (ts_enc.bytes()?, v_enc.bytes()?);
            pack_block(dst, BLOCK_FLOAT64, &tb, &vb);
        }
        Values::Integer(values) => {
            let mut ts_enc = TimeEncoder::new(values.len());
            let mut v_enc = IntegerEncoder::new(values.len());
            for v in values {
                ts_enc.write(v.unix_nano);
                v_enc.write(v.value);
            }
            let (tb, vb) = (ts_enc.bytes()?, v_enc.bytes()?);
            pack_block(dst, BLOCK_INTEGER, &tb, &vb);
        }
        Values::Unsigned(values) => {
            let mut ts_enc = TimeEncoder::new(values.len());
            let mut v_enc = UnsignedEncoder::new(values.len());
            for v in values {
                ts_enc.write(v.unix_nano);
                v_enc.write(v.value);
            }
            let (tb, vb) = (ts_enc.bytes()?, v_enc.bytes()?);
            pack_block(dst, BLOCK_UNSIGNED, &tb, &vb);
        }
        Values::Boolean(values) => {
            let mut ts_enc = TimeEncoder::new(values.len());
            let mut v_enc = BooleanEncoder::new(values.len());
            for v in values {
                ts_enc.write(v.unix_nano);
                v_enc.write(v.value);
            }
            let (tb, vb) = (ts_enc.bytes()?, v_enc.bytes()?);
            pack_block(dst, BLOCK_BOOLEAN, &tb, &vb);
        }
        Values::Str(values) => {
            let mut ts_enc = TimeEncoder::new(values.len());
            let mut v_enc = StringEncoder::new(values.len() * 16);
            for v in values {
                ts_enc.write(v.unix_nano);
                v_enc.write(v.value.as_slice());
            }
            let (tb, vb) = (ts_enc.bytes()?, v_enc.bytes()?);
            pack_block(dst, BLOCK_STRING, &tb, &vb);
        }
    }

    Ok(())
}
