use crate::engine::tsm1::block::{
    unpack_block, BLOCK_BOOLEAN, BLOCK_FLOAT64, BLOCK_INTEGER, BLOCK_STRING, BLOCK_UNSIGNED,
    ENCODED_BLOCK_HEADER_SIZE,
};
use crate::engine::tsm1::codec::boolean::BooleanDecoder;
use crate::engine::tsm1::codec::float::FloatDecoder;
use crate::engine::tsm1::codec::integer::{IntegerDecoder, UnsignedDecoder};
use crate::engine::tsm1::codec::string::StringDecoder;
use crate::engine::tsm1::codec::timestamp::{self, TimeDecoder};
use crate::engine::tsm1::codec::Decoder;
use crate::engine::tsm1::value::{
    BooleanValues, FloatValues, IntegerValues, StringValues, UnsignedValues, Value, Values,
};

/// decode_block decodes a packed block into its typed value sequence.
pub fn decode_block(block: &[u8]) -> anyhow::Result<Values> {
    let (typ, tb, vb, sz) = pre_decode(block)?;

    match typ {
        BLOCK_FLOAT64 => {
            let mut values = FloatValues::new();
            let ts_dec = TimeDecoder::new(tb)?;
            let v_dec = FloatDecoder::new(vb)?;
            decode_block_using(sz, ts_dec, v_dec, &mut values)?;
            Ok(Values::Float(values))
        }
        BLOCK_INTEGER => {
            let mut values = IntegerValues::new();
            let ts_dec = TimeDecoder::new(tb)?;
            let v_dec = IntegerDecoder::new(vb)?;
            decode_block_using(sz, ts_dec, v_dec, &mut values)?;
            Ok(Values::Integer(values))
        }
        BLOCK_BOOLEAN => {
            let mut values = BooleanValues::new();
            let ts_dec = TimeDecoder::new(tb)?;
            let v_dec = BooleanDecoder::new(vb)?;
            decode_block_using(sz, ts_dec, v_dec, &mut values)?;
            Ok(Values::Boolean(values))
        }
        BLOCK_STRING => {
            let mut values = StringValues::new();
            let ts_dec = TimeDecoder::new(tb)?;
            let v_dec = StringDecoder::new(vb)?;
            decode_block_using(sz, ts_dec, v_dec, &mut values)?;
            Ok(Values::Str(values))
        }
        BLOCK_UNSIGNED => {
            let mut values = UnsignedValues::new();
            let ts_dec = TimeDecoder::new(tb)?;
            let v_dec = UnsignedDecoder::new(vb)?;
            decode_block_using(sz, ts_dec, v_dec, &mut values)?;
            Ok(Values::Unsigned(values))
        }
        _ => Err(anyhow!("unknown block type: {}", typ)),
    }
}

fn pre_decode(block: &[u8]) -> anyhow::Result<(u8, &[u8], &[u8], usize)> {
    if block.len() <= ENCODED_BLOCK_HEADER_SIZE {
        return Err(anyhow!(
            "decode of short block: got {}, exp {}",
            block.len(),
            ENCODED_BLOCK_HEADER_SIZE
        ));
    }

    let (typ, tb, vb) = unpack_block(block)?;
    let sz = timestamp::count_timestamps(tb)?;

    Ok((typ, tb, vb, sz))
}

fn decode_block_using<T>(
    sz: usize,
    mut ts_dec: impl Decoder<i64>,
    mut v_dec: impl Decoder<T>,
    values: &mut Vec<Value<T>>,
) -> anyhow::Result<()>
where
    T: crate::engine::tsm1::value::FieldType,
{
    values.reserve(sz);

    for _ in 0..sz {
        if !ts_dec.next() {
            return Err(anyhow!("can not read all timestamp block"));
        }
        if let Some(err) = ts_dec.err() {
            return Err(anyhow!("read timestamp block error: {}", err));
        }
        if !v_dec.next() {
            return Err(anyhow!("can not read all values block"));
        }
        if let Some(err) = v_dec.err() {
            return Err(anyhow!("read values block error: {}", err));
        }

        values.push(Value::new(ts_dec.read(), v_dec.read()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tsm1::block::encoder::encode_block;
    use crate::engine::tsm1::value::Value;

    fn round_trip(values: Values) {
        let mut block = vec![];
        encode_block(&mut block, &values).unwrap();

        assert_eq!(
            crate::engine::tsm1::block::block_count(&block).unwrap(),
            values.len()
        );

        let got = decode_block(&block).unwrap();
        assert_eq!(got, values);
    }

    #[test]
    fn test_float_block_round_trip() {
        round_trip(Values::Float(vec![
            Value::new(1, 1.5),
            Value::new(2, 3.0),
        ]));
    }

    #[test]
    fn test_integer_block_round_trip() {
        round_trip(Values::Integer(vec![
            Value::new(10, 15),
            Value::new(20, 30),
            Value::new(30, -45),
        ]));
    }

    #[test]
    fn test_unsigned_block_round_trip() {
        round_trip(Values::Unsigned(vec![
            Value::new(3000, 45_u64),
            Value::new(4000, u64::MAX),
        ]));
    }

    #[test]
    fn test_boolean_block_round_trip() {
        round_trip(Values::Boolean(vec![
            Value::new(100, true),
            Value::new(200, false),
        ]));
    }

    #[test]
    fn test_string_block_round_trip() {
        round_trip(Values::Str(vec![
            Value::new(1000, b"1k".to_vec()),
            Value::new(2000, b"2k".to_vec()),
        ]));
    }

    #[test]
    fn test_mismatched_type() {
        let mut block = vec![];
        encode_block(
            &mut block,
            &Values::Float(vec![Value::new(1, 1.5)]),
        )
        .unwrap();
        block[0] = 200;
        assert!(decode_block(&block).is_err());
    }
}
