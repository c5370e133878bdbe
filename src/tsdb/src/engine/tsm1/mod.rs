pub mod block;
pub mod codec;
pub mod file_store;
pub mod value;

/// MAGIC_NUMBER is written as the first 4 bytes of a data file to identify
/// the file as a tsm1 formatted file.
pub const MAGIC_NUMBER: u32 = 0x16D116D1;

/// VERSION indicates the version of the TSM file format.
pub const VERSION: u8 = 1;

/// KEY_FIELD_SEPARATOR separates the series key from the field name in a
/// composite key stored in a TSM index.
pub const KEY_FIELD_SEPARATOR: &str = "#!~#";

/// series_field_key combines a series key and a field name into the
/// composite key used inside TSM indices.
pub fn series_field_key(series: &[u8], field: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(series.len() + KEY_FIELD_SEPARATOR.len() + field.len());
    key.extend_from_slice(series);
    key.extend_from_slice(KEY_FIELD_SEPARATOR.as_bytes());
    key.extend_from_slice(field);
    key
}

/// series_and_field_from_composite_key splits a composite key into its
/// series key and field name.  A key without a separator is returned whole
/// with an empty field, matching the engine's behavior for legacy keys.
pub fn series_and_field_from_composite_key(key: &[u8]) -> (&[u8], &[u8]) {
    let sep = KEY_FIELD_SEPARATOR.as_bytes();
    match key
        .windows(sep.len())
        .position(|window| window == sep)
    {
        Some(pos) => (&key[..pos], &key[pos + sep.len()..]),
        None => (key, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_round_trip() {
        let key = series_field_key(b"cpu,host=server-01", b"value");
        assert_eq!(key.as_slice(), b"cpu,host=server-01#!~#value".as_slice());

        let (series, field) = series_and_field_from_composite_key(&key);
        assert_eq!(series, b"cpu,host=server-01");
        assert_eq!(field, b"value");
    }

    #[test]
    fn test_composite_key_without_separator() {
        let (series, field) = series_and_field_from_composite_key(b"cpu");
        assert_eq!(series, b"cpu");
        assert_eq!(field, b"");
    }
}
