use std::collections::BTreeMap;

use migrate_tsdb::engine::tsm1::value::FieldValue;
use migrate_tsdb::series::escape_tag;

/// Point is one multi-field line protocol point.  The measurement is kept
/// in its wire (escaped) form; tag keys and values are unescaped and
/// re-escaped at serialization time.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: Vec<(String, FieldValue)>,
    pub unix_nano: i64,
}

impl Point {
    /// write_line appends the line protocol form of the point to out,
    /// without a trailing newline.
    pub fn write_line(&self, out: &mut String) {
        out.push_str(&self.measurement);

        for (k, v) in &self.tags {
            out.push(',');
            out.push_str(&escape_tag(k));
            out.push('=');
            out.push_str(&escape_tag(v));
        }

        out.push(' ');
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&escape_tag(k));
            out.push('=');
            write_field_value(out, v);
        }

        out.push(' ');
        out.push_str(&self.unix_nano.to_string());
    }

    pub fn to_line(&self) -> String {
        let mut out = String::with_capacity(64);
        self.write_line(&mut out);
        out
    }
}

fn write_field_value(out: &mut String, v: &FieldValue) {
    match v {
        FieldValue::Float { value, .. } => out.push_str(&value.to_string()),
        FieldValue::Integer { value, .. } => {
            out.push_str(&value.to_string());
            out.push('i');
        }
        FieldValue::Unsigned { value, .. } => {
            out.push_str(&value.to_string());
            out.push('u');
        }
        FieldValue::Boolean { value, .. } => {
            out.push_str(if *value { "true" } else { "false" })
        }
        FieldValue::Str { value, .. } => {
            out.push('"');
            for c in String::from_utf8_lossy(value).chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(fields: Vec<(String, FieldValue)>) -> Point {
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), "server 01".to_string());
        Point {
            measurement: "cpu".to_string(),
            tags,
            fields,
            unix_nano: 1000,
        }
    }

    #[test]
    fn test_line_float() {
        let p = point(vec![(
            "value".to_string(),
            FieldValue::Float {
                unix_nano: 1000,
                value: 1.5,
            },
        )]);
        assert_eq!(p.to_line(), r"cpu,host=server\ 01 value=1.5 1000");
    }

    #[test]
    fn test_line_typed_suffixes() {
        let p = point(vec![
            (
                "i".to_string(),
                FieldValue::Integer {
                    unix_nano: 1000,
                    value: -15,
                },
            ),
            (
                "u".to_string(),
                FieldValue::Unsigned {
                    unix_nano: 1000,
                    value: 45,
                },
            ),
            (
                "b".to_string(),
                FieldValue::Boolean {
                    unix_nano: 1000,
                    value: true,
                },
            ),
        ]);
        assert_eq!(
            p.to_line(),
            r"cpu,host=server\ 01 i=-15i,u=45u,b=true 1000"
        );
    }

    #[test]
    fn test_line_string_escapes() {
        let p = point(vec![(
            "s".to_string(),
            FieldValue::Str {
                unix_nano: 1000,
                value: br#"say "hi" back\slash"#.to_vec(),
            },
        )]);
        assert_eq!(
            p.to_line(),
            r#"cpu,host=server\ 01 s="say \"hi\" back\\slash" 1000"#
        );
    }

    #[test]
    fn test_measurement_keeps_wire_escapes() {
        let p = Point {
            measurement: r"mea\,sure".to_string(),
            tags: BTreeMap::new(),
            fields: vec![(
                "f".to_string(),
                FieldValue::Float {
                    unix_nano: 5,
                    value: 2.0,
                },
            )],
            unix_nano: 5,
        };
        assert_eq!(p.to_line(), r"mea\,sure f=2 5");
    }
}
