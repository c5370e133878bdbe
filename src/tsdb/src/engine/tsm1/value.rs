use std::fmt::Debug;

pub trait FieldType: Send + Sync + Sized + Debug + Clone + PartialOrd + PartialEq {}

impl FieldType for f64 {}
impl FieldType for i64 {}
impl FieldType for bool {}
impl FieldType for Vec<u8> {}
impl FieldType for u64 {}

/// A single timestamped value of one concrete field type.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct Value<T>
where
    T: FieldType,
{
    pub unix_nano: i64,
    pub value: T,
}

impl<T> Value<T>
where
    T: FieldType,
{
    pub fn new(unix_nano: i64, value: T) -> Self {
        Self { unix_nano, value }
    }
}

pub type FloatValue = Value<f64>;
pub type IntegerValue = Value<i64>;
pub type BooleanValue = Value<bool>;
pub type StringValue = Value<Vec<u8>>;
pub type UnsignedValue = Value<u64>;

pub type FloatValues = Vec<FloatValue>;
pub type IntegerValues = Vec<IntegerValue>;
pub type BooleanValues = Vec<BooleanValue>;
pub type StringValues = Vec<StringValue>;
pub type UnsignedValues = Vec<UnsignedValue>;

/// FieldValue is the dynamically typed form of a decoded value, used by the
/// migration pipeline where the field type of a key is only known at run
/// time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float { unix_nano: i64, value: f64 },
    Integer { unix_nano: i64, value: i64 },
    Unsigned { unix_nano: i64, value: u64 },
    Boolean { unix_nano: i64, value: bool },
    Str { unix_nano: i64, value: Vec<u8> },
}

impl FieldValue {
    pub fn unix_nano(&self) -> i64 {
        match self {
            Self::Float { unix_nano, .. }
            | Self::Integer { unix_nano, .. }
            | Self::Unsigned { unix_nano, .. }
            | Self::Boolean { unix_nano, .. }
            | Self::Str { unix_nano, .. } => *unix_nano,
        }
    }
}

/// Values is a homogeneous, timestamp-ordered sequence of decoded values,
/// one of the five block types.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Float(FloatValues),
    Integer(IntegerValues),
    Unsigned(UnsignedValues),
    Boolean(BooleanValues),
    Str(StringValues),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Integer(v) => v.len(),
            Self::Unsigned(v) => v.len(),
            Self::Boolean(v) => v.len(),
            Self::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn min_time(&self) -> i64 {
        match self {
            Self::Float(v) => v[0].unix_nano,
            Self::Integer(v) => v[0].unix_nano,
            Self::Unsigned(v) => v[0].unix_nano,
            Self::Boolean(v) => v[0].unix_nano,
            Self::Str(v) => v[0].unix_nano,
        }
    }

    pub fn max_time(&self) -> i64 {
        match self {
            Self::Float(v) => v[v.len() - 1].unix_nano,
            Self::Integer(v) => v[v.len() - 1].unix_nano,
            Self::Unsigned(v) => v[v.len() - 1].unix_nano,
            Self::Boolean(v) => v[v.len() - 1].unix_nano,
            Self::Str(v) => v[v.len() - 1].unix_nano,
        }
    }

    /// into_field_values flattens the typed sequence into dynamically typed
    /// values for the merge pipeline.
    pub fn into_field_values(self) -> Vec<FieldValue> {
        match self {
            Self::Float(v) => v
                .into_iter()
                .map(|x| FieldValue::Float {
                    unix_nano: x.unix_nano,
                    value: x.value,
                })
                .collect(),
            Self::Integer(v) => v
                .into_iter()
                .map(|x| FieldValue::Integer {
                    unix_nano: x.unix_nano,
                    value: x.value,
                })
                .collect(),
            Self::Unsigned(v) => v
                .into_iter()
                .map(|x| FieldValue::Unsigned {
                    unix_nano: x.unix_nano,
                    value: x.value,
                })
                .collect(),
            Self::Boolean(v) => v
                .into_iter()
                .map(|x| FieldValue::Boolean {
                    unix_nano: x.unix_nano,
                    value: x.value,
                })
                .collect(),
            Self::Str(v) => v
                .into_iter()
                .map(|x| FieldValue::Str {
                    unix_nano: x.unix_nano,
                    value: x.value,
                })
                .collect(),
        }
    }
}
