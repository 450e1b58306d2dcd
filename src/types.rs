use std::fmt;
use std::io::Cursor;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Primitive wire value categories understood by the remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomType {
    Boolean,
    Int4,
    Int8,
    Float4,
    Float8,
    Decimal,
    Character,
    Octet,
    Date,
    TimeOfDay,
    TimePoint,
    TimeOfDayWithTimeZone,
    TimePointWithTimeZone,
    Blob,
    Clob,
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AtomType::Boolean => "BOOLEAN",
            AtomType::Int4 => "INT4",
            AtomType::Int8 => "INT8",
            AtomType::Float4 => "FLOAT4",
            AtomType::Float8 => "FLOAT8",
            AtomType::Decimal => "DECIMAL",
            AtomType::Character => "CHARACTER",
            AtomType::Octet => "OCTET",
            AtomType::Date => "DATE",
            AtomType::TimeOfDay => "TIME_OF_DAY",
            AtomType::TimePoint => "TIME_POINT",
            AtomType::TimeOfDayWithTimeZone => "TIME_OF_DAY_WITH_TIME_ZONE",
            AtomType::TimePointWithTimeZone => "TIME_POINT_WITH_TIME_ZONE",
            AtomType::Blob => "BLOB",
            AtomType::Clob => "CLOB",
        };
        f.write_str(name)
    }
}

/// Time of day qualified by a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffsetTime {
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

impl OffsetTime {
    #[must_use]
    pub fn new(time: NaiveTime, offset: FixedOffset) -> Self {
        Self { time, offset }
    }

    /// Same instant expressed at another offset; the date part wraps around midnight.
    #[must_use]
    pub fn with_offset_same_instant(self, offset: FixedOffset) -> Self {
        let delta = i64::from(offset.local_minus_utc() - self.offset.local_minus_utc());
        let (time, _) = self
            .time
            .overflowing_add_signed(chrono::TimeDelta::seconds(delta));
        Self { time, offset }
    }
}

impl fmt::Display for OffsetTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", iso_time(&self.time), self.offset)
    }
}

/// `HH:MM:SS` with a fractional part only when non-zero.
pub(crate) fn iso_time(time: &NaiveTime) -> String {
    time.format("%H:%M:%S%.f").to_string()
}

/// Server-side large object reference. Reading it goes through the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LobReference {
    pub id: u64,
}

impl LobReference {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

/// A value as transmitted by the remote session, before host conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Boolean(bool),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Decimal(Decimal),
    Character(String),
    Octet(Vec<u8>),
    Date(NaiveDate),
    TimeOfDay(NaiveTime),
    TimePoint(NaiveDateTime),
    TimeOfDayWithTimeZone(OffsetTime),
    TimePointWithTimeZone(DateTime<FixedOffset>),
    Blob(LobReference),
    Clob(LobReference),
}

impl WireValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    /// The atom type carried by this value, `None` for null.
    #[must_use]
    pub fn atom_type(&self) -> Option<AtomType> {
        let atom = match self {
            WireValue::Null => return None,
            WireValue::Boolean(_) => AtomType::Boolean,
            WireValue::Int4(_) => AtomType::Int4,
            WireValue::Int8(_) => AtomType::Int8,
            WireValue::Float4(_) => AtomType::Float4,
            WireValue::Float8(_) => AtomType::Float8,
            WireValue::Decimal(_) => AtomType::Decimal,
            WireValue::Character(_) => AtomType::Character,
            WireValue::Octet(_) => AtomType::Octet,
            WireValue::Date(_) => AtomType::Date,
            WireValue::TimeOfDay(_) => AtomType::TimeOfDay,
            WireValue::TimePoint(_) => AtomType::TimePoint,
            WireValue::TimeOfDayWithTimeZone(_) => AtomType::TimeOfDayWithTimeZone,
            WireValue::TimePointWithTimeZone(_) => AtomType::TimePointWithTimeZone,
            WireValue::Blob(_) => AtomType::Blob,
            WireValue::Clob(_) => AtomType::Clob,
        };
        Some(atom)
    }
}

/// Column description reported by the transport for a result cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: Option<String>,
    pub atom_type: AtomType,
    pub nullable: bool,
    /// Declared decimal scale, when the column has one.
    pub scale: Option<u32>,
}

impl ColumnMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>, atom_type: AtomType) -> Self {
        Self {
            name: Some(name.into()),
            atom_type,
            nullable: true,
            scale: None,
        }
    }

    #[must_use]
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// Host representation requested by a caller when reading a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    String,
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    Bytes,
    /// Calendar date interpreted in the caller's zone.
    Date,
    /// Wall-clock time interpreted in the caller's zone.
    Time,
    /// Date-time interpreted in the caller's zone.
    Timestamp,
    LocalDate,
    LocalTime,
    LocalDateTime,
    OffsetTime,
    OffsetDateTime,
    ZonedDateTime,
    AsciiStream,
    BinaryStream,
    CharacterStream,
    Blob,
    Clob,
    Object,
}

impl TargetKind {
    /// Primitive targets read as zero/false when the wire value is null.
    #[must_use]
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            TargetKind::Boolean
                | TargetKind::Byte
                | TargetKind::Short
                | TargetKind::Int
                | TargetKind::Long
                | TargetKind::Float
                | TargetKind::Double
        )
    }
}

/// A converted host value, or a bind value supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    String(String),
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    LocalDate(NaiveDate),
    LocalTime(NaiveTime),
    LocalDateTime(NaiveDateTime),
    OffsetTime(OffsetTime),
    OffsetDateTime(DateTime<FixedOffset>),
    ZonedDateTime(DateTime<FixedOffset>),
    ByteStream(Cursor<Vec<u8>>),
    CharacterStream(Cursor<String>),
    Blob(Vec<u8>),
    Clob(String),
}

impl HostValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// The target kind that produces this variant, `None` for null.
    ///
    /// Byte streams report [`TargetKind::BinaryStream`]; ASCII streams share the representation.
    #[must_use]
    pub fn kind(&self) -> Option<TargetKind> {
        let kind = match self {
            HostValue::Null => return None,
            HostValue::String(_) => TargetKind::String,
            HostValue::Boolean(_) => TargetKind::Boolean,
            HostValue::Byte(_) => TargetKind::Byte,
            HostValue::Short(_) => TargetKind::Short,
            HostValue::Int(_) => TargetKind::Int,
            HostValue::Long(_) => TargetKind::Long,
            HostValue::Float(_) => TargetKind::Float,
            HostValue::Double(_) => TargetKind::Double,
            HostValue::Decimal(_) => TargetKind::Decimal,
            HostValue::Bytes(_) => TargetKind::Bytes,
            HostValue::Date(_) => TargetKind::Date,
            HostValue::Time(_) => TargetKind::Time,
            HostValue::Timestamp(_) => TargetKind::Timestamp,
            HostValue::LocalDate(_) => TargetKind::LocalDate,
            HostValue::LocalTime(_) => TargetKind::LocalTime,
            HostValue::LocalDateTime(_) => TargetKind::LocalDateTime,
            HostValue::OffsetTime(_) => TargetKind::OffsetTime,
            HostValue::OffsetDateTime(_) => TargetKind::OffsetDateTime,
            HostValue::ZonedDateTime(_) => TargetKind::ZonedDateTime,
            HostValue::ByteStream(_) => TargetKind::BinaryStream,
            HostValue::CharacterStream(_) => TargetKind::CharacterStream,
            HostValue::Blob(_) => TargetKind::Blob,
            HostValue::Clob(_) => TargetKind::Clob,
        };
        Some(kind)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) | HostValue::Clob(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Byte(v) => Some(i64::from(*v)),
            HostValue::Short(v) => Some(i64::from(*v)),
            HostValue::Int(v) => Some(i64::from(*v)),
            HostValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let HostValue::Boolean(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        if let HostValue::Decimal(d) = self {
            Some(*d)
        } else {
            None
        }
    }
}

macro_rules! host_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(value: $ty) -> Self {
                    HostValue::$variant(value)
                }
            }
        )*
    };
}

host_value_from! {
    String => String,
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    Vec<u8> => Bytes,
    NaiveDate => LocalDate,
    NaiveTime => LocalTime,
    NaiveDateTime => LocalDateTime,
    OffsetTime => OffsetTime,
    DateTime<FixedOffset> => OffsetDateTime,
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Null, Into::into)
    }
}
