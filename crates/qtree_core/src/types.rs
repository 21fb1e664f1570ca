use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum precision for DECIMAL values.
pub const MAX_DECIMAL_PRECISION: u32 = 31;

/// Base SQL type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeId {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Double,
    Char,
    Varchar,
    LongVarchar,
    Clob,
    Blob,
    Date,
    Time,
    Timestamp,
    /// Type not yet known (untyped NULL or parameter).
    Unknown,
}

impl TypeId {
    /// Precedence used when picking the dominant type of two values. Higher
    /// wins.
    pub const fn precedence(&self) -> u32 {
        match self {
            Self::Blob => 170,
            Self::Boolean => 130,
            Self::Time => 120,
            Self::Timestamp => 110,
            Self::Date => 100,
            Self::Double => 90,
            Self::Real => 80,
            Self::Decimal => 70,
            Self::BigInt => 60,
            Self::Integer => 50,
            Self::SmallInt => 40,
            Self::Clob => 14,
            Self::LongVarchar => 12,
            Self::Varchar => 10,
            Self::Char => 0,
            Self::Unknown => 0,
        }
    }

    pub const fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean)
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::SmallInt | Self::Integer | Self::BigInt | Self::Decimal | Self::Real | Self::Double
        )
    }

    pub const fn is_exact_numeric(&self) -> bool {
        matches!(
            self,
            Self::SmallInt | Self::Integer | Self::BigInt | Self::Decimal
        )
    }

    pub const fn is_string(&self) -> bool {
        matches!(
            self,
            Self::Char | Self::Varchar | Self::LongVarchar | Self::Clob
        )
    }

    pub const fn is_datetime(&self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::Timestamp)
    }

    /// Values of this type are read from a stream and can only be consumed
    /// once.
    pub const fn is_streamable(&self) -> bool {
        matches!(self, Self::LongVarchar | Self::Clob | Self::Blob)
    }

    pub const fn is_orderable(&self) -> bool {
        !matches!(
            self,
            Self::LongVarchar | Self::Clob | Self::Blob | Self::Unknown
        )
    }

    /// Whether a value of type `from` can be stored into a column of this
    /// type.
    pub fn storable(&self, from: TypeId) -> bool {
        if *self == Self::Unknown || from == Self::Unknown {
            return true;
        }

        match self {
            t if t.is_numeric() => from.is_numeric(),
            Self::Char | Self::Varchar => from.is_string() || from.is_datetime(),
            Self::LongVarchar | Self::Clob => from.is_string(),
            Self::Date | Self::Time | Self::Timestamp => {
                from == *self || matches!(from, Self::Char | Self::Varchar)
            }
            Self::Boolean => from == Self::Boolean,
            Self::Blob => from == Self::Blob,
            _ => false,
        }
    }

    /// Precision of an exact numeric when mixed with a DECIMAL.
    const fn exact_precision(&self) -> u32 {
        match self {
            Self::SmallInt => 5,
            Self::Integer => 10,
            Self::BigInt => 19,
            _ => 0,
        }
    }

    pub const fn sql_name(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Decimal => "DECIMAL",
            Self::Real => "REAL",
            Self::Double => "DOUBLE",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::LongVarchar => "LONG VARCHAR",
            Self::Clob => "CLOB",
            Self::Blob => "BLOB",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// A concrete SQL type with nullability and size information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub id: TypeId,
    pub nullable: bool,
    /// Precision for DECIMAL, zero otherwise.
    pub precision: u32,
    /// Scale for DECIMAL, zero otherwise.
    pub scale: u32,
    /// Maximum width in characters or bytes for string and binary types.
    pub max_width: u32,
}

impl DataType {
    const fn new(id: TypeId, max_width: u32) -> Self {
        DataType {
            id,
            nullable: true,
            precision: 0,
            scale: 0,
            max_width,
        }
    }

    pub const fn unknown() -> Self {
        Self::new(TypeId::Unknown, 0)
    }

    pub const fn boolean() -> Self {
        Self::new(TypeId::Boolean, 1)
    }

    pub const fn smallint() -> Self {
        Self::new(TypeId::SmallInt, 2)
    }

    pub const fn integer() -> Self {
        Self::new(TypeId::Integer, 4)
    }

    pub const fn bigint() -> Self {
        Self::new(TypeId::BigInt, 8)
    }

    pub const fn real() -> Self {
        Self::new(TypeId::Real, 4)
    }

    pub const fn double() -> Self {
        Self::new(TypeId::Double, 8)
    }

    pub const fn decimal(precision: u32, scale: u32) -> Self {
        DataType {
            id: TypeId::Decimal,
            nullable: true,
            precision,
            scale,
            max_width: precision,
        }
    }

    pub const fn char(width: u32) -> Self {
        Self::new(TypeId::Char, width)
    }

    pub const fn varchar(width: u32) -> Self {
        Self::new(TypeId::Varchar, width)
    }

    pub const fn long_varchar() -> Self {
        Self::new(TypeId::LongVarchar, 32700)
    }

    pub const fn clob(width: u32) -> Self {
        Self::new(TypeId::Clob, width)
    }

    pub const fn blob(width: u32) -> Self {
        Self::new(TypeId::Blob, width)
    }

    pub const fn date() -> Self {
        Self::new(TypeId::Date, 10)
    }

    pub const fn time() -> Self {
        Self::new(TypeId::Time, 8)
    }

    pub const fn timestamp() -> Self {
        Self::new(TypeId::Timestamp, 29)
    }

    pub const fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub const fn is_unknown(&self) -> bool {
        matches!(self.id, TypeId::Unknown)
    }

    pub const fn is_boolean(&self) -> bool {
        self.id.is_boolean()
    }

    /// Compute the type able to hold values of both `self` and `other`.
    ///
    /// Ties in precedence resolve towards `self`. Callers are expected to
    /// have checked `union_compatible` first.
    pub fn dominant_type(&self, other: &DataType) -> DataType {
        let nullable = self.nullable || other.nullable;

        if self.is_unknown() {
            return other.with_nullable(nullable);
        }
        if other.is_unknown() {
            return self.with_nullable(nullable);
        }

        let (higher, lower) = if other.id.precedence() > self.id.precedence() {
            (other, self)
        } else {
            (self, other)
        };

        // REAL cannot hold every exact numeric value.
        if higher.id == TypeId::Real && lower.id.is_exact_numeric() {
            return DataType::double().with_nullable(nullable);
        }

        if higher.id == TypeId::Decimal {
            let (p1, s1) = decimal_parts(higher);
            let (p2, s2) = decimal_parts(lower);
            let scale = s1.max(s2);
            let precision = (p1.saturating_sub(s1))
                .max(p2.saturating_sub(s2))
                .saturating_add(scale)
                .min(MAX_DECIMAL_PRECISION);
            return DataType::decimal(precision, scale).with_nullable(nullable);
        }

        DataType {
            id: higher.id,
            nullable,
            precision: higher.precision,
            scale: higher.scale,
            max_width: higher.max_width.max(lower.max_width),
        }
    }

    /// Whether values of `self` and `other` can be combined by a set
    /// operation.
    ///
    /// Direction independent: `a.union_compatible(b) == b.union_compatible(a)`.
    pub fn union_compatible(&self, other: &DataType) -> bool {
        if !self.id.storable(other.id) && !other.id.storable(self.id) {
            return false;
        }
        self.id.is_boolean() == other.id.is_boolean()
    }
}

fn decimal_parts(datatype: &DataType) -> (u32, u32) {
    match datatype.id {
        TypeId::Decimal => (datatype.precision, datatype.scale),
        other => (other.exact_precision(), 0),
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            TypeId::Decimal => write!(f, "DECIMAL({},{})", self.precision, self.scale)?,
            TypeId::Char | TypeId::Varchar => write!(f, "{}({})", self.id, self.max_width)?,
            other => write!(f, "{other}")?,
        }
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn dominant_nullable_if_either() {
        let a = DataType::integer().with_nullable(false);
        let b = DataType::integer();
        assert!(a.dominant_type(&b).nullable);
        assert!(!a.dominant_type(&a).nullable);
    }

    #[test]
    fn dominant_real_and_exact_is_double() {
        let t = DataType::real().dominant_type(&DataType::bigint());
        assert_eq!(TypeId::Double, t.id);
        let t = DataType::decimal(5, 2).dominant_type(&DataType::real());
        assert_eq!(TypeId::Double, t.id);
    }

    #[test]
    fn dominant_decimal_precision_and_scale() {
        let t = DataType::decimal(10, 2).dominant_type(&DataType::decimal(6, 4));
        assert_eq!(TypeId::Decimal, t.id);
        assert_eq!(4, t.scale);
        assert_eq!(12, t.precision);

        let t = DataType::decimal(30, 1).dominant_type(&DataType::decimal(30, 10));
        assert_eq!(MAX_DECIMAL_PRECISION, t.precision);

        let t = DataType::integer().dominant_type(&DataType::decimal(5, 2));
        assert_eq!(TypeId::Decimal, t.id);
        assert_eq!(12, t.precision);
        assert_eq!(2, t.scale);
    }

    #[test]
    fn dominant_string_widest() {
        let t = DataType::char(10).dominant_type(&DataType::varchar(5));
        assert_eq!(TypeId::Varchar, t.id);
        assert_eq!(10, t.max_width);
    }

    #[rstest]
    #[case(DataType::integer(), DataType::double(), true)]
    #[case(DataType::integer(), DataType::varchar(10), false)]
    #[case(DataType::boolean(), DataType::integer(), false)]
    #[case(DataType::boolean(), DataType::boolean(), true)]
    #[case(DataType::date(), DataType::char(10), true)]
    #[case(DataType::date(), DataType::time(), false)]
    #[case(DataType::clob(100), DataType::varchar(10), true)]
    #[case(DataType::blob(100), DataType::varchar(10), false)]
    #[case(DataType::unknown(), DataType::integer(), true)]
    fn union_compatibility_is_symmetric(
        #[case] a: DataType,
        #[case] b: DataType,
        #[case] expected: bool,
    ) {
        assert_eq!(expected, a.union_compatible(&b));
        assert_eq!(expected, b.union_compatible(&a));
    }

    #[test]
    fn streamable_types() {
        assert!(TypeId::Clob.is_streamable());
        assert!(TypeId::Blob.is_streamable());
        assert!(!TypeId::Varchar.is_streamable());
        assert!(!TypeId::Blob.is_orderable());
    }
}
