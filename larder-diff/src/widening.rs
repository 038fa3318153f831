//! The column type-widening lattice.
//!
//! A column alteration is admissible online only when every value the old
//! column can hold fits the new column losslessly. The promotions below are
//! domain policy, written out as an explicit table: DECIMAL is a promotion
//! target from every integer type but never a source, FLOAT is reachable
//! from integers but never feeds back into them even where that would be
//! lossless. One-directional by intent — do not "fix" the asymmetry.

use larder::{Catalog, FieldValue, NodeId};

/// Value type tags stored in `Column.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    String,
    Timestamp,
    Decimal,
    Varbinary,
}

/// Worst-case width of one character in the UTF-8 encoding the storage
/// layer uses. Encoding-specific; shared by the character-to-byte column
/// width rule below.
pub const MAX_BYTES_PER_UTF8_CHAR: i64 = 4;

impl ColumnType {
    pub fn from_field(tag: i64) -> Option<ColumnType> {
        Some(match tag {
            3 => ColumnType::TinyInt,
            4 => ColumnType::SmallInt,
            5 => ColumnType::Integer,
            6 => ColumnType::BigInt,
            8 => ColumnType::Float,
            9 => ColumnType::String,
            11 => ColumnType::Timestamp,
            22 => ColumnType::Decimal,
            25 => ColumnType::Varbinary,
            _ => return None,
        })
    }

    pub fn as_field(self) -> i64 {
        match self {
            ColumnType::TinyInt => 3,
            ColumnType::SmallInt => 4,
            ColumnType::Integer => 5,
            ColumnType::BigInt => 6,
            ColumnType::Float => 8,
            ColumnType::String => 9,
            ColumnType::Timestamp => 11,
            ColumnType::Decimal => 22,
            ColumnType::Varbinary => 25,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::TinyInt => "TINYINT",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::String => "VARCHAR",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Decimal => "DECIMAL",
            ColumnType::Varbinary => "VARBINARY",
        }
    }
}

/// One side of a column alteration: (type tag, declared size, whether a
/// string size counts bytes rather than characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnShape {
    pub ty: ColumnType,
    pub size: i64,
    pub in_bytes: bool,
}

impl ColumnShape {
    /// Read the shape of a Column node. Panics on an unknown type tag —
    /// the tag set is closed, an unknown one is an upstream bug.
    pub fn of(catalog: &Catalog, column: NodeId) -> ColumnShape {
        let tag = read_int(catalog.field(column, "type"));
        ColumnShape {
            ty: ColumnType::from_field(tag)
                .unwrap_or_else(|| panic!("unknown column type tag {tag}")),
            size: read_int(catalog.field(column, "size")),
            in_bytes: catalog.field(column, "inbytes").as_bool().unwrap_or(false),
        }
    }

    /// Declared width in bytes, under the worst-case character width for
    /// character-counted string columns.
    fn width_bytes(self) -> i64 {
        if self.ty == ColumnType::String && !self.in_bytes {
            self.size * MAX_BYTES_PER_UTF8_CHAR
        } else {
            self.size
        }
    }
}

fn read_int(value: &FieldValue) -> i64 {
    value.as_int().expect("declared Int field holds Int")
}

/// Judge whether changing a column from `old` to `new` is lossless.
/// Returns the rejection message otherwise.
pub fn check_column_shape_change(old: ColumnShape, new: ColumnShape) -> Result<(), String> {
    if old.ty == new.ty {
        // Same type: width may only grow. Character-counted string columns
        // becoming byte-counted must grow by the worst-case character
        // width to stay lossless.
        if new.width_bytes() >= old.width_bytes() {
            return Ok(());
        }
        return Err(format!(
            "may not reduce the size of column type {} from {} to {}{}",
            old.ty.name(),
            old.size,
            new.size,
            if old.in_bytes != new.in_bytes { " (character/byte semantics changed)" } else { "" },
        ));
    }
    use ColumnType::*;
    let widens = matches!(
        (old.ty, new.ty),
        (Timestamp, BigInt)
            | (BigInt, Decimal)
            | (Integer, Decimal | Float | BigInt)
            | (SmallInt, Decimal | Float | BigInt | Integer)
            | (TinyInt, Decimal | Float | BigInt | Integer | SmallInt)
    );
    if widens {
        Ok(())
    } else {
        Err(format!(
            "may not convert column type {} to {}",
            old.ty.name(),
            new.ty.name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(ty: ColumnType, size: i64) -> ColumnShape {
        ColumnShape { ty, size, in_bytes: ty != ColumnType::String }
    }

    #[test]
    fn same_type_growth_is_allowed_shrink_is_not() {
        for ty in [
            ColumnType::TinyInt,
            ColumnType::Integer,
            ColumnType::String,
            ColumnType::Varbinary,
            ColumnType::Decimal,
        ] {
            assert!(check_column_shape_change(shape(ty, 10), shape(ty, 11)).is_ok());
            assert!(check_column_shape_change(shape(ty, 11), shape(ty, 10)).is_err());
        }
    }

    #[test]
    fn char_counted_strings_need_the_worst_case_multiplier_in_bytes() {
        let chars = ColumnShape { ty: ColumnType::String, size: 10, in_bytes: false };
        let enough = ColumnShape { ty: ColumnType::String, size: 40, in_bytes: true };
        let short = ColumnShape { ty: ColumnType::String, size: 39, in_bytes: true };
        assert!(check_column_shape_change(chars, enough).is_ok());
        assert!(check_column_shape_change(chars, short).is_err());
        // Bytes back to characters widens the effective capacity.
        assert!(check_column_shape_change(enough, chars).is_ok());
    }

    #[test]
    fn integer_promotions_are_one_directional() {
        use ColumnType::*;
        let allowed = [
            (Timestamp, BigInt),
            (BigInt, Decimal),
            (Integer, Decimal),
            (Integer, Float),
            (Integer, BigInt),
            (SmallInt, Integer),
            (TinyInt, SmallInt),
            (TinyInt, Float),
        ];
        for (from, to) in allowed {
            assert!(check_column_shape_change(shape(from, 8), shape(to, 8)).is_ok());
            assert!(
                check_column_shape_change(shape(to, 8), shape(from, 8)).is_err(),
                "{} -> {} must not be reversible",
                from.name(),
                to.name()
            );
        }
    }

    #[test]
    fn float_and_decimal_are_sinks() {
        use ColumnType::*;
        assert!(check_column_shape_change(shape(Float, 8), shape(Integer, 8)).is_err());
        assert!(check_column_shape_change(shape(Decimal, 16), shape(BigInt, 8)).is_err());
        assert!(check_column_shape_change(shape(Float, 8), shape(Decimal, 16)).is_err());
        assert!(check_column_shape_change(shape(String, 16), shape(Varbinary, 16)).is_err());
    }

    #[test]
    fn type_tags_round_trip() {
        for tag in [3, 4, 5, 6, 8, 9, 11, 22, 25] {
            assert_eq!(ColumnType::from_field(tag).unwrap().as_field(), tag);
        }
        assert_eq!(ColumnType::from_field(7), None);
    }
}
