/// One of the scannable value shapes a [`crate::Search`] can be opened with
/// (spec.md §3, "Search Type"). RE ("reverse-endian") flavors exist only for
/// widths of 16 bits or wider — there's no useful distinction between
/// native and reversed byte order for a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchType {
    U8,
    I8,
    U16,
    U16Re,
    I16,
    I16Re,
    U32,
    U32Re,
    I32,
    I32Re,
    U64,
    U64Re,
    I64,
    I64Re,
    F32,
    F32Re,
    F64,
    F64Re,
    /// Opaque variable-length byte string. `value_size()` is 0 for this
    /// variant; the probe width is instead whatever operand the caller
    /// supplies.
    Data,
}

impl SearchType {
    pub const ALL: [SearchType; 19] = [
        Self::U8,
        Self::I8,
        Self::U16,
        Self::U16Re,
        Self::I16,
        Self::I16Re,
        Self::U32,
        Self::U32Re,
        Self::I32,
        Self::I32Re,
        Self::U64,
        Self::U64Re,
        Self::I64,
        Self::I64Re,
        Self::F32,
        Self::F32Re,
        Self::F64,
        Self::F64Re,
        Self::Data,
    ];

    /// Fixed byte width of one value of this type; `0` for [`Self::Data`],
    /// whose width is only known from the operand at scan time.
    #[must_use]
    pub const fn value_size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::U16Re | Self::I16 | Self::I16Re => 2,
            Self::U32 | Self::U32Re | Self::I32 | Self::I32Re | Self::F32 | Self::F32Re => 4,
            Self::U64 | Self::U64Re | Self::I64 | Self::I64Re | Self::F64 | Self::F64Re => 8,
            Self::Data => 0,
        }
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        !matches!(
            self,
            Self::F32 | Self::F32Re | Self::F64 | Self::F64Re | Self::Data
        )
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F32Re | Self::F64 | Self::F64Re)
    }

    #[must_use]
    pub const fn is_reverse_endian(self) -> bool {
        matches!(
            self,
            Self::U16Re
                | Self::I16Re
                | Self::U32Re
                | Self::I32Re
                | Self::U64Re
                | Self::I64Re
                | Self::F32Re
                | Self::F64Re
        )
    }

    /// The shell-facing spelling of this type (spec.md §6: "the catalogue
    /// of search-type names... the shell is expected to accept").
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::U16 => "uint16",
            Self::U16Re => "reverse-uint16",
            Self::I16 => "int16",
            Self::I16Re => "reverse-int16",
            Self::U32 => "uint32",
            Self::U32Re => "reverse-uint32",
            Self::I32 => "int32",
            Self::I32Re => "reverse-int32",
            Self::U64 => "uint64",
            Self::U64Re => "reverse-uint64",
            Self::I64 => "int64",
            Self::I64Re => "reverse-int64",
            Self::F32 => "float",
            Self::F32Re => "reverse-float",
            Self::F64 => "double",
            Self::F64Re => "reverse-double",
            Self::Data => "data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_flavors_only_exist_at_width_16_and_up() {
        assert!(!SearchType::U8.is_reverse_endian());
        assert!(!SearchType::I8.is_reverse_endian());
        assert!(SearchType::U16Re.is_reverse_endian());
        assert!(SearchType::F64Re.is_reverse_endian());
    }

    #[test]
    fn data_has_no_fixed_width() {
        assert_eq!(SearchType::Data.value_size(), 0);
        assert!(!SearchType::Data.is_integer());
        assert!(!SearchType::Data.is_float());
    }

    #[test]
    fn names_are_stable_catalogue_entries() {
        assert_eq!(SearchType::I8.name(), "int8");
        assert_eq!(SearchType::U32Re.name(), "reverse-uint32");
    }
}
