//! Scalar element types of the IR.

use std::fmt;

/// Element type carried by every expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Datatype {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Undefined,
}

impl Datatype {
    /// Width of one element in bits.
    pub const fn bits(self) -> u32 {
        use Datatype::*;
        match self {
            Bool => 8,
            UInt8 | Int8 => 8,
            UInt16 | Int16 => 16,
            UInt32 | Int32 | Float32 => 32,
            UInt64 | Int64 | Float64 | Complex64 => 64,
            UInt128 | Int128 | Complex128 => 128,
            Undefined => 0,
        }
    }

    pub const fn is_bool(self) -> bool {
        matches!(self, Datatype::Bool)
    }

    pub const fn is_uint(self) -> bool {
        use Datatype::*;
        matches!(self, UInt8 | UInt16 | UInt32 | UInt64 | UInt128)
    }

    pub const fn is_int(self) -> bool {
        use Datatype::*;
        matches!(self, Int8 | Int16 | Int32 | Int64 | Int128)
    }

    /// Signed or unsigned fixed-width integer.
    pub const fn is_integer(self) -> bool {
        self.is_uint() || self.is_int()
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Datatype::Float32 | Datatype::Float64)
    }

    pub const fn is_complex(self) -> bool {
        matches!(self, Datatype::Complex64 | Datatype::Complex128)
    }

    /// Signed integer of the given width.
    pub fn int(bits: u32) -> Datatype {
        match bits {
            8 => Datatype::Int8,
            16 => Datatype::Int16,
            32 => Datatype::Int32,
            64 => Datatype::Int64,
            128 => Datatype::Int128,
            _ => Datatype::Undefined,
        }
    }

    /// Unsigned integer of the given width.
    pub fn uint(bits: u32) -> Datatype {
        match bits {
            8 => Datatype::UInt8,
            16 => Datatype::UInt16,
            32 => Datatype::UInt32,
            64 => Datatype::UInt64,
            128 => Datatype::UInt128,
            _ => Datatype::Undefined,
        }
    }

    /// Result type of an arithmetic operation over `a` and `b`.
    ///
    /// Floats dominate integers, signed dominates unsigned, and the wider
    /// operand wins within a category. Booleans adopt the other operand.
    pub fn max_type(a: Datatype, b: Datatype) -> Datatype {
        if a == b {
            return a;
        }
        if a.is_bool() {
            return b;
        }
        if b.is_bool() {
            return a;
        }
        if a.is_complex() || b.is_complex() {
            return if a.bits().max(b.bits()) > 64 || a == Datatype::Complex128 || b == Datatype::Complex128 {
                Datatype::Complex128
            } else {
                Datatype::Complex64
            };
        }
        if a.is_float() || b.is_float() {
            return if a == Datatype::Float64 || b == Datatype::Float64 {
                Datatype::Float64
            } else {
                Datatype::Float32
            };
        }
        let bits = a.bits().max(b.bits());
        if a.is_int() || b.is_int() {
            Datatype::int(bits)
        } else {
            Datatype::uint(bits)
        }
    }

    /// C99 spelling of the type, if C can express it.
    pub fn c_name(self) -> Option<&'static str> {
        use Datatype::*;
        Some(match self {
            Bool => "bool",
            UInt8 => "uint8_t",
            UInt16 => "uint16_t",
            UInt32 => "uint32_t",
            UInt64 => "uint64_t",
            Int8 => "int8_t",
            Int16 => "int16_t",
            Int32 => "int32_t",
            Int64 => "int64_t",
            Float32 => "float",
            Float64 => "double",
            Complex64 => "float complex",
            Complex128 => "double complex",
            UInt128 | Int128 | Undefined => return None,
        })
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Datatype::*;
        let name = match self {
            Bool => "bool",
            UInt8 => "uint8",
            UInt16 => "uint16",
            UInt32 => "uint32",
            UInt64 => "uint64",
            UInt128 => "uint128",
            Int8 => "int8",
            Int16 => "int16",
            Int32 => "int32",
            Int64 => "int64",
            Int128 => "int128",
            Float32 => "float",
            Float64 => "double",
            Complex64 => "complex64",
            Complex128 => "complex128",
            Undefined => "undefined",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Datatype::Int32.is_integer());
        assert!(Datatype::UInt8.is_integer());
        assert!(!Datatype::Float32.is_integer());
        assert!(!Datatype::Bool.is_integer());
        assert!(Datatype::Complex64.is_complex());
    }

    #[test]
    fn test_max_type_promotion() {
        assert_eq!(Datatype::max_type(Datatype::Int32, Datatype::Int32), Datatype::Int32);
        assert_eq!(Datatype::max_type(Datatype::Int8, Datatype::Int32), Datatype::Int32);
        assert_eq!(Datatype::max_type(Datatype::UInt16, Datatype::Int8), Datatype::Int16);
        assert_eq!(Datatype::max_type(Datatype::Int64, Datatype::Float32), Datatype::Float32);
        assert_eq!(Datatype::max_type(Datatype::Float32, Datatype::Float64), Datatype::Float64);
        assert_eq!(Datatype::max_type(Datatype::Bool, Datatype::UInt8), Datatype::UInt8);
    }

    #[test]
    fn test_c_names() {
        assert_eq!(Datatype::Int32.c_name(), Some("int32_t"));
        assert_eq!(Datatype::Float64.c_name(), Some("double"));
        assert_eq!(Datatype::Int128.c_name(), None);
    }
}
