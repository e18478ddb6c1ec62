//! Conversion traits between Rust values and [`HostValue`].
//!
//! - [`FromHost`]: read a Rust value out of a host argument
//! - [`IntoHost`]: turn a Rust return value into a [`HostValue`]
//!
//! Integer targets accept any integer variant (and integral floats) that
//! fits; out-of-range values are an [`ConversionError::IntegerOverflow`].

use crate::error::ConversionError;
use crate::{HostRef, HostValue, ScriptFunction, ScriptTable, ScriptUserData};

/// Extract a Rust value from a host value.
pub trait FromHost: Sized {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError>;
}

/// Convert a Rust value into a host value.
pub trait IntoHost {
    fn into_host(self) -> HostValue;
}

impl<T: Into<HostValue>> IntoHost for T {
    fn into_host(self) -> HostValue {
        self.into()
    }
}

fn mismatch(expected: &str, value: &HostValue) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_owned(),
        actual: value.type_name().to_owned(),
    }
}

// ============================================================================
// Integer implementations
// ============================================================================

macro_rules! impl_from_host_int {
    ($($ty:ty),*) => {
        $(
            impl FromHost for $ty {
                fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
                    let wide = value.as_integer().ok_or_else(|| mismatch(stringify!($ty), value))?;
                    <$ty>::try_from(wide).map_err(|_| ConversionError::IntegerOverflow {
                        value: wide.to_string(),
                        target_type: stringify!($ty),
                    })
                }
            }
        )*
    };
}

impl_from_host_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromHost for f64 {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromHost for f32 {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        value.as_f64().map(|v| v as f32).ok_or_else(|| mismatch("f32", value))
    }
}

impl FromHost for bool {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromHost for String {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        match value {
            HostValue::String(s) => Ok(s.clone()),
            HostValue::Null => Err(ConversionError::NullValue {
                target_type: "string".to_owned(),
            }),
            other => Err(mismatch("string", other)),
        }
    }
}

macro_rules! impl_from_host_ref {
    ($($ty:ty => $variant:ident, $name:literal);* $(;)?) => {
        $(
            impl FromHost for $ty {
                fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
                    match value {
                        HostValue::$variant(v) => Ok(v.clone()),
                        HostValue::Null => Err(ConversionError::NullValue {
                            target_type: $name.to_owned(),
                        }),
                        other => Err(mismatch($name, other)),
                    }
                }
            }
        )*
    };
}

impl_from_host_ref! {
    HostRef => Object, "object";
    ScriptFunction => Function, "function";
    ScriptTable => Table, "table";
    ScriptUserData => UserData, "userdata";
}

impl FromHost for HostValue {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl<T: FromHost> FromHost for Option<T> {
    fn from_host(value: &HostValue) -> Result<Self, ConversionError> {
        match value {
            HostValue::Null => Ok(None),
            other => T::from_host(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_narrowing_checks_bounds() {
        assert_eq!(i8::from_host(&HostValue::I32(100)), Ok(100));
        assert!(matches!(
            i8::from_host(&HostValue::I32(300)),
            Err(ConversionError::IntegerOverflow { target_type: "i8", .. })
        ));
        assert!(matches!(
            u32::from_host(&HostValue::I64(-1)),
            Err(ConversionError::IntegerOverflow { .. })
        ));
    }

    #[test]
    fn integral_float_converts_to_int() {
        assert_eq!(i32::from_host(&HostValue::F64(12.0)), Ok(12));
        assert!(i32::from_host(&HostValue::F64(12.5)).is_err());
    }

    #[test]
    fn string_rejects_null_and_numbers() {
        assert_eq!(String::from_host(&HostValue::from("x")), Ok("x".to_owned()));
        assert!(matches!(
            String::from_host(&HostValue::Null),
            Err(ConversionError::NullValue { .. })
        ));
        assert!(matches!(
            String::from_host(&HostValue::I32(1)),
            Err(ConversionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Option::<i32>::from_host(&HostValue::Null), Ok(None));
        assert_eq!(Option::<i32>::from_host(&HostValue::I32(3)), Ok(Some(3)));
    }

    #[test]
    fn into_host_uses_from_impls() {
        assert_eq!(5i32.into_host(), HostValue::I32(5));
        assert_eq!(().into_host(), HostValue::Null);
        assert_eq!(Some("a").into_host(), HostValue::String("a".into()));
    }
}
