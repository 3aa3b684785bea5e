//! CLI generic serialization helpers
// (c) 2024 Ross Younger

use std::{fmt, marker::PhantomData, str::FromStr};

use serde::{de, de::Visitor, Deserialize};

/// Deserialization helper for types which might reasonably be expressed as an
/// integer or a string, such as `1400` or `"64k"`.
///
/// Strings are forwarded to T's `FromStr` impl; integers to its `TryFrom<u64>` impl.
/// The `PhantomData` tells the Visitor which type it is producing.
#[allow(missing_debug_implementations)]
pub struct IntOrString<T>(pub PhantomData<fn() -> T>);

impl<T> Default for IntOrString<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<'de, T> Visitor<'de> for IntOrString<T>
where
    T: Deserialize<'de> + TryFrom<u64> + FromStr,
    <T as FromStr>::Err: std::fmt::Display,
    <T as TryFrom<u64>>::Error: std::fmt::Display,
{
    type Value = T;
    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("int or string")
    }

    fn visit_str<E>(self, value: &str) -> Result<T, E>
    where
        E: de::Error,
    {
        T::from_str(value).map_err(de::Error::custom)
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        T::try_from(value).map_err(de::Error::custom)
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let u = u64::try_from(value).map_err(de::Error::custom)?;
        T::try_from(u).map_err(de::Error::custom)
    }
}
