//! Serde helpers for the loosely-typed JSON the extraction engine returns.

use serde::{Deserialize, Deserializer};

/// Deserialize `null` (or an absent field, together with `#[serde(default)]`)
/// as the type's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
