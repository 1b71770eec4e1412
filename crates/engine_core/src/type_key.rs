//! Stable per-type keys.
//!
//! Entities, scenes, and the engine store at most one component, system, or
//! module per concrete type. Those per-type maps are keyed by [`TypeKey`],
//! derived from the Rust type name with the FNV-1a 64-bit hash. The key is
//! deterministic across runs and cheap to hash.

use std::fmt;

/// A unique identifier for a component, system, or module type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(pub u64);

impl TypeKey {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the key for a type name using FNV-1a 64-bit.
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the key for a Rust type `T` from its fully qualified name.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::from_name(std::any::type_name::<T>())
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({:#018x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Health;
    struct Velocity;

    #[test]
    fn test_type_key_is_stable() {
        assert_eq!(TypeKey::of::<Health>(), TypeKey::of::<Health>());
    }

    #[test]
    fn test_type_key_matches_from_name() {
        let from_type = TypeKey::of::<Health>();
        let from_name = TypeKey::from_name(std::any::type_name::<Health>());
        assert_eq!(from_type, from_name);
    }

    #[test]
    fn test_type_key_differs_between_types() {
        assert_ne!(TypeKey::of::<Health>(), TypeKey::of::<Velocity>());
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        // The empty string hashes to the offset basis itself.
        assert_eq!(TypeKey::from_name(""), TypeKey(0xcbf2_9ce4_8422_2325));
        assert_eq!(TypeKey::from_name("a"), TypeKey(0xaf63_dc4c_8601_ec8c));
    }
}
