//! Domain-separated BLAKE3 for the session layer.
//!
//! Each protocol value (session id, pairwise key, ring share, group key,
//! auth token, confirmation, transcript link) is derived under its own
//! context in [`contexts`]. Inputs with more than one field are length
//! prefixed so that `["ab", "c"]` and `["a", "bc"]` never meet.

/// Derivation contexts, one per protocol value.
pub mod contexts {
    pub const SESSION_ID: &str = "Concord v1 session-id";
    pub const P2P_KEY: &str = "Concord v1 p2p-key";
    pub const SECRET_SHARE: &str = "Concord v1 secret-share";
    pub const GROUP_KEY: &str = "Concord v1 group-key";
    pub const AUTH_TOKEN: &str = "Concord v1 auth-token";
    pub const SESSION_CONFIRMATION: &str = "Concord v1 session-confirmation";
    pub const KEY_CONSISTENCY: &str = "Concord v1 key-consistency";
    pub const TRANSCRIPT_CHAIN: &str = "Concord v1 transcript-chain";

    pub const ALL: &[&str] = &[
        SESSION_ID,
        P2P_KEY,
        SECRET_SHARE,
        GROUP_KEY,
        AUTH_TOKEN,
        SESSION_CONFIRMATION,
        KEY_CONSISTENCY,
        TRANSCRIPT_CHAIN,
    ];
}

/// Plain digest, used for sent-message fingerprints.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive 32 bytes under `context` from `fields`, each prefixed with its
/// little-endian `u32` length.
pub fn derive_multi(context: &str, fields: &[&[u8]]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    for field in fields {
        hasher.update(&(field.len() as u32).to_le_bytes());
        hasher.update(field);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_versioned_and_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for ctx in contexts::ALL {
            assert!(ctx.starts_with("Concord v1 "), "unversioned context {ctx}");
            assert!(seen.insert(*ctx), "duplicate context {ctx}");
        }
    }

    #[test]
    fn test_contexts_separate_outputs() {
        let share = derive_multi(contexts::SECRET_SHARE, &[&[0u8; 32]]);
        let group = derive_multi(contexts::GROUP_KEY, &[&[0u8; 32]]);
        assert_ne!(share, group);
    }

    #[test]
    fn test_field_split_does_not_collide() {
        let a = derive_multi(contexts::SESSION_ID, &[b"ab", b"c"]);
        let b = derive_multi(contexts::SESSION_ID, &[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefix_matches_manual_encoding() {
        let mut manual = Vec::new();
        for field in [&b"hello"[..], &b"world"[..]] {
            manual.extend_from_slice(&(field.len() as u32).to_le_bytes());
            manual.extend_from_slice(field);
        }
        let expected = *::blake3::Hasher::new_derive_key(contexts::P2P_KEY)
            .update(&manual)
            .finalize()
            .as_bytes();
        assert_eq!(derive_multi(contexts::P2P_KEY, &[b"hello", b"world"]), expected);
    }

    #[test]
    fn test_hash_is_plain_blake3() {
        assert_eq!(hash(b"relay"), *::blake3::hash(b"relay").as_bytes());
        assert_ne!(hash(b"relay"), hash(b"relay "));
    }
}
