//! Pseudo-device identifier derivation.

use sha1::{Digest, Sha1};

const DEFAULT_GUID: &str = "000C2941396B";
const GUID_DEFAULT_PREFIX: usize = 2;
const GUID_SEED: &str = "CAFEBABE";
const GUID_POS: usize = 10;

/// Derives the GUID the store associates with `apple_id`.
///
/// The first two characters of the default GUID are followed by ten hex
/// characters of `sha1(seed + apple_id + seed)`, upper-cased. The same
/// account always maps to the same GUID.
pub fn derive_guid(apple_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(GUID_SEED.as_bytes());
    hasher.update(apple_id.as_bytes());
    hasher.update(GUID_SEED.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let hash_len = DEFAULT_GUID.len() - GUID_DEFAULT_PREFIX;
    let guid = format!(
        "{}{}",
        &DEFAULT_GUID[..GUID_DEFAULT_PREFIX],
        &digest[GUID_POS..GUID_POS + hash_len]
    );
    guid.to_uppercase()
}
