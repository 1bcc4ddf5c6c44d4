use crate::config::RowKeyHash;
use sha1::Sha1;
use sha2::{Digest, Sha512};

/// Fixed-length opaque id for a logical row, used as the physical key and as
/// the row key embedded in the stored blob.
pub fn row_hash(algorithm: RowKeyHash, keyspace: &str, column_family: &str, key: &str) -> String {
    let input = format!("{keyspace}:{column_family}:{key}");
    match algorithm {
        RowKeyHash::Sha1 => hex::encode(Sha1::digest(input.as_bytes())),
        RowKeyHash::Sha512 => hex::encode(Sha512::digest(input.as_bytes())),
    }
}
