// Token subjects and subject locking

use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

/// Something a token can be issued for, usually a user model.
pub trait JwtSubject {
    /// Stable identifier stored in the `sub` claim.
    fn jwt_identifier(&self) -> Value;

    /// Extra claims to embed for this subject.
    fn jwt_custom_claims(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Name of the concrete subject type, hashed into `prv` when the
    /// subject is locked. Two subject types must not share a name.
    fn subject_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// `prv` value for a subject type name: hex SHA-1 of the name.
pub fn hash_subject_type(type_name: &str) -> String {
    hex::encode(Sha1::digest(type_name.as_bytes()))
}

/// `prv` value for a subject.
pub fn subject_hash<S: JwtSubject + ?Sized>(subject: &S) -> String {
    hash_subject_type(subject.subject_type())
}
