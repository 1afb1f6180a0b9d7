/// Security primitives: password hashing and token revocation
pub mod password;
pub mod token_revocation;

pub use password::{hash_password, verify_password, verify_password_timing_safe};
pub use token_revocation::{InMemoryRevocationStore, RedisRevocationStore, RevocationStore};
