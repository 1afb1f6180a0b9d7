//! Shared cryptographic helpers for the session workspace
//!
//! - `jwt`: HS256 access token signing and validation
//! - `hash`: SHA-256 digests used for non-reversible storage keys

pub mod hash;
pub mod jwt;

pub use jwt::{Claims, IssuedToken, JwtError, TokenSigner};
