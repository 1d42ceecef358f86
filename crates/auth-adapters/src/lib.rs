//! # auth-adapters
//!
//! [`IdentityVerifier`](domains::IdentityVerifier) implementations.

#[cfg(feature = "auth-jwt")]
pub mod jwt;
pub mod static_tokens;

#[cfg(feature = "auth-jwt")]
pub use jwt::JwtVerifier;
pub use static_tokens::StaticTokenVerifier;
