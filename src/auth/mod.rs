//! Credential primitives: password hashing, opaque tokens, access JWTs and
//! the request extractor that turns a bearer token into a user id.

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod tokens;

pub use jwt::{Claims, JwtKeys};
pub use middleware::AuthUser;
pub use password::{hash_password, validate_password, verify_password, verify_password_or_dummy};
pub use tokens::{generate_token, hash_token};
