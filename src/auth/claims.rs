use serde::{Deserialize, Serialize};

/// Fixed `sub` value of every session token.
pub const SUBJECT: &str = "Authentication";

/// JWT payload proving control of `email` until `exp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // always SUBJECT
    pub iss: String,   // issuer
    pub exp: i64,      // expires at (unix seconds), may already be past
    pub email: String, // may be empty, callers decide
}
