//! Token primitives.
//!
//! - [`AccountTokens`]: stateless, purpose-bound links for email verification and
//!   password reset. Nothing is persisted; a token dies when the state it was
//!   derived from changes or when its timestamp ages past the TTL.
//! - [`SessionIssuer`]: HS256 access/refresh pairs. Refresh tokens can be revoked
//!   through the store's deny-list.

mod account;
mod session;

pub use account::{AccountTokens, TokenPurpose};
pub use session::{Claims, SessionError, SessionIssuer, TokenPair, TokenType};

/// Compare two byte strings without short-circuiting on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn constant_time_eq_compares_content() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
