//! Short-identifier generation
//!
//! Produces the human-shareable and secret identifiers the service hands
//! out: room codes (uppercase alphanumeric), bot tokens (mixed-case, 32
//! chars) and opaque numeric user-facing ids (10 digits).
//!
//! Generation is pure; uniqueness is the caller's store's business. The
//! [`generate_unique`] helper wraps the generate-check loop with a hard
//! retry cap so a shrinking code space can never become an unbounded loop.

use std::future::Future;

use rand::Rng;

use crate::error::AppError;

/// Uppercase alphanumeric alphabet used for room codes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Mixed-case alphanumeric alphabet used for bot tokens.
const TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Bot tokens are always this long.
pub const TOKEN_LEN: usize = 32;

/// User-facing numeric ids are always this long.
pub const NUMERIC_ID_LEN: usize = 10;

/// Retry cap before giving up with `CodeSpaceExhausted`.
pub const MAX_ATTEMPTS: usize = 100;

/// Generate a random uppercase alphanumeric code of the given length.
pub fn generate(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Generate a random mixed-case alphanumeric token of the given length.
pub fn generate_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Generate a random numeric id of the given length, without a leading zero
/// so the id keeps its full width when parsed as a number.
pub fn generate_numeric(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(len);
    out.push(char::from(b'1' + rng.gen_range(0..9u8)));
    for _ in 1..len {
        out.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    out
}

/// Retry a generator until `exists` reports the candidate free.
///
/// Capped at [`MAX_ATTEMPTS`] attempts, then fails with
/// [`AppError::CodeSpaceExhausted`]. The existence check is advisory; the
/// store's unique constraint remains the authority, so callers must still
/// tolerate a late `Conflict` on insert.
pub async fn generate_unique<G, F, Fut>(mut generate: G, mut exists: F) -> Result<String, AppError>
where
    G: FnMut() -> String,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, AppError>>,
{
    for _ in 0..MAX_ATTEMPTS {
        let candidate = generate();
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }
    Err(AppError::CodeSpaceExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_length_and_alphabet() {
        let code = generate(8);
        assert_eq!(code.len(), 8);
        assert!(code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    #[test]
    fn test_generate_token_alphabet() {
        let token = generate_token(TOKEN_LEN);
        assert_eq!(token.len(), 32);
        assert!(token.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_numeric_width() {
        for _ in 0..20 {
            let id = generate_numeric(NUMERIC_ID_LEN);
            assert_eq!(id.len(), 10);
            assert!(id.bytes().all(|b| b.is_ascii_digit()));
            assert_ne!(id.as_bytes()[0], b'0');
        }
    }

    #[tokio::test]
    async fn test_generate_unique_skips_taken_codes() {
        let mut calls = 0;
        let code = generate_unique(
            || {
                calls += 1;
                format!("CODE{calls}")
            },
            |c| async move { Ok(c != "CODE3") },
        )
        .await
        .unwrap();
        assert_eq!(code, "CODE3");
    }

    #[tokio::test]
    async fn test_generate_unique_gives_up_eventually() {
        let err = generate_unique(|| "TAKEN".to_string(), |_| async { Ok(true) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CodeSpaceExhausted));
    }
}
