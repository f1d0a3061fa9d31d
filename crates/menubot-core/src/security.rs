use sha2::{Digest, Sha256};

/// Header Telegram sets to the `secret_token` registered with `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

// ============== Webhook secret ==============

/// Check the secret presented by a webhook call.
///
/// No configured secret means verification is off. Digests are compared
/// without early exit so response timing does not leak matching prefixes.
pub fn verify_webhook_secret(expected: Option<&str>, presented: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(presented) = presented else {
        return false;
    };
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(presented.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Telegram accepts 1-256 characters of `A-Z`, `a-z`, `0-9`, `_` and `-`.
pub fn is_valid_secret_token(s: &str) -> bool {
    (1..=256).contains(&s.len())
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
