use {
    hmac::{Hmac, Mac},
    sha2::Sha256,
    tracing::warn,
};

type HmacSha256 = Hmac<Sha256>;

/// Verify the `X-Hub-Signature-256` header against the raw request body.
///
/// The header carries `sha256=<hex>`.
#[must_use]
pub fn verify_signature(body: &[u8], signature_header: &str, app_secret: &str) -> bool {
    let expected = match signature_header.strip_prefix("sha256=") {
        Some(hex) => hex,
        None => {
            warn!("invalid signature header format (missing sha256= prefix)");
            return false;
        },
    };

    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("failed to create HMAC");
            return false;
        },
    };

    mac.update(body);
    let computed = hex::encode(mac.finalize().into_bytes());

    // Constant-time comparison to prevent timing attacks.
    constant_time_eq(&computed, expected)
}

/// Constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Verify the webhook subscription handshake (GET request).
///
/// The platform sends `hub.mode=subscribe`, `hub.verify_token=<token>`,
/// and `hub.challenge=<random>`; the challenge must be echoed back on a
/// token match. Returns `Some(challenge)` when verification succeeds.
#[must_use]
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    verify_token: &str,
) -> Option<String> {
    let mode = mode?;
    let token = token?;
    let challenge = challenge?;

    if mode == "subscribe" && token == verify_token {
        Some(challenge.to_string())
    } else {
        None
    }
}
