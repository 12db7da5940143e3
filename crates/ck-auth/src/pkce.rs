use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

fn random_urlsafe<const N: usize>() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generates a cryptographically random code verifier for PKCE.
///
/// Returns a 43-character URL-safe string (RFC 7636 compliant, 43-128 chars).
pub fn generate_code_verifier() -> Result<String, getrandom::Error> {
    random_urlsafe::<32>()
}

/// Computes the S256 code challenge from a code verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generates a random `state` parameter (16 random bytes, base64url).
pub fn generate_state() -> Result<String, getrandom::Error> {
    random_urlsafe::<16>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_verifier_is_url_safe() {
        let verifier = generate_code_verifier().unwrap();

        assert_eq!(verifier.len(), 43);
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_code_challenge_matches_rfc_example() {
        // RFC 7636 appendix B
        let challenge = generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGKSMuNqGE");
    }

    #[test]
    fn test_state_uniqueness() {
        let s1 = generate_state().unwrap();
        let s2 = generate_state().unwrap();

        assert_eq!(s1.len(), 22);
        assert_ne!(s1, s2);
    }
}
