//! PKCE code challenge (S256).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Verifier length in bytes before encoding.
const VERIFIER_LENGTH: usize = 32;

/// A code verifier and the challenge derived from it.
///
/// The challenge travels to the IDP; the verifier stays with the SP and is
/// needed to redeem whatever the IDP mints.
#[derive(Clone, PartialEq, Eq)]
pub struct CodeChallenge {
    verifier: String,
    challenge: String,
}

impl CodeChallenge {
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = s256(&verifier);
        Self { verifier, challenge }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Check that `verifier` hashes to `challenge`.
    pub fn verify(verifier: &str, challenge: &str) -> bool {
        s256(verifier) == challenge
    }
}

impl std::fmt::Debug for CodeChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeChallenge")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7636_vector() {
        let pair = CodeChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(pair.challenge(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn generated_pairs_verify() {
        let pair = CodeChallenge::generate();
        assert_eq!(pair.verifier().len(), 43);
        assert!(CodeChallenge::verify(pair.verifier(), pair.challenge()));
        assert!(!CodeChallenge::verify("other", pair.challenge()));
        assert_ne!(CodeChallenge::generate(), pair);
    }

    #[test]
    fn debug_hides_verifier() {
        let pair = CodeChallenge::from_verifier("secret-verifier");
        assert!(!format!("{pair:?}").contains("secret-verifier"));
    }
}
