//! Signed bearer tokens for signed-in users.
//!
//! A token is `{user_id}.{signature}` where the signature is the node's
//! ed25519 signature over the user id, hex encoded. Tokens do not expire.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use kinship_core::UserId;

fn message(user: UserId) -> String {
    format!("kinship-user:{}", user)
}

/// Issues and checks user tokens with the node's signing key.
pub struct TokenIssuer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl TokenIssuer {
    pub fn new(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create a token for a user.
    pub fn issue(&self, user: UserId) -> String {
        let signature = self.signing_key.sign(message(user).as_bytes());
        format!("{}.{}", user, hex::encode(signature.to_bytes()))
    }

    /// The user a token was issued for, or `None` if it is malformed or was
    /// not signed by this node.
    pub fn verify(&self, token: &str) -> Option<UserId> {
        let (id, signature) = token.split_once('.')?;
        let user = UserId(id.parse().ok()?);
        let bytes = hex::decode(signature).ok()?;
        let signature = Signature::from_slice(&bytes).ok()?;
        self.verifying_key
            .verify(message(user).as_bytes(), &signature)
            .ok()
            .map(|_| user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(seed: u8) -> TokenIssuer {
        TokenIssuer::new(SigningKey::from_bytes(&[seed; 32]))
    }

    #[test]
    fn issued_token_verifies() {
        let tokens = issuer(1);
        let token = tokens.issue(UserId(42));
        assert!(token.starts_with("42."));
        assert_eq!(tokens.verify(&token), Some(UserId(42)));
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let tokens = issuer(1);
        let token = tokens.issue(UserId(42));
        let (_, sig) = token.split_once('.').unwrap();

        assert_eq!(tokens.verify(&format!("43.{}", sig)), None);
        assert_eq!(tokens.verify("42"), None);
        assert_eq!(tokens.verify("42.zz"), None);
        assert_eq!(tokens.verify("42.abcd"), None);
    }

    #[test]
    fn other_nodes_tokens_are_rejected() {
        let token = issuer(1).issue(UserId(7));
        assert_eq!(issuer(2).verify(&token), None);
    }
}
