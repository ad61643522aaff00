//! Usage: PKCE verifier/challenge generation for the authorization code flow.

use crate::infra::settings::{MAX_VERIFIER_LENGTH, MIN_VERIFIER_LENGTH};
use crate::shared::error::AppResult;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Unreserved alphanumeric characters (RFC 7636 §4.1 subset).
pub(crate) const VERIFIER_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone)]
pub(crate) struct PkcePair {
    pub(crate) code_verifier: String,
    pub(crate) code_challenge: String,
}

fn validate_verifier_length(length: usize) -> AppResult<()> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(format!(
            "SEC_INVALID_INPUT: code verifier length must be between {MIN_VERIFIER_LENGTH} and {MAX_VERIFIER_LENGTH}, got {length}"
        )
        .into());
    }
    Ok(())
}

pub(crate) fn generate_code_verifier_with<R: Rng + ?Sized>(rng: &mut R, length: usize) -> AppResult<String> {
    validate_verifier_length(length)?;
    let index = Uniform::from(0..VERIFIER_ALPHABET.len());
    Ok((0..length)
        .map(|_| VERIFIER_ALPHABET[index.sample(&mut *rng)] as char)
        .collect())
}

pub(crate) fn generate_code_verifier(length: usize) -> AppResult<String> {
    generate_code_verifier_with(&mut rand::thread_rng(), length)
}

pub fn code_challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

pub(crate) fn generate_pkce_pair(length: usize) -> AppResult<PkcePair> {
    let code_verifier = generate_code_verifier(length)?;
    let code_challenge = code_challenge_s256(&code_verifier);

    Ok(PkcePair {
        code_verifier,
        code_challenge,
    })
}
