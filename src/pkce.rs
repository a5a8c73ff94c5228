// ABOUTME: PKCE code verifier and challenge generation for authorization flows
// ABOUTME: Implements the S256 challenge method from RFC 7636
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::constants::pkce::{CODE_CHALLENGE_METHOD, CODE_VERIFIER_CHARSET, CODE_VERIFIER_LENGTH};

/// `PKCE` (Proof Key for Code Exchange) parameters for one authorization attempt
#[derive(Debug, Clone)]
pub struct PkceParams {
    /// Randomly generated code verifier
    pub code_verifier: String,
    /// SHA256 hash of the code verifier, base64url encoded without padding
    pub code_challenge: String,
    /// Challenge method (always "S256")
    pub code_challenge_method: String,
}

impl PkceParams {
    /// Generate `PKCE` parameters with the `S256` challenge method
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code_verifier: String = (0..CODE_VERIFIER_LENGTH)
            .map(|_| CODE_VERIFIER_CHARSET[rng.gen_range(0..CODE_VERIFIER_CHARSET.len())] as char)
            .collect();

        let code_challenge = Self::challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: CODE_CHALLENGE_METHOD.into(),
        }
    }

    /// Compute the S256 challenge for an existing verifier
    #[must_use]
    pub fn challenge_for(code_verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}
