//! Token creation, signing and verification.
//!
//! This module provides:
//!
//! - Claim sanitization and the claim model
//! - The `TokenSigner` seam and its JWT implementation
//! - Access/refresh token issuance
//! - Verification including the refresh-token allowlist check

pub mod claims;
pub mod issuer;
pub mod signer;
pub mod verifier;

pub use claims::{
    Claims, PERMISSIONS_CLAIM, Payload, Permissions, RESERVED_CLAIMS, ResourcePermission, Subject,
    decode_unverified, sanitize,
};
pub use issuer::{IssuedTokens, TokenIssuer, TokenPair, TokenSettings, TokenSpec, create_token};
pub use signer::{JwtError, JwtSigner, SigningAlgorithm, TokenSigner};
pub use verifier::Verifier;
