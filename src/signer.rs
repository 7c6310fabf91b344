//! Signature computation and verification over canonical parameter strings.
//!
//! Signing is kept apart from [`ParameterBag`](crate::params::ParameterBag) so a
//! gateway can swap between asymmetric (RSA) and symmetric (HMAC) algorithms
//! without touching canonicalization.

use crate::errors::{GatewayError, Result};
use crate::utils::constant_time_eq;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// Signature algorithm tag carried in the `sign_type` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignType {
    /// SHA256withRSA, PKCS#1 v1.5 padding
    #[serde(rename = "RSA2")]
    Rsa2,
    /// HMAC-SHA256 with a shared secret
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
}

impl SignType {
    /// Wire tag for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::Rsa2 => "RSA2",
            SignType::HmacSha256 => "HMAC-SHA256",
        }
    }
}

impl fmt::Display for SignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RSA2" => Ok(SignType::Rsa2),
            "HMAC-SHA256" | "HMACSHA256" => Ok(SignType::HmacSha256),
            other => Err(GatewayError::ConfigError(format!(
                "unsupported sign type: {}",
                other
            ))),
        }
    }
}

/// Computes and checks signatures for one merchant.
///
/// Implementations must be deterministic: the same content always yields the
/// same signature.
pub trait Signer: Send + Sync {
    /// Algorithm tag written into `sign_type`.
    fn sign_type(&self) -> SignType;

    /// Signs the canonical string.
    fn sign(&self, content: &str) -> Result<String>;

    /// Checks `signature` against `content`.
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature.
    fn verify(&self, content: &str, signature: &str) -> Result<bool>;
}

/// SHA256withRSA signer producing base64 signatures.
pub struct RsaSha256Signer {
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
}

impl RsaSha256Signer {
    /// Creates a signer from encoded keys.
    ///
    /// # Arguments
    ///
    /// * `private_key` - Merchant private key, PEM or bare base64 DER (PKCS#8 or PKCS#1)
    /// * `public_key` - Gateway public key used for verification; when `None`
    ///   the public half of `private_key` is used
    pub fn new(private_key: &str, public_key: Option<&str>) -> Result<Self> {
        let private = decode_private_key(private_key)?;
        let public = match public_key.filter(|k| !k.trim().is_empty()) {
            Some(k) => decode_public_key(k)?,
            None => private.to_public_key(),
        };
        Ok(Self::from_keys(private, public))
    }

    /// Creates a signer from already-decoded keys.
    pub fn from_keys(private_key: RsaPrivateKey, public_key: RsaPublicKey) -> Self {
        Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            verifying_key: VerifyingKey::<Sha256>::new(public_key),
        }
    }
}

impl Signer for RsaSha256Signer {
    fn sign_type(&self) -> SignType {
        SignType::Rsa2
    }

    fn sign(&self, content: &str) -> Result<String> {
        let signature = self
            .signing_key
            .try_sign(content.as_bytes())
            .map_err(|e| GatewayError::KeyError(format!("RSA signing failed: {}", e)))?;
        Ok(BASE64.encode(signature.to_bytes()))
    }

    fn verify(&self, content: &str, signature: &str) -> Result<bool> {
        let Ok(raw) = BASE64.decode(signature.trim().as_bytes()) else {
            return Ok(false);
        };
        let Ok(signature) = Signature::try_from(raw.as_slice()) else {
            return Ok(false);
        };
        Ok(self
            .verifying_key
            .verify(content.as_bytes(), &signature)
            .is_ok())
    }
}

/// HMAC-SHA256 signer producing lowercase hex signatures.
pub struct HmacSha256Signer {
    secret: String,
}

impl HmacSha256Signer {
    /// Creates a signer with the shared secret.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(GatewayError::KeyError("HMAC secret is empty".to_string()));
        }
        Ok(Self { secret })
    }

    fn mac(&self, content: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| GatewayError::KeyError(e.to_string()))?;
        mac.update(content.as_bytes());
        Ok(mac)
    }
}

impl Signer for HmacSha256Signer {
    fn sign_type(&self) -> SignType {
        SignType::HmacSha256
    }

    fn sign(&self, content: &str) -> Result<String> {
        Ok(hex::encode(self.mac(content)?.finalize().into_bytes()))
    }

    fn verify(&self, content: &str, signature: &str) -> Result<bool> {
        let expected = self.sign(content)?;
        Ok(constant_time_eq(&expected, &signature.trim().to_ascii_lowercase()))
    }
}

fn is_pem(key: &str) -> bool {
    key.trim_start().starts_with("-----BEGIN")
}

fn decode_der(key: &str) -> Result<Vec<u8>> {
    let compact: String = key.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(BASE64.decode(compact.as_bytes())?)
}

fn decode_private_key(key: &str) -> Result<RsaPrivateKey> {
    let parsed = if is_pem(key) {
        RsaPrivateKey::from_pkcs8_pem(key)
            .ok()
            .or_else(|| RsaPrivateKey::from_pkcs1_pem(key).ok())
    } else {
        let der = decode_der(key)?;
        RsaPrivateKey::from_pkcs8_der(&der)
            .ok()
            .or_else(|| RsaPrivateKey::from_pkcs1_der(&der).ok())
    };
    parsed.ok_or_else(|| GatewayError::KeyError("unrecognised RSA private key".to_string()))
}

fn decode_public_key(key: &str) -> Result<RsaPublicKey> {
    let parsed = if is_pem(key) {
        RsaPublicKey::from_public_key_pem(key)
            .ok()
            .or_else(|| RsaPublicKey::from_pkcs1_pem(key).ok())
    } else {
        let der = decode_der(key)?;
        RsaPublicKey::from_public_key_der(&der)
            .ok()
            .or_else(|| RsaPublicKey::from_pkcs1_der(&der).ok())
    };
    parsed.ok_or_else(|| GatewayError::KeyError("unrecognised RSA public key".to_string()))
}
