//! `Certificate`, `PrivateKey` and `EcPublicKey` types, plus the certificate
//! chain verifier used for signed payloads.
//!
//! Certificate and key types wrap DER-encoded bytes and validate them at
//! construction time.

use crate::cert::parsing::parse_der_encoded_bytes_as_x509_certificate;
use pkcs8::der::SecretDocument;
use pkcs8::{ObjectIdentifier, PrivateKeyInfo};
use x509_parser::certificate::X509Certificate;
use x509_parser::oid_registry;
use x509_parser::public_key::PublicKey;
use zeroize::Zeroize;

mod chain;
pub mod error;
pub(crate) mod parsing;

pub use chain::{CertificateChain, ChainVerifier, TrustAnchor};
pub use error::{
    CertificateError, ChainError, ChainPosition, ChainViolation, PrivateKeyError,
};

/// `id-ecPublicKey` (RFC 5480).
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// `secp256r1` / P-256 (RFC 5480).
const P256_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// A single DER-encoded X.509 certificate.
///
/// Invariant: instances are always validated as parseable DER-encoded X.509.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    /// Returns the certificate bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Certificate {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Certificate {
    type Error = CertificateError;

    fn try_from(der_bytes: &[u8]) -> Result<Self, Self::Error> {
        parse_der_encoded_bytes_as_x509_certificate(der_bytes)?;
        Ok(Self(Vec::from(der_bytes)))
    }
}

impl TryFrom<Vec<u8>> for Certificate {
    type Error = CertificateError;

    fn try_from(der_bytes: Vec<u8>) -> Result<Self, Self::Error> {
        parse_der_encoded_bytes_as_x509_certificate(&der_bytes)?;
        Ok(Self(der_bytes))
    }
}

/// A DER-encoded EC P-256 private key in PKCS#8 format.
///
/// Invariant: instances are always validated as parseable PKCS#8 carrying an
/// `id-ecPublicKey` key on P-256.
///
/// This type is zeroized on drop.
#[derive(Clone, Eq, PartialEq, Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    /// Decodes a PEM `PRIVATE KEY` block, the format of the `.p8` files issued
    /// by App Store Connect.
    ///
    /// # Errors
    ///
    /// Returns a [`PrivateKeyError`] if the input is not PEM, carries another
    /// label, or does not hold an EC P-256 PKCS#8 key.
    pub fn from_pem(pem: &[u8]) -> Result<Self, PrivateKeyError> {
        let pem = String::from_utf8_lossy(pem);
        let (label, document) =
            SecretDocument::from_pem(pem.trim()).map_err(PrivateKeyError::DecodePem)?;
        if label != "PRIVATE KEY" {
            return Err(PrivateKeyError::UnexpectedPemLabel(label.to_owned()));
        }
        Self::try_from(document.as_bytes())
    }

    /// Returns the private key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PrivateKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = PrivateKeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        validate_ec_p256_pkcs8(bytes)?;
        Ok(Self(Vec::from(bytes)))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("len", &self.0.len())
            .finish()
    }
}

fn validate_ec_p256_pkcs8(bytes: &[u8]) -> Result<(), PrivateKeyError> {
    let info = PrivateKeyInfo::try_from(bytes).map_err(PrivateKeyError::DecodePkcs8)?;
    if info.algorithm.oid != EC_PUBLIC_KEY_OID {
        return Err(PrivateKeyError::UnsupportedAlgorithm);
    }
    match info.algorithm.parameters_oid() {
        Ok(curve) if curve == P256_OID => Ok(()),
        _ => Err(PrivateKeyError::UnsupportedAlgorithm),
    }
}

/// Uncompressed SEC1 point of an EC P-256 public key taken from a verified leaf certificate.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EcPublicKey(Vec<u8>);

impl EcPublicKey {
    /// Returns the SEC1 encoded point (`0x04 || X || Y`).
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the key in the form `jsonwebtoken` verifies ES256 signatures with.
    pub fn decoding_key(&self) -> jsonwebtoken::DecodingKey {
        jsonwebtoken::DecodingKey::from_ec_der(&self.0)
    }

    /// Extracts the subject public key of `cert`, which must be an EC key on P-256.
    pub(crate) fn from_x509(cert: &X509Certificate<'_>) -> Result<Self, ChainError> {
        let spki = cert.public_key();
        if spki.algorithm.algorithm != oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY {
            return Err(ChainError::UnsupportedKeyType);
        }

        let on_p256 = spki
            .algorithm
            .parameters
            .as_ref()
            .and_then(|p| p.as_oid().ok())
            .is_some_and(|curve| curve == oid_registry::OID_EC_P256);
        if !on_p256 {
            return Err(ChainError::UnsupportedKeyType);
        }

        match spki.parsed() {
            Ok(PublicKey::EC(point)) => Ok(Self(point.data().to_vec())),
            _ => Err(ChainError::UnsupportedKeyType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_from_pem_accepts_p256_pkcs8() {
        let key = rcgen::KeyPair::generate().unwrap();
        let pk = PrivateKey::from_pem(key.serialize_pem().as_bytes()).unwrap();
        assert_eq!(pk.as_bytes(), key.serialize_der().as_slice());
    }

    #[test]
    fn private_key_from_pem_rejects_other_curves() {
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        let err = PrivateKey::from_pem(key.serialize_pem().as_bytes()).unwrap_err();
        assert_eq!(err, PrivateKeyError::UnsupportedAlgorithm);
    }

    #[test]
    fn private_key_from_pem_rejects_garbage() {
        let err = PrivateKey::from_pem(b"not pem").unwrap_err();
        assert!(matches!(err, PrivateKeyError::DecodePem(_)));
    }

    #[test]
    fn pem_errors_surface_through_crate_root() {
        let err: crate::PrivateKeyError = PrivateKey::from_pem(b"-----BEGIN").unwrap_err();
        assert!(matches!(err, crate::PrivateKeyError::DecodePem(_)));
        assert_eq!(err.to_string(), "failed decoding PEM private key");

        let chain_err: crate::ChainError = crate::cert::ChainError::UnsupportedKeyType;
        assert_eq!(chain_err, ChainError::UnsupportedKeyType);
    }

    #[test]
    fn private_key_debug_hides_bytes() {
        let key = rcgen::KeyPair::generate().unwrap();
        let pk = PrivateKey::try_from(key.serialize_der().as_slice()).unwrap();
        assert_eq!(format!("{pk:?}"), format!("PrivateKey {{ len: {} }}", pk.as_bytes().len()));
    }

    #[test]
    fn certificate_try_from_rejects_garbage() {
        let err = Certificate::try_from(vec![0u8; 8]).unwrap_err();
        assert!(matches!(err, CertificateError::ParseX509Certificate(_)));
    }

    #[test]
    fn ec_public_key_from_p256_certificate() {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["leaf".to_owned()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let x509 = parse_der_encoded_bytes_as_x509_certificate(cert.der()).unwrap();

        let public = EcPublicKey::from_x509(&x509).unwrap();
        assert_eq!(public.as_bytes(), key.public_key_raw());
    }

    #[test]
    fn ec_public_key_rejects_p384_certificate() {
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        let cert = rcgen::CertificateParams::new(vec!["leaf".to_owned()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let x509 = parse_der_encoded_bytes_as_x509_certificate(cert.der()).unwrap();

        assert_eq!(
            EcPublicKey::from_x509(&x509).unwrap_err(),
            ChainError::UnsupportedKeyType
        );
    }
}
