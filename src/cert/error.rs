//! Error types for certificate parsing, private key decoding and chain verification.

use std::fmt;
use x509_parser::asn1_rs::Oid;
use x509_parser::error::X509Error;

/// An error that may arise parsing X.509 certificates.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    /// Error returned by the X.509 parsing library.
    #[error("failed parsing X.509 certificate")]
    ParseX509Certificate(#[from] X509Error),

    /// An X.509 extension required by the trust policy cannot be found.
    #[error("X.509 extension is missing: {0}")]
    MissingX509Extension(Oid<'static>),

    /// An X.509 extension is present but its content could not be parsed.
    #[error("unparseable X.509 extension: {0}")]
    UnparseableExtension(&'static str),

    /// The certificate is not a certificate authority.
    #[error("certificate is not a CA")]
    NotCertificateAuthority,
}

/// An error that may arise decoding private keys.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum PrivateKeyError {
    /// The key content is not valid PEM.
    #[error("failed decoding PEM private key")]
    DecodePem(pkcs8::der::Error),

    /// The PEM block is not a `PRIVATE KEY` (PKCS#8) block.
    #[error("unexpected PEM label: {0}")]
    UnexpectedPemLabel(String),

    /// Error returned by the pkcs#8 private key decoding library.
    #[error("failed decoding PKCS#8 private key")]
    DecodePkcs8(pkcs8::Error),

    /// The key is not an elliptic-curve key on P-256.
    #[error("private key must be an EC P-256 key")]
    UnsupportedAlgorithm,
}

/// Position of a certificate in the chain carried by a signed payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ChainPosition {
    /// Index 0: the certificate whose key signed the payload.
    Leaf,
    /// Index 1: issuer of the leaf.
    Intermediate,
    /// Index 2: issuer of the intermediate, which must itself chain to the trust anchor.
    Root,
}

impl fmt::Display for ChainPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf => f.write_str("leaf"),
            Self::Intermediate => f.write_str("intermediate"),
            Self::Root => f.write_str("root"),
        }
    }
}

/// Reason a parsed certificate chain was rejected.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ChainViolation {
    /// The certificate's issuer name does not match the subject of the next certificate up.
    #[error("{0} certificate issuer does not match its signer's subject")]
    IssuerMismatch(ChainPosition),

    /// The certificate's signature does not verify under the next certificate's key.
    /// For the root, the next certificate up is the trust anchor.
    #[error("{0} certificate signature does not verify")]
    BadSignature(ChainPosition),

    /// The certificate is outside its validity period.
    #[error("{0} certificate is expired or not yet valid")]
    OutsideValidity(ChainPosition),

    /// A signing certificate lacks the CA basic constraint.
    #[error("{0} certificate must have CA flag set to true")]
    MissingCaFlag(ChainPosition),

    /// A signing certificate has a key usage without `keyCertSign`.
    #[error("{0} certificate must have 'keyCertSign' set as key usage")]
    MissingKeyCertSign(ChainPosition),

    /// The leaf certificate is a CA.
    #[error("leaf certificate must not have CA flag set to true")]
    LeafIsCertificateAuthority,
}

/// Errors produced while extracting and verifying the certificate chain of a signed payload.
///
/// Every variant rejects the payload outright.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum ChainError {
    /// The payload or its `x5c` header could not be decoded.
    #[error("malformed signed payload: {0}")]
    MalformedPayload(&'static str),

    /// The root certificate (`x5c[2]`) is not a parseable X.509 certificate.
    #[error("failed to parse root certificate")]
    InvalidRootCertificate(#[source] CertificateError),

    /// The intermediate certificate (`x5c[1]`) is not a parseable X.509 certificate.
    #[error("failed to parse intermediate certificate")]
    InvalidIntermediateCertificate(#[source] CertificateError),

    /// The leaf certificate (`x5c[0]`) is not a parseable X.509 certificate.
    #[error("failed to parse leaf certificate")]
    InvalidLeafCertificate(#[source] CertificateError),

    /// The configured trust anchor could not be parsed.
    #[error("invalid trust anchor")]
    InvalidTrustAnchor(#[source] CertificateError),

    /// The chain does not verify up to the trust anchor.
    #[error("certificate chain is invalid")]
    CertificateChainInvalid(#[source] ChainViolation),

    /// The leaf certificate key is not an EC P-256 key.
    #[error("leaf public key must be an EC P-256 key")]
    UnsupportedKeyType,
}

impl ChainError {
    pub(crate) fn invalid_certificate(position: ChainPosition, err: CertificateError) -> Self {
        match position {
            ChainPosition::Leaf => Self::InvalidLeafCertificate(err),
            ChainPosition::Intermediate => Self::InvalidIntermediateCertificate(err),
            ChainPosition::Root => Self::InvalidRootCertificate(err),
        }
    }
}
