//! Extraction of the `x5c` certificate chain from a signed payload and its
//! verification against a pinned trust anchor.
//!
//! The root certificate presented in a payload is never trusted because of
//! its position: its signature must verify under the anchor's key before the
//! intermediate and leaf are considered.

use crate::cert::error::{
    CertificateError, ChainError, ChainPosition, ChainViolation,
};
use crate::cert::parsing::{
    decode_x5c_entry, parse_der_encoded_bytes_as_x509_certificate, signing_capability,
    SigningCapability,
};
use crate::cert::{Certificate, EcPublicKey};
use crate::constants::CERT_CHAIN_LENGTH;
use crate::jws::compact;
use crate::prelude::warn;
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;

/// The three certificates carried in a signed payload's `x5c` header.
///
/// Index 0 of the header is the leaf (signer), 1 the intermediate, 2 the root.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CertificateChain {
    leaf: Certificate,
    intermediate: Certificate,
    root: Certificate,
}

impl CertificateChain {
    /// Creates a chain from already parsed certificates.
    pub fn new(leaf: Certificate, intermediate: Certificate, root: Certificate) -> Self {
        Self {
            leaf,
            intermediate,
            root,
        }
    }

    /// Extracts the chain from the protected header of a compact signed payload.
    ///
    /// # Errors
    ///
    /// - [`ChainError::MalformedPayload`] if the payload or header cannot be decoded, the
    ///   `x5c` array does not hold exactly three entries, or an entry is not base64.
    /// - [`ChainError::InvalidRootCertificate`], [`ChainError::InvalidIntermediateCertificate`],
    ///   [`ChainError::InvalidLeafCertificate`] if the entry at that position is not X.509.
    pub fn from_signed_payload(signed_payload: &str) -> Result<Self, ChainError> {
        let header = compact::decode_header(signed_payload)
            .map_err(|e| ChainError::MalformedPayload(e.describe()))?;

        if header.x5c.len() != CERT_CHAIN_LENGTH {
            return Err(ChainError::MalformedPayload(
                "x5c header must contain exactly 3 certificates",
            ));
        }

        // Parsed top-down so a broken root is reported before anything it signs.
        let root = certificate_at(&header.x5c, ChainPosition::Root)?;
        let intermediate = certificate_at(&header.x5c, ChainPosition::Intermediate)?;
        let leaf = certificate_at(&header.x5c, ChainPosition::Leaf)?;

        Ok(Self::new(leaf, intermediate, root))
    }

    /// Returns the leaf (signing) certificate.
    pub fn leaf(&self) -> &Certificate {
        &self.leaf
    }

    /// Returns the intermediate certificate.
    pub fn intermediate(&self) -> &Certificate {
        &self.intermediate
    }

    /// Returns the root certificate as presented by the payload.
    pub fn root(&self) -> &Certificate {
        &self.root
    }
}

fn certificate_at(x5c: &[String], position: ChainPosition) -> Result<Certificate, ChainError> {
    let index = match position {
        ChainPosition::Leaf => 0,
        ChainPosition::Intermediate => 1,
        ChainPosition::Root => 2,
    };
    let der = decode_x5c_entry(&x5c[index])
        .ok_or(ChainError::MalformedPayload("x5c entry is not valid base64"))?;
    Certificate::try_from(der).map_err(|e| ChainError::invalid_certificate(position, e))
}

/// The root certificate authority every payload chain must verify against.
///
/// The anchor is fixed per deployment and passed to the client once; it is not
/// taken from the payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TrustAnchor(Certificate);

impl TrustAnchor {
    /// Creates an anchor from a DER-encoded CA certificate.
    ///
    /// # Errors
    ///
    /// Returns a [`CertificateError`] if the bytes are not X.509 or the
    /// certificate is not a CA allowed to sign certificates.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let x509 = parse_der_encoded_bytes_as_x509_certificate(der)?;
        match signing_capability(&x509)? {
            SigningCapability::Signer => Ok(Self(Certificate::try_from(der)?)),
            SigningCapability::NotCa | SigningCapability::NoKeyCertSign => {
                Err(CertificateError::NotCertificateAuthority)
            }
        }
    }

    /// Returns the anchor certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.0
    }
}

/// Verifies payload certificate chains against a [`TrustAnchor`].
///
/// The verifier is stateless apart from its configuration and may be shared
/// freely between threads.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    anchor: TrustAnchor,
    verify_at: Option<OffsetDateTime>,
}

impl ChainVerifier {
    /// Creates a verifier checking validity periods against the current time.
    pub fn new(anchor: TrustAnchor) -> Self {
        Self {
            anchor,
            verify_at: None,
        }
    }

    /// Pins the time at which certificate validity periods are checked.
    #[must_use]
    pub fn at(mut self, time: OffsetDateTime) -> Self {
        self.verify_at = Some(time);
        self
    }

    /// Returns the configured trust anchor.
    pub fn trust_anchor(&self) -> &TrustAnchor {
        &self.anchor
    }

    /// Verifies that `leaf` → `intermediate` → `root` chains to the trust anchor.
    ///
    /// Checks, in order:
    /// - `root` is signed by the anchor's key and names the anchor as issuer
    ///   (a genuine root is byte-identical to the anchor and passes trivially),
    /// - `intermediate` is signed by `root`, and `leaf` by `intermediate`,
    /// - `root` and `intermediate` are CAs allowed to sign certificates, `leaf` is not a CA,
    /// - every certificate is within its validity period.
    ///
    /// # Errors
    ///
    /// Position-specific parse errors if a certificate is not X.509, and
    /// [`ChainError::CertificateChainInvalid`] for any violation of the policy above.
    pub fn verify(
        &self,
        root: &Certificate,
        intermediate: &Certificate,
        leaf: &Certificate,
    ) -> Result<(), ChainError> {
        let anchor = parse_der_encoded_bytes_as_x509_certificate(self.anchor.0.as_bytes())
            .map_err(ChainError::InvalidTrustAnchor)?;
        let root = parse_at(root, ChainPosition::Root)?;
        let intermediate = parse_at(intermediate, ChainPosition::Intermediate)?;
        let leaf = parse_at(leaf, ChainPosition::Leaf)?;

        let result = self.verify_parsed(&anchor, &root, &intermediate, &leaf);
        if let Err(ChainError::CertificateChainInvalid(violation)) = &result {
            warn!("Rejected payload certificate chain: {violation}");
        }
        result
    }

    /// Verifies `chain` and returns the leaf's public key.
    ///
    /// # Errors
    ///
    /// See [`ChainVerifier::verify`]; additionally [`ChainError::UnsupportedKeyType`]
    /// if the leaf key is not an EC P-256 key.
    pub fn verify_chain(&self, chain: &CertificateChain) -> Result<EcPublicKey, ChainError> {
        self.verify(&chain.root, &chain.intermediate, &chain.leaf)?;
        let leaf = parse_at(&chain.leaf, ChainPosition::Leaf)?;
        EcPublicKey::from_x509(&leaf)
    }

    /// Extracts the chain from `signed_payload`, verifies it and returns the leaf's public key.
    ///
    /// The payload's own signature is **not** checked here.
    ///
    /// # Errors
    ///
    /// See [`CertificateChain::from_signed_payload`] and [`ChainVerifier::verify_chain`].
    pub fn extract_leaf_public_key(&self, signed_payload: &str) -> Result<EcPublicKey, ChainError> {
        let chain = CertificateChain::from_signed_payload(signed_payload)?;
        self.verify_chain(&chain)
    }

    fn verify_parsed(
        &self,
        anchor: &X509Certificate<'_>,
        root: &X509Certificate<'_>,
        intermediate: &X509Certificate<'_>,
        leaf: &X509Certificate<'_>,
    ) -> Result<(), ChainError> {
        check_link(root, anchor, ChainPosition::Root)?;
        check_signer(root, ChainPosition::Root)?;

        check_link(intermediate, root, ChainPosition::Intermediate)?;
        check_signer(intermediate, ChainPosition::Intermediate)?;

        check_link(leaf, intermediate, ChainPosition::Leaf)?;
        if leaf.is_ca() {
            return Err(invalid(ChainViolation::LeafIsCertificateAuthority));
        }

        let now = self
            .verify_at
            .unwrap_or_else(OffsetDateTime::now_utc)
            .unix_timestamp();
        for (cert, position) in [
            (root, ChainPosition::Root),
            (intermediate, ChainPosition::Intermediate),
            (leaf, ChainPosition::Leaf),
        ] {
            let validity = cert.validity();
            if now < validity.not_before.timestamp() || now > validity.not_after.timestamp() {
                return Err(invalid(ChainViolation::OutsideValidity(position)));
            }
        }

        Ok(())
    }
}

fn invalid(violation: ChainViolation) -> ChainError {
    ChainError::CertificateChainInvalid(violation)
}

fn parse_at(cert: &Certificate, position: ChainPosition) -> Result<X509Certificate<'_>, ChainError> {
    parse_der_encoded_bytes_as_x509_certificate(cert.as_bytes())
        .map_err(|e| ChainError::invalid_certificate(position, e))
}

/// Checks that `child` names `issuer` as its issuer and carries a signature made with its key.
fn check_link(
    child: &X509Certificate<'_>,
    issuer: &X509Certificate<'_>,
    position: ChainPosition,
) -> Result<(), ChainError> {
    if child.issuer().as_raw() != issuer.subject().as_raw() {
        return Err(invalid(ChainViolation::IssuerMismatch(position)));
    }
    child
        .verify_signature(Some(issuer.public_key()))
        .map_err(|_| invalid(ChainViolation::BadSignature(position)))
}

fn check_signer(cert: &X509Certificate<'_>, position: ChainPosition) -> Result<(), ChainError> {
    match signing_capability(cert) {
        Ok(SigningCapability::Signer) => Ok(()),
        Ok(SigningCapability::NotCa) => Err(invalid(ChainViolation::MissingCaFlag(position))),
        Ok(SigningCapability::NoKeyCertSign) => {
            Err(invalid(ChainViolation::MissingKeyCertSign(position)))
        }
        Err(e) => Err(ChainError::invalid_certificate(position, e)),
    }
}
