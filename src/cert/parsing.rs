//! Internal parsing helpers.

use crate::cert::error::CertificateError;
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::oid::Oid;
use x509_parser::error::X509Error;
use x509_parser::extensions::ParsedExtension;
use x509_parser::nom::Err;
use x509_parser::oid_registry;

/// Upper bound for a single base64 `x5c` entry.
///
/// Real chain certificates are around 1 KiB; anything far larger is rejected
/// before decoding.
const MAX_X5C_ENTRY_LEN: usize = 16 * 1024;

/// Parses the given DER-encoded bytes as an X.509 certificate.
///
/// Returns a [`CertificateError`] if the input is not a parseable DER-encoded X.509 certificate.
pub(crate) fn parse_der_encoded_bytes_as_x509_certificate(
    der_bytes: &[u8],
) -> Result<X509Certificate<'_>, CertificateError> {
    match x509_parser::parse_x509_certificate(der_bytes) {
        Ok((_, cert)) => Ok(cert),
        Err(Err::Incomplete(_)) => Err(CertificateError::ParseX509Certificate(
            X509Error::InvalidCertificate,
        )),
        Err(Err::Error(e) | Err::Failure(e)) => Err(CertificateError::ParseX509Certificate(e)),
    }
}

/// Returns the parsed X.509 extension for the provided OID, or `None` if the
/// certificate does not carry it.
pub(crate) fn find_x509_extension<'a>(
    cert: &'a X509Certificate<'_>,
    oid: &Oid<'static>,
) -> Result<Option<&'a ParsedExtension<'a>>, CertificateError> {
    Ok(cert
        .tbs_certificate
        .get_extension_unique(oid)?
        .map(|ext| ext.parsed_extension()))
}

/// Classifies whether `cert` may sign other certificates: the CA basic
/// constraint must be set, and if a key usage is present it must allow
/// `keyCertSign`. An absent key usage extension does not restrict signing.
pub(crate) fn signing_capability(
    cert: &X509Certificate<'_>,
) -> Result<SigningCapability, CertificateError> {
    match find_x509_extension(cert, &oid_registry::OID_X509_EXT_BASIC_CONSTRAINTS)? {
        Some(ParsedExtension::BasicConstraints(b)) if b.ca => {}
        Some(ParsedExtension::BasicConstraints(_)) | None => return Ok(SigningCapability::NotCa),
        // Extension OID is present but content could not be parsed.
        Some(_) => return Err(CertificateError::UnparseableExtension("BasicConstraints")),
    }

    match find_x509_extension(cert, &oid_registry::OID_X509_EXT_KEY_USAGE)? {
        Some(ParsedExtension::KeyUsage(k)) if !k.key_cert_sign() => {
            Ok(SigningCapability::NoKeyCertSign)
        }
        Some(ParsedExtension::KeyUsage(_)) | None => Ok(SigningCapability::Signer),
        Some(_) => Err(CertificateError::UnparseableExtension("KeyUsage")),
    }
}

/// Outcome of [`signing_capability`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum SigningCapability {
    Signer,
    NotCa,
    NoKeyCertSign,
}

/// Decodes one `x5c` header entry (standard base64, padded) into DER bytes.
pub(crate) fn decode_x5c_entry(entry: &str) -> Option<Vec<u8>> {
    use base64ct::{Base64, Encoding as _};

    if entry.len() > MAX_X5C_ENTRY_LEN {
        return None;
    }
    Base64::decode_vec(entry).ok()
}
