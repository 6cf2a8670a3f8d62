//! Verification and decoding of App Store signed payloads (JWS).
//!
//! A payload is accepted only after its `x5c` chain verifies against the
//! trust anchor and its `ES256` signature verifies under the leaf key:
//!
//! ```no_run
//! use appstore_server::{ChainVerifier, PayloadDecoder, TrustAnchor};
//!
//! # fn example(anchor_der: &[u8], signed: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let decoder = PayloadDecoder::new(ChainVerifier::new(TrustAnchor::from_der(anchor_der)?));
//! let transaction = decoder.decode_transaction(signed)?;
//! println!("{}", transaction.transaction_id);
//! # Ok(())
//! # }
//! ```

mod claims;
pub(crate) mod compact;
mod error;

pub use claims::{
    NotificationClaims, NotificationData, NotificationSummary, RenewalInfoClaims, SignedPayload,
    TransactionClaims,
};
pub use error::PayloadError;

use crate::cert::{ChainVerifier, EcPublicKey};
use crate::prelude::warn;
use claims::Shape;
use compact::CompactError;
use jsonwebtoken::{Algorithm, Validation};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

const ALGORITHM_ES256: &str = "ES256";

/// Decodes signed payloads after verifying their certificate chain and signature.
///
/// The decoder holds no mutable state; share it by reference or clone it.
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    verifier: ChainVerifier,
}

impl PayloadDecoder {
    /// Creates a decoder verifying chains with `verifier`.
    pub fn new(verifier: ChainVerifier) -> Self {
        Self { verifier }
    }

    /// Returns the chain verifier.
    pub fn verifier(&self) -> &ChainVerifier {
        &self.verifier
    }

    /// Verifies `signed_payload` and decodes its claims into `T`.
    ///
    /// The pipeline is: extract the chain, verify it against the trust
    /// anchor, take the leaf's key, verify the `ES256` signature, decode the
    /// claims. Nothing is returned unless every step succeeds.
    ///
    /// # Errors
    ///
    /// - [`PayloadError::Malformed`] if the payload is not a compact serialization,
    /// - [`PayloadError::UnsupportedAlgorithm`] if `alg` is not `ES256`,
    /// - [`PayloadError::Chain`] if the certificate chain is missing or does not verify,
    /// - [`PayloadError::InvalidSignature`] if the signature does not verify,
    /// - [`PayloadError::InvalidClaims`] if the verified claims do not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self, signed_payload: &str) -> Result<T, PayloadError> {
        let header = compact::decode_header(signed_payload).map_err(malformed)?;
        if header.alg != ALGORITHM_ES256 {
            return Err(PayloadError::UnsupportedAlgorithm(header.alg));
        }

        let key = self.verifier.extract_leaf_public_key(signed_payload)?;
        verify_and_decode(signed_payload, &key)
    }

    /// Decodes a signed transaction.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::decode`].
    pub fn decode_transaction(
        &self,
        signed_transaction: &str,
    ) -> Result<TransactionClaims, PayloadError> {
        self.decode(signed_transaction)
    }

    /// Decodes signed subscription renewal information.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::decode`].
    pub fn decode_renewal_info(
        &self,
        signed_renewal_info: &str,
    ) -> Result<RenewalInfoClaims, PayloadError> {
        self.decode(signed_renewal_info)
    }

    /// Decodes a version 2 server notification.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::decode`].
    pub fn decode_notification(
        &self,
        signed_notification: &str,
    ) -> Result<NotificationClaims, PayloadError> {
        self.decode(signed_notification)
    }

    /// Decodes a payload whose shape is not known in advance.
    ///
    /// The claims are first read **without** verification and probed for
    /// `transactionId`, then `renewalDate`, then `notificationType`. The
    /// probe only selects the target type; the payload is then fully
    /// verified by [`PayloadDecoder::decode`]. A payload matching none of
    /// the shapes yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`PayloadError::Malformed`] if the claims cannot be read, otherwise
    /// see [`PayloadDecoder::decode`].
    pub fn decode_auto(&self, signed_payload: &str) -> Result<Option<SignedPayload>, PayloadError> {
        let unverified: Map<String, Value> =
            compact::decode_unverified_payload(signed_payload).map_err(malformed)?;

        let payload = match Shape::sniff(&unverified) {
            Some(Shape::Transaction) => {
                SignedPayload::Transaction(Box::new(self.decode(signed_payload)?))
            }
            Some(Shape::RenewalInfo) => {
                SignedPayload::RenewalInfo(Box::new(self.decode(signed_payload)?))
            }
            Some(Shape::Notification) => {
                SignedPayload::Notification(Box::new(self.decode(signed_payload)?))
            }
            None => {
                warn!("Signed payload matches no known claim shape; ignoring it");
                return Ok(None);
            }
        };
        Ok(Some(payload))
    }

    /// Decodes a batch of signed transactions, dropping the ones that fail.
    ///
    /// Each dropped entry is logged with its position and the failure.
    pub fn decode_transactions<S: AsRef<str>>(
        &self,
        signed_transactions: &[S],
    ) -> Vec<TransactionClaims> {
        signed_transactions
            .iter()
            .enumerate()
            .filter_map(|(index, signed)| match self.decode_transaction(signed.as_ref()) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    warn!("Skipping signed transaction at index {index}: {e}");
                    None
                }
            })
            .collect()
    }

    /// Verifies the chain of `signed_payload` and returns the leaf public key.
    ///
    /// The payload signature itself is not checked.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Chain`] if the chain cannot be extracted or does not verify.
    pub fn extract_leaf_public_key(&self, signed_payload: &str) -> Result<EcPublicKey, PayloadError> {
        Ok(self.verifier.extract_leaf_public_key(signed_payload)?)
    }
}

fn malformed(err: CompactError) -> PayloadError {
    PayloadError::Malformed(err.describe())
}

fn verify_and_decode<T: DeserializeOwned>(
    signed_payload: &str,
    key: &EcPublicKey,
) -> Result<T, PayloadError> {
    let mut validation = Validation::new(Algorithm::ES256);
    // App Store payloads carry no registered claims.
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    jsonwebtoken::decode::<T>(signed_payload, &key.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(PayloadError::from_jwt)
}
