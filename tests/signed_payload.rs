use appstore_server::cert::{ChainPosition, ChainViolation};
use appstore_server::jws::{PayloadDecoder, SignedPayload};
use appstore_server::{ChainError, ChainVerifier, PayloadError, TrustAnchor};
use base64ct::{Base64, Encoding as _};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose,
    PKCS_ECDSA_P384_SHA384,
};
use serde_json::{json, Value};

struct Issued {
    cert: rcgen::Certificate,
    key: KeyPair,
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params
}

fn leaf_params() -> CertificateParams {
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, "Prod ECC Mac App Store and iTunes Store Receipt Signing");
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params
}

fn self_signed(cn: &str) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = ca_params(cn).self_signed(&key).unwrap();
    Issued { cert, key }
}

fn issue(params: CertificateParams, key: KeyPair, issuer: &Issued) -> Issued {
    let cert = params.signed_by(&key, &issuer.cert, &issuer.key).unwrap();
    Issued { cert, key }
}

struct Pki {
    root: Issued,
    intermediate: Issued,
    leaf: Issued,
}

impl Pki {
    fn new() -> Self {
        let root = self_signed("Apple Root CA - G3");
        let intermediate = issue(
            ca_params("Apple Worldwide Developer Relations Certification Authority"),
            KeyPair::generate().unwrap(),
            &root,
        );
        let leaf = issue(leaf_params(), KeyPair::generate().unwrap(), &intermediate);
        Self {
            root,
            intermediate,
            leaf,
        }
    }

    fn decoder(&self) -> PayloadDecoder {
        decoder_for(&self.root)
    }

    fn x5c(&self) -> Vec<String> {
        vec![
            Base64::encode_string(self.leaf.cert.der()),
            Base64::encode_string(self.intermediate.cert.der()),
            Base64::encode_string(self.root.cert.der()),
        ]
    }

    fn sign(&self, claims: &Value) -> String {
        sign_with(self.x5c(), &self.leaf.key, claims)
    }
}

fn decoder_for(anchor: &Issued) -> PayloadDecoder {
    PayloadDecoder::new(ChainVerifier::new(
        TrustAnchor::from_der(anchor.cert.der()).unwrap(),
    ))
}

fn sign_with(x5c: Vec<String>, key: &KeyPair, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::ES256);
    header.x5c = Some(x5c);
    let encoding_key = EncodingKey::from_ec_der(&key.serialize_der());
    jsonwebtoken::encode(&header, claims, &encoding_key).unwrap()
}

fn transaction_claims() -> Value {
    json!({
        "transactionId": "1000000123456789",
        "originalTransactionId": "1000000123456789",
        "bundleId": "com.example",
        "productId": "com.example.monthly",
        "purchaseDate": 1_698_148_900_000_i64,
        "environment": "Sandbox",
        "storefront": "USA",
    })
}

#[test]
fn decode_transaction_round_trip() {
    let pki = Pki::new();
    let signed = pki.sign(&transaction_claims());

    let transaction = pki.decoder().decode_transaction(&signed).unwrap();

    assert_eq!(transaction.transaction_id, "1000000123456789");
    assert_eq!(transaction.product_id.as_deref(), Some("com.example.monthly"));
    assert_eq!(transaction.purchase_date, Some(1_698_148_900_000));
    assert_eq!(transaction.extra["storefront"], "USA");
}

#[test]
fn decode_into_caller_type_yields_embedded_claims() {
    let pki = Pki::new();
    let claims = transaction_claims();
    let signed = pki.sign(&claims);

    let decoded: Value = pki.decoder().decode(&signed).unwrap();
    assert_eq!(decoded, claims);
}

#[test]
fn tampered_leaf_certificate_signature_is_rejected() {
    let pki = Pki::new();
    let mut leaf_der = pki.leaf.cert.der().to_vec();
    let last = leaf_der.len() - 1;
    leaf_der[last] ^= 0x01;

    let mut x5c = pki.x5c();
    x5c[0] = Base64::encode_string(&leaf_der);
    let signed = sign_with(x5c, &pki.leaf.key, &transaction_claims());

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(
        matches!(
            err,
            PayloadError::Chain(ChainError::CertificateChainInvalid(
                ChainViolation::BadSignature(ChainPosition::Leaf)
            )) | PayloadError::Chain(ChainError::InvalidLeafCertificate(_))
        ),
        "unexpected error: {err:?}"
    );
}

#[test]
fn payload_signed_by_other_key_is_rejected() {
    let pki = Pki::new();
    let other = KeyPair::generate().unwrap();
    let signed = sign_with(pki.x5c(), &other, &transaction_claims());

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(matches!(err, PayloadError::InvalidSignature(_)), "unexpected error: {err:?}");
}

#[test]
fn substituted_self_signed_root_is_rejected() {
    let pki = Pki::new();
    let pinned = self_signed("Apple Root CA - G3");
    let signed = pki.sign(&transaction_claims());

    let err = decoder_for(&pinned).decode_transaction(&signed).unwrap_err();
    assert!(
        matches!(
            err,
            PayloadError::Chain(ChainError::CertificateChainInvalid(
                ChainViolation::BadSignature(ChainPosition::Root)
            ))
        ),
        "unexpected error: {err:?}"
    );
}

#[test]
fn short_certificate_chain_is_malformed() {
    let pki = Pki::new();
    let x5c = pki.x5c()[..2].to_vec();
    let signed = sign_with(x5c, &pki.leaf.key, &transaction_claims());

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(matches!(
        err,
        PayloadError::Chain(ChainError::MalformedPayload(_))
    ));
}

#[test]
fn missing_certificate_chain_is_malformed() {
    let pki = Pki::new();
    let encoding_key = EncodingKey::from_ec_der(&pki.leaf.key.serialize_der());
    let signed = jsonwebtoken::encode(
        &Header::new(Algorithm::ES256),
        &transaction_claims(),
        &encoding_key,
    )
    .unwrap();

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(matches!(
        err,
        PayloadError::Chain(ChainError::MalformedPayload(_))
    ));
}

#[test]
fn unparseable_root_is_reported_by_position() {
    let pki = Pki::new();
    let mut x5c = pki.x5c();
    x5c[2] = Base64::encode_string(b"definitely not a certificate");
    let signed = sign_with(x5c, &pki.leaf.key, &transaction_claims());

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(matches!(
        err,
        PayloadError::Chain(ChainError::InvalidRootCertificate(_))
    ));
}

#[test]
fn unparseable_intermediate_and_leaf_are_reported_by_position() {
    let pki = Pki::new();
    let garbage = Base64::encode_string(b"definitely not a certificate");

    let mut x5c = pki.x5c();
    x5c[1] = garbage.clone();
    let signed = sign_with(x5c, &pki.leaf.key, &transaction_claims());
    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(
        matches!(err, PayloadError::Chain(ChainError::InvalidIntermediateCertificate(_))),
        "unexpected error: {err:?}"
    );

    let mut x5c = pki.x5c();
    x5c[0] = garbage;
    let signed = sign_with(x5c, &pki.leaf.key, &transaction_claims());
    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(
        matches!(err, PayloadError::Chain(ChainError::InvalidLeafCertificate(_))),
        "unexpected error: {err:?}"
    );
}

#[test]
fn long_certificate_chain_is_malformed() {
    let pki = Pki::new();
    let mut x5c = pki.x5c();
    x5c.push(Base64::encode_string(pki.root.cert.der()));
    let signed = sign_with(x5c, &pki.leaf.key, &transaction_claims());

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(matches!(
        err,
        PayloadError::Chain(ChainError::MalformedPayload(_))
    ));
}

#[test]
fn intermediate_issued_by_other_root_is_issuer_mismatch() {
    let pki = Pki::new();
    let other_root = self_signed("Other Root CA");
    let intermediate = issue(
        ca_params("Other Intermediate CA"),
        KeyPair::generate().unwrap(),
        &other_root,
    );
    let leaf = issue(leaf_params(), KeyPair::generate().unwrap(), &intermediate);
    let x5c = vec![
        Base64::encode_string(leaf.cert.der()),
        Base64::encode_string(intermediate.cert.der()),
        Base64::encode_string(pki.root.cert.der()),
    ];
    let signed = sign_with(x5c, &leaf.key, &transaction_claims());

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(
        matches!(
            err,
            PayloadError::Chain(ChainError::CertificateChainInvalid(
                ChainViolation::IssuerMismatch(ChainPosition::Intermediate)
            ))
        ),
        "unexpected error: {err:?}"
    );
}

#[test]
fn intermediate_without_key_cert_sign_is_rejected() {
    let pki = Pki::new();
    let mut params = ca_params("Signing-only CA");
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    let intermediate = issue(params, KeyPair::generate().unwrap(), &pki.root);
    let leaf = issue(leaf_params(), KeyPair::generate().unwrap(), &intermediate);
    let x5c = vec![
        Base64::encode_string(leaf.cert.der()),
        Base64::encode_string(intermediate.cert.der()),
        Base64::encode_string(pki.root.cert.der()),
    ];
    let signed = sign_with(x5c, &leaf.key, &transaction_claims());

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(
        matches!(
            err,
            PayloadError::Chain(ChainError::CertificateChainInvalid(
                ChainViolation::MissingKeyCertSign(ChainPosition::Intermediate)
            ))
        ),
        "unexpected error: {err:?}"
    );
}

#[test]
fn non_p256_leaf_key_is_unsupported() {
    let pki = Pki::new();
    let leaf = issue(
        leaf_params(),
        KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap(),
        &pki.intermediate,
    );
    let mut x5c = pki.x5c();
    x5c[0] = Base64::encode_string(leaf.cert.der());
    let signed = sign_with(x5c, &pki.leaf.key, &transaction_claims());

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(matches!(
        err,
        PayloadError::Chain(ChainError::UnsupportedKeyType)
    ));
}

#[test]
fn expired_intermediate_is_rejected() {
    let root = self_signed("Apple Root CA - G3");
    let mut params = ca_params("Expired WWDR CA");
    params.not_before = rcgen::date_time_ymd(2015, 1, 1);
    params.not_after = rcgen::date_time_ymd(2016, 1, 1);
    let intermediate = issue(params, KeyPair::generate().unwrap(), &root);
    let leaf = issue(leaf_params(), KeyPair::generate().unwrap(), &intermediate);
    let pki = Pki {
        root,
        intermediate,
        leaf,
    };

    let err = pki
        .decoder()
        .decode_transaction(&pki.sign(&transaction_claims()))
        .unwrap_err();
    assert!(matches!(
        err,
        PayloadError::Chain(ChainError::CertificateChainInvalid(
            ChainViolation::OutsideValidity(ChainPosition::Intermediate)
        ))
    ));
}

#[test]
fn non_es256_algorithm_is_rejected() {
    let pki = Pki::new();
    let p384 = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
    let mut header = Header::new(Algorithm::ES384);
    header.x5c = Some(pki.x5c());
    let signed = jsonwebtoken::encode(
        &header,
        &transaction_claims(),
        &EncodingKey::from_ec_der(&p384.serialize_der()),
    )
    .unwrap();

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(matches!(err, PayloadError::UnsupportedAlgorithm(alg) if alg == "ES384"));
}

#[test]
fn claims_of_wrong_shape_are_invalid_claims() {
    let pki = Pki::new();
    let signed = pki.sign(&json!({"renewalDate": 1_700_000_000_000_i64}));

    let err = pki.decoder().decode_transaction(&signed).unwrap_err();
    assert!(matches!(err, PayloadError::InvalidClaims(_)), "unexpected error: {err:?}");
}

#[test]
fn decode_auto_selects_shape() {
    let pki = Pki::new();
    let decoder = pki.decoder();

    let transaction = decoder
        .decode_auto(&pki.sign(&transaction_claims()))
        .unwrap();
    assert!(matches!(
        transaction,
        Some(SignedPayload::Transaction(t)) if t.transaction_id == "1000000123456789"
    ));

    let renewal = decoder
        .decode_auto(&pki.sign(&json!({
            "renewalDate": 1_700_000_000_000_i64,
            "autoRenewStatus": 1,
        })))
        .unwrap();
    assert!(matches!(
        renewal,
        Some(SignedPayload::RenewalInfo(r)) if r.renewal_date == 1_700_000_000_000
    ));

    let notification = decoder
        .decode_auto(&pki.sign(&json!({
            "notificationType": "TEST",
            "notificationUUID": "3838df56-31ab-4e2d-9535-e99e2ad5ed2f",
        })))
        .unwrap();
    assert!(matches!(
        notification,
        Some(SignedPayload::Notification(n)) if n.notification_type == "TEST"
    ));
}

#[test]
fn decode_auto_unknown_shape_is_none() {
    let pki = Pki::new();
    let signed = pki.sign(&json!({"hello": "world"}));

    assert!(pki.decoder().decode_auto(&signed).unwrap().is_none());
}

#[test]
fn decode_auto_still_verifies_matched_shape() {
    let pki = Pki::new();
    let pinned = self_signed("Apple Root CA - G3");
    let signed = pki.sign(&transaction_claims());

    let err = decoder_for(&pinned).decode_auto(&signed).unwrap_err();
    assert!(matches!(
        err,
        PayloadError::Chain(ChainError::CertificateChainInvalid(_))
    ));
}

#[test]
fn decode_transactions_skips_failures() {
    let pki = Pki::new();
    let good = pki.sign(&transaction_claims());
    let forged = sign_with(pki.x5c(), &KeyPair::generate().unwrap(), &transaction_claims());

    let decoded = pki
        .decoder()
        .decode_transactions(&[good.as_str(), "not-a-jws", forged.as_str(), good.as_str()]);
    assert_eq!(decoded.len(), 2);
}

#[test]
fn extract_leaf_public_key_matches_leaf() {
    let pki = Pki::new();
    let signed = pki.sign(&transaction_claims());

    let key = pki.decoder().extract_leaf_public_key(&signed).unwrap();
    assert_eq!(key.as_bytes(), pki.leaf.key.public_key_raw());
}

#[test]
fn notification_data_carries_nested_signed_payloads() {
    let pki = Pki::new();
    let transaction = pki.sign(&transaction_claims());
    let notification = pki.sign(&json!({
        "notificationType": "DID_RENEW",
        "data": {
            "bundleId": "com.example",
            "environment": "Sandbox",
            "signedTransactionInfo": transaction,
        },
    }));

    let decoder = pki.decoder();
    let claims = decoder.decode_notification(&notification).unwrap();
    let nested = claims.data.unwrap().signed_transaction_info.unwrap();
    let transaction = decoder.decode_transaction(&nested).unwrap();
    assert_eq!(transaction.transaction_id, "1000000123456789");
}
