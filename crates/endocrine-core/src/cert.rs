//! Peer certificate model.
//!
//! `RawPeerCertificate` is what a transport hands over after the TLS
//! handshake. It still carries key material (DER bytes, public key, RSA
//! modulus/exponent). `PeerCertificate` is the sanitized view that access
//! predicates and event listeners get to see; it has no field that could
//! hold key material.

use serde::Serialize;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::error::{EndocrineError, Result};

/// Subset of a distinguished name (subject or issuer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistinguishedName {
    #[serde(rename = "C", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "ST", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "L", skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(rename = "O", skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(rename = "OU", skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    #[serde(rename = "CN", skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// Rendered form, e.g. `C=DE, O=Acme, CN=thyroid`.
    pub rendered: String,
}

impl DistinguishedName {
    fn from_x509(name: &X509Name<'_>) -> Self {
        fn first<'b, 'a: 'b>(
            mut it: impl Iterator<Item = &'b AttributeTypeAndValue<'a>>,
        ) -> Option<String> {
            it.next().and_then(|a| a.as_str().ok()).map(str::to_owned)
        }

        Self {
            country: first(name.iter_country()),
            state: first(name.iter_state_or_province()),
            locality: first(name.iter_locality()),
            organization: first(name.iter_organization()),
            organizational_unit: first(name.iter_organizational_unit()),
            common_name: first(name.iter_common_name()),
            rendered: name.to_string(),
        }
    }
}

/// Certificate as delivered by the transport, key material included.
#[derive(Debug, Clone, Default)]
pub struct RawPeerCertificate {
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    /// Seconds since the unix epoch.
    pub valid_from: i64,
    /// Seconds since the unix epoch.
    pub valid_to: i64,
    /// Upper-case hex serial number.
    pub serial_number: String,
    /// DER encoding of the whole certificate.
    pub raw: Vec<u8>,
    /// DER encoding of the subject public key info.
    pub public_key: Vec<u8>,
    /// RSA modulus (hex), when the key is RSA.
    pub modulus: Option<String>,
    /// RSA public exponent (hex), when the key is RSA.
    pub exponent: Option<String>,
}

impl RawPeerCertificate {
    /// Parse a DER-encoded X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| EndocrineError::Certificate(format!("parse failed: {e}")))?;

        let validity = cert.validity();
        let spki = cert.public_key();
        let (modulus, exponent) = match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => (Some(hex::encode(rsa.modulus)), Some(hex::encode(rsa.exponent))),
            _ => (None, None),
        };

        Ok(Self {
            subject: DistinguishedName::from_x509(cert.subject()),
            issuer: DistinguishedName::from_x509(cert.issuer()),
            valid_from: validity.not_before.timestamp(),
            valid_to: validity.not_after.timestamp(),
            serial_number: hex::encode_upper(cert.raw_serial()),
            raw: der.to_vec(),
            public_key: spki.raw.to_vec(),
            modulus,
            exponent,
        })
    }

    /// Drop key material and keep the identity fields.
    ///
    /// The fingerprint is a digest of `raw`, computed here before `raw` goes.
    pub fn sanitize(self) -> PeerCertificate {
        let fingerprint256 = if self.raw.is_empty() {
            None
        } else {
            Some(colon_hex(&Sha256::digest(&self.raw)))
        };

        PeerCertificate {
            subject: self.subject,
            issuer: self.issuer,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            serial_number: self.serial_number,
            fingerprint256,
        }
    }
}

/// Sanitized peer certificate exposed to predicates and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerCertificate {
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub valid_from: i64,
    pub valid_to: i64,
    pub serial_number: String,
    /// SHA-256 of the DER certificate, lowercase colon-separated hex.
    pub fingerprint256: Option<String>,
}

impl PeerCertificate {
    /// Subject common name, if present.
    pub fn common_name(&self) -> Option<&str> {
        self.subject.common_name.as_deref()
    }
}

/// Lowercase hex pairs joined by `:`.
pub(crate) fn colon_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.push_str(&hex::encode([*b]));
    }
    out
}
