//! CA certificate fingerprint.
//!
//! The fingerprint is the SHA-256 digest of the DER-encoded CA certificate,
//! rendered as lowercase hex pairs joined by `:`. It identifies the trust
//! domain in service advertisements.

use sha2::{Digest, Sha256};
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use crate::cert::colon_hex;
use crate::error::{EndocrineError, Result};

const PEM_CERT_LABEL: &str = "CERTIFICATE";

/// Compute the fingerprint of a CA certificate given as PEM or DER bytes.
///
/// Fails if the input holds no certificate or the certificate does not parse.
pub fn ca_fingerprint(ca: &[u8]) -> Result<String> {
    let der = certificate_der(ca)?;
    X509Certificate::from_der(&der)
        .map_err(|e| EndocrineError::Fingerprint(format!("malformed CA certificate: {e}")))?;
    Ok(colon_hex(&Sha256::digest(&der)))
}

/// Extract the DER bytes of the first certificate.
fn certificate_der(input: &[u8]) -> Result<Vec<u8>> {
    // DER starts with a SEQUENCE tag.
    if input.first() == Some(&0x30) {
        return Ok(input.to_vec());
    }

    for pem in Pem::iter_from_buffer(input) {
        let pem = pem.map_err(|e| EndocrineError::Fingerprint(format!("invalid PEM: {e}")))?;
        if pem.label == PEM_CERT_LABEL {
            return Ok(pem.contents);
        }
    }

    Err(EndocrineError::Fingerprint("no certificate found in input".into()))
}
