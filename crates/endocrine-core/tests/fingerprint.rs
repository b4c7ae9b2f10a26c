//! CA fingerprint tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use endocrine_core::fingerprint::ca_fingerprint;

const CA_PEM: &[u8] = include_bytes!("pki/ca.crt");
const CLIENT_DER: &[u8] = include_bytes!("pki/client.der");
const CA_FINGERPRINT: &str =
    "60:62:28:76:ca:73:90:a3:f5:8b:16:4a:ab:bc:8b:c1:c1:e7:49:b8:33:8f:22:90:21:8f:58:30:71:0e:cc:1d";

#[test]
fn pem_fingerprint_is_lowercase_sha256() {
    assert_eq!(ca_fingerprint(CA_PEM).unwrap(), CA_FINGERPRINT);
}

#[test]
fn der_input_is_accepted() {
    let fp = ca_fingerprint(CLIENT_DER).unwrap();
    assert!(fp.starts_with("d5:d8:b0:d9"));
    assert_eq!(fp.len(), 32 * 3 - 1);
}

#[test]
fn malformed_input_fails() {
    for bad in [&b""[..], b"not a certificate", b"-----BEGIN CERTIFICATE-----\naGVsbG8=\n-----END CERTIFICATE-----\n"] {
        let err = ca_fingerprint(bad).expect_err("must fail");
        assert_eq!(err.code().as_str(), "FINGERPRINT");
    }
}
