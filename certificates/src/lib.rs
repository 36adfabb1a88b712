// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utilities for validating X509 certificates handed to cluster members and
//! for computing the fingerprints recorded alongside them.

use opcenter_common::api::external::Error;
use openssl::asn1::Asn1Time;
use openssl::pkey::PKey;
use openssl::x509::X509;

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate")]
    BadCertificate(#[source] openssl::error::ErrorStack),

    #[error("Certificate exists, but is empty")]
    CertificateEmpty,

    #[error("Certificate exists, but is expired")]
    CertificateExpired,

    #[error("Failed to parse private key")]
    BadPrivateKey(#[source] openssl::error::ErrorStack),

    #[error("Certificate and private key do not match")]
    Mismatch,

    #[error("Unexpected error")]
    Unexpected(#[source] openssl::error::ErrorStack),
}

impl From<CertificateError> for Error {
    fn from(error: CertificateError) -> Self {
        use CertificateError::*;
        match error {
            BadCertificate(_)
            | CertificateEmpty
            | CertificateExpired
            | Mismatch => Error::InvalidValue {
                label: String::from("certificate"),
                message: format!("{error:#}"),
            },
            BadPrivateKey(_) => Error::InvalidValue {
                label: String::from("private-key"),
                message: format!("{error:#}"),
            },
            Unexpected(_) => {
                Error::InternalError { internal_message: format!("{error:#}") }
            }
        }
    }
}

pub struct CertificateValidator {
    validate_expiration: bool,
}

impl Default for CertificateValidator {
    fn default() -> Self {
        Self { validate_expiration: true }
    }
}

impl CertificateValidator {
    /// Disable validation of certificate expiration dates.
    pub fn danger_disable_expiration_validation(&mut self) {
        self.validate_expiration = false;
    }

    /// Validate that we can parse the cert chain, that the key matches, and
    /// that the certs in the chain are not expired (unless we have disabled
    /// expiration validation).
    ///
    /// `certs` is expected to be a certificate chain in PEM format, leaf
    /// first.  `key` is expected to be the private key for that leaf in PEM
    /// format.
    pub fn validate(
        &self,
        certs: &[u8],
        key: &[u8],
    ) -> Result<(), CertificateError> {
        let mut certs = X509::stack_from_pem(certs)
            .map_err(CertificateError::BadCertificate)?;
        if certs.is_empty() {
            return Err(CertificateError::CertificateEmpty);
        }

        if self.validate_expiration {
            let now = Asn1Time::days_from_now(0)
                .map_err(CertificateError::Unexpected)?;
            for cert in &certs {
                if cert.not_after() < now {
                    return Err(CertificateError::CertificateExpired);
                }
            }
        }

        let cert = certs.swap_remove(0);

        let key = PKey::private_key_from_pem(key)
            .map_err(CertificateError::BadPrivateKey)?;

        // The private key must correspond to the leaf's public key.
        if !cert
            .public_key()
            .map_err(CertificateError::BadCertificate)?
            .public_eq(&key)
        {
            return Err(CertificateError::Mismatch);
        }

        Ok(())
    }
}

/// Returns the lowercase hex SHA-256 digest of the DER encoding of the first
/// certificate in `pem`.
pub fn fingerprint(pem: &[u8]) -> Result<String, CertificateError> {
    let certs =
        X509::stack_from_pem(pem).map_err(CertificateError::BadCertificate)?;
    let Some(leaf) = certs.first() else {
        return Err(CertificateError::CertificateEmpty);
    };
    let der = leaf.to_der().map_err(CertificateError::BadCertificate)?;
    Ok(hex::encode(openssl::sha::sha256(&der)))
}
