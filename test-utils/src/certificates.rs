// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utilities for tests that need certificates.

/// A root CA, an intermediate CA and an end-entity certificate signed by the
/// intermediate, all PEM-encoded.
pub struct CertificateChain {
    root_cert: String,
    intermediate_cert: String,
    end_cert: String,
    end_keypair: rcgen::Certificate,
}

impl CertificateChain {
    pub fn new<S: Into<String>>(subject_alt_name: S) -> Self {
        let params =
            rcgen::CertificateParams::new(vec![subject_alt_name.into()]);
        Self::with_params(params)
    }

    pub fn with_params(params: rcgen::CertificateParams) -> Self {
        let mut root_params = rcgen::CertificateParams::new(vec![]);
        root_params.is_ca =
            rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let root_keypair = rcgen::Certificate::from_params(root_params)
            .expect("failed to generate root keys");

        let mut intermediate_params = rcgen::CertificateParams::new(vec![]);
        intermediate_params.is_ca =
            rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let intermediate_keypair =
            rcgen::Certificate::from_params(intermediate_params)
                .expect("failed to generate intermediate keys");

        let end_keypair = rcgen::Certificate::from_params(params)
            .expect("failed to generate end-entity keys");

        let root_cert =
            root_keypair.serialize_pem().expect("failed to serialize root cert");
        let intermediate_cert = intermediate_keypair
            .serialize_pem_with_signer(&root_keypair)
            .expect("failed to serialize intermediate cert");
        let end_cert = end_keypair
            .serialize_pem_with_signer(&intermediate_keypair)
            .expect("failed to serialize end-entity cert");

        Self { root_cert, intermediate_cert, end_cert, end_keypair }
    }

    pub fn end_cert_private_key_as_pem(&self) -> String {
        self.end_keypair.serialize_private_key_pem()
    }

    pub fn end_cert_as_pem(&self) -> String {
        self.end_cert.clone()
    }

    /// Leaf first, root last.
    pub fn cert_chain_as_pem(&self) -> String {
        [&self.end_cert, &self.intermediate_cert, &self.root_cert]
            .into_iter()
            .map(String::as_str)
            .collect()
    }
}
