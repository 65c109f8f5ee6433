//! Reliable-channel TLS setup.
//!
//! Two trust modes: system root certificates (hosted servers with real
//! certs) or a pinned leaf-certificate SHA-256 fingerprint (self-hosted
//! servers on auto-generated certs). Either way the connection is TLS 1.3.

use std::sync::Arc;

use ring::digest;
use tracing::warn;

use crate::error::ClientError;

pub(crate) fn build_tls_config(
    pinned_sha256: Option<[u8; 32]>,
) -> Result<rustls::ClientConfig, ClientError> {
    // The builder needs a process-level crypto provider; installing twice
    // is harmless.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let builder =
        rustls::ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13]);

    if let Some(expected) = pinned_sha256 {
        let supported_algs = rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms)
            .ok_or_else(|| {
                ClientError::ConnectFailed("no rustls CryptoProvider available".to_string())
            })?;

        let verifier = Arc::new(PinnedSha256CertVerifier {
            expected,
            supported_algs,
        });

        let mut cfg = builder
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();
        cfg.dangerous().set_certificate_verifier(verifier);
        Ok(cfg)
    } else {
        let mut roots = rustls::RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        if !native.errors.is_empty() {
            warn!(
                errors = native.errors.len(),
                "Failed to load some native root certs"
            );
        }
        for cert in native.certs {
            let _ = roots.add(cert);
        }

        Ok(builder.with_root_certificates(roots).with_no_client_auth())
    }
}

/// Accepts exactly one certificate: the one whose SHA-256 digest matches
/// the pinned fingerprint. Chain and hostname are not consulted.
#[derive(Debug)]
struct PinnedSha256CertVerifier {
    expected: [u8; 32],
    supported_algs: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl rustls::client::danger::ServerCertVerifier for PinnedSha256CertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        let actual = digest::digest(&digest::SHA256, end_entity.as_ref());
        if actual.as_ref() != self.expected {
            return Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::UnknownIssuer,
            ));
        }
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported_algs)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported_algs)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.supported_algs.supported_schemes()
    }
}

/// Parse a SHA-256 fingerprint in hex form, with or without colons.
pub(crate) fn parse_sha256_fingerprint(s: &str) -> Result<[u8; 32], ClientError> {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();

    if cleaned.len() != 64 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ClientError::ConnectFailed(format!(
            "invalid SHA-256 fingerprint: {s:?}"
        )));
    }

    let bytes = hex::decode(cleaned)
        .map_err(|e| ClientError::ConnectFailed(format!("invalid fingerprint: {e}")))?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}
