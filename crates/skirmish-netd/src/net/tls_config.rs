//! Server TLS material.
//!
//! Self-hosted servers run on an auto-generated self-signed certificate;
//! clients pin its SHA-256 fingerprint instead of relying on a CA chain.
//! Operators with real certificates can point the server at their own PEM
//! files and clients use system trust as usual.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_rustls::TlsAcceptor;

/// Default directory for auto-generated cert/key material.
pub fn default_data_dir(app_name: &str) -> PathBuf {
    #[cfg(windows)]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(app_name)
            .join("tls")
    }
    #[cfg(not(windows))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(app_name)
            .join("tls")
    }
}

/// Generate a self-signed cert/key pair in `dir` unless one already exists.
pub fn ensure_cert_pair(dir: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");

    if cert_path.exists() && key_path.exists() {
        return Ok((cert_path, key_path));
    }

    // Pinning mode ignores SAN/hostname, but reasonable SANs keep the cert
    // usable if an operator later switches to system trust.
    let subject_alt_names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(subject_alt_names)?;
    std::fs::write(&cert_path, cert.pem())?;
    std::fs::write(&key_path, signing_key.serialize_pem())?;

    Ok((cert_path, key_path))
}

/// Build a TLS 1.3 acceptor from PEM cert/key files.
pub fn build_acceptor(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(std::fs::File::open(
        cert_path,
    )?))
    .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(std::fs::File::open(
        key_path,
    )?))?
    .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key_path.display()))?;

    let config =
        rustls::ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| anyhow::anyhow!("failed to build server TLS config: {e}"))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Leaf certificate SHA-256 fingerprint as lowercase hex, the form clients
/// pass to their pinned-connect option.
pub fn sha256_fingerprint_hex(cert_path: &Path) -> anyhow::Result<String> {
    use rustls::pki_types::CertificateDer;
    use rustls::pki_types::pem::PemObject;

    let Some(cert) = CertificateDer::pem_file_iter(cert_path)?.next() else {
        anyhow::bail!("no certificate found in {}", cert_path.display());
    };
    let cert = cert?;

    let digest = ring::digest::digest(&ring::digest::SHA256, cert.as_ref());
    Ok(hex::encode(digest.as_ref()))
}
