use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const CERT_ENV: &str = "PGHARBOR_TLS_CERT";
const KEY_ENV: &str = "PGHARBOR_TLS_KEY";

// -----------------------------------------------------------------------------
// ----- TlsError --------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{present} is set but {missing} is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },

    #[error("cannot read {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("no {what} found in {path:?}")]
    Empty { what: &'static str, path: PathBuf },

    #[error("invalid tls key/cert pair: {0}")]
    Rustls(#[from] rustls::Error),
}

// -----------------------------------------------------------------------------
// ----- TLS: Exported ---------------------------------------------------------

/// Acceptor for client connections, if a certificate and key are configured
/// through the environment.
pub fn acceptor_from_env() -> Result<Option<TlsAcceptor>, TlsError> {
    let cert_path = env::var_os(CERT_ENV).map(PathBuf::from);
    let key_path = env::var_os(KEY_ENV).map(PathBuf::from);

    match (cert_path, key_path) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(TlsError::Incomplete {
            present: CERT_ENV,
            missing: KEY_ENV,
        }),
        (None, Some(_)) => Err(TlsError::Incomplete {
            present: KEY_ENV,
            missing: CERT_ENV,
        }),
        (Some(cert), Some(key)) => acceptor(&cert, &key).map(Some),
    }
}

pub fn acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

// -----------------------------------------------------------------------------
// ----- TLS: Private helpers --------------------------------------------------

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::Empty {
            what: "certificates",
            path: path.to_path_buf(),
        });
    }

    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::Empty {
            what: "private key",
            path: path.to_path_buf(),
        })
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_is_reported() {
        let err = acceptor(Path::new("/nope/cert.pem"), Path::new("/nope/key.pem")).unwrap_err();
        assert!(matches!(err, TlsError::Io { .. }));
    }

    #[test]
    fn empty_pem_has_no_certificates() {
        let mut cert = NamedTempFile::new().unwrap();
        cert.write_all(b"not a pem file\n").unwrap();
        let err = acceptor(cert.path(), cert.path()).unwrap_err();
        assert!(matches!(err, TlsError::Empty { what: "certificates", .. }));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
