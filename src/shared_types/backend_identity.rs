use rand::Rng;

// -----------------------------------------------------------------------------
// ----- BackendIdentity -------------------------------------------------------

/// Process id and secret key pair carried by BackendKeyData and
/// CancelRequest. Clients get a random one from the proxy; server
/// connections remember the one their backend handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendIdentity {
    pub process_id: i32,
    pub secret_key: i32,
}

// -----------------------------------------------------------------------------
// ----- BackendIdentity: Static -----------------------------------------------

impl BackendIdentity {
    pub fn new(process_id: i32, secret_key: i32) -> Self {
        Self {
            process_id,
            secret_key,
        }
    }

    pub fn random() -> Self {
        let mut rng = rand::rng();

        BackendIdentity {
            process_id: rng.random(),
            secret_key: rng.random(),
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
