use crate::gateway::Binding;
use crate::shared_types::{AuthStage, BackendIdentity};

// -----------------------------------------------------------------------------
// ----- FrontendContext -------------------------------------------------------

/// What the handshake learned about a client connection.
#[derive(Debug)]
pub(crate) struct FrontendContext {
    pub(crate) stage: AuthStage,
    pub(crate) username: Option<String>,
    pub(crate) database: Option<String>,

    /// Handed to the client as its BackendKeyData.
    pub(crate) client_key: BackendIdentity,

    /// Set once authentication succeeded.
    pub(crate) binding: Option<Binding>,

    /// The session sits in the session registry and must be removed.
    pub(crate) admitted: bool,

    close_after_flush: bool,
    upgrade_to_tls: bool,
}

impl FrontendContext {
    pub(crate) fn new() -> Self {
        Self {
            stage: AuthStage::Startup,
            username: None,
            database: None,
            client_key: BackendIdentity::random(),
            binding: None,
            admitted: false,
            close_after_flush: false,
            upgrade_to_tls: false,
        }
    }

    pub(crate) fn request_close(&mut self) {
        self.close_after_flush = true;
    }

    pub(crate) fn should_close(&self) -> bool {
        self.close_after_flush
    }

    pub(crate) fn request_tls_upgrade(&mut self) {
        self.upgrade_to_tls = true;
    }

    pub(crate) fn take_tls_upgrade(&mut self) -> bool {
        std::mem::take(&mut self.upgrade_to_tls)
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
