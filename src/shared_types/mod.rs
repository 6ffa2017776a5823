pub mod auth_stage;
pub mod backend_identity;
pub mod pool_identity;
pub mod statement_signature;
pub mod transaction_status;

pub use auth_stage::AuthStage;
pub use backend_identity::BackendIdentity;
pub use pool_identity::PoolIdentity;
pub use statement_signature::StatementSignature;
pub use transaction_status::TransactionStatus;
