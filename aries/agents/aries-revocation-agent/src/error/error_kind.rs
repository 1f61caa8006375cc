use thiserror::Error;

use crate::ledger::RegistrationStep;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum AgentErrorKind {
    #[error("Ledger registration failed at step: {0}")]
    LedgerRegistration(RegistrationStep),
    #[error("Connection not established")]
    ConnectionNotEstablished,
    #[error("Tails file server could not be reached")]
    TailsUploadTransport,
    #[error("Tails file server rejected the upload")]
    TailsUploadRejected,
    #[error("Revocation status list update failed")]
    RevocationUpdate,
    #[error("Revocation registry has no free revocation index left")]
    RevocationRegistryFull,
    #[error("Revocation index is out of range or already assigned")]
    InvalidRevocationIndex,
    #[error("Operation did not complete in time")]
    CompletionTimeout,
    #[error("Message could not be delivered")]
    TransportError,
    #[error("Object is in invalid state for requested operation")]
    InvalidState,
    #[error("Invalid arguments passed")]
    InvalidArguments,
    #[error("Invalid configuration")]
    InvalidConfiguration,
    #[error("Object not found")]
    NotFound,
    #[error("Unable to lock storage")]
    LockError,
    #[error("Serialization error")]
    SerializationError,
    #[error("IO error")]
    IoError,
    #[error("Generic agent error")]
    GenericAgentError,
}
