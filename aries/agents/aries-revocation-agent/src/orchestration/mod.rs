pub mod connection_broker;
pub mod issuance;
pub mod lifecycle;
pub mod listener;
pub mod registrar;
pub mod revocation;
