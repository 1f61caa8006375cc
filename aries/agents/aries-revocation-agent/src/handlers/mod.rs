pub mod connection;
pub mod credential;
pub mod holder;
pub mod issuer;
pub mod out_of_band;
pub mod revocation_registry;
