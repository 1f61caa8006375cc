pub mod events;
pub mod messages;
pub mod transport;

use rand::RngCore;

/// Fresh verkey-like identifier for one side of a connection.
pub fn generate_key() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    bs58::encode(key).into_string()
}
