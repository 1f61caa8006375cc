#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod distributor;
pub mod errors;
pub mod http_client;
pub mod server;

pub use distributor::{tails_file_url, tails_hash, RetryPolicy, TailsFileDistributor};
pub use errors::error::{TailsFileError, TailsResult};
