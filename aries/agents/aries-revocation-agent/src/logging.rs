use env_logger::Env;

/// Logs at `info` unless `RUST_LOG` says otherwise.
pub fn init_logger() {
    let env = Env::default().default_filter_or("info");
    env_logger::init_from_env(env);
}
