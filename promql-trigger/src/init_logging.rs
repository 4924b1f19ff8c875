//! Logging initialization for promql-trigger

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install a stderr tracing subscriber, then load a `.env` file if one exists.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Deployed apps get VCAP_APPLICATION and QUERIES from the platform, so a missing
    // file is normal. One that exists but can't be read would silently drop queries.
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded trigger environment from: {}", path.display()),
        Err(dotenvy::Error::Io(io_error)) => {
            if matches!(io_error.kind(), std::io::ErrorKind::NotFound) {
                info!("No dotenv file, using the platform environment only");
            } else {
                panic!("Io error when reading dot env file: {io_error}")
            }
        }
        Err(err) => {
            panic!("Error reading dotenv file: {err}")
        }
    }
}
