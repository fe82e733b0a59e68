use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "PROJCTX_LOG";

/// `PROJCTX_LOG` wins when set; otherwise `-v` raises the default level.
/// Output goes to stderr so JSON on stdout stays clean.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
