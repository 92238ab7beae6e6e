use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the level chosen
/// by `debug`.
pub fn init(debug: bool)
{
    let default = if debug {
        "scgi_gateway=debug"
    } else {
        "scgi_gateway=info"
    };
    let res = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env()
              .unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    if let Err(e) = res {
        eprintln!("Logging already initialised: {}", e);
    }
}
