//! Multi-site HTTP server.
//!
//! Serves static folders, reverse-proxies to upstreams and runs CGI scripts
//! for every site described in a JSON config, grouped onto one listener per
//! port.
//!
//! # Architecture Overview
//!
//! ```text
//!     server-config.json
//!            │
//!            ▼
//!     ┌─────────────┐    ┌──────────────┐    ┌──────────────────────────────┐
//!     │   config    │───▶│   routing    │───▶│  http::pipeline (per site)   │
//!     │ load/schema │    │   topology   │    │  trace → response-time       │
//!     └─────────────┘    │ (port groups)│    │  → cors → compression        │
//!                        └──────┬───────┘    │  → helmet → favicon          │
//!                               │            │  → rate-limit → basic-auth   │
//!                               ▼            │  → headers                   │
//!                        ┌──────────────┐    │  → static → cgi → proxy      │
//!     Client ───────────▶│ net listener │───▶│  → fallback                  │
//!                        │  (+ TLS)     │    └──────────────────────────────┘
//!                        └──────┬───────┘
//!                               │  per port
//!                               ▼
//!                        ┌──────────────┐    ┌──────────────────────────────┐
//!                        │ routing::    │    │ reload (watch → debounce →   │
//!                        │ router (host)│    │ server-sent `reload`)        │
//!                        └──────────────┘    └──────────────────────────────┘
//!
//!     lifecycle: start_all → ready → signal → coordinated drain (10s cap)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use site_proxy::lifecycle::{self, signals, ShutdownOutcome, SHUTDOWN_DEADLINE};
use site_proxy::observability::{logging, logging::LogFormat, metrics};

#[derive(Debug, Parser)]
#[command(name = "site-proxy", version, about = "Multi-site static, proxy and CGI server")]
struct Cli {
    /// Config file, or a directory containing server-config.json
    #[arg(short, long, default_value = "server-config.json")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Expose Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    tracing::info!("site-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = cli.metrics_address {
        if let Err(e) = metrics::install_exporter(addr) {
            tracing::error!(error = %e, "Metrics disabled");
        }
    }

    let code = match lifecycle::run(
        &cli.config,
        async {
            signals::wait_for_shutdown().await;
        },
        SHUTDOWN_DEADLINE,
    )
    .await
    {
        Ok(ShutdownOutcome::Clean) => 0,
        Ok(ShutdownOutcome::Forced { outstanding }) => {
            tracing::warn!(outstanding, "Exiting with listeners still draining");
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            e.exit_code()
        }
    };

    std::process::exit(code);
}
