//! Breakout Daemon
//!
//! Runs the breakout strategy against the stub exchange; candles are
//! published through `POST /candles`.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p breakoutd
//!
//! # Start with custom environment
//! BREAKOUT_ENV=test BREAKOUT_API_PORT=8081 BREAKOUT_SYMBOLS=BTCUSDT,SOLUSDT cargo run -p breakoutd
//! ```
//!
//! # Environment Variables
//!
//! - `BREAKOUT_ENV`: Environment (test, development, production)
//! - `BREAKOUT_API_HOST`: API host (default: 0.0.0.0)
//! - `BREAKOUT_API_PORT`: API port (default: 8080)
//! - `BREAKOUT_SYMBOLS`: Comma-separated symbols (default: BTCUSDT,ETHUSDT)
//! - `BREAKOUT_CAPITAL`: Total capital (default: 10000)
//! - `BREAKOUT_VOLUME_WINDOW`: Baseline window R in candles (default: 30)
//! - `BREAKOUT_VOLUME_MULTIPLIER`: Volume multiple N (default: 2.0)
//! - `BREAKOUT_PRICE_CHANGE_PCT`: Candle price change M% (default: 1.5)
//! - `BREAKOUT_CAPITAL_FRACTION_PCT`: Capital per order Q% (default: 10)
//! - `BREAKOUT_ADD_ON_PCT`: Add-on rise U% (default: 2.0)
//! - `BREAKOUT_TRAILING_STOP_PCT`: Trailing stop S% (default: 3.0)
//! - `BREAKOUT_MAX_POSITIONS`: Concurrent positions (default: 3)
//! - `BREAKOUT_MIN_ORDER_SIZE` / `BREAKOUT_MAX_ORDER_SIZE`: Optional order size limits

use breakoutd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("breakoutd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        symbols = config.strategy.symbols.len(),
        "Breakout Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::new_stub(config);
    daemon.run().await?;

    Ok(())
}
