//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Strategy parameters are validated once, here, and handed to the rest of
//! the daemon as an already-valid [`StrategyParameters`].

use crate::error::{DaemonError, DaemonResult};
use breakout_domain::{OrderSizeLimits, StrategyParameters, Symbol};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

const DEFAULT_SYMBOLS: &str = "BTCUSDT,ETHUSDT";

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Strategy configuration
    pub strategy: StrategyConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// What to trade and how.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Symbols tracked from startup
    pub symbols: Vec<Symbol>,
    /// Tradable capital in quote currency
    pub total_capital: Decimal,
    pub params: StrategyParameters,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let strategy = Self::load_strategy_config()?;

        Ok(Self {
            api,
            strategy,
            environment,
        })
    }

    /// Create test configuration.
    ///
    /// Window 3, volume x2, price +1.5%, 10% of capital per order, add-on at
    /// +2%, trailing stop 3%, at most 3 positions.
    pub fn test() -> Self {
        let params = StrategyParameters::new(
            3,
            Decimal::new(2, 0),
            Decimal::new(15, 1),
            Decimal::new(10, 0),
            Decimal::new(2, 0),
            Decimal::new(3, 0),
            3,
        )
        .unwrap_or_default();

        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            strategy: StrategyConfig {
                symbols: Vec::new(),
                total_capital: Decimal::new(10_000, 0),
                params,
            },
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("BREAKOUT_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid BREAKOUT_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("BREAKOUT_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("BREAKOUT_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid BREAKOUT_API_PORT: {}", port_str)))?;

        Ok(ApiConfig { host, port })
    }

    fn load_strategy_config() -> DaemonResult<StrategyConfig> {
        let defaults = StrategyParameters::default();

        let symbols = parse_symbols(
            &env::var("BREAKOUT_SYMBOLS").unwrap_or_else(|_| DEFAULT_SYMBOLS.to_string()),
        )?;
        let total_capital = Self::load_decimal_env("BREAKOUT_CAPITAL", Decimal::new(10_000, 0))?;

        let params = StrategyParameters::new(
            Self::load_usize_env("BREAKOUT_VOLUME_WINDOW", defaults.volume_window())?,
            Self::load_decimal_env("BREAKOUT_VOLUME_MULTIPLIER", defaults.volume_multiplier())?,
            Self::load_decimal_env("BREAKOUT_PRICE_CHANGE_PCT", defaults.price_change_pct())?,
            Self::load_decimal_env(
                "BREAKOUT_CAPITAL_FRACTION_PCT",
                defaults.capital_fraction_pct(),
            )?,
            Self::load_decimal_env("BREAKOUT_ADD_ON_PCT", defaults.add_on_pct())?,
            Self::load_decimal_env("BREAKOUT_TRAILING_STOP_PCT", defaults.trailing_stop_pct())?,
            Self::load_usize_env("BREAKOUT_MAX_POSITIONS", defaults.max_positions())?,
        )
        .map_err(|e| DaemonError::Config(e.to_string()))?;

        let limits = order_size_limits(
            Self::load_optional_decimal_env("BREAKOUT_MIN_ORDER_SIZE")?,
            Self::load_optional_decimal_env("BREAKOUT_MAX_ORDER_SIZE")?,
        )?;
        let params = match limits {
            Some(limits) => params.with_order_size_limits(limits),
            None => params,
        };

        if total_capital <= Decimal::ZERO {
            return Err(DaemonError::Config(format!(
                "BREAKOUT_CAPITAL must be positive, got {}",
                total_capital
            )));
        }

        Ok(StrategyConfig {
            symbols,
            total_capital,
            params,
        })
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        Ok(Self::load_optional_decimal_env(key)?.unwrap_or(default))
    }

    fn load_optional_decimal_env(key: &str) -> DaemonResult<Option<Decimal>> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(val.trim())
                .map(Some)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(None),
        }
    }

    fn load_usize_env(key: &str, default: usize) -> DaemonResult<usize> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<usize>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

/// Parse a comma-separated symbol list such as `BTCUSDT, eth/usdt`.
pub fn parse_symbols(raw: &str) -> DaemonResult<Vec<Symbol>> {
    let mut symbols = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let symbol = Symbol::from_pair(pair)
            .map_err(|e| DaemonError::Config(format!("Invalid symbol in BREAKOUT_SYMBOLS: {}", e)))?;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}

fn order_size_limits(
    min: Option<Decimal>,
    max: Option<Decimal>,
) -> DaemonResult<Option<OrderSizeLimits>> {
    match (min, max) {
        (None, None) => Ok(None),
        (Some(min), Some(max)) => OrderSizeLimits::new(min, max)
            .map(Some)
            .map_err(|e| DaemonError::Config(e.to_string())),
        _ => Err(DaemonError::Config(
            "BREAKOUT_MIN_ORDER_SIZE and BREAKOUT_MAX_ORDER_SIZE must be set together".to_string(),
        )),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            strategy: StrategyConfig {
                symbols: parse_symbols(DEFAULT_SYMBOLS).unwrap_or_default(),
                total_capital: Decimal::new(10_000, 0),
                params: StrategyParameters::default(),
            },
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.strategy.params, StrategyParameters::default());
        assert_eq!(config.strategy.symbols.len(), 2);
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.strategy.params.volume_window(), 3);
        assert_eq!(config.strategy.params.volume_multiplier(), dec!(2));
        assert_eq!(config.strategy.params.price_change_pct(), dec!(1.5));
        assert_eq!(config.strategy.params.trailing_stop_pct(), dec!(3));
        assert_eq!(config.strategy.total_capital, dec!(10000));
    }

    #[test]
    fn test_parse_symbols() {
        let symbols = parse_symbols("BTCUSDT, eth/usdt,,BTCUSDT").unwrap();

        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].as_pair(), "BTCUSDT");
        assert_eq!(symbols[1].as_pair(), "ETHUSDT");

        assert!(parse_symbols("NOTAPAIR").is_err());
        assert!(parse_symbols("").unwrap().is_empty());
    }

    #[test]
    fn test_order_size_limits_must_come_in_pairs() {
        assert!(order_size_limits(None, None).unwrap().is_none());
        assert!(order_size_limits(Some(dec!(0.001)), Some(dec!(10))).unwrap().is_some());
        assert!(matches!(
            order_size_limits(Some(dec!(0.001)), None),
            Err(DaemonError::Config(_))
        ));
        assert!(order_size_limits(Some(dec!(10)), Some(dec!(1))).is_err());
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
