/// Operational configuration loaded from environment variables at startup.
/// Missing or malformed required variables cause an immediate panic with a
/// clear message. Strategy and run parameters live in the TOML file instead
/// (see `strategy::RunConfig`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Exchange credentials. Only required in live mode; dry-run and
    /// backtest must work without keys.
    pub bybit_api_key: Option<String>,
    pub bybit_secret: Option<String>,

    /// Starting quote balance for simulated fills and equity tracking.
    pub initial_balance: f64,

    /// Upper bound on a single gateway submission before the router gives
    /// up on the bar.
    pub order_timeout_secs: u64,

    /// Path to the TOML run configuration.
    pub run_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Config {
            bybit_api_key: optional_env("BYBIT_API_KEY"),
            bybit_secret: optional_env("BYBIT_SECRET"),
            initial_balance: optional_env("INITIAL_BALANCE")
                .map(|v| parse_or_panic(&v, "INITIAL_BALANCE"))
                .unwrap_or(10_000.0),
            order_timeout_secs: optional_env("ORDER_TIMEOUT_SECS")
                .map(|v| parse_or_panic(&v, "ORDER_TIMEOUT_SECS"))
                .unwrap_or(5),
            run_config_path: optional_env("RUN_CONFIG_PATH")
                .unwrap_or_else(|| "config/scalper.toml".to_string()),
        }
    }

    /// Credentials, or panic with a message naming the missing variables.
    /// Called only on the live wiring path.
    pub fn credentials(&self) -> (&str, &str) {
        match (&self.bybit_api_key, &self.bybit_secret) {
            (Some(key), Some(secret)) => (key, secret),
            _ => panic!(
                "Live mode requires BYBIT_API_KEY and BYBIT_SECRET. Check your .env file."
            ),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_or_panic<T: std::str::FromStr>(value: &str, key: &str) -> T {
    value
        .parse()
        .unwrap_or_else(|_| panic!("Environment variable '{key}' is not a valid number: '{value}'"))
}
