use serde::{Deserialize, Serialize};

/// Top-level run configuration (TOML).
///
/// Example `config/scalper.toml`:
/// ```toml
/// pair = "BTCUSDT"
/// timeframe = "1m"
///
/// [strategy]
/// fast_period = 9
/// slow_period = 21
///
/// [sizing]
/// rule = "fixed"
/// value = 0.001
///
/// [execution]
/// fee_rate = 0.001
/// slippage = "fixed-bps"
/// slippage_bps = 10.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Trading pair, e.g. "BTCUSDT".
    pub pair: String,
    /// Candle timeframe, e.g. "1m", "5m", "1h".
    pub timeframe: String,
    pub strategy: StrategyParams,
    pub sizing: SizingRule,
    pub execution: ExecutionParams,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyParams {
    /// Fast EMA period, must be > 0.
    pub fast_period: usize,
    /// Slow EMA period, must be greater than `fast_period`.
    pub slow_period: usize,
}

/// Position sizing for each opened trade.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum SizingRule {
    /// A fixed quantity of the base asset per trade.
    Fixed { value: f64 },
    /// A fraction of current equity (0 < value <= 1), converted to base
    /// quantity at the signal bar's close.
    BalancePct { value: f64 },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ExecutionParams {
    /// Proportional fee charged on every fill (e.g. 0.001 = 10 bps).
    pub fee_rate: f64,
    #[serde(flatten)]
    pub slippage: SlippageModel,
}

/// Slippage applied by the simulated fill model.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(tag = "slippage", rename_all = "kebab-case")]
pub enum SlippageModel {
    None,
    FixedBps { slippage_bps: f64 },
}

impl SlippageModel {
    /// Slippage in basis points; zero for `None`.
    pub fn bps(&self) -> f64 {
        match self {
            SlippageModel::None => 0.0,
            SlippageModel::FixedBps { slippage_bps } => *slippage_bps,
        }
    }
}

impl RunConfig {
    /// Load from a TOML file. Exits the process on error: there is no
    /// sensible way to trade with a half-parsed configuration.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read run config at '{path}': {e}"));
        let config: RunConfig = toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse run config at '{path}': {e}"));
        config.validate();
        config
    }

    /// Panics with a clear message on any out-of-range parameter.
    pub fn validate(&self) {
        if self.pair.is_empty() {
            panic!("Run config: 'pair' must not be empty");
        }
        if self.strategy.fast_period == 0 {
            panic!("Run config: fast_period must be > 0");
        }
        if self.strategy.slow_period <= self.strategy.fast_period {
            panic!(
                "Run config: slow_period ({}) must be greater than fast_period ({})",
                self.strategy.slow_period, self.strategy.fast_period
            );
        }
        match self.sizing {
            SizingRule::Fixed { value } if value <= 0.0 => {
                panic!("Run config: sizing value must be positive")
            }
            SizingRule::BalancePct { value } if value <= 0.0 || value > 1.0 => {
                panic!("Run config: balance-pct sizing must be in (0, 1]")
            }
            _ => {}
        }
        if self.execution.fee_rate < 0.0 {
            panic!("Run config: fee_rate must be >= 0");
        }
        if self.execution.slippage.bps() < 0.0 {
            panic!("Run config: slippage_bps must be >= 0");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> RunConfig {
        toml::from_str(toml_str).expect("config should parse")
    }

    const BASE: &str = r#"
        pair = "BTCUSDT"
        timeframe = "1m"

        [strategy]
        fast_period = 9
        slow_period = 21

        [sizing]
        rule = "fixed"
        value = 0.001

        [execution]
        fee_rate = 0.001
        slippage = "fixed-bps"
        slippage_bps = 10.0
    "#;

    #[test]
    fn parses_full_config() {
        let cfg = parse(BASE);
        cfg.validate();
        assert_eq!(cfg.pair, "BTCUSDT");
        assert_eq!(cfg.strategy.fast_period, 9);
        assert!((cfg.execution.slippage.bps() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_no_slippage_variant() {
        let cfg = parse(
            r#"
            pair = "ETHUSDT"
            timeframe = "5m"

            [strategy]
            fast_period = 2
            slow_period = 3

            [sizing]
            rule = "balance-pct"
            value = 0.5

            [execution]
            fee_rate = 0.0
            slippage = "none"
        "#,
        );
        cfg.validate();
        assert!((cfg.execution.slippage.bps()).abs() < f64::EPSILON);
        assert!(matches!(cfg.sizing, SizingRule::BalancePct { .. }));
    }

    #[test]
    #[should_panic(expected = "slow_period")]
    fn rejects_slow_not_greater_than_fast() {
        let mut cfg = parse(BASE);
        cfg.strategy.slow_period = 9;
        cfg.validate();
    }

    #[test]
    #[should_panic(expected = "fee_rate")]
    fn rejects_negative_fee() {
        let mut cfg = parse(BASE);
        cfg.execution.fee_rate = -0.01;
        cfg.validate();
    }
}
