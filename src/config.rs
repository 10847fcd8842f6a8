// Layered settings: defaults, then an optional TOML file, then `FMM_*`
// environment variables (`FMM_QUOTING__SPREAD_BPS=25`).

use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::pricing::Skew;
use crate::engine::risk::RiskLimits;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "fairmm.toml";
pub const ENV_PREFIX: &str = "FMM";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub venue: VenueSettings,
    pub feed: FeedSettings,
    pub quoting: QuotingSettings,
    pub risk: RiskSettings,
    pub position: PositionSettings,
    pub monitor: MonitorSettings,
    pub logging: LoggingSettings,
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VenueSettings {
    pub api_key: String,
    pub base_url: String,
    pub ws_url: String,
    pub symbol: String,
    pub inst_type: String,
    pub order_type: String,
    pub time_in_force: String,
    pub reconnect_interval_ms: u64,
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.roxom.io".into(),
            ws_url: "wss://ws.roxom.io/ws".into(),
            symbol: "GOLD-BTC".into(),
            inst_type: "perpetual".into(),
            order_type: "limit".into(),
            time_in_force: "gtc".into(),
            reconnect_interval_ms: 5_000,
        }
    }
}

impl VenueSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(invalid("venue.symbol", "must not be empty"));
        }
        if self.base_url.trim().is_empty() {
            return Err(invalid("venue.base_url", "must not be empty"));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(invalid("venue.reconnect_interval_ms", "must be >0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedSettings {
    pub ws_url: String,
    /// Numerator of the fair price, e.g. PAXG/USDT.
    pub ref_base: String,
    /// Denominator of the fair price, e.g. BTC/USDT.
    pub ref_quote: String,
    pub reconnect_interval_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.binance.com:9443/ws".into(),
            ref_base: "PAXGUSDT".into(),
            ref_quote: "BTCUSDT".into(),
            reconnect_interval_ms: 5_000,
        }
    }
}

impl FeedSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ref_base.trim().is_empty() || self.ref_quote.trim().is_empty() {
            return Err(invalid("feed.ref_base/ref_quote", "must not be empty"));
        }
        if self.ref_base.eq_ignore_ascii_case(&self.ref_quote) {
            return Err(invalid("feed.ref_quote", "must differ from feed.ref_base"));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(invalid("feed.reconnect_interval_ms", "must be >0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotingSettings {
    pub spread_bps: Decimal,
    pub order_size: Decimal,
    pub interval_ms: u64,
    pub tick_size: Decimal,
    pub call_timeout_ms: u64,
    pub pending_ttl_ms: u64,
    /// 0 disables inventory skew.
    pub skew_bps_per_unit: Decimal,
    pub max_skew_bps: Decimal,
}

impl Default for QuotingSettings {
    fn default() -> Self {
        Self {
            spread_bps: dec!(20),
            order_size: dec!(1.00),
            interval_ms: 5_000,
            tick_size: dec!(0.000001),
            call_timeout_ms: 2_000,
            pending_ttl_ms: 10_000,
            skew_bps_per_unit: Decimal::ZERO,
            max_skew_bps: Decimal::ZERO,
        }
    }
}

impl QuotingSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.spread_bps < Decimal::ZERO {
            return Err(invalid("quoting.spread_bps", format!("must be >=0, got {}", self.spread_bps)));
        }
        if self.order_size <= Decimal::ZERO {
            return Err(invalid("quoting.order_size", format!("must be >0, got {}", self.order_size)));
        }
        if self.tick_size <= Decimal::ZERO {
            return Err(invalid("quoting.tick_size", format!("must be >0, got {}", self.tick_size)));
        }
        if self.interval_ms == 0 {
            return Err(invalid("quoting.interval_ms", "must be >0"));
        }
        if self.call_timeout_ms == 0 {
            return Err(invalid("quoting.call_timeout_ms", "must be >0"));
        }
        if self.pending_ttl_ms < self.call_timeout_ms {
            return Err(invalid("quoting.pending_ttl_ms", "must be >= quoting.call_timeout_ms"));
        }
        if self.skew_bps_per_unit < Decimal::ZERO || self.max_skew_bps < Decimal::ZERO {
            return Err(invalid("quoting.skew_bps_per_unit/max_skew_bps", "must be >=0"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_ttl_ms)
    }

    pub fn skew(&self) -> Skew {
        Skew {
            bps_per_unit: self.skew_bps_per_unit,
            max_bps: self.max_skew_bps,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskSettings {
    pub max_cancel_failures: u32,
    pub max_open_orders: usize,
    pub max_consecutive_rejects: u32,
}

impl Default for RiskSettings {
    fn default() -> Self {
        let limits = RiskLimits::default();
        Self {
            max_cancel_failures: limits.max_cancel_failures,
            max_open_orders: limits.max_open_orders,
            max_consecutive_rejects: limits.max_consecutive_rejects,
        }
    }
}

impl RiskSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cancel_failures == 0 {
            return Err(invalid("risk.max_cancel_failures", "must be >0"));
        }
        if self.max_open_orders == 0 {
            return Err(invalid("risk.max_open_orders", "must be >0"));
        }
        if self.max_consecutive_rejects == 0 {
            return Err(invalid("risk.max_consecutive_rejects", "must be >0"));
        }
        Ok(())
    }

    pub fn limits(&self) -> RiskLimits {
        RiskLimits {
            max_cancel_failures: self.max_cancel_failures,
            max_open_orders: self.max_open_orders,
            max_consecutive_rejects: self.max_consecutive_rejects,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PositionSettings {
    pub poll_interval_ms: u64,
}

impl Default for PositionSettings {
    fn default() -> Self {
        Self { poll_interval_ms: 1_000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub enabled: bool,
    pub bind: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:8000".into(),
        }
    }
}

impl MonitorSettings {
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| invalid("monitor.bind", format!("{e}: {}", self.bind)))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
    /// Also write logs to this file (appended, never rotated).
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { port: 9_000 }
    }
}

impl Settings {
    /// Load from `path` (must exist) or `fairmm.toml` (optional), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(env.prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.venue.validate()?;
        self.feed.validate()?;
        self.quoting.validate()?;
        self.risk.validate()?;
        if self.position.poll_interval_ms == 0 {
            return Err(invalid("position.poll_interval_ms", "must be >0"));
        }
        if self.monitor.enabled {
            self.monitor.addr()?;
        }
        Ok(())
    }

    /// Copy safe to print or log.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.venue.api_key.is_empty() {
            copy.venue.api_key = "***".into();
        }
        copy
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.venue.symbol, "GOLD-BTC");
        assert_eq!(settings.quoting.spread_bps, dec!(20));
        assert_eq!(settings.quoting.tick_size, dec!(0.000001));
        assert_eq!(settings.risk.limits(), RiskLimits::default());
        assert!(!settings.quoting.skew().is_enabled());
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = Settings::load_with_env(
            None,
            env(&[
                ("FMM_QUOTING__SPREAD_BPS", "25"),
                ("FMM_VENUE__API_KEY", "secret"),
                ("FMM_RISK__MAX_OPEN_ORDERS", "6"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.quoting.spread_bps, dec!(25));
        assert_eq!(settings.venue.api_key, "secret");
        assert_eq!(settings.risk.max_open_orders, 6);
        assert_eq!(settings.redacted().venue.api_key, "***");
        assert!(settings.logging.file.is_none());
    }

    #[test]
    fn log_file_from_environment() {
        let settings = Settings::load_with_env(None, env(&[("FMM_LOGGING__FILE", "/var/log/fairmm.log")])).unwrap();
        assert_eq!(settings.logging.file.as_deref(), Some(Path::new("/var/log/fairmm.log")));
    }

    #[test]
    fn file_values_are_layered() {
        let path = std::env::temp_dir().join(format!("fairmm-test-{}.toml", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[quoting]\norder_size = \"0.25\"\ninterval_ms = 1000\n\n[venue]\nsymbol = \"SILVER-BTC\"").unwrap();
        drop(f);

        let settings = Settings::load_with_env(Some(&path), env(&[("FMM_QUOTING__INTERVAL_MS", "2500")])).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.quoting.order_size, dec!(0.25));
        assert_eq!(settings.quoting.interval_ms, 2_500);
        assert_eq!(settings.venue.symbol, "SILVER-BTC");
        assert_eq!(settings.feed.ref_base, "PAXGUSDT");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = Path::new("/definitely/not/here/fairmm.toml");
        assert!(matches!(Settings::load_with_env(Some(path), env(&[])), Err(ConfigError::Load(_))));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut s = Settings::default();
        s.quoting.order_size = Decimal::ZERO;
        assert!(matches!(s.validate(), Err(ConfigError::InvalidValue { field: "quoting.order_size", .. })));

        let mut s = Settings::default();
        s.venue.symbol = " ".into();
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.risk.max_cancel_failures = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.monitor.bind = "not an addr".into();
        assert!(s.validate().is_err());
    }
}
