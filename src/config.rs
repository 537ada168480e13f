use crate::domain::Decimal;
use crate::engine::{ReactivationPolicy, SettlementRules};
use crate::orchestration::scheduler::WeeklySchedule;
use chrono::FixedOffset;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// PV credited for one package purchase when the event carries none.
    pub package_pv: Decimal,
    /// Largest PV a single purchase event may carry.
    pub max_purchase_pv: Decimal,
    pub inactivity_days: i64,
    pub max_propagation_depth: usize,
    pub reactivation_policy: ReactivationPolicy,
    pub settlement_schedule: WeeklySchedule,
    pub settlement_enabled: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let package_pv = env_map
            .get("PACKAGE_PV")
            .map(|s| s.as_str())
            .unwrap_or("94.5");
        let package_pv = Decimal::from_str(package_pv)
            .ok()
            .filter(|d| d.is_positive())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PACKAGE_PV".to_string(),
                    "must be a positive decimal".to_string(),
                )
            })?;

        let max_purchase_pv = env_map
            .get("MAX_PURCHASE_PV")
            .map(|s| s.as_str())
            .unwrap_or("1000000");
        let max_purchase_pv = Decimal::from_str(max_purchase_pv)
            .ok()
            .filter(|d| d.is_positive() && *d >= package_pv)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "MAX_PURCHASE_PV".to_string(),
                    "must be a positive decimal no smaller than PACKAGE_PV".to_string(),
                )
            })?;

        let inactivity_days = env_map
            .get("INACTIVITY_DAYS")
            .map(|s| s.as_str())
            .unwrap_or("90")
            .parse::<i64>()
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "INACTIVITY_DAYS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let max_propagation_depth = env_map
            .get("MAX_PROPAGATION_DEPTH")
            .map(|s| s.as_str())
            .unwrap_or("10000")
            .parse::<usize>()
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "MAX_PROPAGATION_DEPTH".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let reactivation_policy = match env_map
            .get("REACTIVATION_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("keep")
        {
            "keep" => ReactivationPolicy::Keep,
            "requalify" => ReactivationPolicy::Requalify,
            other => {
                return Err(ConfigError::InvalidValue(
                    "REACTIVATION_POLICY".to_string(),
                    format!("must be keep or requalify, got {}", other),
                ))
            }
        };

        let offset_minutes = env_map
            .get("SETTLEMENT_UTC_OFFSET_MINUTES")
            .map(|s| s.as_str())
            .unwrap_or("0")
            .parse::<i32>()
            .ok()
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SETTLEMENT_UTC_OFFSET_MINUTES".to_string(),
                    "must be minutes within +/-24h".to_string(),
                )
            })?;

        let settlement_schedule = WeeklySchedule::parse(
            env_map
                .get("SETTLEMENT_SCHEDULE")
                .map(|s| s.as_str())
                .unwrap_or("fri 23:59"),
            offset_minutes,
        )
        .map_err(|e| ConfigError::InvalidValue("SETTLEMENT_SCHEDULE".to_string(), e.to_string()))?;

        let settlement_enabled = match env_map
            .get("SETTLEMENT_ENABLED")
            .map(|s| s.as_str())
            .unwrap_or("true")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SETTLEMENT_ENABLED".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            package_pv,
            max_purchase_pv,
            inactivity_days,
            max_propagation_depth,
            reactivation_policy,
            settlement_schedule,
            settlement_enabled,
        })
    }

    pub fn settlement_rules(&self) -> SettlementRules {
        SettlementRules {
            inactivity_days: self.inactivity_days,
            reactivation: self.reactivation_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.package_pv, Decimal::from_str("94.5").unwrap());
        assert_eq!(config.max_purchase_pv, Decimal::from_str("1000000").unwrap());
        assert_eq!(config.inactivity_days, 90);
        assert_eq!(config.max_propagation_depth, 10000);
        assert_eq!(config.reactivation_policy, ReactivationPolicy::Keep);
        assert_eq!(config.settlement_schedule.weekday, Weekday::Fri);
        assert_eq!(config.settlement_schedule.hour, 23);
        assert_eq!(config.settlement_schedule.minute, 59);
        assert!(config.settlement_enabled);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_non_positive_package_pv_rejected() {
        for bad in ["0", "-94.5", "abc"] {
            let mut env_map = setup_required_env();
            env_map.insert("PACKAGE_PV".to_string(), bad.to_string());
            match Config::from_env_map(env_map) {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PACKAGE_PV"),
                _ => panic!("Expected InvalidValue error for {}", bad),
            }
        }
    }

    #[test]
    fn test_max_purchase_pv() {
        let mut env_map = setup_required_env();
        env_map.insert("MAX_PURCHASE_PV".to_string(), "5000".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.max_purchase_pv, Decimal::from_str("5000").unwrap());

        for bad in ["0", "50", "lots"] {
            let mut env_map = setup_required_env();
            env_map.insert("MAX_PURCHASE_PV".to_string(), bad.to_string());
            match Config::from_env_map(env_map) {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MAX_PURCHASE_PV"),
                _ => panic!("Expected InvalidValue error for {}", bad),
            }
        }
    }

    #[test]
    fn test_requalify_policy() {
        let mut env_map = setup_required_env();
        env_map.insert("REACTIVATION_POLICY".to_string(), "requalify".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(
            config.settlement_rules().reactivation,
            ReactivationPolicy::Requalify
        );
    }

    #[test]
    fn test_invalid_reactivation_policy() {
        let mut env_map = setup_required_env();
        env_map.insert("REACTIVATION_POLICY".to_string(), "maybe".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "REACTIVATION_POLICY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_schedule_with_offset() {
        let mut env_map = setup_required_env();
        env_map.insert("SETTLEMENT_SCHEDULE".to_string(), "mon 06:30".to_string());
        env_map.insert("SETTLEMENT_UTC_OFFSET_MINUTES".to_string(), "330".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.settlement_schedule.weekday, Weekday::Mon);
        assert_eq!(config.settlement_schedule.offset.local_minus_utc(), 330 * 60);
    }

    #[test]
    fn test_invalid_schedule() {
        let mut env_map = setup_required_env();
        env_map.insert("SETTLEMENT_SCHEDULE".to_string(), "someday 25:00".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "SETTLEMENT_SCHEDULE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_settlement_enabled() {
        let mut env_map = setup_required_env();
        env_map.insert("SETTLEMENT_ENABLED".to_string(), "yes".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }
}
