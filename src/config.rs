use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::domain::FinePolicy;

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS_ENV: &str = "DATABASE_MAX_CONNECTIONS";
pub const FINE_DAILY_RATE_ENV: &str = "FINE_DAILY_RATE";
pub const FINE_CAP_ENV: &str = "FINE_CAP";
pub const OVERDUE_SWEEP_INTERVAL_ENV: &str = "OVERDUE_SWEEP_INTERVAL_SECS";

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/library";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// 設定値の読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 値を解釈できない
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// アプリケーション設定
///
/// 環境変数から読み込む。未設定の項目は既定値になる。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub fine_policy: FinePolicy,
    /// 延滞検出バッチの実行間隔（未設定ならスキーマ同期のみで終了）
    pub overdue_sweep_interval: Option<Duration>,
}

impl AppConfig {
    /// プロセスの環境変数から読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から読み込む
    ///
    /// テストで環境変数を書き換えずに設定を与えるために使う。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url =
            lookup(DATABASE_URL_ENV).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let max_connections = match lookup(DATABASE_MAX_CONNECTIONS_ENV) {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(0) => return Err(invalid(DATABASE_MAX_CONNECTIONS_ENV, value, "must be at least 1")),
                Ok(n) => n,
                Err(e) => return Err(invalid(DATABASE_MAX_CONNECTIONS_ENV, value, e)),
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let defaults = FinePolicy::default();
        let daily_rate = match lookup(FINE_DAILY_RATE_ENV) {
            Some(value) => parse_money(FINE_DAILY_RATE_ENV, value)?,
            None => defaults.daily_rate,
        };
        let cap = lookup(FINE_CAP_ENV)
            .map(|value| parse_money(FINE_CAP_ENV, value))
            .transpose()?;

        let overdue_sweep_interval = match lookup(OVERDUE_SWEEP_INTERVAL_ENV) {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => return Err(invalid(OVERDUE_SWEEP_INTERVAL_ENV, value, "must be at least 1")),
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(e) => return Err(invalid(OVERDUE_SWEEP_INTERVAL_ENV, value, e)),
            },
            None => None,
        };

        Ok(Self {
            database_url,
            max_connections,
            fine_policy: FinePolicy::new(daily_rate, cap),
            overdue_sweep_interval,
        })
    }
}

fn invalid(name: &'static str, value: String, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value,
        reason: reason.to_string(),
    }
}

fn parse_money(name: &'static str, value: String) -> Result<Decimal, ConfigError> {
    match value.trim().parse::<Decimal>() {
        Ok(amount) if amount.is_sign_negative() => Err(invalid(name, value, "must not be negative")),
        Ok(amount) => Ok(amount),
        Err(e) => Err(invalid(name, value, e)),
    }
}
