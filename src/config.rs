// src/config.rs
use std::env;
use std::net::IpAddr;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::models::amount;

/// Runtime settings read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub default_vat_rate: Decimal,
    pub bcrypt_cost: u32,
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| format!("{name} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

/// Tokens live between one hour and one year.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 366;

fn token_ttl(hours: i64) -> Result<i64, String> {
    if !(1..=MAX_TOKEN_TTL_HOURS).contains(&hours) {
        return Err(format!("TOKEN_TTL_HOURS must be between 1 and {MAX_TOKEN_TTL_HOURS}"));
    }
    Ok(hours)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "JWT_SECRET must be set".to_string())?;

        let default_vat_rate: Decimal = parsed("DEFAULT_VAT_RATE", Decimal::ZERO)?;
        if default_vat_rate < Decimal::ZERO || default_vat_rate > Decimal::ONE_HUNDRED {
            return Err("DEFAULT_VAT_RATE must be between 0 and 100".to_string());
        }
        amount::VAT_RATE
            .check(default_vat_rate)
            .map_err(|e| format!("DEFAULT_VAT_RATE: {e}"))?;

        let token_ttl_hours = token_ttl(parsed("TOKEN_TTL_HOURS", 8)?)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            host: parsed("HOST", IpAddr::from([127, 0, 0, 1]))?,
            port: parsed("PORT", 3000)?,
            jwt_secret,
            token_ttl_hours,
            default_vat_rate,
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            database_max_connections: 1,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
            default_vat_rate: Decimal::from(20),
            bcrypt_cost: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ttl_must_be_positive_and_bounded() {
        assert_eq!(token_ttl(8), Ok(8));
        assert_eq!(token_ttl(MAX_TOKEN_TTL_HOURS), Ok(MAX_TOKEN_TTL_HOURS));
        assert!(token_ttl(0).is_err());
        assert!(token_ttl(-2).is_err());
        assert!(token_ttl(i64::MAX).is_err());
    }
}
