//! Service configuration read from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Listing page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    /// Page size used when a request does not give one.
    pub default_size: u32,

    /// Largest `page_size` a request may ask for.
    pub max_size: u32,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            default_size: 10,
            max_size: 100,
        }
    }
}

/// Staff account created at startup if its email is not yet registered.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAccount")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_pool_size: u32,
    pub connection_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,

    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,

    pub pages: PageConfig,

    pub admin: Option<AdminAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("{0} must be set together with {1}")]
    Incomplete(&'static str, &'static str),

    #[error("DATABASE_URL is set but this binary was built without the `postgres` feature")]
    PostgresUnavailable,
}

const DEFAULT_LISTEN_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000);
const DEFAULT_POOL_SIZE: u32 = 10;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: format!("{e} (got {raw:?})"),
        }),
    }
}

fn positive(var: &'static str, value: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        Err(ConfigError::Invalid {
            var,
            message: "must be at least 1".to_string(),
        })
    } else {
        Ok(value)
    }
}

impl AppConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
    }

    /// Read the configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = parsed(&lookup, "STATION_LISTEN_ADDR", DEFAULT_LISTEN_ADDR)?;

        let defaults = PageConfig::default();
        let default_size = positive(
            "STATION_PAGE_SIZE",
            parsed(&lookup, "STATION_PAGE_SIZE", defaults.default_size)?,
        )?;
        let max_size = positive(
            "STATION_MAX_PAGE_SIZE",
            parsed(&lookup, "STATION_MAX_PAGE_SIZE", defaults.max_size)?,
        )?;
        if default_size > max_size {
            return Err(ConfigError::Invalid {
                var: "STATION_PAGE_SIZE",
                message: format!("{default_size} exceeds STATION_MAX_PAGE_SIZE ({max_size})"),
            });
        }

        let database = match lookup("DATABASE_URL") {
            None => None,
            Some(_) if !cfg!(feature = "postgres") => return Err(ConfigError::PostgresUnavailable),
            Some(url) => Some(DatabaseConfig {
                url,
                max_pool_size: positive(
                    "PG_POOL_MAX",
                    parsed(&lookup, "PG_POOL_MAX", DEFAULT_POOL_SIZE)?,
                )?,
                connection_timeout: CONNECTION_TIMEOUT,
            }),
        };

        let admin = match (
            lookup("STATION_ADMIN_EMAIL"),
            lookup("STATION_ADMIN_PASSWORD"),
        ) {
            (None, None) => None,
            (Some(email), Some(password)) => Some(AdminAccount { email, password }),
            (Some(_), None) => {
                return Err(ConfigError::Incomplete(
                    "STATION_ADMIN_EMAIL",
                    "STATION_ADMIN_PASSWORD",
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete(
                    "STATION_ADMIN_PASSWORD",
                    "STATION_ADMIN_EMAIL",
                ));
            }
        };

        Ok(Self {
            listen_addr,
            database,
            pages: PageConfig {
                default_size,
                max_size,
            },
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8000".parse().unwrap());
        assert_eq!(config.database, None);
        assert_eq!(config.pages, PageConfig::default());
        assert_eq!(config.admin, None);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("STATION_LISTEN_ADDR", "0.0.0.0:9000"),
            ("STATION_PAGE_SIZE", "5"),
            ("STATION_MAX_PAGE_SIZE", "50"),
            ("STATION_ADMIN_EMAIL", "admin@station.com"),
            ("STATION_ADMIN_PASSWORD", "change-me-now"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(
            config.pages,
            PageConfig {
                default_size: 5,
                max_size: 50
            }
        );
        assert_eq!(config.admin.unwrap().email, "admin@station.com");
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = config(&[("STATION_PAGE_SIZE", "ten")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "STATION_PAGE_SIZE",
                ..
            }
        ));
        assert!(config(&[("STATION_MAX_PAGE_SIZE", "0")]).is_err());
        assert!(config(&[("STATION_PAGE_SIZE", "200")]).is_err());
        assert!(config(&[("STATION_LISTEN_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn admin_needs_both_halves() {
        assert_eq!(
            config(&[("STATION_ADMIN_EMAIL", "admin@station.com")]).unwrap_err(),
            ConfigError::Incomplete("STATION_ADMIN_EMAIL", "STATION_ADMIN_PASSWORD")
        );
    }

    #[test]
    fn admin_password_not_debug_printed() {
        let admin = AdminAccount {
            email: "admin@station.com".into(),
            password: "change-me-now".into(),
        };
        assert!(!format!("{admin:?}").contains("change-me-now"));
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn database_url_needs_feature() {
        assert_eq!(
            config(&[("DATABASE_URL", "postgres://localhost/station")]).unwrap_err(),
            ConfigError::PostgresUnavailable
        );
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn database_url_selects_postgres() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/station"),
            ("PG_POOL_MAX", "4"),
        ])
        .unwrap();
        let database = config.database.unwrap();
        assert_eq!(database.url, "postgres://localhost/station");
        assert_eq!(database.max_pool_size, 4);
    }
}
