//! Authentication Configuration
//!
//! All configuration values are loaded from environment variables.
//! Every value has a default so a bare environment boots a working app.

use crate::csrf::PathExclusions;
use crate::error::AuthError;
use std::env;

/// Cookie `SameSite` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }
}

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Session cookie name (from SESSION_NAME env var)
    pub session_cookie_name: String,

    /// Session lifetime in seconds (from SESSION_LIFETIME env var)
    pub session_lifetime: i64,

    /// Session lifetime in seconds when "remember me" is ticked
    /// (from SESSION_REMEMBER_LIFETIME env var)
    pub remember_lifetime: i64,

    /// Mark the session cookie `Secure` (from SESSION_SECURE_COOKIE env var)
    pub cookie_secure: bool,

    /// Session cookie `SameSite` attribute (from SESSION_SAME_SITE env var)
    pub cookie_same_site: SameSite,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Glob patterns that bypass CSRF verification (from CSRF_EXCLUDE_PATHS env var)
    pub csrf_exclude_paths: Vec<String>,

    /// Asset version stamped into rendered pages (from VIEW_VERSION env var)
    pub view_version: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: "rustpress_session".to_string(),
            session_lifetime: 7200,     // 2 hours
            remember_lifetime: 2592000, // 30 days
            cookie_secure: false,
            cookie_same_site: SameSite::Lax,
            argon2_memory_cost: 19456, // 19 MiB
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            csrf_exclude_paths: vec!["/api/webhooks/*".to_string(), "/health".to_string()],
            view_version: "1".to_string(),
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            session_cookie_name: env::var("SESSION_NAME")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.session_cookie_name),

            session_lifetime: parse_var("SESSION_LIFETIME").unwrap_or(defaults.session_lifetime),

            remember_lifetime: parse_var("SESSION_REMEMBER_LIFETIME")
                .unwrap_or(defaults.remember_lifetime),

            cookie_secure: env::var("SESSION_SECURE_COOKIE")
                .ok()
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(defaults.cookie_secure),

            cookie_same_site: env::var("SESSION_SAME_SITE")
                .ok()
                .and_then(|v| SameSite::parse(&v))
                .unwrap_or(defaults.cookie_same_site),

            argon2_memory_cost: parse_var("ARGON2_MEMORY_COST")
                .unwrap_or(defaults.argon2_memory_cost),

            argon2_time_cost: parse_var("ARGON2_TIME_COST").unwrap_or(defaults.argon2_time_cost),

            argon2_parallelism: parse_var("ARGON2_PARALLELISM")
                .unwrap_or(defaults.argon2_parallelism),

            csrf_exclude_paths: env::var("CSRF_EXCLUDE_PATHS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.csrf_exclude_paths),

            view_version: env::var("VIEW_VERSION").unwrap_or(defaults.view_version),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.session_cookie_name.is_empty()
            || !self
                .session_cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AuthError::Config(
                "SESSION_NAME must be a non-empty cookie token".to_string(),
            ));
        }

        if self.session_lifetime <= 0 {
            return Err(AuthError::Config(
                "SESSION_LIFETIME must be positive".to_string(),
            ));
        }

        if self.remember_lifetime < self.session_lifetime {
            return Err(AuthError::Config(
                "SESSION_REMEMBER_LIFETIME must not be shorter than SESSION_LIFETIME".to_string(),
            ));
        }

        if self.cookie_same_site == SameSite::None && !self.cookie_secure {
            return Err(AuthError::Config(
                "SESSION_SAME_SITE=None requires SESSION_SECURE_COOKIE=true".to_string(),
            ));
        }

        argon2::Params::new(
            self.argon2_memory_cost,
            self.argon2_time_cost,
            self.argon2_parallelism,
            None,
        )
        .map_err(|e| AuthError::Config(format!("invalid Argon2 parameters: {e}")))?;

        PathExclusions::new(&self.csrf_exclude_paths)?;

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AuthConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_cookie_name() {
        let config = AuthConfig {
            session_cookie_name: "bad name;".to_string(),
            ..AuthConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_remember_shorter_than_session() {
        let config = AuthConfig {
            session_lifetime: 3600,
            remember_lifetime: 60,
            ..AuthConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_same_site_none_requires_secure() {
        let config = AuthConfig {
            cookie_same_site: SameSite::None,
            cookie_secure: false,
            ..AuthConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AuthConfig {
            cookie_same_site: SameSite::None,
            cookie_secure: true,
            ..AuthConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_same_site_parse() {
        assert_eq!(SameSite::parse("STRICT"), Some(SameSite::Strict));
        assert_eq!(SameSite::parse("lax"), Some(SameSite::Lax));
        assert_eq!(SameSite::parse("sideways"), None);
    }
}
