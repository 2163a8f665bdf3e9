use crate::{
    config::models::{DirectorConfig, TtlSource},
    core::whitelist::Whitelist,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types. All of these are fatal to configuration loading.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid port '{port}': {reason}")]
    InvalidPort { port: String, reason: String },

    #[error("Invalid whitelist entry: {reason}")]
    InvalidWhitelist { reason: String },

    #[error("'{field}' requires a resolver that supplies DNS TTLs")]
    ResolverRequired { field: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Well-known symbolic service ports accepted where a port is expected.
const SERVICE_PORTS: &[(&str, u16)] = &[
    ("http", 80),
    ("https", 443),
    ("http-alt", 8080),
    ("domain", 53),
];

/// Director configuration validator
pub struct DirectorConfigValidator;

impl DirectorConfigValidator {
    /// Validate a full director configuration against the capabilities of the
    /// resolver it will be paired with.
    pub fn validate(config: &DirectorConfig, resolver_provides_ttl: bool) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::resolve_port(&config.port) {
            errors.push(e);
        }

        if config.proxy_header > 2 {
            errors.push(ValidationError::InvalidField {
                field: "proxy_header".to_string(),
                message: format!("must be 0, 1 or 2, got {}", config.proxy_header),
            });
        }

        if config.ttl <= 0.0 {
            errors.push(ValidationError::InvalidField {
                field: "ttl".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if config.domain_usage_timeout <= 0.0 {
            errors.push(ValidationError::InvalidField {
                field: "domain_usage_timeout".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if config.first_lookup_timeout < 0.0 {
            errors.push(ValidationError::InvalidField {
                field: "first_lookup_timeout".to_string(),
                message: "must not be negative".to_string(),
            });
        }

        if config.ttl_from != TtlSource::Cfg && !resolver_provides_ttl {
            errors.push(ValidationError::ResolverRequired {
                field: "ttl_from".to_string(),
            });
        }

        if let Some(entries) = &config.whitelist {
            if let Err(reason) = Whitelist::parse(entries) {
                errors.push(ValidationError::InvalidWhitelist { reason });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Resolve a numeric or symbolic port string to its numeric form.
    pub fn resolve_port(port: &str) -> ValidationResult<u16> {
        if port.is_empty() {
            return Err(ValidationError::InvalidPort {
                port: port.to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if let Ok(numeric) = port.parse::<u16>() {
            return Ok(numeric);
        }
        SERVICE_PORTS
            .iter()
            .find(|(name, _)| *name == port)
            .map(|(_, numeric)| *numeric)
            .ok_or_else(|| ValidationError::InvalidPort {
                port: port.to_string(),
                reason: "not numeric and not a known service name".to_string(),
            })
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(DirectorConfigValidator::validate(&DirectorConfig::default(), false).is_ok());
    }

    #[test]
    fn test_resolve_port_numeric() {
        assert_eq!(DirectorConfigValidator::resolve_port("8080").unwrap(), 8080);
    }

    #[test]
    fn test_resolve_port_symbolic() {
        assert_eq!(DirectorConfigValidator::resolve_port("http").unwrap(), 80);
        assert_eq!(DirectorConfigValidator::resolve_port("https").unwrap(), 443);
    }

    #[test]
    fn test_resolve_port_unknown() {
        assert!(DirectorConfigValidator::resolve_port("gopher-ng").is_err());
        assert!(DirectorConfigValidator::resolve_port("").is_err());
    }

    #[test]
    fn test_proxy_header_rejected() {
        let config = DirectorConfig {
            proxy_header: 3,
            ..DirectorConfig::default()
        };
        let err = DirectorConfigValidator::validate(&config, false).unwrap_err();
        assert!(err.to_string().contains("proxy_header"));
    }

    #[test]
    fn test_ttl_from_requires_capable_resolver() {
        let config = DirectorConfig {
            ttl_from: TtlSource::Dns,
            ..DirectorConfig::default()
        };
        assert!(DirectorConfigValidator::validate(&config, false).is_err());
        assert!(DirectorConfigValidator::validate(&config, true).is_ok());
    }

    #[test]
    fn test_nonpositive_ttl_rejected() {
        let config = DirectorConfig {
            ttl: 0.0,
            ..DirectorConfig::default()
        };
        assert!(DirectorConfigValidator::validate(&config, false).is_err());
    }

    #[test]
    fn test_bad_whitelist_rejected() {
        let config = DirectorConfig {
            whitelist: Some(vec!["not-a-network/99".to_string()]),
            ..DirectorConfig::default()
        };
        assert!(DirectorConfigValidator::validate(&config, false).is_err());
    }
}
