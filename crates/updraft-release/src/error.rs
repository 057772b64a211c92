use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Network error during {operation}: {details}")]
    Network {
        operation: &'static str,
        details: String,
    },

    #[error("Authentication rejected during {operation} (HTTP {status})")]
    Auth { operation: &'static str, status: u16 },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Failed to parse {operation} response: {details}")]
    Parse {
        operation: &'static str,
        details: String,
    },
}

impl RepositoryError {
    pub fn network(operation: &'static str, details: impl Into<String>) -> Self {
        Self::Network {
            operation,
            details: details.into(),
        }
    }

    pub fn network_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::network(operation, error.to_string())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn parse_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Parse {
            operation,
            details: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RepositoryError;

    #[test]
    fn network_helper_keeps_operation_and_details() {
        let error = RepositoryError::network("list releases", "connection reset");
        assert_eq!(
            error,
            RepositoryError::Network {
                operation: "list releases",
                details: "connection reset".to_string()
            }
        );
        assert_eq!(
            error.to_string(),
            "Network error during list releases: connection reset"
        );
    }

    #[test]
    fn auth_display_includes_status() {
        let error = RepositoryError::Auth {
            operation: "latest release",
            status: 401,
        };
        assert_eq!(
            error.to_string(),
            "Authentication rejected during latest release (HTTP 401)"
        );
    }

    #[test]
    fn parse_from_formats_source_error() {
        let source = serde_json::from_str::<u32>("nope").expect_err("input should not parse");
        let error = RepositoryError::parse_from("list releases", &source);
        assert!(matches!(
            error,
            RepositoryError::Parse {
                operation: "list releases",
                ..
            }
        ));
    }
}
