//! Connection-related data models.
//!
//! This module defines the database backends the sqlx driver understands and
//! a log-safe rendering of connection strings.

use url::Url;

/// Backends the sqlx driver can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Pick the backend from the URL scheme, if it is one we know.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let (scheme, _) = connection_string.split_once(':')?;
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Render a connection string with its password replaced by `****`.
///
/// Strings that are not URLs (or carry no password) are returned with only
/// their scheme kept, so nothing sensitive reaches the logs.
pub fn masked_connection_string(connection_string: &str) -> String {
    match Url::parse(connection_string) {
        Ok(mut url) => {
            if url.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which carry no credentials.
                let _ = url.set_password(Some("****"));
            }
            url.set_query(None);
            url.to_string()
        }
        Err(_) => match connection_string.split_once(':') {
            Some((scheme, _)) => format!("{}:****", scheme),
            None => "****".to_string(),
        },
    }
}
