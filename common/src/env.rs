use std::env;

/// Process-level environment, read once at startup.
///
/// This is deliberately separate from the dataset configuration model
/// (`Datalayer`/`TableMapping`/...) that lives in the `datalayer` crate:
/// this struct is just the handful of keys that select *where* that
/// configuration document lives and how the process presents itself.
#[derive(Debug, Clone)]
pub struct Env {
    pub profile: String,
    pub port: String,
    pub config_location: String,
    pub refresh_interval: String,
    pub service_name: String,
    pub mssql_user: String,
    pub mssql_password: String,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub well_known: String,
    pub audience: String,
    pub issuer: String,
    /// `"noop"` or an enforcing middleware name.
    pub middleware: String,
}

impl Env {
    pub fn from_process_env() -> Self {
        Env {
            profile: env_or("PROFILE", "local"),
            port: env_or("SERVER_PORT", "8080"),
            config_location: env_or("CONFIG_LOCATION", "file://.config.json"),
            refresh_interval: env_or("CONFIG_REFRESH_INTERVAL", "@every 60s"),
            service_name: env_or("SERVICE_NAME", "datahub-mssql-datalayer"),
            mssql_user: env_or("MSSQL_DB_USER", ""),
            mssql_password: env_or("MSSQL_DB_PASSWORD", ""),
            auth: AuthConfig {
                well_known: env_or("TOKEN_WELL_KNOWN", ""),
                audience: env_or("TOKEN_AUDIENCE", ""),
                issuer: env_or("TOKEN_ISSUER", ""),
                middleware: env_or("AUTHORIZATION_MIDDLEWARE", "noop"),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
