use std::path::PathBuf;

use subtle::ConstantTimeEq;

use crate::cli::Args;
use crate::core::exec::DEFAULT_DANGEROUS_OPS;

pub const USERNAME_ENV: &str = "SQLITE_REST_USERNAME";
pub const PASSWORD_ENV: &str = "SQLITE_REST_PASSWORD";
pub const DANGEROUS_OPS_ENV: &str = "SQLITE_REST_DANGEROUS_OPS";

/// Runtime configuration, resolved once at startup. Nothing reads the
/// environment after this point.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    /// Basic Auth credentials; `None` disables authentication.
    pub auth: Option<BasicCredentials>,
    /// Uppercased substrings that make an exec query unsafe. Empty means
    /// everything is allowed.
    pub dangerous_ops: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Constant-time comparison of both fields; an early mismatch must not
    /// change the timing profile.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}

impl Config {
    pub fn from_env(args: &Args) -> Self {
        let auth = match (read_env(USERNAME_ENV), read_env(PASSWORD_ENV)) {
            (Some(username), Some(password)) => Some(BasicCredentials { username, password }),
            _ => None,
        };

        let dangerous_ops = match std::env::var(DANGEROUS_OPS_ENV) {
            // Set but empty means "allow everything".
            Ok(raw) => parse_dangerous_ops(&raw),
            Err(_) => DEFAULT_DANGEROUS_OPS.iter().map(|s| s.to_string()).collect(),
        };

        Self {
            db_path: args.db_path.clone(),
            port: args.port,
            auth,
            dangerous_ops,
        }
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_dangerous_ops(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|op| op.trim().to_uppercase())
        .filter(|op| !op.is_empty())
        .collect()
}
