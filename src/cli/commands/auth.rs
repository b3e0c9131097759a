use crate::auth::{
    DEFAULT_FRONTEND_BASE_URL,
    token::{DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS},
};
use anyhow::{Context, Result, ensure};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[derive(Debug)]
pub struct Options {
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub frontend_base_url: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a secret is missing or a TTL is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = |id: &str| -> Result<SecretString> {
            matches
                .get_one::<String>(id)
                .map(|value| SecretString::from(value.clone()))
                .with_context(|| format!("missing required argument: --{id}"))
        };
        let ttl = |id: &str, default: i64| -> Result<i64> {
            let value = matches.get_one::<i64>(id).copied().unwrap_or(default);
            ensure!(value > 0, "--{id} must be greater than zero");
            Ok(value)
        };

        Ok(Self {
            access_token_secret: secret(ARG_ACCESS_TOKEN_SECRET)?,
            refresh_token_secret: secret(ARG_REFRESH_TOKEN_SECRET)?,
            access_ttl_seconds: ttl(ARG_ACCESS_TOKEN_TTL_SECONDS, DEFAULT_ACCESS_TTL_SECONDS)?,
            refresh_ttl_seconds: ttl(ARG_REFRESH_TOKEN_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS)?,
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| DEFAULT_FRONTEND_BASE_URL.to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token lifetime in seconds")
                .env("SCRIBE_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token and cookie lifetime in seconds")
                .env("SCRIBE_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used as the CORS origin")
                .long_help(
                    "Frontend base URL, used as the CORS origin. An https:// URL also marks the refresh cookie Secure.",
                )
                .env("SCRIBE_FRONTEND_BASE_URL")
                .default_value(DEFAULT_FRONTEND_BASE_URL),
        )
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("HMAC secret for access tokens")
                .env("SCRIBE_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("HMAC secret for refresh tokens, must differ from the access secret")
                .env("SCRIBE_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const ENV_VARS: [&str; 5] = [
        "SCRIBE_ACCESS_TOKEN_SECRET",
        "SCRIBE_REFRESH_TOKEN_SECRET",
        "SCRIBE_ACCESS_TOKEN_TTL_SECONDS",
        "SCRIBE_REFRESH_TOKEN_TTL_SECONDS",
        "SCRIBE_FRONTEND_BASE_URL",
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        ENV_VARS.iter().map(|name| (*name, None)).collect()
    }

    #[test]
    fn defaults_apply() -> Result<()> {
        temp_env::with_vars(cleared(), || {
            let matches = with_args(Command::new("scribe")).try_get_matches_from(vec![
                "scribe",
                "--access-token-secret",
                "a",
                "--refresh-token-secret",
                "r",
            ])?;
            let options = Options::parse(&matches)?;
            assert_eq!(options.access_token_secret.expose_secret(), "a");
            assert_eq!(options.refresh_token_secret.expose_secret(), "r");
            assert_eq!(options.access_ttl_seconds, 900);
            assert_eq!(options.refresh_ttl_seconds, 604_800);
            assert_eq!(options.frontend_base_url, "http://localhost:5173");
            Ok(())
        })
    }

    #[test]
    fn env_fallbacks() -> Result<()> {
        let vars = [
            ("SCRIBE_ACCESS_TOKEN_SECRET", Some("env-access")),
            ("SCRIBE_REFRESH_TOKEN_SECRET", Some("env-refresh")),
            ("SCRIBE_ACCESS_TOKEN_TTL_SECONDS", Some("60")),
            ("SCRIBE_REFRESH_TOKEN_TTL_SECONDS", None),
            ("SCRIBE_FRONTEND_BASE_URL", Some("https://blog.example.com")),
        ];
        temp_env::with_vars(vars, || {
            let matches = with_args(Command::new("scribe")).try_get_matches_from(vec!["scribe"])?;
            let options = Options::parse(&matches)?;
            assert_eq!(options.access_token_secret.expose_secret(), "env-access");
            assert_eq!(options.access_ttl_seconds, 60);
            assert_eq!(options.frontend_base_url, "https://blog.example.com");
            Ok(())
        })
    }

    #[test]
    fn secrets_are_required() {
        temp_env::with_vars(cleared(), || {
            let result = with_args(Command::new("scribe")).try_get_matches_from(vec!["scribe"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn ttl_must_be_positive() -> Result<()> {
        temp_env::with_vars(cleared(), || {
            let matches = with_args(Command::new("scribe")).try_get_matches_from(vec![
                "scribe",
                "--access-token-secret",
                "a",
                "--refresh-token-secret",
                "r",
                "--refresh-token-ttl-seconds",
                "0",
            ])?;
            assert!(Options::parse(&matches).is_err());
            Ok(())
        })
    }
}
