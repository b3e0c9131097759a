//! Maps parsed arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or out of range.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .map(|dsn| dsn.trim().to_string())
        .filter(|dsn| !dsn.is_empty());

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        access_token_secret: auth_opts.access_token_secret,
        refresh_token_secret: auth_opts.refresh_token_secret,
        access_ttl_seconds: auth_opts.access_ttl_seconds,
        refresh_ttl_seconds: auth_opts.refresh_ttl_seconds,
        frontend_base_url: auth_opts.frontend_base_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_dsn_means_memory_store() -> Result<()> {
        temp_env::with_vars(
            [
                ("SCRIBE_DSN", Some("  ")),
                ("SCRIBE_PORT", None),
                ("SCRIBE_ACCESS_TOKEN_SECRET", Some("access")),
                ("SCRIBE_REFRESH_TOKEN_SECRET", Some("refresh")),
            ],
            || {
                let matches = crate::cli::commands::new().try_get_matches_from(vec!["scribe"])?;
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 8080);
                assert!(args.dsn.is_none());
                Ok(())
            },
        )
    }

    #[test]
    fn server_args_carry_auth_options() -> Result<()> {
        temp_env::with_vars(
            [
                ("SCRIBE_DSN", Some("postgres://localhost/scribe")),
                ("SCRIBE_ACCESS_TOKEN_SECRET", Some("access")),
                ("SCRIBE_REFRESH_TOKEN_SECRET", Some("refresh")),
                ("SCRIBE_ACCESS_TOKEN_TTL_SECONDS", Some("120")),
                ("SCRIBE_REFRESH_TOKEN_TTL_SECONDS", None),
            ],
            || {
                let matches = crate::cli::commands::new().try_get_matches_from(vec!["scribe"])?;
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.dsn.as_deref(), Some("postgres://localhost/scribe"));
                assert_eq!(args.access_ttl_seconds, 120);
                assert_eq!(args.refresh_ttl_seconds, 604_800);
                Ok(())
            },
        )
    }
}
