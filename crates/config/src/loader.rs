use std::path::Path;

use anyhow::bail;
use indoc::indoc;
use serde_json::json;

use crate::{Config, DeliveryMode};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;

    validate(&config)?;

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    validate_auth(config)?;
    validate_cors(config)?;
    validate_profiles(config)?;

    Ok(())
}

fn validate_auth(config: &Config) -> anyhow::Result<()> {
    let auth = &config.server.auth;

    if auth.enabled() && auth.credentials.is_empty() {
        bail!(indoc! {r#"
            Authentication is enabled but no credentials are configured.

            Example configuration:

              [server.auth]
              mode = "token"

              [[server.auth.credentials]]
              secret = "replace-me"
              subject = "ops"
              permissions = ["*"]
        "#});
    }

    for credential in &auth.credentials {
        if credential.subject.is_empty() {
            bail!("Auth credential has an empty subject");
        }
    }

    Ok(())
}

fn validate_cors(config: &Config) -> anyhow::Result<()> {
    let cors = &config.server.cors;

    if !cors.enabled {
        return Ok(());
    }

    if cors.origins.is_empty() {
        bail!("CORS is enabled but no origins are configured. Use [\"*\"] to allow any origin.");
    }

    // Credentialed CORS with a wildcard origin is rejected by browsers.
    if cors.credentials && cors.allows_any_origin() {
        bail!("CORS credentials require explicit origins; a '*' origin cannot be credentialed");
    }

    Ok(())
}

fn validate_profiles(config: &Config) -> anyhow::Result<()> {
    for (name, profile) in &config.profiles {
        if profile.min_chars == 0 {
            bail!("Profile '{name}': min_chars must be at least 1");
        }

        if let Some(max_chars) = profile.max_chars
            && max_chars < profile.min_chars
        {
            bail!(
                "Profile '{name}': max_chars ({max_chars}) must not be smaller than min_chars ({})",
                profile.min_chars
            );
        }

        if profile.max_lines == Some(0) {
            bail!("Profile '{name}': max_lines must be at least 1");
        }
    }

    Ok(())
}

pub(crate) fn redacted_view(config: &Config) -> serde_json::Value {
    let server = &config.server;

    json!({
        "server": {
            "listen_address": server.listen_address.map(|addr| addr.to_string()),
            "auth": {
                "mode": match server.auth.mode {
                    crate::AuthMode::None => "none",
                    crate::AuthMode::Token => "token",
                    crate::AuthMode::ApiKey => "apikey",
                    crate::AuthMode::Multi => "multi",
                },
                "credentials": server.auth.credentials.len(),
            },
            "cors": {
                "enabled": server.cors.enabled,
                "origins": server.cors.origins,
            },
            "rate_limits": {
                "enabled": server.rate_limits.enabled,
                "default_limit": server.rate_limits.default_limit,
                "interval_ms": server.rate_limits.interval.as_millis(),
            },
            "static": {
                "enabled": server.static_files.enabled,
            },
            "timeouts": {
                "request_ms": server.timeouts.request.as_millis(),
                "websocket_ms": server.timeouts.websocket.as_millis(),
                "shutdown_ms": server.timeouts.shutdown.as_millis(),
            },
            "limits": {
                "max_body_size": server.limits.max_body_size,
                "max_connections": server.limits.max_connections,
                "max_connections_per_ip": server.limits.max_connections_per_ip,
                "max_ws_subscriptions_per_connection": server.limits.max_ws_subscriptions_per_connection,
                "max_ws_queued_frames": server.limits.max_ws_queued_frames,
            },
            "logging": {
                "requests": server.logging.requests,
                "responses": server.logging.responses,
                "errors": server.logging.errors,
            },
        },
        "registry": {
            "buffer_size": config.registry.buffer_size,
            "retention_ms": config.registry.retention.as_millis(),
        },
        "profiles": config
            .profiles
            .iter()
            .map(|(name, profile)| {
                (
                    name.clone(),
                    json!({
                        "max_chars": profile.max_chars,
                        "max_lines": profile.max_lines,
                        "min_chars": profile.min_chars,
                        "default_mode": match profile.default_mode {
                            DeliveryMode::Block => "block",
                            DeliveryMode::Streaming => "streaming",
                            DeliveryMode::Batch => "batch",
                        },
                    }),
                )
            })
            .collect::<serde_json::Map<_, _>>(),
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_snapshot;

    use crate::Config;

    #[test]
    fn auth_without_credentials_fails() {
        let config: Config = toml::from_str(indoc! {r#"
            [server.auth]
            mode = "token"
        "#})
        .unwrap();

        let error = super::validate(&config).unwrap_err().to_string();

        assert_snapshot!(error, @r#"
        Authentication is enabled but no credentials are configured.

        Example configuration:

          [server.auth]
          mode = "token"

          [[server.auth.credentials]]
          secret = "replace-me"
          subject = "ops"
          permissions = ["*"]
        "#);
    }

    #[test]
    fn auth_with_credentials_passes() {
        let config: Config = toml::from_str(indoc! {r#"
            [server.auth]
            mode = "multi"

            [[server.auth.credentials]]
            secret = "s3cret"
            subject = "ops"
            permissions = ["*"]
        "#})
        .unwrap();

        assert!(super::validate(&config).is_ok());
    }

    #[test]
    fn credentialed_cors_with_wildcard_origin_fails() {
        let config: Config = toml::from_str(indoc! {r#"
            [server.cors]
            credentials = true
        "#})
        .unwrap();

        let error = super::validate(&config).unwrap_err().to_string();

        assert_snapshot!(error, @"CORS credentials require explicit origins; a '*' origin cannot be credentialed");
    }

    #[test]
    fn profile_with_inverted_budgets_fails() {
        let config: Config = toml::from_str(indoc! {r#"
            [profiles.sms]
            max_chars = 100
            min_chars = 200
            coalesce_gap = "100ms"
            default_mode = "block"
        "#})
        .unwrap();

        let error = super::validate(&config).unwrap_err().to_string();

        assert_snapshot!(error, @"Profile 'sms': max_chars (100) must not be smaller than min_chars (200)");
    }

    #[test]
    fn profile_with_zero_max_lines_fails() {
        let config: Config = toml::from_str(indoc! {r#"
            [profiles.ticker]
            max_lines = 0
            min_chars = 1
            default_mode = "block"
        "#})
        .unwrap();

        let error = super::validate(&config).unwrap_err().to_string();

        assert_snapshot!(error, @"Profile 'ticker': max_lines must be at least 1");
    }

    #[test]
    fn unknown_delivery_mode_is_rejected_at_parse_time() {
        let result: Result<Config, _> = toml::from_str(indoc! {r#"
            [profiles.pager]
            default_mode = "firehose"
        "#});

        assert!(result.is_err());
    }

    #[test]
    fn redacted_view_hides_secrets() {
        let config: Config = toml::from_str(indoc! {r#"
            [server.auth]
            mode = "token"

            [[server.auth.credentials]]
            secret = "super-secret-token"
            subject = "ops"
        "#})
        .unwrap();

        let view = serde_json::to_string(&config.redacted_view()).unwrap();

        assert!(!view.contains("super-secret-token"));
        assert!(view.contains(r#""credentials":1"#));
    }
}
