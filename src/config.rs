use anyhow::Context;
use serde::Deserialize;

const PLACEHOLDER_SECRET: &str = "CHANGE_ME_SESSION_SECRET";
const DEFAULT_LINK_TOKEN_TTL_HOURS: i64 = 7 * 24;
/// Values above one year are ignored.
const MAX_LINK_TOKEN_TTL_HOURS: i64 = 365 * 24;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Public base URL used in dashboard links sent by the bot.
    pub host: String,
    pub dev_mode: bool,
    pub app_name: String,
    pub admin: Option<AdminBootstrap>,
    /// Without a bot token the dispatcher is not started.
    pub bot_token: Option<String>,
    pub bot_username: String,
    pub telegram_api_url: String,
    pub session_secret: String,
    pub link_token_ttl: chrono::Duration,
    /// Slack-compatible webhook notified about registration requests.
    pub admin_webhook_url: Option<String>,
    /// bcrypt cost for password hashes.
    pub password_cost: u32,
    pub registration: RegistrationOptions,
}

#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Registration form options, optionally loaded from a YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrationOptions {
    pub enabled: bool,
    pub locations: Vec<String>,
    pub job_fields: Vec<String>,
    pub interests: Vec<String>,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            locations: to_strings(&["Lazio", "Lombardia", "Piemonte", "Veneto", "Toscana"]),
            job_fields: to_strings(&[
                "Technology",
                "Finance",
                "Healthcare",
                "Education",
                "Marketing",
                "Consulting",
                "Other",
            ]),
            interests: to_strings(&["Networking", "Learning", "Mentoring", "Collaboration"]),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Config {
    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.host.trim_end_matches('/'))
    }

    pub fn secure_cookies(&self) -> bool {
        self.host.starts_with("https://")
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Build the config from an arbitrary key lookup (the environment in production).
pub fn from_lookup<F>(get: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let env_mode = get("DISCIPLO_ENV").unwrap_or_default();

    let session_secret = get("DISCIPLO_SESSION_SECRET").unwrap_or_else(|| PLACEHOLDER_SECRET.into());
    if session_secret == PLACEHOLDER_SECRET {
        if env_mode == "production" {
            anyhow::bail!(
                "DISCIPLO_SESSION_SECRET is still the insecure placeholder. \
                 Set a long random secret before running in production."
            );
        }
        tracing::warn!("DISCIPLO_SESSION_SECRET is not set, using insecure placeholder");
    }

    let port: u16 = get("DISCIPLO_PORT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let dev_mode = get("DISCIPLO_DEV_MODE").is_some_and(|v| v == "true");
    let host = if dev_mode {
        format!("http://localhost:{}", port)
    } else {
        get("DISCIPLO_HOST").unwrap_or_else(|| format!("http://localhost:{}", port))
    };

    let admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
        (Some(email), Some(password)) => Some(AdminBootstrap {
            email,
            password,
            name: get("ADMIN_NAME").unwrap_or_else(|| "Admin".into()),
        }),
        _ => None,
    };

    let ttl_hours: i64 = get("DISCIPLO_LINK_TOKEN_TTL_HOURS")
        .and_then(|v| v.parse().ok())
        .filter(|h| (1..=MAX_LINK_TOKEN_TTL_HOURS).contains(h))
        .unwrap_or(DEFAULT_LINK_TOKEN_TTL_HOURS);

    let registration = match get("DISCIPLO_REGISTRATION_FILE") {
        Some(path) => load_registration(&path)?,
        None => RegistrationOptions::default(),
    };

    Ok(Config {
        port,
        database_url: get("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/disciplo".into()),
        host,
        dev_mode,
        app_name: get("DISCIPLO_APP_NAME").unwrap_or_else(|| "Disciplo".into()),
        admin,
        bot_token: get("BOT_TOKEN"),
        bot_username: get("BOT_USERNAME").unwrap_or_default(),
        telegram_api_url: get("TELEGRAM_API_URL")
            .unwrap_or_else(|| "https://api.telegram.org".into()),
        session_secret,
        link_token_ttl: chrono::Duration::hours(ttl_hours),
        admin_webhook_url: get("DISCIPLO_ADMIN_WEBHOOK_URL"),
        password_cost: get("DISCIPLO_PASSWORD_COST")
            .and_then(|v| v.parse().ok())
            .unwrap_or(bcrypt::DEFAULT_COST),
        registration,
    })
}

pub fn load_registration(path: &str) -> anyhow::Result<RegistrationOptions> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read registration file {}", path))?;
    parse_registration(&raw).with_context(|| format!("invalid registration file {}", path))
}

fn parse_registration(raw: &str) -> anyhow::Result<RegistrationOptions> {
    let options: RegistrationOptions = serde_yaml::from_str(raw)?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.host, "http://localhost:8080");
        assert_eq!(cfg.link_token_ttl, chrono::Duration::days(7));
        assert!(cfg.admin.is_none());
        assert!(cfg.bot_token.is_none());
        assert!(cfg.registration.enabled);
        assert_eq!(cfg.dashboard_url(), "http://localhost:8080/dashboard");
        assert!(!cfg.secure_cookies());
    }

    #[test]
    fn test_placeholder_secret_refused_in_production() {
        let err = from_lookup(lookup(&[("DISCIPLO_ENV", "production")]));
        assert!(err.is_err());

        let cfg = from_lookup(lookup(&[
            ("DISCIPLO_ENV", "production"),
            ("DISCIPLO_SESSION_SECRET", "a-real-secret"),
        ]))
        .unwrap();
        assert_eq!(cfg.session_secret, "a-real-secret");
    }

    #[test]
    fn test_dev_mode_overrides_host() {
        let cfg = from_lookup(lookup(&[
            ("DISCIPLO_DEV_MODE", "true"),
            ("DISCIPLO_PORT", "9000"),
            ("DISCIPLO_HOST", "https://members.example.org"),
        ]))
        .unwrap();
        assert_eq!(cfg.host, "http://localhost:9000");

        let cfg = from_lookup(lookup(&[("DISCIPLO_HOST", "https://members.example.org/")])).unwrap();
        assert_eq!(cfg.dashboard_url(), "https://members.example.org/dashboard");
        assert!(cfg.secure_cookies());
    }

    #[test]
    fn test_admin_requires_email_and_password() {
        let cfg = from_lookup(lookup(&[("ADMIN_EMAIL", "root@example.com")])).unwrap();
        assert!(cfg.admin.is_none());

        let cfg = from_lookup(lookup(&[
            ("ADMIN_EMAIL", "root@example.com"),
            ("ADMIN_PASSWORD", "hunter22"),
        ]))
        .unwrap();
        let admin = cfg.admin.unwrap();
        assert_eq!(admin.name, "Admin");
    }

    #[test]
    fn test_ttl_override_and_invalid_values() {
        let cfg = from_lookup(lookup(&[("DISCIPLO_LINK_TOKEN_TTL_HOURS", "2")])).unwrap();
        assert_eq!(cfg.link_token_ttl, chrono::Duration::hours(2));

        let cfg = from_lookup(lookup(&[("DISCIPLO_LINK_TOKEN_TTL_HOURS", "-3")])).unwrap();
        assert_eq!(cfg.link_token_ttl, chrono::Duration::days(7));
    }

    #[test]
    fn test_out_of_range_ttl_falls_back_to_default() {
        for raw in ["9999999999999", "8761", "0"] {
            let cfg = from_lookup(lookup(&[("DISCIPLO_LINK_TOKEN_TTL_HOURS", raw)])).unwrap();
            assert_eq!(cfg.link_token_ttl, chrono::Duration::days(7), "ttl {raw}");
        }

        let cfg = from_lookup(lookup(&[("DISCIPLO_LINK_TOKEN_TTL_HOURS", "8760")])).unwrap();
        assert_eq!(cfg.link_token_ttl, chrono::Duration::days(365));
    }

    #[test]
    fn test_parse_registration_partial_file() {
        let options = parse_registration("enabled: false\nlocations: [Sardegna]\n").unwrap();
        assert!(!options.enabled);
        assert_eq!(options.locations, vec!["Sardegna".to_string()]);
        // untouched keys keep their defaults
        assert!(options.interests.contains(&"Networking".to_string()));
    }
}
