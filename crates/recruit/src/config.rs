use clap::{Parser, ValueEnum};
use recruit_passkey::{AttestationPolicy, CounterPolicy, RelyingParty};

#[derive(Parser, Debug, Clone)]
#[command(name = "recruit", version, about = "Hiring platform passkey service")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "RECRUIT_BIND_ADDRESS", default_value = "127.0.0.1:8080")]
    pub bind_address: String,

    #[arg(
        long,
        env = "RECRUIT_DATABASE_URL",
        default_value = "sqlite://recruit.db?mode=rwc"
    )]
    pub database_url: String,

    /// Relying-party display name shown by authenticators.
    #[arg(long, env = "RECRUIT_RP_NAME", default_value = "Recruit", value_parser = parse_env_value)]
    pub rp_name: String,

    #[arg(long, env = "RECRUIT_RP_LOCAL_ID", default_value = "localhost", value_parser = parse_env_value)]
    pub rp_local_id: String,

    #[arg(
        long,
        env = "RECRUIT_RP_LOCAL_ORIGIN",
        default_value = "http://localhost:3000",
        value_parser = parse_origin
    )]
    pub rp_local_origin: String,

    #[arg(
        long,
        env = "RECRUIT_RP_PRODUCTION_ID",
        default_value = "jobs.example.com",
        value_parser = parse_env_value
    )]
    pub rp_production_id: String,

    #[arg(
        long,
        env = "RECRUIT_RP_PRODUCTION_ORIGIN",
        default_value = "https://jobs.example.com",
        value_parser = parse_origin
    )]
    pub rp_production_origin: String,

    /// Timeout hint sent to the browser, in milliseconds.
    #[arg(long, env = "RECRUIT_CEREMONY_TIMEOUT_MS", default_value_t = 60_000)]
    pub ceremony_timeout_ms: u32,

    #[arg(long, env = "RECRUIT_CHALLENGE_TTL_SECS", default_value_t = 300)]
    pub challenge_ttl_secs: i64,

    /// How often expired challenges are purged.
    #[arg(long, env = "RECRUIT_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "RECRUIT_COUNTER_POLICY", value_enum, default_value_t = CounterPolicyArg::Warn)]
    pub counter_policy: CounterPolicyArg,

    #[arg(
        long,
        env = "RECRUIT_ATTESTATION_POLICY",
        value_enum,
        default_value_t = AttestationPolicyArg::AcceptUnverified
    )]
    pub attestation_policy: AttestationPolicyArg,

    /// Lifetime of the `access_token` session cookie, in seconds.
    #[arg(long, env = "RECRUIT_ACCESS_TOKEN_EXPIRATION", default_value_t = 3600)]
    pub access_token_expiration: i64,
}

impl Config {
    pub fn relying_party(&self) -> RelyingParty {
        RelyingParty::new(
            self.rp_name.clone(),
            self.rp_local_id.clone(),
            self.rp_local_origin.clone(),
            self.rp_production_id.clone(),
            self.rp_production_origin.clone(),
        )
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterPolicyArg {
    Warn,
    Reject,
}

impl From<CounterPolicyArg> for CounterPolicy {
    fn from(arg: CounterPolicyArg) -> Self {
        match arg {
            CounterPolicyArg::Warn => CounterPolicy::Warn,
            CounterPolicyArg::Reject => CounterPolicy::Reject,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationPolicyArg {
    AcceptUnverified,
    NoneOnly,
}

impl From<AttestationPolicyArg> for AttestationPolicy {
    fn from(arg: AttestationPolicyArg) -> Self {
        match arg {
            AttestationPolicyArg::AcceptUnverified => AttestationPolicy::AcceptUnverified,
            AttestationPolicyArg::NoneOnly => AttestationPolicy::NoneOnly,
        }
    }
}

/// Trims whitespace and one pair of surrounding quotes, which dashboards and
/// `.env` files tend to add.
fn parse_env_value(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(trimmed)
        .trim();

    if unquoted.is_empty() {
        return Err("value must not be empty".to_string());
    }
    Ok(unquoted.to_string())
}

/// Origins are compared byte-for-byte against `clientDataJSON`, so a trailing
/// slash would never match.
fn parse_origin(raw: &str) -> Result<String, String> {
    let value = parse_env_value(raw)?;
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(format!("{value} is not an http(s) origin"));
    }
    Ok(value.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["recruit"]);
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.challenge_ttl_secs, 300);
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.counter_policy, CounterPolicyArg::Warn);

        let rp = config.relying_party();
        assert_eq!(rp.rp_id_for("http://localhost:3000"), "localhost");
        assert_eq!(rp.rp_id_for("https://jobs.example.com"), "jobs.example.com");
    }

    #[test]
    fn test_policy_flags() {
        let config = Config::parse_from([
            "recruit",
            "--counter-policy",
            "reject",
            "--attestation-policy",
            "none-only",
        ]);
        assert_eq!(CounterPolicy::from(config.counter_policy), CounterPolicy::Reject);
        assert_eq!(
            AttestationPolicy::from(config.attestation_policy),
            AttestationPolicy::NoneOnly
        );
    }

    #[test]
    fn test_env_values_are_normalized() {
        assert_eq!(parse_env_value("  \"Recruit\" ").unwrap(), "Recruit");
        assert_eq!(parse_env_value("'jobs'").unwrap(), "jobs");
        assert!(parse_env_value("  ").is_err());

        assert_eq!(
            parse_origin("https://jobs.example.com/").unwrap(),
            "https://jobs.example.com"
        );
        assert!(parse_origin("jobs.example.com").is_err());
    }
}
