use anyhow::{Context, Result};
use faculty_scout::ScoutConfig;
use std::env;
use std::path::Path;
use std::str::FromStr;

/// CLI configuration: pipeline tuning plus collaborator settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub scout: ScoutConfig,
    pub openai_model: Option<String>,
    pub user_agent: Option<String>,
}

impl Config {
    /// Load the pipeline config from an optional JSON file, then apply
    /// `SCOUT_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let scout = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => ScoutConfig::default(),
        };
        Self::from_lookup(scout, |key| env::var(key).ok())
    }

    fn from_lookup(mut scout: ScoutConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let governor = &mut scout.governor;
        if let Some(rps) = parsed(&lookup, "SCOUT_REQUESTS_PER_SECOND")? {
            governor.requests_per_second = rps;
        }
        if let Some(max) = parsed(&lookup, "SCOUT_MAX_CONCURRENT_PER_DOMAIN")? {
            governor.max_concurrent_per_domain = max;
        }
        if let Some(max) = parsed(&lookup, "SCOUT_MAX_MODEL_CALLS")? {
            governor.max_model_calls = max;
        }
        if let Some(attempts) = parsed(&lookup, "SCOUT_MAX_ATTEMPTS")? {
            governor.max_attempts = attempts;
        }
        if let Some(enabled) = parsed(&lookup, "SCOUT_VISION_VERIFICATION")? {
            scout.discovery.vision_verification = enabled;
        }
        if let Some(enabled) = parsed(&lookup, "SCOUT_VISUAL_TIER")? {
            scout.extraction.visual_tier = enabled;
        }

        Ok(Self {
            scout,
            openai_model: lookup("OPENAI_MODEL"),
            user_agent: lookup("SCOUT_USER_AGENT"),
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("{key} must be a valid value")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_governor() {
        let config = Config::from_lookup(
            ScoutConfig::default(),
            lookup(&[
                ("SCOUT_REQUESTS_PER_SECOND", "5"),
                ("SCOUT_MAX_MODEL_CALLS", "1"),
                ("SCOUT_VISUAL_TIER", "false"),
                ("OPENAI_MODEL", "gpt-4o-mini"),
            ]),
        )
        .unwrap();

        assert_eq!(config.scout.governor.requests_per_second, 5);
        assert_eq!(config.scout.governor.max_model_calls, 1);
        assert_eq!(config.scout.governor.max_concurrent_per_domain, 2);
        assert!(!config.scout.extraction.visual_tier);
        assert_eq!(config.openai_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.user_agent, None);
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        let err = Config::from_lookup(ScoutConfig::default(), lookup(&[("SCOUT_MAX_ATTEMPTS", "three")])).unwrap_err();
        assert!(err.to_string().contains("SCOUT_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let scout: ScoutConfig = serde_json::from_str(r#"{"governor": {"requests_per_second": 7}}"#).unwrap();
        let config = Config::from_lookup(scout, lookup(&[])).unwrap();
        assert_eq!(config.scout.governor.requests_per_second, 7);
        assert_eq!(config.scout.governor.max_attempts, 3);
        assert_eq!(config.scout.discovery.vision_top_k, 3);
    }
}
