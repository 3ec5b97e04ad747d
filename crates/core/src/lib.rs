pub mod domain;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod report;

pub mod config {
    use crate::domain::rules::WinRuleConfig;
    use anyhow::Context;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Serialize};
    use std::str::FromStr;

    /// Where ad rows come from for a run.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum DataMode {
        #[default]
        Demo,
        Live,
    }

    impl FromStr for DataMode {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> anyhow::Result<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "demo" | "fixture" => Ok(Self::Demo),
                "live" => Ok(Self::Live),
                other => anyhow::bail!("unknown data mode {other:?} (expected demo or live)"),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct MetaCredentials {
        pub app_id: String,
        pub app_secret: String,
        pub access_token: String,
        pub ad_account_id: String,
    }

    /// Live mode was requested without the keys it needs.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MissingCredentials {
        pub missing: Vec<&'static str>,
    }

    impl MissingCredentials {
        pub fn remediation(&self) -> &'static str {
            "Add the missing keys to .env (see the Meta app dashboard and Business Manager), \
             or switch to demo mode to use fixture data."
        }
    }

    impl std::fmt::Display for MissingCredentials {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(
                f,
                "live mode requires {}; set them in .env or switch to demo mode",
                self.missing.join(", ")
            )
        }
    }

    impl std::error::Error for MissingCredentials {}

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub meta_app_id: Option<String>,
        pub meta_app_secret: Option<String>,
        pub meta_access_token: Option<String>,
        pub meta_ad_account_ids: Vec<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub data_mode: DataMode,
        pub win_rules: WinRuleConfig,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_vars(|key| std::env::var(key).ok())
        }

        pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            // Blank values in .env files count as unset.
            let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());

            let meta_ad_account_ids = match get("META_AD_ACCOUNT_IDS") {
                Some(list) => parse_account_list(&list),
                None => get("META_AD_ACCOUNT_ID")
                    .map(|id| vec![id.trim().to_string()])
                    .unwrap_or_default(),
            };

            let data_mode = get("DATA_MODE")
                .map(|s| s.parse::<DataMode>())
                .transpose()?
                .unwrap_or_default();

            let mut win_rules = WinRuleConfig::default();
            if let Some(s) = get("WIN_MIN_ROAS") {
                win_rules.min_roas = Decimal::from_str(s.trim())
                    .with_context(|| format!("WIN_MIN_ROAS is not a decimal: {s}"))?;
            }
            if let Some(s) = get("WIN_MIN_SPEND") {
                win_rules.min_spend = Decimal::from_str(s.trim())
                    .with_context(|| format!("WIN_MIN_SPEND is not a decimal: {s}"))?;
            }
            win_rules.validate()?;

            Ok(Self {
                meta_app_id: get("META_APP_ID"),
                meta_app_secret: get("META_APP_SECRET"),
                meta_access_token: get("META_ACCESS_TOKEN"),
                meta_ad_account_ids,
                anthropic_api_key: get("ANTHROPIC_API_KEY"),
                sentry_dsn: get("SENTRY_DSN"),
                data_mode,
                win_rules,
            })
        }

        /// Collects the Meta credentials needed for live mode, naming every missing key at once.
        pub fn require_meta_credentials(
            &self,
            ad_account_id: Option<&str>,
        ) -> anyhow::Result<MetaCredentials> {
            let account = ad_account_id
                .map(str::to_string)
                .or_else(|| self.meta_ad_account_ids.first().cloned());

            let mut missing = Vec::new();
            if self.meta_app_id.is_none() {
                missing.push("META_APP_ID");
            }
            if self.meta_app_secret.is_none() {
                missing.push("META_APP_SECRET");
            }
            if self.meta_access_token.is_none() {
                missing.push("META_ACCESS_TOKEN");
            }
            if account.is_none() {
                missing.push("META_AD_ACCOUNT_ID");
            }

            match (
                &self.meta_app_id,
                &self.meta_app_secret,
                &self.meta_access_token,
                account,
            ) {
                (Some(app_id), Some(app_secret), Some(access_token), Some(ad_account_id)) => {
                    Ok(MetaCredentials {
                        app_id: app_id.clone(),
                        app_secret: app_secret.clone(),
                        access_token: access_token.clone(),
                        ad_account_id,
                    })
                }
                _ => Err(MissingCredentials { missing }.into()),
            }
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required for angle labeling")
        }
    }

    fn parse_account_list(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::HashMap;

        fn settings(vars: &[(&str, &str)]) -> anyhow::Result<Settings> {
            let map: HashMap<String, String> = vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Settings::from_vars(|k| map.get(k).cloned())
        }

        #[test]
        fn defaults_to_demo_mode_and_default_rules() {
            let s = settings(&[]).unwrap();
            assert_eq!(s.data_mode, DataMode::Demo);
            assert_eq!(s.win_rules, WinRuleConfig::default());
            assert!(s.meta_ad_account_ids.is_empty());
        }

        #[test]
        fn account_list_takes_precedence_over_single_account() {
            let s = settings(&[
                ("META_AD_ACCOUNT_IDS", "act_1, act_2,,"),
                ("META_AD_ACCOUNT_ID", "act_9"),
            ])
            .unwrap();
            assert_eq!(s.meta_ad_account_ids, vec!["act_1", "act_2"]);
        }

        #[test]
        fn missing_credentials_are_all_named() {
            let s = settings(&[("META_APP_ID", "123"), ("META_ACCESS_TOKEN", " ")]).unwrap();
            let err = s.require_meta_credentials(None).unwrap_err();
            let missing = err.downcast_ref::<MissingCredentials>().unwrap();
            assert_eq!(missing.missing.len(), 3);
            let err = err.to_string();
            assert!(err.contains("META_APP_SECRET"));
            assert!(err.contains("META_ACCESS_TOKEN"));
            assert!(err.contains("META_AD_ACCOUNT_ID"));
            assert!(!err.contains("META_APP_ID"));
        }

        #[test]
        fn complete_credentials_use_first_account() {
            let s = settings(&[
                ("META_APP_ID", "1"),
                ("META_APP_SECRET", "s"),
                ("META_ACCESS_TOKEN", "t"),
                ("META_AD_ACCOUNT_IDS", "act_1,act_2"),
            ])
            .unwrap();
            let creds = s.require_meta_credentials(None).unwrap();
            assert_eq!(creds.ad_account_id, "act_1");
            let creds = s.require_meta_credentials(Some("act_2")).unwrap();
            assert_eq!(creds.ad_account_id, "act_2");
        }

        #[test]
        fn win_rule_overrides_are_parsed_and_validated() {
            let s = settings(&[("WIN_MIN_ROAS", "3.5"), ("WIN_MIN_SPEND", "250")]).unwrap();
            assert_eq!(s.win_rules.min_roas, Decimal::new(35, 1));
            assert_eq!(s.win_rules.min_spend, Decimal::new(250, 0));

            assert!(settings(&[("WIN_MIN_ROAS", "abc")]).is_err());
            assert!(settings(&[("WIN_MIN_SPEND", "-1")]).is_err());
            assert!(settings(&[("DATA_MODE", "staging")]).is_err());
        }
    }
}
