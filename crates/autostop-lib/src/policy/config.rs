//! Typed per-VM policy resolved from tag parameters

use serde::{Deserialize, Serialize};

use super::tags::{
    TagParams, CPU_STDEV_BAS_PCT, INACTIVITY_TH_MIN, NETW_STDEV_BAS_PCT, POST_WARN_TH_MINS,
    WARN_EMAIL_TO,
};
use crate::error::ConfigValueError;

/// Subscription-wide values used when a VM does not set its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefaults {
    pub inactivity_threshold_minutes: u64,
    pub post_warning_threshold_minutes: u64,
    pub cpu_stdev_baseline_pct: f64,
    pub network_stdev_baseline_pct: f64,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            inactivity_threshold_minutes: 60,
            post_warning_threshold_minutes: 30,
            cpu_stdev_baseline_pct: 10.0,
            network_stdev_baseline_pct: 10.0,
        }
    }
}

/// Effective auto-stop policy for one VM on one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmPolicy {
    /// Lookback window for metrics
    pub inactivity_threshold_minutes: u64,
    /// Grace period between a warning and the stop
    pub post_warning_threshold_minutes: u64,
    pub cpu_stdev_baseline_pct: f64,
    pub network_stdev_baseline_pct: f64,
    /// Overrides the notifier's default recipient
    pub warning_email_to: Option<String>,
}

impl VmPolicy {
    /// Policy built purely from defaults
    pub fn from_defaults(defaults: &PolicyDefaults) -> Self {
        Self {
            inactivity_threshold_minutes: defaults.inactivity_threshold_minutes,
            post_warning_threshold_minutes: defaults.post_warning_threshold_minutes,
            cpu_stdev_baseline_pct: defaults.cpu_stdev_baseline_pct,
            network_stdev_baseline_pct: defaults.network_stdev_baseline_pct,
            warning_email_to: None,
        }
    }

    /// Resolve a policy from merged tag parameters
    ///
    /// Every malformed value falls back to its default and is returned
    /// alongside the policy so the caller can log it against the VM.
    pub fn resolve(params: &TagParams, defaults: &PolicyDefaults) -> (Self, Vec<ConfigValueError>) {
        let mut policy = Self::from_defaults(defaults);
        let mut errors = Vec::new();

        if let Some(raw) = params.get(INACTIVITY_TH_MIN) {
            match parse_minutes(INACTIVITY_TH_MIN, raw, false) {
                Ok(v) => policy.inactivity_threshold_minutes = v,
                Err(e) => errors.push(e),
            }
        }

        if let Some(raw) = params.get(POST_WARN_TH_MINS) {
            match parse_minutes(POST_WARN_TH_MINS, raw, true) {
                Ok(v) => policy.post_warning_threshold_minutes = v,
                Err(e) => errors.push(e),
            }
        }

        if let Some(raw) = params.get(CPU_STDEV_BAS_PCT) {
            match parse_pct(CPU_STDEV_BAS_PCT, raw) {
                Ok(v) => policy.cpu_stdev_baseline_pct = v,
                Err(e) => errors.push(e),
            }
        }

        if let Some(raw) = params.get(NETW_STDEV_BAS_PCT) {
            match parse_pct(NETW_STDEV_BAS_PCT, raw) {
                Ok(v) => policy.network_stdev_baseline_pct = v,
                Err(e) => errors.push(e),
            }
        }

        policy.warning_email_to = params
            .get(WARN_EMAIL_TO)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        (policy, errors)
    }
}

fn parse_minutes(key: &'static str, raw: &str, allow_zero: bool) -> Result<u64, ConfigValueError> {
    let invalid = |reason: &str| ConfigValueError {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let minutes: u64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid("expected a whole number of minutes"))?;

    if minutes == 0 && !allow_zero {
        return Err(invalid("must be greater than zero"));
    }
    Ok(minutes)
}

fn parse_pct(key: &'static str, raw: &str) -> Result<f64, ConfigValueError> {
    let invalid = |reason: &str| ConfigValueError {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let pct: f64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid("expected a number"))?;

    if !pct.is_finite() || pct < 0.0 {
        return Err(invalid("must be a finite, non-negative percentage"));
    }
    Ok(pct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tags::parse_params;

    #[test]
    fn test_resolve_uses_defaults_when_absent() {
        let defaults = PolicyDefaults::default();
        let (policy, errors) = VmPolicy::resolve(&parse_params("AUTO_STOP=Y").unwrap(), &defaults);

        assert!(errors.is_empty());
        assert_eq!(policy, VmPolicy::from_defaults(&defaults));
        assert_eq!(policy.warning_email_to, None);
    }

    #[test]
    fn test_resolve_reads_overrides() {
        let params = parse_params(
            "AUTO_STOP=Y;WARN_EMAIL_TO=dev@example.com;INACTIVITY_TH_MIN=90;\
             POST_WARN_TH_MINS=15;CPU_STDEV_BAS_PCT=2.5;NETW_STDEV_BAS_PCT=7",
        )
        .unwrap();
        let (policy, errors) = VmPolicy::resolve(&params, &PolicyDefaults::default());

        assert!(errors.is_empty());
        assert_eq!(policy.inactivity_threshold_minutes, 90);
        assert_eq!(policy.post_warning_threshold_minutes, 15);
        assert_eq!(policy.cpu_stdev_baseline_pct, 2.5);
        assert_eq!(policy.network_stdev_baseline_pct, 7.0);
        assert_eq!(policy.warning_email_to.as_deref(), Some("dev@example.com"));
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let defaults = PolicyDefaults {
            inactivity_threshold_minutes: 45,
            post_warning_threshold_minutes: 20,
            cpu_stdev_baseline_pct: 5.0,
            network_stdev_baseline_pct: 6.0,
        };
        let params = parse_params(
            "INACTIVITY_TH_MIN=soon;POST_WARN_TH_MINS=-1;CPU_STDEV_BAS_PCT=NaN;NETW_STDEV_BAS_PCT=lots",
        )
        .unwrap();
        let (policy, errors) = VmPolicy::resolve(&params, &defaults);

        assert_eq!(errors.len(), 4);
        assert_eq!(policy, VmPolicy::from_defaults(&defaults));
        assert!(errors.iter().any(|e| e.key == INACTIVITY_TH_MIN && e.value == "soon"));
    }

    #[test]
    fn test_zero_lookback_rejected_zero_grace_allowed() {
        let params = parse_params("INACTIVITY_TH_MIN=0;POST_WARN_TH_MINS=0").unwrap();
        let (policy, errors) = VmPolicy::resolve(&params, &PolicyDefaults::default());

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, INACTIVITY_TH_MIN);
        assert_eq!(policy.inactivity_threshold_minutes, 60);
        assert_eq!(policy.post_warning_threshold_minutes, 0);
    }

    #[test]
    fn test_blank_recipient_is_none() {
        let params = parse_params("WARN_EMAIL_TO=  ").unwrap();
        let (policy, _) = VmPolicy::resolve(&params, &PolicyDefaults::default());
        assert_eq!(policy.warning_email_to, None);
    }
}
