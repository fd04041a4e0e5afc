//! Limits and usage observations
//!
//! An [`AwsLimit`] describes one named service quota together with the usage
//! observations recorded against it during the last check.

use serde::Serialize;

/// Default warning threshold, as a percentage of the limit
pub const DEFAULT_WARNING_THRESHOLD: u32 = 80;

/// Default critical threshold, as a percentage of the limit
pub const DEFAULT_CRITICAL_THRESHOLD: u32 = 99;

/// One recorded count against a limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AwsLimitUsage {
    pub value: u64,
    /// Resource the count belongs to, `None` for account-wide usage
    pub resource_id: Option<String>,
    pub aws_type: Option<String>,
}

impl AwsLimitUsage {
    pub fn new(value: u64, resource_id: Option<&str>, aws_type: Option<&str>) -> Self {
        Self {
            value,
            resource_id: resource_id.map(|s| s.to_string()),
            aws_type: aws_type.map(|s| s.to_string()),
        }
    }

    /// Label used in reports: the resource id, or the bare value for account usage
    pub fn label(&self) -> String {
        match &self.resource_id {
            Some(id) => format!("{}={}", id, self.value),
            None => self.value.to_string(),
        }
    }
}

/// Per-limit warning/critical percentages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warning: u32,
    pub critical: u32,
}

/// A single service quota
#[derive(Debug, Clone)]
pub struct AwsLimit {
    pub name: String,
    pub service_name: String,
    pub default_limit: u64,
    pub def_warning_threshold: u32,
    pub def_critical_threshold: u32,
    pub limit_type: Option<String>,
    /// Name of this quota in the Service Quotas service
    pub quotas_name: String,
    limit_override: Option<u64>,
    threshold_override: Option<Thresholds>,
    current_usage: Vec<AwsLimitUsage>,
    warnings: Vec<AwsLimitUsage>,
    criticals: Vec<AwsLimitUsage>,
}

impl AwsLimit {
    pub fn new(
        name: &str,
        service_name: &str,
        default_limit: u64,
        warning_threshold: u32,
        critical_threshold: u32,
        limit_type: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            service_name: service_name.to_string(),
            default_limit,
            def_warning_threshold: warning_threshold,
            def_critical_threshold: critical_threshold,
            limit_type: limit_type.map(|s| s.to_string()),
            quotas_name: name.to_string(),
            limit_override: None,
            threshold_override: None,
            current_usage: Vec::new(),
            warnings: Vec::new(),
            criticals: Vec::new(),
        }
    }

    /// Use a different name when looking this limit up in Service Quotas
    pub fn with_quotas_name(mut self, quotas_name: &str) -> Self {
        self.quotas_name = quotas_name.to_string();
        self
    }

    /// Effective limit: the override if set, otherwise the default
    pub fn get_limit(&self) -> u64 {
        self.limit_override.unwrap_or(self.default_limit)
    }

    /// Where the effective limit comes from
    pub fn get_limit_source(&self) -> &'static str {
        if self.limit_override.is_some() {
            "override"
        } else {
            "default"
        }
    }

    pub fn set_limit_override(&mut self, value: u64) {
        self.limit_override = Some(value);
    }

    pub fn set_threshold_override(&mut self, warning: u32, critical: u32) {
        self.threshold_override = Some(Thresholds { warning, critical });
    }

    /// Thresholds in effect for this limit
    pub fn thresholds(&self) -> Thresholds {
        self.threshold_override.unwrap_or(Thresholds {
            warning: self.def_warning_threshold,
            critical: self.def_critical_threshold,
        })
    }

    pub fn add_current_usage(&mut self, value: u64, resource_id: Option<&str>, aws_type: Option<&str>) {
        self.current_usage
            .push(AwsLimitUsage::new(value, resource_id, aws_type));
    }

    pub fn reset_usage(&mut self) {
        self.current_usage.clear();
    }

    /// Observations in the order they were recorded
    pub fn get_current_usage(&self) -> &[AwsLimitUsage] {
        &self.current_usage
    }

    /// Compare every observation against the effective limit and thresholds.
    ///
    /// Returns `true` when nothing is at or above the warning percentage.
    /// Offending observations are available from [`get_warnings`] and
    /// [`get_criticals`] until the next call.
    ///
    /// [`get_warnings`]: AwsLimit::get_warnings
    /// [`get_criticals`]: AwsLimit::get_criticals
    pub fn check_thresholds(&mut self) -> bool {
        self.warnings.clear();
        self.criticals.clear();

        let limit = self.get_limit();
        let thresholds = self.thresholds();

        for usage in &self.current_usage {
            let pct = percent_of(usage.value, limit);
            if pct >= f64::from(thresholds.critical) {
                self.criticals.push(usage.clone());
            } else if pct >= f64::from(thresholds.warning) {
                self.warnings.push(usage.clone());
            }
        }

        self.warnings.is_empty() && self.criticals.is_empty()
    }

    pub fn get_warnings(&self) -> &[AwsLimitUsage] {
        &self.warnings
    }

    pub fn get_criticals(&self) -> &[AwsLimitUsage] {
        &self.criticals
    }
}

/// Usage as a percentage of the limit; a zero limit is fully used by any usage
fn percent_of(value: u64, limit: u64) -> f64 {
    if limit == 0 {
        return if value == 0 { 0.0 } else { 100.0 };
    }
    value as f64 / limit as f64 * 100.0
}
