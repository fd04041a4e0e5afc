//! Report rendering
//!
//! Renders limits, usage and threshold problems as a table or pretty-printed
//! JSON.

use crate::limit::{AwsLimit, AwsLimitUsage};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tabled::{Table, Tabled};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Serialize)]
struct LimitRow<'a> {
    service: &'a str,
    name: &'a str,
    quotas_name: &'a str,
    limit: u64,
    source: &'static str,
    warning_threshold: u32,
    critical_threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<&'a [AwsLimitUsage]>,
}

#[derive(Debug, Serialize)]
struct ProblemRow<'a> {
    service: &'a str,
    name: &'a str,
    limit: u64,
    warnings: &'a [AwsLimitUsage],
    criticals: &'a [AwsLimitUsage],
}

/// Limit row for table display
#[derive(Debug, Tabled)]
struct LimitTableRow {
    #[tabled(rename = "Limit")]
    name: String,
    #[tabled(rename = "Value")]
    value: u64,
    #[tabled(rename = "Source")]
    source: &'static str,
    #[tabled(rename = "Warning %")]
    warning: u32,
    #[tabled(rename = "Critical %")]
    critical: u32,
}

/// Usage row for table display
#[derive(Debug, Tabled)]
struct UsageTableRow {
    #[tabled(rename = "Limit")]
    name: String,
    #[tabled(rename = "Usage")]
    usage: String,
}

/// Problem row for table display, one per limit and severity
#[derive(Debug, Tabled)]
struct ProblemTableRow {
    #[tabled(rename = "Limit")]
    name: String,
    #[tabled(rename = "Value")]
    value: u64,
    #[tabled(rename = "Level")]
    level: &'static str,
    #[tabled(rename = "Usage")]
    usage: String,
}

fn limit_row(limit: &AwsLimit, with_usage: bool) -> LimitRow<'_> {
    let thresholds = limit.thresholds();
    LimitRow {
        service: &limit.service_name,
        name: &limit.name,
        quotas_name: &limit.quotas_name,
        limit: limit.get_limit(),
        source: limit.get_limit_source(),
        warning_threshold: thresholds.warning,
        critical_threshold: thresholds.critical,
        usage: with_usage.then(|| limit.get_current_usage()),
    }
}

fn qualified_name(limit: &AwsLimit) -> String {
    format!("{}/{}", limit.service_name, limit.name)
}

fn table_or<T: Tabled>(rows: Vec<T>, empty: &str) -> String {
    if rows.is_empty() {
        return format!("{}\n", empty);
    }
    format!("{}\n", Table::new(rows))
}

/// Render the effective value of every limit
pub fn render_limits(limits: &BTreeMap<String, AwsLimit>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<LimitTableRow> = limits
                .values()
                .map(|limit| {
                    let thresholds = limit.thresholds();
                    LimitTableRow {
                        name: qualified_name(limit),
                        value: limit.get_limit(),
                        source: limit.get_limit_source(),
                        warning: thresholds.warning,
                        critical: thresholds.critical,
                    }
                })
                .collect();
            Ok(table_or(rows, "No limits found."))
        }
        OutputFormat::Json => {
            let rows: Vec<LimitRow> = limits.values().map(|l| limit_row(l, false)).collect();
            Ok(serde_json::to_string_pretty(&rows)?)
        }
    }
}

/// Render the current usage of every limit
pub fn render_usage(
    limits: &BTreeMap<String, AwsLimit>,
    checked_at: DateTime<Utc>,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<UsageTableRow> = limits
                .values()
                .map(|limit| {
                    let usage = match limit.get_current_usage() {
                        [] => "<unknown>".to_string(),
                        [single] if single.resource_id.is_none() => single.value.to_string(),
                        usage => labels(usage),
                    };
                    UsageTableRow {
                        name: qualified_name(limit),
                        usage,
                    }
                })
                .collect();
            Ok(table_or(rows, "No limits found."))
        }
        OutputFormat::Json => {
            let rows: Vec<LimitRow> = limits.values().map(|l| limit_row(l, true)).collect();
            Ok(serde_json::to_string_pretty(&json!({
                "checked_at": checked_at.to_rfc3339(),
                "limits": rows,
            }))?)
        }
    }
}

/// Render limits with usage at or above their thresholds
pub fn render_problems(
    problems: &BTreeMap<String, AwsLimit>,
    checked_at: DateTime<Utc>,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Table => {
            let mut rows = Vec::new();
            for limit in problems.values() {
                for (level, usage) in [
                    ("CRITICAL", limit.get_criticals()),
                    ("WARNING", limit.get_warnings()),
                ] {
                    if usage.is_empty() {
                        continue;
                    }
                    rows.push(ProblemTableRow {
                        name: qualified_name(limit),
                        value: limit.get_limit(),
                        level,
                        usage: labels(usage),
                    });
                }
            }
            Ok(table_or(rows, "No limits at or above threshold."))
        }
        OutputFormat::Json => {
            let rows: Vec<ProblemRow> = problems
                .values()
                .map(|limit| ProblemRow {
                    service: &limit.service_name,
                    name: &limit.name,
                    limit: limit.get_limit(),
                    warnings: limit.get_warnings(),
                    criticals: limit.get_criticals(),
                })
                .collect();
            Ok(serde_json::to_string_pretty(&json!({
                "checked_at": checked_at.to_rfc3339(),
                "problems": rows,
            }))?)
        }
    }
}

fn labels(usage: &[AwsLimitUsage]) -> String {
    usage
        .iter()
        .map(|u| u.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// IAM policy document allowing `actions` on every resource
pub fn render_iam_policy(actions: &[&str]) -> Result<String> {
    let mut actions = actions.to_vec();
    actions.sort_unstable();

    Ok(serde_json::to_string_pretty(&json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Resource": "*",
            "Action": actions,
        }]
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn limits() -> BTreeMap<String, AwsLimit> {
        let mut account = AwsLimit::new("Things per account", "Svc", 10, 80, 99, None);
        account.add_current_usage(9, None, None);

        let mut per_thing = AwsLimit::new("Parts per thing", "Svc", 4, 80, 99, None);
        per_thing.set_limit_override(5);
        per_thing.add_current_usage(5, Some("t1"), None);
        per_thing.add_current_usage(1, Some("t2"), None);

        let idle = AwsLimit::new("Unused things", "Svc", 3, 80, 99, None);

        [account, per_thing, idle]
            .into_iter()
            .map(|l| (l.name.clone(), l))
            .collect()
    }

    fn checked_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    /// Trimmed cells of the first table row mentioning `label`
    fn cells<'a>(out: &'a str, label: &str) -> Vec<&'a str> {
        out.lines()
            .find(|line| line.contains(label))
            .map(|line| line.trim().trim_matches('|').split('|').map(str::trim).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_render_limits_table() {
        let out = render_limits(&limits(), OutputFormat::Table).unwrap();
        assert_eq!(
            cells(&out, "Limit"),
            vec!["Limit", "Value", "Source", "Warning %", "Critical %"]
        );
        assert_eq!(
            cells(&out, "Svc/Parts per thing"),
            vec!["Svc/Parts per thing", "5", "override", "80", "99"]
        );
        assert_eq!(
            cells(&out, "Svc/Things per account"),
            vec!["Svc/Things per account", "10", "default", "80", "99"]
        );
        assert_eq!(out.lines().filter(|l| l.contains("| Svc/")).count(), 3);

        let parts = out.find("Svc/Parts per thing").unwrap();
        let things = out.find("Svc/Things per account").unwrap();
        assert!(parts < things);
    }

    #[test]
    fn test_render_usage_table() {
        let out = render_usage(&limits(), checked_at(), OutputFormat::Table).unwrap();
        assert_eq!(cells(&out, "Svc/Parts per thing"), vec!["Svc/Parts per thing", "t1=5, t2=1"]);
        assert_eq!(cells(&out, "Svc/Things per account"), vec!["Svc/Things per account", "9"]);
        assert_eq!(cells(&out, "Svc/Unused things"), vec!["Svc/Unused things", "<unknown>"]);
    }

    #[test]
    fn test_render_usage_json() {
        let out = render_usage(&limits(), checked_at(), OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["checked_at"], "2024-05-01T12:00:00+00:00");
        assert_eq!(value["limits"][0]["name"], "Parts per thing");
        assert_eq!(value["limits"][0]["source"], "override");
        assert_eq!(value["limits"][0]["quotas_name"], "Parts per thing");
        assert_eq!(value["limits"][0]["usage"][0]["resource_id"], "t1");
    }

    #[test]
    fn test_render_problems() {
        let mut limits = limits();
        let problems: BTreeMap<String, AwsLimit> = limits
            .iter_mut()
            .filter_map(|(name, l)| (!l.check_thresholds()).then(|| (name.clone(), l.clone())))
            .collect();

        let out = render_problems(&problems, checked_at(), OutputFormat::Table).unwrap();
        assert_eq!(
            cells(&out, "Svc/Parts per thing"),
            vec!["Svc/Parts per thing", "5", "CRITICAL", "t1=5"]
        );
        assert_eq!(
            cells(&out, "Svc/Things per account"),
            vec!["Svc/Things per account", "10", "WARNING", "9"]
        );
        assert!(!out.contains("Unused things"));

        let out = render_problems(&BTreeMap::new(), checked_at(), OutputFormat::Table).unwrap();
        assert_eq!(out, "No limits at or above threshold.\n");
    }

    #[test]
    fn test_render_iam_policy() {
        let out = render_iam_policy(&["cloudfront:ListKeyGroups", "cloudfront:ListDistributions"])
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["Statement"][0]["Effect"], "Allow");
        assert_eq!(
            value["Statement"][0]["Action"],
            json!(["cloudfront:ListDistributions", "cloudfront:ListKeyGroups"])
        );
    }
}
