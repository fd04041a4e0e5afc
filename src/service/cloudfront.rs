//! CloudFront limits and usage collection

use crate::aws::CloudFrontApi;
use crate::limit::AwsLimit;
use crate::paginate::{count_items, extract_items, lookup, lookup_str, paginate, PageShape};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

pub const SERVICE_NAME: &str = "CloudFront";
pub const API_NAME: &str = "cloudfront";
pub const QUOTAS_SERVICE_CODE: &str = "cloudfront";

pub const ALIASES_PER_DISTRIBUTION: &str = "Alternate domain names (CNAMEs) per distribution";
pub const CACHE_BEHAVIORS_PER_DISTRIBUTION: &str = "Cache behaviors per distribution";
pub const CACHE_POLICIES: &str = "Cache policies per AWS account";
pub const COOKIES_PER_CACHE_POLICY: &str = "Cookies per cache policy";
pub const COOKIES_PER_ORIGIN_REQUEST_POLICY: &str = "Cookies per origin request policy";
pub const DISTRIBUTIONS_PER_KEY_GROUP: &str = "Distributions associated with a single key group";
pub const DISTRIBUTIONS_PER_CACHE_POLICY: &str = "Distributions associated with the same cache policy";
pub const DISTRIBUTIONS_PER_ORIGIN_REQUEST_POLICY: &str =
    "Distributions associated with the same origin request policy";
pub const DISTRIBUTIONS: &str = "Distributions per AWS account";
pub const HEADERS_PER_CACHE_POLICY: &str = "Headers per cache policy";
pub const HEADERS_PER_ORIGIN_REQUEST_POLICY: &str = "Headers per origin request policy";
pub const KEY_GROUPS_PER_CACHE_BEHAVIOR: &str = "Key groups associated with a single cache behavior";
pub const KEY_GROUPS_PER_DISTRIBUTION: &str = "Key groups associated with a single distribution";
pub const KEY_GROUPS: &str = "Key groups per AWS account";
pub const ORIGIN_ACCESS_IDENTITIES: &str = "Origin access identities per account";
pub const ORIGIN_GROUPS_PER_DISTRIBUTION: &str = "Origin groups per distribution";
pub const ORIGIN_REQUEST_POLICIES: &str = "Origin request policies per AWS account";
pub const ORIGINS_PER_DISTRIBUTION: &str = "Origins per distribution";
pub const PUBLIC_KEYS_PER_KEY_GROUP: &str = "Public keys in a single key group";
pub const QUERY_STRINGS_PER_CACHE_POLICY: &str = "Query strings per cache policy";
pub const QUERY_STRINGS_PER_ORIGIN_REQUEST_POLICY: &str = "Query strings per origin request policy";
pub const WHITELISTED_COOKIES_PER_CACHE_BEHAVIOR: &str = "Whitelisted cookies per cache behavior";
pub const WHITELISTED_HEADERS_PER_CACHE_BEHAVIOR: &str = "Whitelisted headers per cache behavior";
pub const WHITELISTED_QUERY_STRINGS_PER_CACHE_BEHAVIOR: &str =
    "Whitelisted query strings per cache behavior";

const DISTRIBUTION_TYPE: &str = "AWS::CloudFront::Distribution";
const KEY_GROUP_TYPE: &str = "AWS::CloudFront::KeyGroup";
const PUBLIC_KEY_TYPE: &str = "AWS::CloudFront::PublicKey";
const CACHE_POLICY_TYPE: &str = "AWS::CloudFront::CachePolicy";
const ORIGIN_REQUEST_POLICY_TYPE: &str = "AWS::CloudFront::OriginRequestPolicy";
const ORIGIN_ACCESS_IDENTITY_TYPE: &str = "AWS::CloudFront::CloudFrontOriginAccessIdentity";

/// Known limits: (name, default value, resource type)
const CATALOG: &[(&str, u64, Option<&str>)] = &[
    (ALIASES_PER_DISTRIBUTION, 100, Some(DISTRIBUTION_TYPE)),
    (CACHE_BEHAVIORS_PER_DISTRIBUTION, 25, None),
    (CACHE_POLICIES, 20, Some(CACHE_POLICY_TYPE)),
    (COOKIES_PER_CACHE_POLICY, 10, Some(CACHE_POLICY_TYPE)),
    (COOKIES_PER_ORIGIN_REQUEST_POLICY, 10, Some(ORIGIN_REQUEST_POLICY_TYPE)),
    (DISTRIBUTIONS_PER_KEY_GROUP, 100, Some(KEY_GROUP_TYPE)),
    (DISTRIBUTIONS_PER_CACHE_POLICY, 100, Some(CACHE_POLICY_TYPE)),
    (DISTRIBUTIONS_PER_ORIGIN_REQUEST_POLICY, 100, Some(ORIGIN_REQUEST_POLICY_TYPE)),
    (DISTRIBUTIONS, 200, Some(DISTRIBUTION_TYPE)),
    (HEADERS_PER_CACHE_POLICY, 10, Some(CACHE_POLICY_TYPE)),
    (HEADERS_PER_ORIGIN_REQUEST_POLICY, 10, Some(ORIGIN_REQUEST_POLICY_TYPE)),
    (KEY_GROUPS_PER_CACHE_BEHAVIOR, 4, Some(KEY_GROUP_TYPE)),
    (KEY_GROUPS_PER_DISTRIBUTION, 4, Some(KEY_GROUP_TYPE)),
    (KEY_GROUPS, 10, Some(KEY_GROUP_TYPE)),
    (ORIGIN_ACCESS_IDENTITIES, 100, Some(ORIGIN_ACCESS_IDENTITY_TYPE)),
    (ORIGIN_GROUPS_PER_DISTRIBUTION, 10, Some(DISTRIBUTION_TYPE)),
    (ORIGIN_REQUEST_POLICIES, 20, Some(ORIGIN_REQUEST_POLICY_TYPE)),
    (ORIGINS_PER_DISTRIBUTION, 25, Some(DISTRIBUTION_TYPE)),
    (PUBLIC_KEYS_PER_KEY_GROUP, 5, Some(PUBLIC_KEY_TYPE)),
    (QUERY_STRINGS_PER_CACHE_POLICY, 10, Some(CACHE_POLICY_TYPE)),
    (QUERY_STRINGS_PER_ORIGIN_REQUEST_POLICY, 10, Some(ORIGIN_REQUEST_POLICY_TYPE)),
    (WHITELISTED_COOKIES_PER_CACHE_BEHAVIOR, 10, Some(DISTRIBUTION_TYPE)),
    (WHITELISTED_HEADERS_PER_CACHE_BEHAVIOR, 10, Some(DISTRIBUTION_TYPE)),
    (WHITELISTED_QUERY_STRINGS_PER_CACHE_BEHAVIOR, 10, Some(DISTRIBUTION_TYPE)),
];

/// Limits whose Service Quotas name differs from the limit name
const QUOTAS_NAMES: &[(&str, &str)] = &[(DISTRIBUTIONS, "Web distributions per AWS account")];

const DISTRIBUTION_PAGES: PageShape = PageShape {
    marker_path: "DistributionList.NextMarker",
    data_path: "DistributionList.Items",
    marker_param: "Marker",
};

const KEY_GROUP_PAGES: PageShape = PageShape {
    marker_path: "KeyGroupList.NextMarker",
    data_path: "KeyGroupList.Items",
    marker_param: "Marker",
};

const ORIGIN_ACCESS_IDENTITY_PAGES: PageShape = PageShape {
    marker_path: "CloudFrontOriginAccessIdentityList.NextMarker",
    data_path: "CloudFrontOriginAccessIdentityList.Items",
    marker_param: "Marker",
};

const CACHE_POLICY_PAGES: PageShape = PageShape {
    marker_path: "CachePolicyList.NextMarker",
    data_path: "CachePolicyList.Items",
    marker_param: "Marker",
};

const ORIGIN_REQUEST_POLICY_PAGES: PageShape = PageShape {
    marker_path: "OriginRequestPolicyList.NextMarker",
    data_path: "OriginRequestPolicyList.Items",
    marker_param: "Marker",
};

/// Whitelist lists may sit on the behavior itself or under the legacy `ForwardedValues` block
const WHITELISTED_COOKIE_PATHS: &[&str] = &[
    "Cookies.Items",
    "Cookies.WhitelistedNames.Items",
    "ForwardedValues.Cookies.WhitelistedNames.Items",
];
const WHITELISTED_HEADER_PATHS: &[&str] = &["Headers.Items", "ForwardedValues.Headers.Items"];
const WHITELISTED_QUERY_STRING_PATHS: &[&str] = &[
    "QueryStringCacheKeys.Items",
    "ForwardedValues.QueryStringCacheKeys.Items",
];

/// Usage check for CloudFront
pub struct CloudFrontService<C> {
    conn: C,
    warning_threshold: u32,
    critical_threshold: u32,
    limits: Option<BTreeMap<String, AwsLimit>>,
    have_usage: bool,
}

impl<C: CloudFrontApi> CloudFrontService<C> {
    pub fn new(conn: C, warning_threshold: u32, critical_threshold: u32) -> Self {
        Self {
            conn,
            warning_threshold,
            critical_threshold,
            limits: None,
            have_usage: false,
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn warning_threshold(&self) -> u32 {
        self.warning_threshold
    }

    pub fn critical_threshold(&self) -> u32 {
        self.critical_threshold
    }

    /// Whether [`find_usage`](Self::find_usage) has completed at least once
    pub fn have_usage(&self) -> bool {
        self.have_usage
    }

    /// All known limits by name, built on first call and cached afterwards
    pub fn get_limits(&mut self) -> &mut BTreeMap<String, AwsLimit> {
        let (warning, critical) = (self.warning_threshold, self.critical_threshold);
        self.limits
            .get_or_insert_with(|| build_limits(warning, critical))
    }

    /// IAM actions `find_usage` needs, each allowed on resource `*`
    pub fn required_iam_permissions(&self) -> Vec<&'static str> {
        vec![
            "cloudfront:ListCachePolicies",
            "cloudfront:ListCloudFrontOriginAccessIdentities",
            "cloudfront:ListDistributions",
            "cloudfront:ListKeyGroups",
            "cloudfront:ListOriginRequestPolicies",
        ]
    }

    pub fn set_limit_override(&mut self, name: &str, value: u64) -> Result<()> {
        let limit = self
            .get_limits()
            .get_mut(name)
            .with_context(|| format!("Unknown limit '{}' for service {}", name, SERVICE_NAME))?;
        limit.set_limit_override(value);
        Ok(())
    }

    pub fn set_threshold_override(&mut self, name: &str, warning: u32, critical: u32) -> Result<()> {
        let limit = self
            .get_limits()
            .get_mut(name)
            .with_context(|| format!("Unknown limit '{}' for service {}", name, SERVICE_NAME))?;
        limit.set_threshold_override(warning, critical);
        Ok(())
    }

    /// Limits with at least one observation at or above their warning threshold
    pub fn check_thresholds(&mut self) -> BTreeMap<String, AwsLimit> {
        self.get_limits()
            .iter_mut()
            .filter_map(|(name, limit)| {
                if limit.check_thresholds() {
                    None
                } else {
                    Some((name.clone(), limit.clone()))
                }
            })
            .collect()
    }

    /// Reset every limit's usage and collect it again from the API.
    ///
    /// Any API error aborts the pass and is returned unchanged.
    pub async fn find_usage(&mut self) -> Result<()> {
        tracing::debug!("Checking usage for service {}", SERVICE_NAME);

        for limit in self.get_limits().values_mut() {
            limit.reset_usage();
        }

        self.find_usage_distributions().await?;
        self.find_usage_key_groups().await?;
        self.find_usage_origin_access_identities().await?;
        self.find_usage_cache_policies().await?;
        self.find_usage_origin_request_policies().await?;

        self.have_usage = true;
        tracing::debug!("Done checking usage.");
        Ok(())
    }

    async fn find_usage_distributions(&mut self) -> Result<()> {
        let conn = &self.conn;
        let res = paginate(
            move |params| conn.list_distributions(params),
            &DISTRIBUTION_PAGES,
            json!({}),
        )
        .await?;

        let distributions = extract_items(&res, DISTRIBUTION_PAGES.data_path);
        if distributions.is_empty() {
            self.add_usage(DISTRIBUTIONS, 0, None, Some(DISTRIBUTION_TYPE));
            return Ok(());
        }

        // entity id -> distinct distributions referencing it
        let mut key_group_users: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut cache_policy_users: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut origin_request_policy_users: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (idx, dist) in distributions.iter().enumerate() {
            let id = match lookup_str(dist, "Id") {
                Some(id) => id.to_string(),
                None => format!("-{}", idx),
            };
            let id = id.as_str();

            self.add_usage(
                ALIASES_PER_DISTRIBUTION,
                count_items(dist, "Aliases.Items"),
                Some(id),
                Some(DISTRIBUTION_TYPE),
            );

            let explicit = extract_items(dist, "CacheBehaviors.Items");
            self.add_usage(
                CACHE_BEHAVIORS_PER_DISTRIBUTION,
                1 + explicit.len() as u64,
                Some(id),
                Some(DISTRIBUTION_TYPE),
            );

            self.add_usage(
                ORIGINS_PER_DISTRIBUTION,
                count_items(dist, "Origins.Items"),
                Some(id),
                Some(DISTRIBUTION_TYPE),
            );
            self.add_usage(
                ORIGIN_GROUPS_PER_DISTRIBUTION,
                count_items(dist, "OriginGroups.Items"),
                Some(id),
                Some(DISTRIBUTION_TYPE),
            );

            let default_behavior = dist.get("DefaultCacheBehavior").unwrap_or(&Value::Null);
            let mut behaviors = vec![(format!("{}-default-cache-behavior", id), default_behavior)];
            behaviors.extend(explicit.iter().map(|cb| {
                let pattern = lookup_str(cb, "PathPattern").unwrap_or("");
                (format!("{}-cache-behavior-{}", id, pattern), cb)
            }));

            let mut dist_key_groups: BTreeSet<&str> = BTreeSet::new();

            for (scope, behavior) in &behaviors {
                let key_groups = trusted_key_groups(behavior);

                self.add_usage(
                    KEY_GROUPS_PER_CACHE_BEHAVIOR,
                    key_groups.len() as u64,
                    Some(scope.as_str()),
                    Some(DISTRIBUTION_TYPE),
                );
                self.add_usage(
                    WHITELISTED_COOKIES_PER_CACHE_BEHAVIOR,
                    first_count(behavior, WHITELISTED_COOKIE_PATHS),
                    Some(scope.as_str()),
                    Some(DISTRIBUTION_TYPE),
                );
                self.add_usage(
                    WHITELISTED_HEADERS_PER_CACHE_BEHAVIOR,
                    first_count(behavior, WHITELISTED_HEADER_PATHS),
                    Some(scope.as_str()),
                    Some(DISTRIBUTION_TYPE),
                );
                self.add_usage(
                    WHITELISTED_QUERY_STRINGS_PER_CACHE_BEHAVIOR,
                    first_count(behavior, WHITELISTED_QUERY_STRING_PATHS),
                    Some(scope.as_str()),
                    Some(DISTRIBUTION_TYPE),
                );

                for kg in &key_groups {
                    key_group_users
                        .entry(kg.to_string())
                        .or_default()
                        .insert(id.to_string());
                }
                dist_key_groups.extend(key_groups);

                if let Some(policy) = lookup_str(behavior, "CachePolicyId") {
                    cache_policy_users
                        .entry(policy.to_string())
                        .or_default()
                        .insert(id.to_string());
                }
                if let Some(policy) = lookup_str(behavior, "OriginRequestPolicyId") {
                    origin_request_policy_users
                        .entry(policy.to_string())
                        .or_default()
                        .insert(id.to_string());
                }
            }

            self.add_usage(
                KEY_GROUPS_PER_DISTRIBUTION,
                dist_key_groups.len() as u64,
                Some(id),
                Some(DISTRIBUTION_TYPE),
            );
        }

        self.add_usage(
            DISTRIBUTIONS,
            distributions.len() as u64,
            None,
            Some(DISTRIBUTION_TYPE),
        );

        for (kg, users) in &key_group_users {
            self.add_usage(
                DISTRIBUTIONS_PER_KEY_GROUP,
                users.len() as u64,
                Some(kg.as_str()),
                Some(KEY_GROUP_TYPE),
            );
        }
        for (policy, users) in &cache_policy_users {
            self.add_usage(
                DISTRIBUTIONS_PER_CACHE_POLICY,
                users.len() as u64,
                Some(policy.as_str()),
                Some(CACHE_POLICY_TYPE),
            );
        }
        for (policy, users) in &origin_request_policy_users {
            self.add_usage(
                DISTRIBUTIONS_PER_ORIGIN_REQUEST_POLICY,
                users.len() as u64,
                Some(policy.as_str()),
                Some(ORIGIN_REQUEST_POLICY_TYPE),
            );
        }

        Ok(())
    }

    async fn find_usage_key_groups(&mut self) -> Result<()> {
        let conn = &self.conn;
        let res = paginate(
            move |params| conn.list_key_groups(params),
            &KEY_GROUP_PAGES,
            json!({}),
        )
        .await?;

        let key_groups = extract_items(&res, KEY_GROUP_PAGES.data_path);
        self.add_usage(KEY_GROUPS, key_groups.len() as u64, None, Some(KEY_GROUP_TYPE));

        for kg in key_groups {
            let id = lookup_str(kg, "KeyGroup.Id").unwrap_or("-");
            self.add_usage(
                PUBLIC_KEYS_PER_KEY_GROUP,
                count_items(kg, "KeyGroup.KeyGroupConfig.Items"),
                Some(id),
                Some(KEY_GROUP_TYPE),
            );
        }

        Ok(())
    }

    async fn find_usage_origin_access_identities(&mut self) -> Result<()> {
        let conn = &self.conn;
        let res = paginate(
            move |params| conn.list_cloud_front_origin_access_identities(params),
            &ORIGIN_ACCESS_IDENTITY_PAGES,
            json!({}),
        )
        .await?;

        self.add_usage(
            ORIGIN_ACCESS_IDENTITIES,
            count_items(&res, ORIGIN_ACCESS_IDENTITY_PAGES.data_path),
            None,
            Some(ORIGIN_ACCESS_IDENTITY_TYPE),
        );
        Ok(())
    }

    async fn find_usage_cache_policies(&mut self) -> Result<()> {
        let conn = &self.conn;
        // Managed policies do not count against the quota
        let res = paginate(
            move |params| conn.list_cache_policies(params),
            &CACHE_POLICY_PAGES,
            json!({ "Type": "custom" }),
        )
        .await?;

        let policies = extract_items(&res, CACHE_POLICY_PAGES.data_path);
        self.add_usage(CACHE_POLICIES, policies.len() as u64, None, Some(CACHE_POLICY_TYPE));

        for policy in policies {
            let id = lookup_str(policy, "CachePolicy.Id").unwrap_or("-");
            let params = lookup(
                policy,
                "CachePolicy.CachePolicyConfig.ParametersInCacheKeyAndForwardedToOrigin",
            )
            .unwrap_or(&Value::Null);
            self.add_policy_usage(
                params,
                id,
                [
                    HEADERS_PER_CACHE_POLICY,
                    COOKIES_PER_CACHE_POLICY,
                    QUERY_STRINGS_PER_CACHE_POLICY,
                ],
                CACHE_POLICY_TYPE,
            );
        }

        Ok(())
    }

    async fn find_usage_origin_request_policies(&mut self) -> Result<()> {
        let conn = &self.conn;
        let res = paginate(
            move |params| conn.list_origin_request_policies(params),
            &ORIGIN_REQUEST_POLICY_PAGES,
            json!({ "Type": "custom" }),
        )
        .await?;

        let policies = extract_items(&res, ORIGIN_REQUEST_POLICY_PAGES.data_path);
        self.add_usage(
            ORIGIN_REQUEST_POLICIES,
            policies.len() as u64,
            None,
            Some(ORIGIN_REQUEST_POLICY_TYPE),
        );

        for policy in policies {
            let id = lookup_str(policy, "OriginRequestPolicy.Id").unwrap_or("-");
            let config = lookup(policy, "OriginRequestPolicy.OriginRequestPolicyConfig")
                .unwrap_or(&Value::Null);
            self.add_policy_usage(
                config,
                id,
                [
                    HEADERS_PER_ORIGIN_REQUEST_POLICY,
                    COOKIES_PER_ORIGIN_REQUEST_POLICY,
                    QUERY_STRINGS_PER_ORIGIN_REQUEST_POLICY,
                ],
                ORIGIN_REQUEST_POLICY_TYPE,
            );
        }

        Ok(())
    }

    /// Record header, cookie and query string counts of a policy config, in that order
    fn add_policy_usage(&mut self, config: &Value, id: &str, limits: [&str; 3], aws_type: &str) {
        let [headers, cookies, query_strings] = limits;
        self.add_usage(
            headers,
            count_items(config, "HeadersConfig.Headers.Items"),
            Some(id),
            Some(aws_type),
        );
        self.add_usage(
            cookies,
            count_items(config, "CookiesConfig.Cookies.Items"),
            Some(id),
            Some(aws_type),
        );
        self.add_usage(
            query_strings,
            count_items(config, "QueryStringsConfig.QueryStrings.Items"),
            Some(id),
            Some(aws_type),
        );
    }

    fn add_usage(&mut self, name: &str, value: u64, resource_id: Option<&str>, aws_type: Option<&str>) {
        match self.get_limits().get_mut(name) {
            Some(limit) => limit.add_current_usage(value, resource_id, aws_type),
            None => tracing::warn!("Usage recorded for unknown limit {}", name),
        }
    }
}

fn build_limits(warning_threshold: u32, critical_threshold: u32) -> BTreeMap<String, AwsLimit> {
    CATALOG
        .iter()
        .map(|&(name, default, limit_type)| {
            let mut limit = AwsLimit::new(
                name,
                SERVICE_NAME,
                default,
                warning_threshold,
                critical_threshold,
                limit_type,
            );
            if let Some(&(_, quotas_name)) = QUOTAS_NAMES.iter().find(|(n, _)| *n == name) {
                limit = limit.with_quotas_name(quotas_name);
            }
            (name.to_string(), limit)
        })
        .collect()
}

/// Distinct key-group ids a cache behavior trusts
fn trusted_key_groups(behavior: &Value) -> BTreeSet<&str> {
    extract_items(behavior, "TrustedKeyGroups.Items")
        .iter()
        .filter_map(|v| v.as_str())
        .collect()
}

/// Length of the first list found among `paths`, zero when none is present
fn first_count(value: &Value, paths: &[&str]) -> u64 {
    paths
        .iter()
        .find_map(|path| lookup(value, path).and_then(|v| v.as_array()))
        .map(|items| items.len() as u64)
        .unwrap_or(0)
}
