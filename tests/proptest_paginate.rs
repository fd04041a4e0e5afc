//! Property-based tests using proptest
//!
//! These tests verify pagination and usage counting invariants using
//! randomized page layouts and distribution shapes.

use cflimits::aws::FixtureConnection;
use cflimits::paginate::{extract_items, paginate, PageShape};
use cflimits::service::cloudfront::{
    CACHE_BEHAVIORS_PER_DISTRIBUTION, DISTRIBUTIONS, KEY_GROUPS_PER_CACHE_BEHAVIOR,
    KEY_GROUPS_PER_DISTRIBUTION,
};
use cflimits::service::CloudFrontService;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;

const SHAPE: PageShape = PageShape {
    marker_path: "DistributionList.NextMarker",
    data_path: "DistributionList.Items",
    marker_param: "Marker",
};

/// Split `ids` into pages of the given sizes, chaining them with markers
fn build_pages(ids: &[String], sizes: &[usize]) -> Vec<Value> {
    let mut pages = Vec::new();
    let mut start = 0;

    for (i, size) in sizes.iter().enumerate() {
        let end = (start + size).min(ids.len());
        let items: Vec<Value> = ids[start..end].iter().map(|id| json!({ "Id": id })).collect();
        let mut list = json!({ "Items": items });
        if i + 1 < sizes.len() {
            list["NextMarker"] = json!(format!("page-{}", i + 1));
        }
        pages.push(json!({ "DistributionList": list }));
        start = end;
    }

    pages
}

/// Generate a list of key-group ids drawn from a small pool, so behaviors overlap
fn arb_key_groups() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("kg[0-5]", 0..5)
}

/// Generate a distribution with a default behavior and up to four explicit ones
fn arb_distribution() -> impl Strategy<Value = Value> {
    (
        "[A-Z0-9]{6,14}",
        arb_key_groups(),
        prop::collection::vec(("/[a-z]{1,8}/\\*", arb_key_groups()), 0..4),
    )
        .prop_map(|(id, default_kgs, behaviors)| {
            let explicit: Vec<Value> = behaviors
                .into_iter()
                .map(|(pattern, kgs)| {
                    json!({ "PathPattern": pattern, "TrustedKeyGroups": { "Items": kgs } })
                })
                .collect();
            json!({
                "Id": id,
                "DefaultCacheBehavior": { "TrustedKeyGroups": { "Items": default_kgs } },
                "CacheBehaviors": { "Items": explicit }
            })
        })
}

fn key_groups_of(behavior: &Value) -> BTreeSet<String> {
    extract_items(behavior, "TrustedKeyGroups.Items")
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect()
}

proptest! {
    /// Paginating returns every item exactly once, in page order
    #[test]
    fn pagination_preserves_all_items(
        ids in prop::collection::vec("[a-z0-9]{1,8}", 0..40),
        sizes in prop::collection::vec(0usize..10, 1..8),
    ) {
        let pages = build_pages(&ids, &sizes);
        let covered: usize = sizes.iter().sum::<usize>().min(ids.len());
        let calls = RefCell::new(0usize);

        let result = tokio_test::block_on(paginate(
            |params| {
                let idx = match params.get("Marker").and_then(|m| m.as_str()) {
                    Some(marker) => marker.trim_start_matches("page-").parse::<usize>().unwrap(),
                    None => 0,
                };
                *calls.borrow_mut() += 1;
                let page = pages[idx].clone();
                async move { Ok::<_, anyhow::Error>(page) }
            },
            &SHAPE,
            json!({}),
        ))
        .unwrap();

        let got: Vec<String> = extract_items(&result, SHAPE.data_path)
            .iter()
            .filter_map(|v| v["Id"].as_str().map(|s| s.to_string()))
            .collect();

        prop_assert_eq!(got, ids[..covered].to_vec());
        prop_assert_eq!(*calls.borrow(), sizes.len());
    }

    /// Key groups per distribution is the size of the union, never more than the per-behavior sum
    #[test]
    fn key_group_union_bounded_by_sum(dists in prop::collection::vec(arb_distribution(), 0..6)) {
        let fixture = json!({ "list_distributions": { "DistributionList": { "Items": dists.clone() } } });
        let mut service = CloudFrontService::new(FixtureConnection::from_value(fixture).unwrap(), 80, 99);
        tokio_test::block_on(service.find_usage()).unwrap();
        let limits = service.get_limits();

        prop_assert_eq!(limits[DISTRIBUTIONS].get_current_usage()[0].value, dists.len() as u64);

        let per_dist = limits[KEY_GROUPS_PER_DISTRIBUTION].get_current_usage();
        let behaviors = limits[CACHE_BEHAVIORS_PER_DISTRIBUTION].get_current_usage();
        let per_behavior = limits[KEY_GROUPS_PER_CACHE_BEHAVIOR].get_current_usage();
        prop_assert_eq!(per_dist.len(), dists.len());

        let mut offset = 0;
        for (i, dist) in dists.iter().enumerate() {
            let explicit = extract_items(dist, "CacheBehaviors.Items");
            let mut union = key_groups_of(&dist["DefaultCacheBehavior"]);
            let mut sum = union.len() as u64;
            for cb in explicit {
                let kgs = key_groups_of(cb);
                sum += kgs.len() as u64;
                union.extend(kgs);
            }

            prop_assert_eq!(per_dist[i].value, union.len() as u64);
            prop_assert!(per_dist[i].value <= sum);
            prop_assert_eq!(behaviors[i].value, 1 + explicit.len() as u64);

            let scoped: u64 = per_behavior[offset..offset + 1 + explicit.len()]
                .iter()
                .map(|u| u.value)
                .sum();
            prop_assert_eq!(scoped, sum);
            offset += 1 + explicit.len();
        }
        prop_assert_eq!(offset, per_behavior.len());
    }
}
