//! Rank-based segment naming
//!
//! Every segment is ranked on recency (ascending, rank 1 = most recent),
//! transaction count and total spend (both descending, rank 1 = highest).
//! Ties share the average of the ranks they span. Names come from an ordered
//! rule list where the first match wins, then from a fallback chain that never
//! reuses a name.
//!
//! The five primary rules overlap; only their order keeps names apart, and two
//! segments can still both land on the same primary name.

use crate::profile::SegmentProfile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

pub const VIP: &str = "VIP";
pub const AT_RISK: &str = "At Risk";
pub const NEW: &str = "New";
pub const REGULAR: &str = "Regular";
pub const OCCASIONAL: &str = "Occasional";
pub const RECENT_SHOPPERS: &str = "Recent Shoppers";
pub const FREQUENT_SHOPPERS: &str = "Frequent Shoppers";
pub const HIGH_VALUE: &str = "High Value";
pub const STANDARD: &str = "Standard";
pub const OCCASIONAL_PLUS: &str = "Occasional-Plus";

/// Ranks of one segment among all profiled segments; NaN for an empty segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRanks {
    #[serde(with = "crate::nan_serde::scalar")]
    pub recency_rank: f64,
    #[serde(with = "crate::nan_serde::scalar")]
    pub frequency_rank: f64,
    #[serde(with = "crate::nan_serde::scalar")]
    pub monetary_rank: f64,
    /// Sum of the three ranks; lower is better
    #[serde(with = "crate::nan_serde::scalar")]
    pub rfm_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Ascending,
    Descending,
}

/// Average ranks (1-based); NaN values are left out and keep a NaN rank
pub fn average_rank(values: &[f64], order: RankOrder) -> Vec<f64> {
    let mut indices: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    indices.sort_by(|&a, &b| {
        let ordering = values[a].total_cmp(&values[b]);
        match order {
            RankOrder::Ascending => ordering,
            RankOrder::Descending => ordering.reverse(),
        }
    });

    let mut ranks = vec![f64::NAN; values.len()];
    let mut start = 0;
    while start < indices.len() {
        let mut end = start + 1;
        while end < indices.len() && values[indices[end]] == values[indices[start]] {
            end += 1;
        }
        // positions start..end hold rank start+1 ..= end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &indices[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// Median over the non-NaN values; NaN when there are none
pub fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn rank_segments(profiles: &[SegmentProfile]) -> Vec<SegmentRanks> {
    let recency: Vec<f64> = profiles.iter().map(SegmentProfile::recency).collect();
    let frequency: Vec<f64> = profiles.iter().map(SegmentProfile::transaction_count).collect();
    let monetary: Vec<f64> = profiles.iter().map(SegmentProfile::total_spend).collect();

    let recency_rank = average_rank(&recency, RankOrder::Ascending);
    let frequency_rank = average_rank(&frequency, RankOrder::Descending);
    let monetary_rank = average_rank(&monetary, RankOrder::Descending);

    (0..profiles.len())
        .map(|i| SegmentRanks {
            recency_rank: recency_rank[i],
            frequency_rank: frequency_rank[i],
            monetary_rank: monetary_rank[i],
            rfm_score: recency_rank[i] + frequency_rank[i] + monetary_rank[i],
        })
        .collect()
}

/// What the naming rules look at for one segment
#[derive(Debug, Clone, Copy)]
pub struct NamingInput {
    pub ranks: SegmentRanks,
    pub total_spend: f64,
    pub customer_lifetime: f64,
}

/// Cross-segment reference values shared by every rule
#[derive(Debug, Clone, Copy)]
pub struct Cohort {
    /// Number of profiled segments
    pub n: f64,
    pub median_total_spend: f64,
    pub median_customer_lifetime: f64,
}

impl Cohort {
    fn half(&self) -> f64 {
        self.n / 2.0
    }

    fn third(&self) -> f64 {
        self.n / 3.0
    }
}

struct NamingRule {
    name: &'static str,
    matches: fn(&NamingInput, &Cohort) -> bool,
}

/// Evaluated top to bottom; the first match names the segment
const PRIMARY_RULES: [NamingRule; 5] = [
    NamingRule {
        name: VIP,
        matches: |s, c| {
            s.ranks.frequency_rank <= c.half()
                && s.ranks.monetary_rank <= c.half()
                && s.total_spend > c.median_total_spend
        },
    },
    NamingRule {
        name: AT_RISK,
        matches: |s, c| s.ranks.recency_rank >= c.half() && s.ranks.monetary_rank <= c.half(),
    },
    NamingRule {
        name: NEW,
        matches: |s, c| {
            s.customer_lifetime < c.median_customer_lifetime && s.ranks.recency_rank <= c.half()
        },
    },
    NamingRule {
        name: REGULAR,
        matches: |s, c| s.ranks.frequency_rank <= c.half() && s.ranks.monetary_rank > c.half(),
    },
    NamingRule {
        name: OCCASIONAL,
        matches: is_occasional,
    },
];

/// Tried in order when no primary rule matched; a name already in use is skipped
const FALLBACK_RULES: [NamingRule; 3] = [
    NamingRule {
        name: RECENT_SHOPPERS,
        matches: |s, c| s.ranks.recency_rank <= c.third(),
    },
    NamingRule {
        name: FREQUENT_SHOPPERS,
        matches: |s, c| s.ranks.frequency_rank <= c.third(),
    },
    NamingRule {
        name: HIGH_VALUE,
        matches: |s, c| s.ranks.monetary_rank <= c.third(),
    },
];

fn is_occasional(s: &NamingInput, c: &Cohort) -> bool {
    s.ranks.frequency_rank > c.half() && s.ranks.monetary_rank > c.half()
}

pub fn primary_name(segment: &NamingInput, cohort: &Cohort) -> Option<&'static str> {
    PRIMARY_RULES
        .iter()
        .find(|rule| (rule.matches)(segment, cohort))
        .map(|rule| rule.name)
}

pub fn fallback_name(segment: &NamingInput, cohort: &Cohort, used: &HashSet<String>) -> String {
    if let Some(rule) = FALLBACK_RULES
        .iter()
        .find(|rule| !used.contains(rule.name) && (rule.matches)(segment, cohort))
    {
        return rule.name.to_string();
    }

    if is_occasional(segment, cohort) && used.contains(OCCASIONAL) {
        return unused_variant(OCCASIONAL_PLUS, used);
    }
    unused_variant(STANDARD, used)
}

/// `base` if free, otherwise `base-2`, `base-3`, ...
fn unused_variant(base: &str, used: &HashSet<String>) -> String {
    if !used.contains(base) {
        return base.to_string();
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !used.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Names for `segments` in order, one per entry
pub fn assign_names(segments: &[NamingInput], cohort: &Cohort) -> Vec<String> {
    let mut used = HashSet::new();
    let mut names = Vec::with_capacity(segments.len());

    for segment in segments {
        let name = match primary_name(segment, cohort) {
            Some(name) => name.to_string(),
            None => fallback_name(segment, cohort, &used),
        };
        used.insert(name.clone());
        names.push(name);
    }

    names
}

/// Rank the profiles and write ranks and names into them.
///
/// Only segments with customers take part in the ranking thresholds and the
/// medians. Empty segments are named last, from the "Standard" chain, so they
/// never change the names of populated segments.
pub fn name_segments(profiles: &mut [SegmentProfile]) {
    let ranks = rank_segments(profiles);

    let populated: Vec<usize> = (0..profiles.len()).filter(|&i| !profiles[i].is_empty()).collect();
    let spend: Vec<f64> = populated.iter().map(|&i| profiles[i].total_spend()).collect();
    let lifetime: Vec<f64> = populated.iter().map(|&i| profiles[i].customer_lifetime()).collect();
    let cohort = Cohort {
        n: populated.len() as f64,
        median_total_spend: median(&spend),
        median_customer_lifetime: median(&lifetime),
    };

    let inputs: Vec<NamingInput> = populated
        .iter()
        .map(|&i| NamingInput {
            ranks: ranks[i],
            total_spend: profiles[i].total_spend(),
            customer_lifetime: profiles[i].customer_lifetime(),
        })
        .collect();

    let mut names: Vec<Option<String>> = vec![None; profiles.len()];
    for (&i, name) in populated.iter().zip(assign_names(&inputs, &cohort)) {
        names[i] = Some(name);
    }

    let mut used: HashSet<String> = names.iter().flatten().cloned().collect();
    for name in names.iter_mut().filter(|n| n.is_none()) {
        let standard = unused_variant(STANDARD, &used);
        used.insert(standard.clone());
        *name = Some(standard);
    }

    for ((profile, ranks), name) in profiles.iter_mut().zip(ranks).zip(names) {
        let name = name.unwrap_or_default();
        debug!(segment = profile.segment, name = %name, rfm_score = ranks.rfm_score, "Segment named");
        profile.ranks = ranks;
        profile.segment_name = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CUSTOMER_LIFETIME, RECENCY, TOTAL_SPEND, TRANSACTION_COUNT};
    use std::collections::BTreeMap;

    fn profile(segment: usize, recency: f64, count: f64, spend: f64, lifetime: f64) -> SegmentProfile {
        let feature_means: BTreeMap<String, f64> = [
            (RECENCY, recency),
            (TRANSACTION_COUNT, count),
            (TOTAL_SPEND, spend),
            (CUSTOMER_LIFETIME, lifetime),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        SegmentProfile {
            segment,
            feature_means,
            customer_count: 10,
            customer_percentage: 0.0,
            segment_name: String::new(),
            ranks: SegmentRanks::default(),
        }
    }

    fn empty(segment: usize) -> SegmentProfile {
        let mut p = profile(segment, f64::NAN, f64::NAN, f64::NAN, f64::NAN);
        p.customer_count = 0;
        p
    }

    fn names(profiles: &[SegmentProfile]) -> Vec<&str> {
        profiles.iter().map(|p| p.segment_name.as_str()).collect()
    }

    fn input(recency: f64, frequency: f64, monetary: f64) -> NamingInput {
        NamingInput {
            ranks: SegmentRanks {
                recency_rank: recency,
                frequency_rank: frequency,
                monetary_rank: monetary,
                rfm_score: recency + frequency + monetary,
            },
            total_spend: 100.0,
            customer_lifetime: 100.0,
        }
    }

    fn cohort(n: usize) -> Cohort {
        Cohort {
            n: n as f64,
            median_total_spend: 100.0,
            median_customer_lifetime: 100.0,
        }
    }

    #[test]
    fn test_average_rank_ties() {
        assert_eq!(average_rank(&[3.0, 1.0, 3.0], RankOrder::Ascending), vec![2.5, 1.0, 2.5]);
        assert_eq!(average_rank(&[3.0, 1.0, 3.0], RankOrder::Descending), vec![1.5, 3.0, 1.5]);
        assert_eq!(average_rank(&[5.0, 5.0, 5.0, 5.0], RankOrder::Ascending), vec![2.5; 4]);
    }

    #[test]
    fn test_average_rank_skips_nan() {
        let ranks = average_rank(&[f64::NAN, 2.0, 1.0], RankOrder::Ascending);
        assert!(ranks[0].is_nan());
        assert_eq!(&ranks[1..], &[2.0, 1.0]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[f64::NAN, 1.0, 3.0]), 2.0);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_recency_rank_follows_recency() {
        let profiles = vec![
            profile(0, 40.0, 1.0, 1.0, 1.0),
            profile(1, 5.0, 1.0, 1.0, 1.0),
            profile(2, 40.0, 1.0, 1.0, 1.0),
            profile(3, 90.0, 1.0, 1.0, 1.0),
        ];
        let ranks = rank_segments(&profiles);
        let recency: Vec<f64> = ranks.iter().map(|r| r.recency_rank).collect();
        assert_eq!(recency, vec![2.5, 1.0, 2.5, 4.0]);
        assert_eq!(ranks[1].rfm_score, 1.0 + 2.5 + 2.5);
    }

    #[test]
    fn test_vip_detection() {
        let mut profiles = vec![
            profile(0, 20.0, 15.0, 5000.0, 300.0),
            profile(1, 60.0, 5.0, 800.0, 100.0),
            profile(2, 200.0, 2.0, 200.0, 400.0),
        ];
        name_segments(&mut profiles);
        assert_eq!(profiles[0].segment_name, VIP);
        assert_eq!(profiles[0].ranks.frequency_rank, 1.0);
        assert_eq!(profiles[0].ranks.monetary_rank, 1.0);
    }

    #[test]
    fn test_at_risk_detection() {
        let mut profiles = vec![
            profile(0, 200.0, 3.0, 5000.0, 500.0),
            profile(1, 10.0, 20.0, 3000.0, 100.0),
            profile(2, 50.0, 8.0, 400.0, 300.0),
        ];
        name_segments(&mut profiles);
        assert_eq!(names(&profiles), vec![AT_RISK, NEW, OCCASIONAL]);
    }

    #[test]
    fn test_fallback_to_recent_shoppers() {
        let mut profiles = vec![
            profile(0, 5.0, 2.0, 900.0, 500.0),
            profile(1, 10.0, 30.0, 1000.0, 400.0),
            profile(2, 100.0, 10.0, 100.0, 100.0),
            profile(3, 200.0, 5.0, 50.0, 50.0),
        ];
        name_segments(&mut profiles);
        assert_eq!(names(&profiles), vec![RECENT_SHOPPERS, VIP, REGULAR, OCCASIONAL]);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // qualifies for both VIP and At Risk
        let mut segment = input(4.0, 1.0, 1.0);
        segment.total_spend = 500.0;
        assert_eq!(primary_name(&segment, &cohort(4)), Some(VIP));

        segment.total_spend = 50.0;
        assert_eq!(primary_name(&segment, &cohort(4)), Some(AT_RISK));
    }

    #[test]
    fn test_fallback_chain_skips_used_names() {
        let segment = input(1.0, 1.0, 1.0);
        let mut used = HashSet::new();

        assert_eq!(fallback_name(&segment, &cohort(6), &used), RECENT_SHOPPERS);
        used.insert(RECENT_SHOPPERS.to_string());
        assert_eq!(fallback_name(&segment, &cohort(6), &used), FREQUENT_SHOPPERS);
        used.insert(FREQUENT_SHOPPERS.to_string());
        assert_eq!(fallback_name(&segment, &cohort(6), &used), HIGH_VALUE);
        used.insert(HIGH_VALUE.to_string());
        assert_eq!(fallback_name(&segment, &cohort(6), &used), STANDARD);
        used.insert(STANDARD.to_string());
        assert_eq!(fallback_name(&segment, &cohort(6), &used), "Standard-2");
    }

    #[test]
    fn test_occasional_plus_when_occasional_taken() {
        let segment = input(5.0, 5.0, 5.0);
        let mut used = HashSet::new();
        assert_eq!(fallback_name(&segment, &cohort(6), &used), STANDARD);

        used.insert(OCCASIONAL.to_string());
        assert_eq!(fallback_name(&segment, &cohort(6), &used), OCCASIONAL_PLUS);
        used.insert(OCCASIONAL_PLUS.to_string());
        assert_eq!(fallback_name(&segment, &cohort(6), &used), "Occasional-Plus-2");
    }

    #[test]
    fn test_empty_segment_gets_a_name() {
        let mut profiles = vec![
            profile(0, 20.0, 15.0, 5000.0, 300.0),
            empty(1),
            profile(2, 200.0, 2.0, 200.0, 400.0),
        ];
        name_segments(&mut profiles);
        assert!(profiles[1].ranks.recency_rank.is_nan());
        assert_eq!(profiles[1].segment_name, STANDARD);
        assert!(profiles.iter().all(|p| !p.segment_name.is_empty()));
    }

    #[test]
    fn test_empty_segments_do_not_shift_populated_names() {
        let populated = vec![
            profile(0, 10.0, 20.0, 3000.0, 100.0),
            profile(3, 200.0, 3.0, 400.0, 500.0),
        ];
        let mut without_empty = populated.clone();
        name_segments(&mut without_empty);

        let mut with_empty = vec![populated[0].clone(), empty(1), empty(2), populated[1].clone()];
        name_segments(&mut with_empty);

        assert_eq!(with_empty[0].segment_name, without_empty[0].segment_name);
        assert_eq!(with_empty[3].segment_name, without_empty[1].segment_name);
        assert_eq!(with_empty[3].ranks, without_empty[1].ranks);
        // the low-spend segment sits in the bottom half and is not "At Risk"
        assert_eq!(with_empty[3].segment_name, OCCASIONAL);
        assert_eq!(with_empty[1].segment_name, STANDARD);
        assert_eq!(with_empty[2].segment_name, "Standard-2");
    }
}
