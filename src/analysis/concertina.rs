//! Concertina merge: collapse facet entries that tag mostly the same articles.
//!
//! This is a single-pass heuristic, not an optimal clustering. Entries are
//! taken from the bottom of a descending ranking one at a time (the
//! "bubble") and compared against the entries above them, nearest first.
//! When enough of the bubble's articles are also tagged by a candidate, the
//! two are replaced by one merged entry named `a + b`, re-inserted where its
//! new count belongs. A bubble that matches nothing is final.

use crate::analysis::correlate::RankedItem;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

pub const CONCERTINA_NAME_JOIN: &str = " + ";

/// Concertinaed versions of the overall and per-taxonomy rankings.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcertinaedLists {
    pub sorted_by_count: Vec<RankedItem>,
    pub sorted_by_count_grouped_by_taxonomy: BTreeMap<String, Vec<RankedItem>>,
}

/// Concertina the overall ranking and then each taxonomy's ranking.
///
/// All passes share `uuids_by_item`, which gains an entry per merged item.
pub fn concertina_sorted_lists(
    sorted_by_count: &[RankedItem],
    grouped_by_taxonomy: &BTreeMap<String, Vec<RankedItem>>,
    uuids_by_item: &mut HashMap<String, Vec<String>>,
    overlap_threshold: f64,
) -> ConcertinaedLists {
    let overall = collapse_near_duplicates(sorted_by_count, uuids_by_item, overlap_threshold);

    let mut by_taxonomy = BTreeMap::new();
    for (taxonomy, list) in grouped_by_taxonomy {
        by_taxonomy.insert(
            taxonomy.clone(),
            collapse_near_duplicates(list, uuids_by_item, overlap_threshold),
        );
    }

    ConcertinaedLists {
        sorted_by_count: overall,
        sorted_by_count_grouped_by_taxonomy: by_taxonomy,
    }
}

/// Merge entries of a descending `ranked` list whose uuid sets overlap.
///
/// A bubble merges into a candidate when
/// `|bubble ∩ candidate| >= bubble.count * overlap_threshold`.
/// `uuids_by_item` is updated with the uuids of every merged entry.
pub fn collapse_near_duplicates(
    ranked: &[RankedItem],
    uuids_by_item: &mut HashMap<String, Vec<String>>,
    overlap_threshold: f64,
) -> Vec<RankedItem> {
    let mut source: Vec<RankedItem> = ranked.to_vec();
    let mut concertinaed: Vec<RankedItem> = Vec::with_capacity(ranked.len());
    let mut merges = 0usize;

    while source.len() > 1 {
        let Some(bubble) = source.pop() else {
            break;
        };
        let bubble_uuids = uuids_by_item.get(&bubble.name).cloned().unwrap_or_default();
        let needed = bubble.count as f64 * overlap_threshold;

        let mut merged = false;
        for i in (0..source.len()).rev() {
            let candidate = &source[i];
            let candidate_uuids = uuids_by_item
                .get(&candidate.name)
                .cloned()
                .unwrap_or_default();
            let candidate_set: HashSet<&String> = candidate_uuids.iter().collect();
            let overlap = bubble_uuids
                .iter()
                .filter(|uuid| candidate_set.contains(uuid))
                .count();

            if (overlap as f64) < needed {
                continue;
            }

            let merged_uuids = union(&candidate_uuids, &bubble_uuids);
            let merged_names = union(&candidate.constituents(), &bubble.constituents());
            let merged_item = RankedItem {
                name: merged_names.join(CONCERTINA_NAME_JOIN),
                count: merged_uuids.len(),
                constituent_names: Some(merged_names),
            };

            source.remove(i);
            // Walk up from the candidate's old slot past anything smaller.
            let mut insert_at = i;
            while insert_at > 0 && source[insert_at - 1].count < merged_item.count {
                insert_at -= 1;
            }

            debug!(
                "Concertina: merged {} into {} ({} uuids)",
                bubble.name, merged_item.name, merged_item.count
            );
            uuids_by_item.insert(merged_item.name.clone(), merged_uuids);
            source.insert(insert_at, merged_item);
            merged = true;
            merges += 1;
            break;
        }

        if !merged {
            concertinaed.push(bubble);
        }
    }

    if let Some(last) = source.pop() {
        concertinaed.push(last);
    }
    concertinaed.sort_by(|a, b| b.count.cmp(&a.count));

    debug!(
        "Concertina: {} entries in, {} out, {} merges",
        ranked.len(),
        concertinaed.len(),
        merges
    );
    concertinaed
}

/// Order-preserving union: `first`, then anything new from `second`.
fn union(first: &[String], second: &[String]) -> Vec<String> {
    let mut seen: HashSet<&String> = HashSet::with_capacity(first.len() + second.len());
    first
        .iter()
        .chain(second)
        .filter(|item| seen.insert(item))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuids(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(name, ids)| (name.to_string(), ids.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn ranked(map: &HashMap<String, Vec<String>>, order: &[&str]) -> Vec<RankedItem> {
        order
            .iter()
            .map(|name| RankedItem::new(*name, map[*name].len()))
            .collect()
    }

    fn names(list: &[RankedItem]) -> Vec<&str> {
        list.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_overlapping_entries_merge_into_union() {
        let mut map = uuids(&[
            ("TOPIC:Brexit", &["1", "2", "3", "4"]),
            ("TOPIC:EU", &["2", "3", "5"]),
        ]);
        let list = ranked(&map, &["TOPIC:Brexit", "TOPIC:EU"]);

        let out = collapse_near_duplicates(&list, &mut map, DEFAULT_THRESHOLD);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "TOPIC:Brexit + TOPIC:EU");
        assert_eq!(out[0].count, 5);
        assert_eq!(
            out[0].constituent_names.as_deref(),
            Some(&["TOPIC:Brexit".to_string(), "TOPIC:EU".to_string()][..])
        );
        assert_eq!(map["TOPIC:Brexit + TOPIC:EU"], vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_below_threshold_stays_separate() {
        let mut map = uuids(&[
            ("A", &["1", "2", "3", "4"]),
            ("B", &["4", "5", "6"]),
        ]);
        let list = ranked(&map, &["A", "B"]);

        let out = collapse_near_duplicates(&list, &mut map, DEFAULT_THRESHOLD);

        assert_eq!(names(&out), vec!["A", "B"]);
        assert!(out.iter().all(|i| i.constituent_names.is_none()));
    }

    #[test]
    fn test_bubble_checks_nearest_candidate_first() {
        // C overlaps both A and B fully; it merges with B, the nearer one.
        let mut map = uuids(&[
            ("A", &["1", "2", "3", "4", "5"]),
            ("B", &["1", "2", "9", "8"]),
            ("C", &["1", "2"]),
        ]);
        let list = ranked(&map, &["A", "B", "C"]);

        let out = collapse_near_duplicates(&list, &mut map, DEFAULT_THRESHOLD);

        assert_eq!(names(&out), vec!["A", "B + C"]);
    }

    #[test]
    fn test_merged_entry_can_absorb_later_bubbles() {
        let mut map = uuids(&[
            ("A", &["1", "2", "3"]),
            ("B", &["4", "5", "6"]),
            ("C", &["1", "2", "3"]),
            ("D", &["4", "5"]),
        ]);
        let list = ranked(&map, &["A", "B", "C", "D"]);

        let out = collapse_near_duplicates(&list, &mut map, DEFAULT_THRESHOLD);

        // D merges into B, then C into A; neither pair overlaps the other.
        assert_eq!(out.len(), 2);
        let mut got = names(&out);
        got.sort();
        assert_eq!(got, vec!["A + C", "B + D"]);
    }

    #[test]
    fn test_merged_entry_reinserted_by_count() {
        let mut map = uuids(&[
            ("A", &["1", "2", "3", "4"]),
            ("B", &["5", "6", "7"]),
            ("C", &["5", "6", "8", "9"]),
            ("D", &["8", "9"]),
        ]);
        // ranking with a tie broken as given
        let list = vec![
            RankedItem::new("A", 4),
            RankedItem::new("C", 4),
            RankedItem::new("B", 3),
            RankedItem::new("D", 2),
        ];

        let out = collapse_near_duplicates(&list, &mut map, DEFAULT_THRESHOLD);

        // D merges into C (count 4); B then merges into "C + D" and moves above A.
        assert_eq!(out[0].name, "C + D + B");
        assert_eq!(out[0].count, 5);
        assert_eq!(out[1].name, "A");
    }

    #[test]
    fn test_second_pass_is_a_fixed_point() {
        let mut map = uuids(&[
            ("A", &["1", "2", "3", "4"]),
            ("B", &["1", "2", "3"]),
            ("C", &["7", "8"]),
        ]);
        let list = ranked(&map, &["A", "B", "C"]);

        let once = collapse_near_duplicates(&list, &mut map, DEFAULT_THRESHOLD);
        let twice = collapse_near_duplicates(&once, &mut map, DEFAULT_THRESHOLD);

        assert_eq!(names(&once), vec!["A + B", "C"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_small_lists() {
        let mut map = uuids(&[("A", &["1"])]);
        assert!(collapse_near_duplicates(&[], &mut map, DEFAULT_THRESHOLD).is_empty());

        let single = ranked(&map, &["A"]);
        assert_eq!(collapse_near_duplicates(&single, &mut map, DEFAULT_THRESHOLD), single);
    }

    #[test]
    fn test_shared_uuid_map_across_taxonomies() {
        let mut map = uuids(&[
            ("topics:A", &["1", "2"]),
            ("topics:B", &["1", "2"]),
            ("people:C", &["3"]),
        ]);
        let overall = ranked(&map, &["topics:A", "topics:B", "people:C"]);
        let mut grouped = BTreeMap::new();
        grouped.insert("topics".to_string(), ranked(&map, &["topics:A", "topics:B"]));
        grouped.insert("people".to_string(), ranked(&map, &["people:C"]));

        let lists = concertina_sorted_lists(&overall, &grouped, &mut map, DEFAULT_THRESHOLD);

        assert_eq!(names(&lists.sorted_by_count), vec!["topics:A + topics:B", "people:C"]);
        assert_eq!(
            names(&lists.sorted_by_count_grouped_by_taxonomy["topics"]),
            vec!["topics:A + topics:B"]
        );
        assert!(map.contains_key("topics:A + topics:B"));
    }

    const DEFAULT_THRESHOLD: f64 = crate::analysis::correlate::DEFAULT_OVERLAP_THRESHOLD;
}
