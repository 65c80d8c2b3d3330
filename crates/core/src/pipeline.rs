//! Result postprocessing: keyword filter, ranking, and per-URL provider
//! grouping.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::source::{LinkType, MergedLink, MergedLinks, SearchResponse, SearchResult};

/// Title keywords that raise a result's rank, highest-value first.
const PRIORITY_KEYWORDS: [&str; 7] = ["全", "合集", "系列", "完", "最新", "附", "花园墙外"];

/// Score a title against the priority keyword list.
///
/// The score is the distance of the first matching keyword from the end of
/// the list, so earlier keywords score higher; 0 means no match.
pub fn priority_score(title: &str) -> usize {
    let title = title.to_lowercase();
    PRIORITY_KEYWORDS
        .iter()
        .position(|kw| title.contains(kw))
        .map(|i| PRIORITY_KEYWORDS.len() - i)
        .unwrap_or(0)
}

/// Keep only results where every whitespace-separated keyword token matches.
///
/// The token "pwd" is special: it also matches link URLs carrying a
/// `pwd=` parameter, so "movie pwd" finds password-protected shares.
pub fn filter_results(results: Vec<SearchResult>, keyword: &str) -> Vec<SearchResult> {
    let tokens: Vec<String> = keyword
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();
    if tokens.is_empty() {
        return results;
    }

    results
        .into_iter()
        .filter(|result| {
            let title = result.title.to_lowercase();
            let content = result.content.to_lowercase();
            tokens.iter().all(|token| {
                if token == "pwd" {
                    title.contains("pwd")
                        || content.contains("pwd")
                        || result
                            .links
                            .iter()
                            .any(|l| l.url.to_lowercase().contains("pwd="))
                } else {
                    title.contains(token) || content.contains(token)
                }
            })
        })
        .collect()
}

/// Sort results: recency dominates beyond a one-day gap, priority keywords
/// dominate within it, and results with no datetime sink to the bottom
/// (ranked among themselves by keyword score, then title).
pub fn rank_results(results: &mut [SearchResult]) {
    results.sort_by(compare_results);
}

fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    match (a.datetime, b.datetime) {
        (None, None) => priority_score(&b.title)
            .cmp(&priority_score(&a.title))
            .then_with(|| a.title.cmp(&b.title)),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(ta), Some(tb)) => {
            let delta = if ta > tb { ta - tb } else { tb - ta };
            if delta > chrono::Duration::days(1) {
                tb.cmp(&ta)
            } else {
                priority_score(&b.title)
                    .cmp(&priority_score(&a.title))
                    .then_with(|| tb.cmp(&ta))
            }
        }
    }
}

/// The subset of ranked results promoted into the `results` view: anything
/// with a known datetime or a priority-keyword title.
fn filtered_for_results(ranked: &[SearchResult]) -> Vec<SearchResult> {
    ranked
        .iter()
        .filter(|r| r.datetime.is_some() || priority_score(&r.title) > 0)
        .cloned()
        .collect()
}

/// Collapse all links across ranked results into one record per URL,
/// grouped by provider and sorted newest-first within each group.
///
/// When a URL occurs in several results, the occurrence with the newest
/// datetime supplies the merged record's fields.
pub fn merge_by_type(ranked: &[SearchResult]) -> MergedLinks {
    let mut by_url: HashMap<String, (LinkType, MergedLink)> = HashMap::new();

    for result in ranked {
        for link in &result.links {
            let candidate = MergedLink {
                url: link.url.clone(),
                password: link.password.clone(),
                note: result.title.clone(),
                datetime: result.datetime,
            };
            match by_url.get_mut(&link.url) {
                Some((_, existing)) => {
                    if candidate.datetime > existing.datetime {
                        *existing = candidate;
                    }
                }
                None => {
                    by_url.insert(link.url.clone(), (link.link_type, candidate));
                }
            }
        }
    }

    let mut merged: MergedLinks = HashMap::new();
    for (_, (link_type, link)) in by_url {
        merged.entry(link_type).or_default().push(link);
    }

    for links in merged.values_mut() {
        links.sort_by(|a, b| match (a.datetime, b.datetime) {
            (Some(ta), Some(tb)) => tb.cmp(&ta),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }

    merged
}

/// Run the whole pipeline over raw source output and build the full
/// (`all`-view) response; the orchestrator projects it per request.
pub fn build_response(raw: Vec<SearchResult>, keyword: &str) -> SearchResponse {
    let mut ranked = filter_results(raw, keyword);
    rank_results(&mut ranked);

    let filtered = filtered_for_results(&ranked);
    let merged = merge_by_type(&ranked);

    SearchResponse {
        total: filtered.len(),
        results: Some(filtered),
        merged_by_type: Some(merged),
    }
}
