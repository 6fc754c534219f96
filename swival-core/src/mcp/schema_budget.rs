//! MCP schema budgeting.
//!
//! Tool schemas ride in every prompt, so their token cost is bounded before
//! the loop starts: past 30 % of the context window a warning is logged, and
//! past 50 % whole servers are dropped, costliest first, until the rest fit.

use tracing::warn;

use super::client::McpClientPool;
use crate::core::token_estimator::TokenEstimator;

#[derive(Debug, Default)]
pub struct SchemaBudgetOutcome {
    pub total_tokens: usize,
    pub warned: bool,
    pub removed_servers: Vec<String>,
}

/// Estimate the schema cost of each connected server and trim the pool so
/// the total stays within half the context window.
pub fn apply_schema_budget(
    pool: &mut McpClientPool,
    context_window: usize,
    estimator: &TokenEstimator,
) -> SchemaBudgetOutcome {
    let mut costs: Vec<(String, usize)> = pool
        .server_names()
        .into_iter()
        .filter_map(|name| {
            pool.server(&name).map(|handle| {
                let cost: usize = handle
                    .tools()
                    .iter()
                    .map(|tool| {
                        estimator.estimate_schema(&tool.schema)
                            + estimator.estimate_text(&tool.name)
                            + estimator.estimate_text(&tool.description)
                    })
                    .sum();
                (name, cost)
            })
        })
        .collect();

    let (warned, to_remove) = plan_trim(&costs, context_window);

    for name in &to_remove {
        pool.remove_server(name);
        costs.retain(|(n, _)| n != name);
        warn!(
            server = name.as_str(),
            "MCP server removed: schema cost exceeds the context budget"
        );
    }

    let total_tokens = costs.iter().map(|(_, cost)| cost).sum();
    SchemaBudgetOutcome {
        total_tokens,
        warned,
        removed_servers: to_remove,
    }
}

/// Pure trimming plan: returns whether the warn threshold was crossed and
/// which servers to drop, costliest first, until the remainder fits within
/// half the window.
fn plan_trim(costs: &[(String, usize)], context_window: usize) -> (bool, Vec<String>) {
    let mut total: usize = costs.iter().map(|(_, cost)| cost).sum();
    let warned = total * 10 > context_window * 3;
    if warned {
        warn!(
            schema_tokens = total,
            context_window, "MCP schemas consume more than 30% of the context window"
        );
    }

    let mut remaining: Vec<(String, usize)> = costs.to_vec();
    let mut removed = Vec::new();
    // Exactly 50% passes; one token past it trims.
    while total * 2 > context_window && !remaining.is_empty() {
        let (idx, _) = remaining
            .iter()
            .enumerate()
            .max_by_key(|(_, (_, cost))| *cost)
            .expect("non-empty");
        let (name, cost) = remaining.remove(idx);
        total -= cost;
        removed.push(name);
    }
    (warned, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_half_the_window_passes() {
        let costs = vec![("a".to_string(), 500)];
        let (_, removed) = plan_trim(&costs, 1000);
        assert!(removed.is_empty());
    }

    #[test]
    fn one_token_past_half_trims() {
        let costs = vec![("a".to_string(), 501)];
        let (_, removed) = plan_trim(&costs, 1000);
        assert_eq!(removed, vec!["a".to_string()]);
    }

    #[test]
    fn costliest_server_is_removed_first() {
        let costs = vec![
            ("small".to_string(), 200),
            ("big".to_string(), 600),
            ("medium".to_string(), 300),
        ];
        let (warned, removed) = plan_trim(&costs, 1000);
        assert!(warned);
        assert_eq!(removed, vec!["big".to_string(), "medium".to_string()]);
    }

    #[test]
    fn warning_threshold_is_thirty_percent() {
        let (warned, removed) = plan_trim(&[("a".to_string(), 301)], 1000);
        assert!(warned);
        assert!(removed.is_empty());

        let (warned, _) = plan_trim(&[("a".to_string(), 300)], 1000);
        assert!(!warned);
    }
}
