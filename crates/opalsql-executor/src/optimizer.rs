//! Join planning
//!
//! A deliberately small cost model: each filter gets the index that
//! matches the longest equality prefix of its pushed conditions (or a
//! range on a leading column), filters are ordered cheapest-first, and
//! the chain cost accumulates the expected row blow-up left to right.

use opalsql_storage::Database;

use crate::errors::ExecutorError;
use crate::expression::ComparisonOp;
use crate::table_filter::TableFilter;

/// Choose per-filter indexes, order the top filters by cost, link them
/// into a chain, and return the chain root and plan cost.
pub(crate) fn plan_joins(
    filters: &mut [TableFilter],
    top_filters: &[usize],
    database: &Database,
) -> Result<(usize, f64), ExecutorError> {
    if top_filters.is_empty() {
        return Err(ExecutorError::Internal("query has no table".to_string()));
    }
    for &ordinal in top_filters {
        choose_index(&mut filters[ordinal], database)?;
    }
    let mut order: Vec<usize> = top_filters.to_vec();
    if order.len() > 1 {
        let mut costs = Vec::with_capacity(filters.len());
        for filter in filters.iter() {
            costs.push(filter_cost(filter, database)?);
        }
        // outer-join sides must stay behind their left-hand side, so only
        // inner filters are reordered
        order.sort_by(|&a, &b| {
            let outer = (filters[a].joined_outer, filters[b].joined_outer);
            match outer {
                (false, true) => std::cmp::Ordering::Less,
                (true, false) => std::cmp::Ordering::Greater,
                _ => costs[a].partial_cmp(&costs[b]).unwrap_or(std::cmp::Ordering::Equal),
            }
        });
    }
    let mut cost = 0.0;
    let mut multiplier = 1.0;
    for i in 0..order.len() {
        let step = filter_cost(&filters[order[i]], database)?;
        cost += multiplier * step;
        multiplier *= step;
        filters[order[i]].join = order.get(i + 1).copied();
    }
    log::debug!("join order: {:?}, cost {}", order, cost);
    Ok((order[0], cost))
}

/// Pick the index with the longest equality prefix over the filter's
/// pushed conditions; fall back to an ordered index with a range on its
/// leading column; otherwise keep the scan.
fn choose_index(filter: &mut TableFilter, database: &Database) -> Result<(), ExecutorError> {
    let table = filter.table(database)?;
    let mut best: Option<(usize, usize)> = None;
    let mut range_fallback: Option<usize> = None;
    for (position, index) in table.indexes().iter().enumerate() {
        let mut matched = 0;
        for ic in &index.columns {
            let has_equality = filter
                .index_conditions
                .iter()
                .any(|c| c.column == ic.column && c.op == ComparisonOp::Equal);
            if has_equality {
                matched += 1;
            } else {
                break;
            }
        }
        // a hash index only supports full-key equality lookups
        if index.index_type.is_hash() && matched < index.columns.len() {
            matched = 0;
        }
        if matched > 0 {
            if best.map_or(true, |(_, m)| matched > m) {
                best = Some((position, matched));
            }
        } else if range_fallback.is_none() && !index.index_type.is_hash() {
            let has_range = filter.index_conditions.iter().any(|c| {
                c.column == index.first_column()
                    && matches!(
                        c.op,
                        ComparisonOp::Greater
                            | ComparisonOp::GreaterEqual
                            | ComparisonOp::Less
                            | ComparisonOp::LessEqual
                    )
            });
            if has_range {
                range_fallback = Some(position);
            }
        }
    }
    match best.map(|(position, _)| position).or(range_fallback) {
        Some(position) => {
            log::debug!(
                "filter {} uses index {}",
                filter.alias,
                table.index(position).expect("position from enumerate").name
            );
            filter.set_index(Some(position));
        }
        None => filter.set_index(None),
    }
    Ok(())
}

fn filter_cost(filter: &TableFilter, database: &Database) -> Result<f64, ExecutorError> {
    let rows = filter.table(database)?.row_count() as f64 + 1.0;
    let cost = match filter.index {
        None => rows,
        Some(_) => {
            let has_equality =
                filter.index_conditions.iter().any(|c| c.op == ComparisonOp::Equal);
            if has_equality {
                (rows / 100.0).max(1.0)
            } else {
                (rows / 3.0).max(1.0)
            }
        }
    };
    Ok(cost)
}
