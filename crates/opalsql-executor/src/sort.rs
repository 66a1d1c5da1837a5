//! Materialized sort orders
//!
//! A [`SortOrder`] names positions in the expression row plus per-key
//! sort specifications. The default NULL position keeps NULLs at the low
//! end of the direction, matching index key order so that index-sorted
//! plans and materialized sorts agree.

use std::cmp::Ordering;

use opalsql_types::SqlValue;

use crate::expression::{un_enclose, Expression};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub descending: bool,
    pub nulls_last: bool,
}

impl SortSpec {
    pub fn ascending() -> Self {
        SortSpec { descending: false, nulls_last: false }
    }

    pub fn descending() -> Self {
        SortSpec { descending: true, nulls_last: true }
    }
}

#[derive(Debug, Clone)]
pub struct SortOrder {
    /// Positions into the (full-width) expression row.
    pub indexes: Vec<usize>,
    pub specs: Vec<SortSpec>,
}

impl SortOrder {
    pub fn new(indexes: Vec<usize>, specs: Vec<SortSpec>) -> Self {
        debug_assert_eq!(indexes.len(), specs.len());
        SortOrder { indexes, specs }
    }

    pub fn compare(&self, a: &[SqlValue], b: &[SqlValue]) -> Ordering {
        for (&idx, spec) in self.indexes.iter().zip(&self.specs) {
            let (va, vb) = (&a[idx], &b[idx]);
            let ord = match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => {
                    if spec.nulls_last {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
                (false, true) => {
                    if spec.nulls_last {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }
                (false, false) => {
                    let ord = va.cmp(vb);
                    if spec.descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort, so rows equal under the order keep arrival order.
    pub fn sort(&self, rows: &mut [Vec<SqlValue>]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }

    /// ORDER BY fragment for the plan printer. Visible columns print as
    /// 1-based positions, appended expressions print their SQL.
    pub fn sql(&self, expressions: &[Expression], visible_column_count: usize) -> String {
        let mut out = String::new();
        for (i, (&idx, spec)) in self.indexes.iter().zip(&self.specs).enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if idx < visible_column_count {
                out.push_str(&(idx + 1).to_string());
            } else {
                out.push_str(un_enclose(&expressions[idx].non_alias().sql_text()));
            }
            if spec.descending {
                out.push_str(" DESC");
            }
            if spec.nulls_last != spec.descending {
                // only print when it deviates from the direction default
                out.push_str(if spec.nulls_last { " NULLS LAST" } else { " NULLS FIRST" });
            }
        }
        out
    }
}
