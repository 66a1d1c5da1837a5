//! Plan printer
//!
//! Reconstructs an equivalent SELECT from the prepared statement,
//! annotated with the chosen access-path optimizations as inline
//! comments.

use opalsql_storage::Database;

use crate::expression::un_enclose;
use crate::select::Select;
use crate::table_filter::TableFilter;

impl Select {
    pub fn get_plan_sql(&self, database: &Database) -> String {
        let mut buff = String::from("SELECT");
        if self.is_any_distinct() {
            buff.push_str(" DISTINCT");
            if let Some(expressions) = &self.distinct_expressions {
                buff.push_str(" ON(");
                for (i, expression) in expressions.iter().enumerate() {
                    if i > 0 {
                        buff.push_str(", ");
                    }
                    buff.push_str(&expression.sql_text());
                }
                buff.push(')');
            }
        }
        for i in 0..self.visible_column_count {
            if i > 0 {
                buff.push(',');
            }
            buff.push_str("\n    ");
            buff.push_str(&self.expressions[i].sql_text());
        }
        buff.push_str("\nFROM ");
        match self.top_table_filter {
            Some(top) => {
                let mut next = Some(top);
                let mut is_join = false;
                while let Some(ordinal) = next {
                    if is_join {
                        buff.push('\n');
                    }
                    let filter = &self.filters[ordinal];
                    buff.push_str(&filter_plan_sql(filter, database, is_join));
                    next = filter.join;
                    is_join = true;
                }
            }
            None => {
                for (i, &ordinal) in self.top_filters.iter().enumerate() {
                    if i > 0 {
                        buff.push('\n');
                    }
                    buff.push_str(&filter_plan_sql(&self.filters[ordinal], database, i > 0));
                }
            }
        }
        if let Some(condition) = &self.condition {
            buff.push_str("\nWHERE ");
            buff.push_str(un_enclose(&condition.sql_text()));
        }
        if let Some(group_index) = &self.group_index {
            buff.push_str("\nGROUP BY ");
            for (i, &index) in group_index.iter().enumerate() {
                if i > 0 {
                    buff.push_str(", ");
                }
                buff.push_str(un_enclose(&self.expressions[index].non_alias().sql_text()));
            }
        } else if let Some(group) = &self.group {
            buff.push_str("\nGROUP BY ");
            for (i, expression) in group.iter().enumerate() {
                if i > 0 {
                    buff.push_str(", ");
                }
                buff.push_str(un_enclose(&expression.sql_text()));
            }
        }
        // having may be set by add_global_condition after binding moved
        // the original into the expression list; in that case the query
        // is not run directly, only printed
        if let Some(having) = &self.having {
            buff.push_str("\nHAVING ");
            buff.push_str(un_enclose(&having.sql_text()));
        } else if let Some(having_index) = self.having_index {
            buff.push_str("\nHAVING ");
            buff.push_str(un_enclose(&self.expressions[having_index].sql_text()));
        }
        if let Some(sort) = &self.sort {
            buff.push_str("\nORDER BY ");
            buff.push_str(&sort.sql(&self.expressions, self.visible_column_count));
        } else if let Some(order_list) = &self.order_list {
            buff.push_str("\nORDER BY ");
            for (i, item) in order_list.iter().enumerate() {
                if i > 0 {
                    buff.push_str(", ");
                }
                buff.push_str(un_enclose(&item.expression.sql_text()));
                if item.descending {
                    buff.push_str(" DESC");
                }
            }
        }
        if let Some(offset) = &self.offset_expr {
            buff.push_str("\nOFFSET ");
            buff.push_str(un_enclose(&offset.sql_text()));
            buff.push_str(" ROWS");
        }
        if let Some(limit) = &self.limit_expr {
            buff.push_str("\nFETCH FIRST ");
            buff.push_str(un_enclose(&limit.sql_text()));
            if self.fetch_percent {
                buff.push_str(" PERCENT");
            }
            buff.push_str(" ROWS");
            buff.push_str(if self.with_ties { " WITH TIES" } else { " ONLY" });
        }
        if let Some(sample_size) = &self.sample_size_expr {
            buff.push_str("\nSAMPLE_SIZE ");
            buff.push_str(un_enclose(&sample_size.sql_text()));
        }
        if self.is_for_update {
            buff.push_str("\nFOR UPDATE");
        }
        if self.is_quick_aggregate_query {
            buff.push_str("\n/* direct lookup */");
        }
        if self.is_distinct_query {
            buff.push_str("\n/* distinct */");
        }
        if self.sort_using_index {
            buff.push_str("\n/* index sorted */");
        }
        if self.is_group_query && self.is_group_sorted_query {
            buff.push_str("\n/* group sorted */");
        }
        buff
    }
}

fn filter_plan_sql(filter: &TableFilter, database: &Database, is_join: bool) -> String {
    let mut out = String::new();
    if is_join {
        out.push_str(if filter.joined_outer { "LEFT OUTER JOIN " } else { "INNER JOIN " });
    }
    out.push_str(&filter.table_name);
    if !database.equals_identifiers(&filter.alias, &filter.table_name) {
        out.push(' ');
        out.push_str(&filter.alias);
    }
    let access = match filter.index.and_then(|p| {
        database.get_table(&filter.table_name).and_then(|t| t.index(p).map(|i| i.name.clone()))
    }) {
        Some(name) => name,
        None => "scan".to_string(),
    };
    out.push_str(" /* ");
    out.push_str(&access);
    out.push_str(" */");
    if is_join {
        if let Some(condition) = &filter.join_condition {
            out.push_str(" ON ");
            out.push_str(un_enclose(&condition.sql_text()));
        }
    }
    out
}
