// SeqScan -> IndexScan Rewrite
//
// A sequential scan whose filter is a single `column = constant` equality
// becomes a point lookup when the table has a single-column index on that
// column. The original filter stays on the index scan as a residual.

use crate::catalog::Catalog;
use crate::execution::expression::{ComparisonOp, Expression};
use crate::execution::plan::PlanNode;
use crate::optimizer::map_children;
use crate::storage::table::DataValue;

pub struct SeqScanAsIndexScan<'a> {
    catalog: &'a Catalog,
}

impl<'a> SeqScanAsIndexScan<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn optimize(&self, plan: PlanNode) -> PlanNode {
        let plan = map_children(plan, &|child| self.optimize(child));
        match plan {
            PlanNode::SeqScan {
                table_oid,
                filter: Some(filter),
                output,
            } => {
                if let Some((col_idx, constant)) = match_column_eq_constant(&filter) {
                    if let Some(table) = self.catalog.table(table_oid) {
                        for index in self.catalog.indexes_for_table(&table.name) {
                            if index.key_attrs == [col_idx] {
                                return PlanNode::IndexScan {
                                    table_oid,
                                    index_oid: index.oid,
                                    pred_key: constant,
                                    filter: Some(filter),
                                    output,
                                };
                            }
                        }
                    }
                }
                PlanNode::SeqScan {
                    table_oid,
                    filter: Some(filter),
                    output,
                }
            }
            other => other,
        }
    }
}

/// Matches `col = const` (either orientation), returning the column
/// position and the constant.
fn match_column_eq_constant(filter: &Expression) -> Option<(usize, DataValue)> {
    let Expression::Comparison {
        op: ComparisonOp::Eq,
        left,
        right,
    } = filter
    else {
        return None;
    };
    match (left.as_ref(), right.as_ref()) {
        (
            Expression::ColumnRef {
                tuple_idx: 0,
                col_idx,
            },
            Expression::Constant(value),
        )
        | (
            Expression::Constant(value),
            Expression::ColumnRef {
                tuple_idx: 0,
                col_idx,
            },
        ) => Some((*col_idx, value.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType, Schema};
    use crate::common::config::{BufferPoolConfig, HashTableConfig};
    use crate::storage::buffer::BufferPoolManager;
    use tempfile::NamedTempFile;

    fn test_catalog() -> (Catalog, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let bpm = BufferPoolManager::new(BufferPoolConfig::default(), file.path()).unwrap();
        let mut catalog = Catalog::new(bpm);
        let schema = Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Text),
        ]);
        catalog.create_table("accounts", schema).unwrap();
        catalog
            .create_index("accounts_pk", "accounts", vec![0], true, HashTableConfig::default())
            .unwrap();
        (catalog, file)
    }

    fn eq_filter(col: usize, value: i64) -> Expression {
        Expression::comparison(
            ComparisonOp::Eq,
            Expression::column(col),
            Expression::constant(DataValue::Integer(value)),
        )
    }

    #[test]
    fn test_indexed_equality_becomes_point_lookup() {
        let (catalog, _file) = test_catalog();
        let table_oid = catalog.table_by_name("accounts").unwrap().oid;
        let plan = PlanNode::SeqScan {
            table_oid,
            filter: Some(eq_filter(0, 7)),
            output: Schema::default(),
        };
        let optimized = SeqScanAsIndexScan::new(&catalog).optimize(plan);
        match optimized {
            PlanNode::IndexScan {
                pred_key, filter, ..
            } => {
                assert_eq!(pred_key, DataValue::Integer(7));
                assert!(filter.is_some(), "residual filter must be retained");
            }
            other => panic!("expected index scan, got {:?}", other),
        }
    }

    #[test]
    fn test_unindexed_column_keeps_seq_scan() {
        let (catalog, _file) = test_catalog();
        let table_oid = catalog.table_by_name("accounts").unwrap().oid;
        let plan = PlanNode::SeqScan {
            table_oid,
            filter: Some(eq_filter(1, 7)),
            output: Schema::default(),
        };
        let optimized = SeqScanAsIndexScan::new(&catalog).optimize(plan);
        assert!(matches!(optimized, PlanNode::SeqScan { .. }));
    }

    #[test]
    fn test_non_equality_keeps_seq_scan() {
        let (catalog, _file) = test_catalog();
        let table_oid = catalog.table_by_name("accounts").unwrap().oid;
        let filter = Expression::comparison(
            ComparisonOp::Gt,
            Expression::column(0),
            Expression::constant(DataValue::Integer(7)),
        );
        let plan = PlanNode::SeqScan {
            table_oid,
            filter: Some(filter),
            output: Schema::default(),
        };
        let optimized = SeqScanAsIndexScan::new(&catalog).optimize(plan);
        assert!(matches!(optimized, PlanNode::SeqScan { .. }));
    }
}
