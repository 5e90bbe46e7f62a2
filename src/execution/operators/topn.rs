// Top-N Operator
//
// Keeps a bounded binary heap of the best N rows seen so far, ordered by
// the inverse comparator so the heap top is always the next row to
// discard. Emits in sorted order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::ExecResult;
use crate::execution::executor::Executor;
use crate::execution::expression::Expression;
use crate::execution::operators::sort::compare_keys;
use crate::execution::plan::OrderDirection;
use crate::storage::table::{DataValue, Tuple};

struct HeapEntry {
    keys: Vec<DataValue>,
    dirs: Arc<Vec<OrderDirection>>,
    tuple: Tuple,
    rid: Rid,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap in output order: the peeked element is the worst kept
        // row, exactly what a bounded top-N wants to drop first.
        compare_keys(&self.keys, &other.keys, &self.dirs)
    }
}

pub struct TopNExecutor {
    child: Box<dyn Executor>,
    order_by: Vec<(OrderDirection, Expression)>,
    n: usize,
    results: Option<std::vec::IntoIter<(Tuple, Rid)>>,
}

impl TopNExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        order_by: Vec<(OrderDirection, Expression)>,
        n: usize,
    ) -> Self {
        Self {
            child,
            order_by,
            n,
            results: None,
        }
    }

    fn materialize(&mut self) -> ExecResult<Vec<(Tuple, Rid)>> {
        let dirs = Arc::new(
            self.order_by
                .iter()
                .map(|(d, _)| *d)
                .collect::<Vec<_>>(),
        );
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(self.n + 1);
        while let Some((tuple, rid)) = self.child.next()? {
            let keys = self
                .order_by
                .iter()
                .map(|(_, e)| e.evaluate(&tuple))
                .collect::<ExecResult<Vec<_>>>()?;
            heap.push(HeapEntry {
                keys,
                dirs: dirs.clone(),
                tuple,
                rid,
            });
            if heap.len() > self.n {
                heap.pop();
            }
        }
        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|e| (e.tuple, e.rid))
            .collect())
    }
}

impl Executor for TopNExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.results = None;
        self.child.init()
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.results.is_none() {
            let rows = self.materialize()?;
            self.results = Some(rows.into_iter());
        }
        Ok(self.results.as_mut().and_then(|iter| iter.next()))
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
