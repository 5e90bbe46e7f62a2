// Hash Join Operator
//
// Builds a hash table over the left child keyed by the left join
// expressions, then probes it with right tuples. Rows with a NULL in the
// key never match. For a LEFT join, unmatched left rows stream out
// null-padded after the probe phase drains.

use std::collections::HashMap;

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::execution::error::ExecResult;
use crate::execution::executor::Executor;
use crate::execution::expression::Expression;
use crate::execution::operators::nested_loop_join::{join_tuples, pad_right_nulls};
use crate::execution::plan::JoinType;
use crate::storage::table::{DataValue, Tuple};

pub struct HashJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    left_keys: Vec<Expression>,
    right_keys: Vec<Expression>,
    join_type: JoinType,
    output: Schema,
    right_width: usize,

    built: bool,
    hash_table: HashMap<Vec<DataValue>, Vec<usize>>,
    left_rows: Vec<Tuple>,
    left_matched: Vec<bool>,
    current_right: Option<Tuple>,
    current_matches: Vec<usize>,
    current_match_idx: usize,
    probe_done: bool,
    unmatched_idx: usize,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        left_keys: Vec<Expression>,
        right_keys: Vec<Expression>,
        join_type: JoinType,
        output: Schema,
    ) -> Self {
        let right_width = right.output_schema().column_count();
        Self {
            left,
            right,
            left_keys,
            right_keys,
            join_type,
            output,
            right_width,
            built: false,
            hash_table: HashMap::new(),
            left_rows: Vec::new(),
            left_matched: Vec::new(),
            current_right: None,
            current_matches: Vec::new(),
            current_match_idx: 0,
            probe_done: false,
            unmatched_idx: 0,
        }
    }

    fn evaluate_keys(exprs: &[Expression], tuple: &Tuple) -> ExecResult<Vec<DataValue>> {
        exprs.iter().map(|e| e.evaluate(tuple)).collect()
    }

    fn build(&mut self) -> ExecResult<()> {
        while let Some((tuple, _)) = self.left.next()? {
            let key = Self::evaluate_keys(&self.left_keys, &tuple)?;
            let idx = self.left_rows.len();
            self.left_rows.push(tuple);
            self.left_matched.push(false);
            if !key.iter().any(DataValue::is_null) {
                self.hash_table.entry(key).or_default().push(idx);
            }
        }
        Ok(())
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.built = false;
        self.hash_table.clear();
        self.left_rows.clear();
        self.left_matched.clear();
        self.current_right = None;
        self.current_matches.clear();
        self.current_match_idx = 0;
        self.probe_done = false;
        self.unmatched_idx = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if !self.built {
            self.build()?;
            self.built = true;
        }

        while !self.probe_done {
            if self.current_match_idx < self.current_matches.len() {
                let left_idx = self.current_matches[self.current_match_idx];
                self.current_match_idx += 1;
                let right_tuple = self
                    .current_right
                    .as_ref()
                    .expect("probe row set while matches remain");
                return Ok(Some((
                    join_tuples(&self.left_rows[left_idx], right_tuple),
                    Rid::default(),
                )));
            }

            match self.right.next()? {
                Some((tuple, _)) => {
                    let key = Self::evaluate_keys(&self.right_keys, &tuple)?;
                    self.current_matches = if key.iter().any(DataValue::is_null) {
                        Vec::new()
                    } else {
                        self.hash_table.get(&key).cloned().unwrap_or_default()
                    };
                    for &idx in &self.current_matches {
                        self.left_matched[idx] = true;
                    }
                    self.current_match_idx = 0;
                    self.current_right = Some(tuple);
                }
                None => self.probe_done = true,
            }
        }

        if self.join_type == JoinType::Left {
            while self.unmatched_idx < self.left_rows.len() {
                let idx = self.unmatched_idx;
                self.unmatched_idx += 1;
                if !self.left_matched[idx] {
                    return Ok(Some((
                        pad_right_nulls(&self.left_rows[idx], self.right_width),
                        Rid::default(),
                    )));
                }
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.output
    }
}
