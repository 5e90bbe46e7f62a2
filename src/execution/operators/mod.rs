// Query Operators
//
// One file per physical operator, all implementing the Executor contract.

pub mod aggregation;
pub mod delete;
pub mod filter;
pub mod hash_join;
pub mod index_scan;
pub mod insert;
pub mod nested_loop_join;
pub mod projection;
pub mod seq_scan;
pub mod sort;
pub mod topn;
pub mod update;
pub mod values;
pub mod window;
