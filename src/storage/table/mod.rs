pub mod table_heap;
pub mod tuple;

pub use table_heap::{HeapError, TableHeap, TableIterator};
pub use tuple::{DataValue, Tuple, TupleMeta};
