use serde::{Deserialize, Serialize};

use crate::catalog::column::{Column, DataType};

/// An ordered list of columns describing one tuple layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Convenience constructor for a single unnamed integer column, the
    /// output shape of every DML executor.
    pub fn count_schema() -> Self {
        Self::new(vec![Column::new("count", DataType::Integer)])
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Schema of the listed columns, in the listed order.
    pub fn project(&self, attrs: &[usize]) -> Schema {
        Schema::new(attrs.iter().map(|&i| self.columns[i].clone()).collect())
    }

    /// Concatenation for join outputs.
    pub fn join(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Schema::new(columns)
    }
}
