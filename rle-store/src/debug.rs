use crate::store::{RunValue, Store};
use arrow::{
    array::{ArrayRef, Int64Builder, StringBuilder, UInt64Builder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
    util::pretty,
};
use rle_result::Result;
use std::fmt::Display;
use std::sync::Arc;

/// Diagnostic rendering of a store's runs.
pub trait StoreDebug {
    /// Renders one row per run (index, first position, end, value) into a
    /// formatted ASCII table string.
    fn render_runs_as_table(&self) -> Result<String>;
}

impl<V: RunValue + Display> StoreDebug for Store<V> {
    fn render_runs_as_table(&self) -> Result<String> {
        let mut index_builder = UInt64Builder::with_capacity(self.num_runs());
        let mut start_builder = Int64Builder::with_capacity(self.num_runs());
        let mut end_builder = Int64Builder::with_capacity(self.num_runs());
        let mut value_builder = StringBuilder::new();

        let schema = Arc::new(Schema::new(vec![
            Field::new("Run", DataType::UInt64, false),
            Field::new("Start", DataType::Int64, false),
            Field::new("End", DataType::Int64, false),
            Field::new("Value", DataType::Utf8, false),
        ]));

        let mut start = 0;
        for (i, (end, val)) in self.runs().enumerate() {
            index_builder.append_value(i as u64);
            start_builder.append_value(start);
            end_builder.append_value(end);
            value_builder.append_value(val.to_string());
            start = end;
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(index_builder.finish()),
            Arc::new(start_builder.finish()),
            Arc::new(end_builder.finish()),
            Arc::new(value_builder.finish()),
        ];
        let batch = RecordBatch::try_new(schema, columns)?;
        Ok(pretty::pretty_format_batches(&[batch])?.to_string())
    }
}
