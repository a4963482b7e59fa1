//! CSV export of a topic's history

use crate::error::Result;
use crate::store::Topic;
use crate::types::Payload;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `topic` to `path` as CSV. Returns the number of rows written.
///
/// Indexed topics are written as `index,value` in ascending index order,
/// linear topics as `sample,value` in arrival order.
pub fn dump_topic(topic: &Topic, path: &Path) -> Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let rows = write_csv(topic, &mut writer)?;
    writer.flush()?;
    Ok(rows)
}

pub fn write_csv(topic: &Topic, out: &mut impl Write) -> Result<usize> {
    if topic.is_indexed() {
        writeln!(out, "index,value")?;
        for (index, value) in topic.indexes() {
            writeln!(out, "{},{}", index, csv_field(value))?;
        }
        Ok(topic.indexes().len())
    } else {
        writeln!(out, "sample,value")?;
        for (sample, value) in topic.raw().iter().enumerate() {
            writeln!(out, "{},{}", sample, csv_field(value))?;
        }
        Ok(topic.raw().len())
    }
}

fn csv_field(value: &Payload) -> String {
    match value {
        Payload::Text(s) if s.contains([',', '"', '\n', '\r']) => {
            format!("\"{}\"", s.replace('"', "\"\""))
        }
        other => other.to_string(),
    }
}
