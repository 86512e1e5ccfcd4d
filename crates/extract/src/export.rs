use anyhow::{Context, Result};
use std::collections::HashMap;

use crate::aggregator::Record;

/// Anything that can supply a cell value by column name.
pub trait RowSource {
    fn value(&self, field: &str) -> Option<&str>;
}

impl RowSource for Record {
    fn value(&self, field: &str) -> Option<&str> {
        self.get(field)
    }
}

impl RowSource for HashMap<String, String> {
    fn value(&self, field: &str) -> Option<&str> {
        self.get(field).map(String::as_str)
    }
}

/// Serialize rows as CSV with a header in `fields` order. Missing cells are
/// written empty; quoting follows RFC 4180.
pub fn write_csv<R: RowSource>(fields: &[String], rows: &[R]) -> Result<String> {
    write_rows(
        fields,
        rows.iter()
            .map(move |row| fields.iter().map(move |f| row.value(f).unwrap_or(""))),
    )
}

/// Like [`write_csv`] with a leading `document` column naming the file each
/// record came from.
pub fn write_records_csv(fields: &[String], records: &[Record]) -> Result<String> {
    let header = std::iter::once("document").chain(fields.iter().map(String::as_str));
    let rows = records.iter().map(move |record| {
        std::iter::once(record.document.as_str())
            .chain(fields.iter().map(move |f| record.get(f).unwrap_or("")))
    });
    write_rows(header, rows)
}

fn write_rows<H, R, C>(header: H, rows: R) -> Result<String>
where
    H: IntoIterator,
    H::Item: AsRef<[u8]>,
    R: IntoIterator<Item = C>,
    C: IntoIterator,
    C::Item: AsRef<[u8]>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(header)
        .context("Failed to write CSV header")?;

    for row in rows {
        writer
            .write_record(row)
            .context("Failed to write CSV row")?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))?;

    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}
