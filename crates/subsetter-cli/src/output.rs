//! Flat-results output: one JSON object per row, newline-delimited.

use std::io::Write;

use serde::Serialize;
use subsetter_core::Row;

#[derive(Serialize)]
struct ResultLine<'a> {
    table: &'a str,
    row: &'a Row,
}

pub fn write_flat_results<W: Write>(mut out: W, results: &[(String, Row)]) -> std::io::Result<()> {
    for (table, row) in results {
        let line = ResultLine { table, row };
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
    }
    Ok(())
}
