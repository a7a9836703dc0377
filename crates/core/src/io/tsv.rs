//! Tab-separated writers for region time series and connectivity matrices

use std::io::Write;

use ndarray::ArrayView2;

use crate::error::{Error, Result};

/// Cell text for NaN values (BIDS convention)
pub const MISSING_VALUE: &str = "n/a";

/// Write region time series as one column per region, one line per timepoint.
///
/// `data` is regions × timepoints with rows in the order of `region_ids`.
pub fn write_region_timeseries<W: Write>(
    writer: &mut W,
    region_ids: &[u32],
    data: ArrayView2<'_, f64>,
) -> Result<()> {
    if data.nrows() != region_ids.len() {
        return Err(Error::ShapeMismatch {
            what: "region time series table".into(),
            expected: format!("{} regions", region_ids.len()),
            actual: format!("{} rows", data.nrows()),
        });
    }

    write_header(writer, None, region_ids)?;
    for t in 0..data.ncols() {
        let line: Vec<String> = data.column(t).iter().map(|&v| format_value(v)).collect();
        writeln!(writer, "{}", line.join("\t"))?;
    }
    Ok(())
}

/// Write a square connectivity matrix with region ids as header and first column.
pub fn write_connectivity<W: Write>(
    writer: &mut W,
    region_ids: &[u32],
    matrix: ArrayView2<'_, f64>,
) -> Result<()> {
    let n = region_ids.len();
    if matrix.dim() != (n, n) {
        let (r, c) = matrix.dim();
        return Err(Error::ShapeMismatch {
            what: "connectivity table".into(),
            expected: format!("{}x{}", n, n),
            actual: format!("{}x{}", r, c),
        });
    }

    write_header(writer, Some("Node"), region_ids)?;
    for (row, id) in region_ids.iter().enumerate() {
        write!(writer, "{}", id)?;
        for &v in matrix.row(row) {
            write!(writer, "\t{}", format_value(v))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn write_header<W: Write>(writer: &mut W, corner: Option<&str>, region_ids: &[u32]) -> Result<()> {
    let mut cells: Vec<String> = Vec::with_capacity(region_ids.len() + 1);
    if let Some(c) = corner {
        cells.push(c.to_string());
    }
    cells.extend(region_ids.iter().map(|id| id.to_string()));
    writeln!(writer, "{}", cells.join("\t"))?;
    Ok(())
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        MISSING_VALUE.to_string()
    } else {
        v.to_string()
    }
}
