//! CSV export for simulation step results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::StepResult;

/// Column header for CSV telemetry export.
const HEADER: &str = "tick,time_hr,power_kw,residual_kw,swap_queue,charge_queue,\
                       bay,grid_discharge,charging_piles,ready_batteries,swap_completed";

/// Exports simulation results to a CSV file at the given path.
///
/// Writes a header row followed by one data row per tick. Produces
/// deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(results: &[StepResult], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(results, buf)
}

/// Writes simulation results as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(results: &[StepResult], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in results {
        wtr.write_record(&[
            r.tick.to_string(),
            format!("{:.4}", r.time_hr),
            format!("{:.4}", r.power_kw),
            format!("{:.4}", r.residual_kw),
            r.swap_queue.to_string(),
            r.charge_queue.to_string(),
            r.bay.to_string(),
            r.grid_discharge.to_string(),
            r.charging_piles.to_string(),
            r.ready_batteries.to_string(),
            r.swap_completed.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
