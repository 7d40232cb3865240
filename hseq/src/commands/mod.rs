pub mod dot;
pub use dot::*;

pub mod emit;
pub use emit::*;

pub mod frame;
pub use frame::*;

pub mod viterbi;
pub use viterbi::*;

use serde::Serialize;

/// One row of a probability table, as printed by the commands.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TableRow {
    pub symbols: String,
    pub probability: f64,
}

impl TableRow {
    pub fn from_log(symbols: &str, log_prob: f64) -> Self {
        TableRow {
            symbols: symbols.to_string(),
            probability: log_prob.exp(),
        }
    }
}

pub fn print_table(rows: &[TableRow], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        rows.iter()
            .for_each(|row| println!("{}\t{}", row.symbols, row.probability));
    }
    Ok(())
}
