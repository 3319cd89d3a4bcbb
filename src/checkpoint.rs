//! Where to pick up numbering when a partition is run again.

use std::fs::File;
use std::path::Path;

use regex::Regex;
use tracing::{info, warn};

use crate::record::AGENT_INDEX_COLUMN;
use crate::OUTPUT_DELIMITER;

/// The highest agent index already written to `output`, or 0.
///
/// Never fails: anything that keeps the index from being read (no file, no
/// `Agent_index` column, an unparsable value) degrades to 0 and is logged.
pub fn resume_index(output: impl AsRef<Path>) -> u64 {
    let output = output.as_ref();
    if !output.exists() {
        info!("No prior output at {}, starting from agent_0", output.display());
        return 0;
    }

    match max_agent_index(output) {
        Ok(Some(index)) => {
            info!("Resuming after agent_{index} from {}", output.display());
            index
        }
        Ok(None) => {
            warn!(
                "{} has no {AGENT_INDEX_COLUMN} values, starting from agent_0",
                output.display()
            );
            0
        }
        Err(reason) => {
            warn!(
                "Couldn't read a checkpoint from {} ({reason}), starting from agent_0. Indices may repeat.",
                output.display()
            );
            0
        }
    }
}

fn max_agent_index(output: &Path) -> Result<Option<u64>, String> {
    let file = File::open(output).map_err(|e| e.to_string())?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(OUTPUT_DELIMITER)
        .flexible(true)
        .from_reader(file);

    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    let column = headers
        .iter()
        .position(|h| h == AGENT_INDEX_COLUMN)
        .ok_or_else(|| format!("no {AGENT_INDEX_COLUMN} column"))?;

    let digits = Regex::new(r"(\d+)").map_err(|e| e.to_string())?;
    let mut max = None;
    for (row, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| format!("row {}: {e}", row + 1))?;
        let value = record.get(column).unwrap_or_default();
        let index = digits
            .captures(value)
            .and_then(|cap| cap[1].parse::<u64>().ok())
            .ok_or_else(|| format!("row {}: unparsable {AGENT_INDEX_COLUMN} {value:?}", row + 1))?;
        max = max.max(Some(index));
    }
    Ok(max)
}
