// src/pipeline.rs

//! Record evaluation stage.
//!
//! Reads JSON-lines records, evaluates each against the rule set currently in
//! the [`EvaluatorSlot`], and writes one JSON line per emitted result.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::engine::EvaluatorSlot;
use crate::errors::Result;
use crate::policy::{Record, RuleMatch};

/// One emitted evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluatedRecord {
    /// Generation of the rule set that produced `rules`.
    pub generation: u64,
    pub rules: Vec<RuleMatch>,
    pub record: Record,
}

/// Evaluate `record` against the rule set in force.
///
/// Returns `None` when no rule set has been adopted yet, or when the set's
/// mode does not emit this record.
pub fn evaluate_record(slot: &EvaluatorSlot, record: Record) -> Option<EvaluatedRecord> {
    let rules = slot.load()?;
    let matches = rules.evaluate(&record);
    rules.should_emit(&matches).then(|| EvaluatedRecord {
        generation: rules.generation(),
        rules: matches,
        record,
    })
}

/// Process records until `reader` reaches end of input.
///
/// Lines that are blank or not a JSON object of attributes are skipped with a
/// warning. Returns the number of results written.
pub async fn process_stream<R, W>(reader: R, mut writer: W, slot: Arc<EvaluatorSlot>) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;
    let mut emitted: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: Record = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping malformed record");
                continue;
            }
        };

        let Some(result) = evaluate_record(&slot, record) else {
            continue;
        };

        let mut out = serde_json::to_vec(&result).map_err(anyhow::Error::from)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
        emitted += 1;
    }

    debug!(lines = line_no, emitted, "record stream finished");
    Ok(emitted)
}
