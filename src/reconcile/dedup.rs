use super::types::{PlainRow, SpecialRow};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// (order id, master emi, parameter code).
type PlainKey = (String, String, String);
/// (order id, master emi, parent emi, sub emi, batch id, parameter code, description).
type SpecialKey = (String, String, String, String, String, String, String);

fn plain_key(row: &PlainRow) -> PlainKey {
    (
        row.order_id.clone(),
        row.master_emi.clone(),
        row.parameter.clone(),
    )
}

fn special_key(row: &SpecialRow) -> SpecialKey {
    (
        row.order_id.clone(),
        row.master_emi.clone(),
        row.parent_emi.clone(),
        row.sub_emi.clone(),
        row.batch_id.clone(),
        row.parameter.clone(),
        row.description.clone(),
    )
}

/// Latest input date wins; equal dates fall back to the highest input index.
/// A missing date ranks below any date.
fn plain_outranks(candidate: &PlainRow, current: &PlainRow) -> bool {
    (candidate.input_date, candidate.input_index) > (current.input_date, current.input_index)
}

/// Highest input index wins. Dates are not consulted on this path.
// TODO: confirm with the process owners whether special readings should also
// prefer the latest input date like plain readings do.
fn special_outranks(candidate: &SpecialRow, current: &SpecialRow) -> bool {
    candidate.input_index > current.input_index
}

fn keep_best<R, K, F, O>(rows: Vec<R>, key_of: F, outranks: O) -> Vec<R>
where
    K: std::hash::Hash + Eq + Ord,
    F: Fn(&R) -> K,
    O: Fn(&R, &R) -> bool,
{
    let mut best: HashMap<K, R> = HashMap::with_capacity(rows.len());
    for row in rows {
        match best.entry(key_of(&row)) {
            Entry::Occupied(mut slot) => {
                if outranks(&row, slot.get()) {
                    slot.insert(row);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
        }
    }
    let mut kept: Vec<(K, R)> = best.into_iter().collect();
    kept.sort_by(|a, b| a.0.cmp(&b.0));
    kept.into_iter().map(|(_, row)| row).collect()
}

/// One row per (order, master emi, parameter). Rows that tie on both date
/// and index keep the first one seen.
pub fn dedup_plain(rows: Vec<PlainRow>) -> Vec<PlainRow> {
    let before = rows.len();
    let kept = keep_best(rows, plain_key, plain_outranks);
    tracing::debug!(before, after = kept.len(), "deduplicated plain rows");
    kept
}

/// One row per (order, master, parent, sub, batch, parameter, description).
/// Rows that tie on input index keep the first one seen.
pub fn dedup_special(rows: Vec<SpecialRow>) -> Vec<SpecialRow> {
    let before = rows.len();
    let kept = keep_best(rows, special_key, special_outranks);
    tracing::debug!(before, after = kept.len(), "deduplicated special rows");
    kept
}
