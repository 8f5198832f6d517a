use super::types::{Repetition, ValidityCounts};
use serde::Serialize;

/// Repetitions of one tanda, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TandaGroup {
    pub tanda_number: u32,
    /// Sorted by `rep_number`
    pub repetitions: Vec<Repetition>,
    pub counts: ValidityCounts,
    /// Holds at least the expected number of valid repetitions
    pub complete: bool,
}

/// Partition `repetitions` into tandas `1..=tanda_count`.
///
/// Read model only: the acceptance policy works on the flat list and never
/// looks at groups. Repetitions with a tanda number outside the range are
/// left out.
pub fn group_by_tanda(
    repetitions: &[Repetition],
    tanda_count: u32,
    expected_per_tanda: u32,
) -> Vec<TandaGroup> {
    (1..=tanda_count)
        .map(|tanda_number| {
            let mut members: Vec<Repetition> = repetitions
                .iter()
                .filter(|r| r.tanda_number == tanda_number)
                .cloned()
                .collect();
            members.sort_by_key(|r| r.rep_number);

            let counts = ValidityCounts::tally(&members);
            TandaGroup {
                tanda_number,
                complete: counts.valid >= expected_per_tanda as usize,
                counts,
                repetitions: members,
            }
        })
        .collect()
}
