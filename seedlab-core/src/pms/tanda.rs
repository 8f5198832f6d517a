use super::types::Repetition;

fn valid_in_tanda(repetitions: &[Repetition], tanda: u32) -> usize {
    repetitions
        .iter()
        .filter(|r| r.tanda_number == tanda && r.valid.is_valid())
        .count()
}

/// First tanda in `1..=tanda_count` holding fewer than `expected_per_tanda`
/// valid repetitions.
///
/// When every tanda is full the last one is returned: opening a new tanda is
/// the store's decision, made during its recomputation.
pub fn current_tanda(repetitions: &[Repetition], expected_per_tanda: u32, tanda_count: u32) -> u32 {
    let expected = expected_per_tanda as usize;
    (1..=tanda_count)
        .find(|&tanda| valid_in_tanda(repetitions, tanda) < expected)
        .unwrap_or_else(|| tanda_count.max(1))
}

/// Display-only number for the next repetition in `current_tanda`; the store
/// assigns the authoritative one.
///
/// Counts every repetition in the tanda regardless of validity. Numbers are
/// never compacted after a delete, so this may repeat a number that is still
/// in use when an earlier repetition was removed.
pub fn next_repetition_number(repetitions: &[Repetition], current_tanda: u32) -> u32 {
    let in_tanda = repetitions
        .iter()
        .filter(|r| r.tanda_number == current_tanda)
        .count();
    in_tanda as u32 + 1
}
