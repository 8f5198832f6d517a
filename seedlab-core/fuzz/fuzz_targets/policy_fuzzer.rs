#![no_main]
use libfuzzer_sys::fuzz_target;
use seedlab_core::pms::{self, PmsAnalysis, Repetition, Validity};
use seedlab_core::PolicyLimits;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 { return; }
    let expected = u32::from(data[0] % 8) + 1;
    let coarse = data[1] & 1 == 1;
    let limits = PolicyLimits::default();

    let reps: Vec<Repetition> = data[2..]
        .chunks(3)
        .filter(|c| c.len() == 3)
        .enumerate()
        .map(|(i, c)| {
            let valid = match c[2] % 3 {
                0 => Validity::Valid,
                1 => Validity::Invalid,
                _ => Validity::Indeterminate,
            };
            Repetition::new(u32::from(c[0] % 4) + 1, i as u32 + 1, f64::from(c[1]) / 4.0)
                .with_validity(valid)
        })
        .collect();

    let mut analysis = PmsAnalysis::new("fuzz", expected, coarse);
    analysis.tanda_count = 4;

    let can_add = pms::can_add_repetition(&reps, expected, coarse, &limits);
    if reps.len() >= limits.max_repetitions as usize {
        assert!(!can_add);
    }
    let _ = pms::can_finalize(&analysis, &reps, &limits);
    let _ = pms::can_edit_rounded_weight(&analysis, &reps, &limits);

    let tanda = pms::current_tanda(&reps, expected, analysis.tanda_count);
    assert!(tanda >= 1);
    assert!(pms::next_repetition_number(&reps, tanda) >= 1);
    assert_eq!(
        pms::group_by_tanda(&reps, analysis.tanda_count, expected),
        pms::group_by_tanda(&reps, analysis.tanda_count, expected)
    );

    let c = pms::reclassify(&analysis, &reps, &limits);
    assert!(c.tanda_count >= analysis.tanda_count);
});
