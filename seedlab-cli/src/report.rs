//! Plain-text rendering of snapshots and policy flags.

use seedlab_core::pms::{PmsSnapshot, PolicyFlags, TandaGroup, WeightStatistics};

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn grams(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.3} g"))
        .unwrap_or_else(|| "-".to_string())
}

pub fn print_statistics(stats: Option<&WeightStatistics>) {
    match stats {
        Some(s) => {
            println!("Valid repetitions: {}", s.count);
            println!("Mean: {:.3} g", s.mean);
            println!("Std deviation: {:.3} g", s.std_dev);
            match s.cv {
                Some(cv) => println!("CV: {cv:.3}%"),
                None => println!("CV: undefined (zero mean)"),
            }
        }
        None => println!("No valid repetitions."),
    }
}

fn print_group(group: &TandaGroup) {
    let status = if group.complete { "complete" } else { "open" };
    println!(
        "Tanda {} [{}] {} valid / {} recorded",
        group.tanda_number,
        status,
        group.counts.valid,
        group.counts.total()
    );
    for rep in &group.repetitions {
        println!("  #{:<3} {:>10.3} g  {}", rep.rep_number, rep.weight, rep.valid);
    }
}

pub fn print_snapshot(snapshot: &PmsSnapshot, flags: &PolicyFlags) {
    let analysis = &snapshot.analysis;
    println!("=== Analysis {} ===", analysis.id);
    println!("State: {}", analysis.state);
    println!(
        "Seed type: {} (CV threshold {:.3}%)",
        if analysis.is_coarse_seed { "coarse" } else { "fine" },
        flags.cv_threshold
    );
    println!(
        "Tandas: {} (expected {} repetitions each)",
        analysis.tanda_count, analysis.expected_repetitions_per_tanda
    );
    println!(
        "Repetitions: {} ({} valid, {} invalid, {} pending)",
        flags.counts.total(),
        flags.counts.valid,
        flags.counts.invalid,
        flags.counts.indeterminate
    );

    println!();
    for group in snapshot.grouped_by_tanda() {
        print_group(&group);
    }

    println!();
    print_statistics(flags.valid_statistics.as_ref());
    println!("Raw final weight: {}", grams(analysis.raw_final_weight));
    println!("Rounded final weight: {}", grams(analysis.rounded_final_weight));

    println!();
    println!(
        "Current tanda: {}, next repetition: #{}",
        flags.current_tanda, flags.next_repetition_number
    );
    println!(
        "Can add repetition: {} ({})",
        yes_no(flags.can_add_repetition),
        flags.add_decision
    );
    match flags.rounded_weight_blocker {
        Some(reason) => println!("Can edit rounded weight: no ({reason})"),
        None => println!("Can edit rounded weight: yes"),
    }
    match flags.finalize_blocker {
        Some(reason) => println!("Can finalize: no ({reason})"),
        None => println!("Can finalize: yes"),
    }
}
