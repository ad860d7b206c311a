//! Named parser configurations selectable from an experiment file.

use crate::derived;
use crate::error::{ParseError, Result};
use crate::extract::Extractor;
use crate::pattern::{Coercion, Pattern};

pub const PRESET_NAMES: [&str; 5] = ["planner", "translator", "dominance", "fts", "symbolic"];

const TIME_FLOOR: f64 = 0.01;

fn floor() -> Coercion {
    Coercion::FloatFloor(TIME_FLOOR)
}

pub fn preset(name: &str) -> Result<Extractor> {
    match name {
        "planner" => planner(),
        "translator" => translator(),
        "dominance" => dominance(),
        "fts" => fts(),
        "symbolic" => symbolic(),
        other => Err(ParseError::UnknownPreset(other.to_string())),
    }
}

/// Combines presets in the given order into one extractor.
pub fn combined<S: AsRef<str>>(names: &[S]) -> Result<Extractor> {
    let mut out = Extractor::new();
    for name in names {
        out.extend(preset(name.as_ref())?);
    }
    Ok(out)
}

/// Search statistics every planner run prints, plus exit-code classification.
pub fn planner() -> Result<Extractor> {
    use Coercion::Int;
    Ok(Extractor::new()
        .with_pattern(Pattern::scalar(
            r"Plan length: (?P<plan_length>\d+) step\(s\)\.",
            &[("plan_length", Int)],
        )?)
        .with_pattern(Pattern::scalar(r"Plan cost: (?P<cost>\d+)", &[("cost", Int)])?)
        .with_pattern(Pattern::scalar(
            r"Expanded (?P<expansions>\d+) state\(s\)\.",
            &[("expansions", Int)],
        )?)
        .with_pattern(Pattern::scalar(
            r"Evaluated (?P<evaluations>\d+) state\(s\)\.",
            &[("evaluations", Int)],
        )?)
        .with_pattern(Pattern::scalar(
            r"Generated (?P<generated>\d+) state\(s\)\.",
            &[("generated", Int)],
        )?)
        .with_pattern(Pattern::scalar(
            r"Expanded until last jump: (?P<expansions_until_last_jump>\d+) state\(s\)\.",
            &[("expansions_until_last_jump", Int)],
        )?)
        .with_pattern(Pattern::scalar(
            r"Initial heuristic value for .*: (?P<initial_h_value>\d+)",
            &[("initial_h_value", Int)],
        )?)
        .with_pattern(Pattern::scalar(
            r"Actual search time: (?P<actual_search_time>[\d.]+)s",
            &[("actual_search_time", floor())],
        )?)
        .with_pattern(Pattern::scalar(
            r"Search time: (?P<search_time>[\d.]+)s",
            &[("search_time", floor())],
        )?)
        .with_pattern(Pattern::scalar(
            r"Total time: (?P<total_time>[\d.]+)s",
            &[("total_time", floor())],
        )?)
        .with_pattern(Pattern::scalar(
            r"Peak memory: (?P<memory>\d+) KB",
            &[("memory", Int)],
        )?)
        .with_derived("classify_exit_code", derived::classify_exit_code)
        .with_derived("fix_error", derived::fix_error)
        .with_derived("coverage", derived::coverage)
        .with_derived("solved_without_search", derived::solved_without_search))
}

/// Label-dominance simulation statistics, the numeric dominance block and
/// per-f-layer search progress.
pub fn dominance() -> Result<Extractor> {
    use Coercion::Int;
    Ok(Extractor::new()
        .with_pattern(Pattern::scalar(
            r"Compute LDSim on (?P<lts_num>\d+) LTSs\. Total size: (?P<lts_total_size>\d+) Total trsize: (?P<lts_total_trsize>\d+) Max size: (?P<lts_max_size>\d+) Max trsize: (?P<lts_max_trsize>\d+)",
            &[
                ("lts_num", Int),
                ("lts_total_size", Int),
                ("lts_total_trsize", Int),
                ("lts_max_size", Int),
                ("lts_max_trsize", Int),
            ],
        )?)
        .with_pattern(Pattern::scalar(
            r".*Init LDSim in (?P<time_init_ldsim>[\d.]+)s:.*",
            &[("time_init_ldsim", floor())],
        )?)
        .with_pattern(Pattern::scalar(
            r"LDSim computed (?P<time_ldsim>[\d.]+)s?",
            &[("time_ldsim", floor())],
        )?)
        .with_pattern(Pattern::scalar(
            r"Dead operators due to dead labels: (?P<dead_ops_by_labels>\d+) / (?P<orig_ops>\d+) \((?P<perc_dead_ops_by_labels>\d*[.\d]*)%\)",
            &[
                ("dead_ops_by_labels", Int),
                ("orig_ops", Int),
                ("perc_dead_ops_by_labels", Coercion::Float),
            ],
        )?)
        .with_pattern(Pattern::scalar(
            r"Dead operators detected by storing original operators: (?P<dead_ops_by_stored>\d+) / (?P<orig_ops>\d+) \((?P<perc_dead_ops_by_stored>\d*[.\d]*)%\)",
            &[
                ("dead_ops_by_stored", Int),
                ("orig_ops", Int),
                ("perc_dead_ops_by_stored", Coercion::Float),
            ],
        )?)
        .with_pattern(Pattern::scalar(
            r"Simulation pruning (?P<pruning_desactivated>.*): (?P<pruned_desactivated>\d+) pruned (?P<checked_desactivated>\d+) checked (?P<inserted_desactivated>\d+) inserted (?P<deadends_desactivated>\d+) deadends",
            &[
                ("pruning_desactivated", Coercion::Sentinel("desactivated".to_string())),
                ("pruned_desactivated", Int),
                ("checked_desactivated", Int),
                ("inserted_desactivated", Int),
                ("deadends_desactivated", Int),
            ],
        )?)
        .with_pattern(Pattern::scalar(
            r"Numeric LDSim computed (?P<time_ldsim>[\d.eE+-]+)s?",
            &[("time_ldsim", floor())],
        )?)
        .with_pattern(Pattern::scalar(
            r"Numeric LDSim outer iterations: (?P<outer_iterations_numeric_ldsimulation>\d+)",
            &[("outer_iterations_numeric_ldsimulation", Int)],
        )?)
        .with_pattern(Pattern::scalar(
            r"Numeric LDSim inner iterations: (?P<inner_iterations_numeric_ldsimulation>\d+)",
            &[("inner_iterations_numeric_ldsimulation", Int)],
        )?)
        .with_pattern(Pattern::scalar(
            r"First node pruned after checking (?P<dom_checked_before_first_pruned>\d+) and inserting (?P<dom_inserted_before_first_pruned>\d+)",
            &[
                ("dom_checked_before_first_pruned", Int),
                ("dom_inserted_before_first_pruned", Int),
            ],
        )?)
        .with_pattern(Pattern::scalar(
            r"Done initializing simulation heuristic \[(?P<total_simulation_time>[\d.]+)s\]",
            &[("total_simulation_time", floor())],
        )?)
        .with_pattern(Pattern::scalar(
            r"Done initializing merge-and-shrink heuristic \[(?P<total_abstraction_time>[\d.]+)s\]",
            &[("total_abstraction_time", floor())],
        )?)
        .with_pattern(Pattern::scalar_all(
            r"Final abstractions: (?P<final_abstractions>\d+)",
            Int,
        )?)
        .with_pattern(Pattern::scalar_all(r"Useless vars: (?P<useless_vars>\d+)", Int)?)
        .with_pattern(Pattern::scalar_all(
            r"Total Simulations: (?P<total_simulations>\d+)",
            Int,
        )?)
        .with_pattern(Pattern::scalar_all(
            r"Only Simulations: (?P<only_simulations>\d+)",
            Int,
        )?)
        .with_pattern(Pattern::scalar_all(
            r"Similarity equivalences: (?P<similarity_equivalences>\d+)",
            Int,
        )?)
        .with_pattern(Pattern::scalar(
            r"Completed preprocessing: (?P<time_completed_preprocessing>[\d.]+)s?",
            &[("time_completed_preprocessing", floor())],
        )?)
        .with_pattern(Pattern::scalar_all(
            r"Simulations Found in (?P<num_variables_with_positive_dominance>\d+) out of (?P<total_num_variables>\d+) variables",
            Int,
        )?)
        .with_pattern(Pattern::scalar_all(
            r"Computed tau labels .*: (?P<tau_labels_all>\d+) : (?P<tau_labels_some>\d+) / (?P<total_labels>\d+)",
            Int,
        )?)
        .with_pattern(Pattern::accumulate(
            r"f = (?P<f_value>\d+) \[(?P<evaluated>\d+) evaluated, (?P<expanded>\d+) expanded, (?:(?P<pruned>\d+) pruned, )?t=(?P<time>[\d.]+)s, (?P<peak_memory>\d+) KB\]",
            "f_layers",
            &[
                ("f_value", Int),
                ("evaluated", Int),
                ("expanded", Int),
                ("pruned", Int),
                ("time", Coercion::Float),
                ("peak_memory", Int),
            ],
        )?)
        .with_derived("did_prune", derived::did_prune)
        .with_derived("numeric_dominance", derived::numeric_dominance))
}

/// Factored-transition-system transformation timings.
pub fn fts() -> Result<Extractor> {
    Ok(Extractor::new()
        .with_pattern(Pattern::search(
            r"Merge-and-shrink algorithm runtime: (?P<ms_algorithm_time>.+)s",
            &[("ms_algorithm_time", Coercion::Float)],
        )?)
        .with_pattern(Pattern::search(
            r"Merge-and-shrink atomic construction runtime: (?P<ms_atomic_algorithm_time>.+)s",
            &[("ms_atomic_algorithm_time", Coercion::Float)],
        )?)
        .with_pattern(Pattern::search(
            r"Final peak memory increase of merge-and-shrink algorithm: (?P<ms_memory_delta>\d+) KB",
            &[("ms_memory_delta", Coercion::Int)],
        )?)
        .with_pattern(Pattern::search(
            r"Transform time: (?P<fts_transformation_time>.+)s",
            &[("fts_transformation_time", Coercion::Float)],
        )?)
        .with_pattern(Pattern::search(
            r"Done building search task wrapper for FTS task: (?P<fts_search_task_construction_time>.+)s",
            &[("fts_search_task_construction_time", Coercion::Float)],
        )?)
        .with_pattern(Pattern::search(
            r"Plan reconstruction time: (?P<fts_plan_reconstruction_time>.+)s",
            &[("fts_plan_reconstruction_time", Coercion::Float)],
        )?)
        .with_derived("atomic_task_constructed", derived::atomic_task_constructed))
}

const TRANSLATOR_STATS: [&str; 9] = [
    "variables",
    "derived variables",
    "facts",
    "goal facts",
    "mutex groups",
    "total mutex groups size",
    "operators",
    "axioms",
    "task size",
];

/// Task statistics and step timings printed by the translator.
pub fn translator() -> Result<Extractor> {
    let mut out = Extractor::new();
    for stat in TRANSLATOR_STATS {
        let field = format!("translator_{}", stat.replace(' ', "_"));
        out = out.with_pattern(Pattern::search(
            &format!(r"Translator {}: (?P<{}>\d+)", stat, field),
            &[(field.as_str(), Coercion::Int)],
        )?);
    }
    Ok(out
        .with_pattern(Pattern::search(
            r"Translator peak memory: (?P<translator_peak_memory>\d+) KB",
            &[("translator_peak_memory", Coercion::Int)],
        )?)
        .with_derived("translator_timestamps", derived::translator_timestamps))
}

/// Symbolic search variable counts.
pub fn symbolic() -> Result<Extractor> {
    Ok(Extractor::new().with_pattern(Pattern::scalar_all(
        r"Num variables: (?P<num_fdr_vars>\d+) => (?P<num_binary_vars>\d+)",
        Coercion::Int,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use planlab_core::{AttrValue, Record};

    #[test]
    fn every_preset_compiles() {
        for name in PRESET_NAMES {
            preset(name).unwrap_or_else(|e| panic!("preset {} failed: {}", name, e));
        }
        assert!(matches!(preset("nope"), Err(ParseError::UnknownPreset(_))));
    }

    #[test]
    fn planner_preset_parses_a_solved_run() {
        let log = "\
Initial heuristic value for blind: 1
Solution found!
Actual search time: 0.002s [t=0.01s]
Plan length: 11 step(s).
Plan cost: 11
Expanded 120 state(s).
Evaluated 200 state(s).
Generated 400 state(s).
Expanded until last jump: 80 state(s).
Search time: 0.004s
Total time: 0.3s
Peak memory: 3000 KB
";
        let mut seed = Record::new();
        seed.insert("planner_exit_code".to_string(), AttrValue::Int(0));
        let record = planner().expect("preset").extract(log, seed).expect("parse");
        assert_eq!(record.get("cost"), Some(&AttrValue::Int(11)));
        assert_eq!(record.get("expansions"), Some(&AttrValue::Int(120)));
        assert_eq!(record.get("search_time"), Some(&AttrValue::Float(0.01)));
        assert_eq!(record.get("total_time"), Some(&AttrValue::Float(0.3)));
        assert_eq!(record.get("coverage"), Some(&AttrValue::Int(1)));
        assert_eq!(record.get("error").and_then(|v| v.as_str()), Some("success"));
    }

    #[test]
    fn planner_preset_refines_critical_errors_to_oom() {
        let log = "Peak memory: Failed to allocate memory. Released memory buffer.\n";
        let mut seed = Record::new();
        seed.insert("planner_exit_code".to_string(), AttrValue::Int(1));
        let record = planner().expect("preset").extract(log, seed).expect("parse");
        assert_eq!(record.get("error").and_then(|v| v.as_str()), Some("out-of-memory"));
        assert_eq!(record.get("coverage"), Some(&AttrValue::Int(0)));
        assert!(!record.contains_key("memory"));
    }

    #[test]
    fn dominance_preset_collects_f_layers_with_optional_pruning() {
        let log = "\
f = 3 [10 evaluated, 4 expanded, t=0.01s, 2000 KB]
f = 4 [30 evaluated, 12 expanded, 5 pruned, t=0.02s, 2100 KB]
Simulation pruning desactivated: 1 pruned 2 checked 3 inserted 0 deadends
";
        let record = dominance().expect("preset").extract(log, Record::new()).expect("parse");
        let layers = record.get("f_layers").and_then(|v| v.as_list()).expect("layers");
        assert_eq!(layers.len(), 2);
        assert!(!layers[0].contains_key("pruned"));
        assert_eq!(layers[1].get("pruned"), Some(&AttrValue::Int(5)));
        assert_eq!(record.get("pruning_desactivated"), Some(&AttrValue::Int(1)));
        assert_eq!(record.get("did_prune"), Some(&AttrValue::Int(0)));
    }

    #[test]
    fn fts_preset_matches_prefixed_lines() {
        let log = "[t=0.5s, 100 KB] Transform time: 0.25s\nMain task constructed\n";
        let record = fts().expect("preset").extract(log, Record::new()).expect("parse");
        assert_eq!(record.get("fts_transformation_time"), Some(&AttrValue::Float(0.25)));
        assert_eq!(record.get("atomic_task_constructed"), Some(&AttrValue::Int(1)));
    }

    #[test]
    fn combined_runs_presets_in_order() {
        let extractor = combined(&["symbolic", "fts"]).expect("combined");
        let record = extractor
            .extract("Num variables: 3 => 9\n", Record::new())
            .expect("parse");
        assert_eq!(record.get("num_binary_vars"), Some(&AttrValue::Int(9)));
        assert_eq!(record.get("atomic_task_constructed"), Some(&AttrValue::Int(0)));
    }

    #[test]
    fn translator_preset_reads_task_statistics() {
        let log = "\
Translator variables: 12
Translator derived variables: 0
Translator facts: 30
Translator goal facts: 4
Translator operators: 88
Translator task size: 902
Translator peak memory: 29340 KB
Writing output... [0.004s CPU, 0.004s wall-clock]
Done! [0.100s CPU, 0.101s wall-clock]
";
        let record = preset("translator")
            .expect("preset")
            .extract(log, Record::new())
            .expect("extract");
        let int = |name: &str| record.get(name).and_then(|v| v.as_i64());
        assert_eq!(int("translator_variables"), Some(12));
        assert_eq!(int("translator_derived_variables"), Some(0));
        assert_eq!(int("translator_goal_facts"), Some(4));
        assert_eq!(int("translator_task_size"), Some(902));
        assert_eq!(int("translator_peak_memory"), Some(29340));
        assert!(!record.contains_key("translator_axioms"));
        assert_eq!(
            record.get("translator_time_writing_output"),
            Some(&AttrValue::Float(0.004))
        );
    }
}
