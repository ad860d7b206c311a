//! Experiment orchestration: load a definition, run the planner once per
//! (algorithm, problem), parse the logs, gather runs into an eval store and
//! archive the experiment directory.

pub mod archive;
pub mod experiment;
pub mod fetch;
pub mod planner;
pub mod steps;
pub mod suite;

pub use archive::{archive_experiment, default_archive_path, ArchiveResult};
pub use experiment::{
    compile_schema, describe_experiment, load_document, schema_errors, summarize,
    AlgorithmConfig, Experiment, ExperimentSummary, LoadedExperiment, PlannerConfig, SuiteConfig,
    EXPERIMENT_TEMPLATE, SCHEMA_NAMES,
};
pub use fetch::{default_eval_dir, eval_store_path, fetch, load_source, FetchFilter, FetchSummary};
pub use planner::{build_command, RunPaths};
pub use steps::{parse_runs, run_experiment, ParseSummary, RunOptions, RunSummary};
pub use suite::{resolve_suite, Task};
