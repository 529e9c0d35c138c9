//! # Railyard
//!
//! Command line front-end for railyard projects. Every subcommand loads the
//! project (or plot documents), calls one library operation per
//! flavor/selection combination and reports what it did.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "railyard", about = "Bookkeeping for photo-z analysis projects", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the project configuration and the contents of its library.
    Inspect(ProjectArgs),
    /// Write the pipeline definitions of one or more flavors.
    Build(BuildArgs),
    /// Apply a selection to every file of a catalog.
    Reduce(ReduceArgs),
    /// Draw a random subsample of a catalog into a single file.
    Subsample(SubsampleArgs),
    /// Run written pipelines.
    #[command(subcommand)]
    Run(RunCommand),
    /// Plot bookkeeping.
    #[command(subcommand)]
    Plot(PlotCommand),
}

#[derive(Subcommand, Debug)]
enum RunCommand {
    /// Run a pipeline once on the flavor's input files.
    Single(RunArgs),
    /// Run a pipeline once per file of its input catalog.
    Catalog(RunArgs),
}

#[derive(Subcommand, Debug)]
enum PlotCommand {
    /// List the plot jobs of the groups defined in one or more documents,
    /// one tab-separated row per plot, for an external renderer.
    Run(PlotRunArgs),
    /// Write a PlotGroups document pairing a plotter list with dataset lists.
    MakeGroups(MakeGroupsArgs),
}

/// How commands are carried out.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RunMode {
    /// Log commands without running them.
    DryRun,
    /// Run commands in the local shell.
    Bash,
}

#[derive(Args, Debug)]
struct ProjectArgs {
    /// Project configuration file.
    #[arg(long, env = "RAILYARD_PROJECT")]
    config_file: PathBuf,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Flavors to build, `all` for every flavor.
    #[arg(long = "flavor", default_value = "baseline")]
    flavors: Vec<String>,
    /// Overwrite existing pipeline files.
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct ReduceArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Catalog to reduce.
    #[arg(long, default_value = "truth")]
    catalog_template: String,
    /// Catalog to write.
    #[arg(long, default_value = "reduced")]
    output_catalog_template: String,
    /// Reducer to apply.
    #[arg(long, default_value = "roman_rubin")]
    reducer_class_name: String,
    /// Selection the input catalog was made with.
    #[arg(long, default_value = "")]
    input_selection: String,
    /// Selections to apply, `all` for every selection.
    #[arg(long = "selection", default_value = "all")]
    selections: Vec<String>,
    #[arg(long, value_enum, default_value_t = RunMode::Bash)]
    run_mode: RunMode,
}

#[derive(Args, Debug)]
struct SubsampleArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Catalog to draw from.
    #[arg(long, default_value = "degraded")]
    catalog_template: String,
    /// File to write the subsample to.
    #[arg(long)]
    file_template: String,
    /// Subsampler to use.
    #[arg(long, default_value = "random_subsampler")]
    subsampler_class_name: String,
    /// Subsample definition giving seed and size.
    #[arg(long = "subsample-name")]
    subsample: String,
    #[arg(long = "flavor", default_value = "baseline")]
    flavors: Vec<String>,
    #[arg(long = "selection", default_value = "all")]
    selections: Vec<String>,
    #[arg(long, value_enum, default_value_t = RunMode::Bash)]
    run_mode: RunMode,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Pipeline to run.
    pipeline: String,
    #[arg(long = "flavor", default_value = "baseline")]
    flavors: Vec<String>,
    #[arg(long = "selection", default_value = "all")]
    selections: Vec<String>,
    #[arg(long, value_enum, default_value_t = RunMode::DryRun)]
    run_mode: RunMode,
}

#[derive(Args, Debug)]
struct PlotRunArgs {
    /// Documents defining plotters, datasets and plot groups.
    #[arg(long = "yaml-file", required = true)]
    yaml_files: Vec<PathBuf>,
    /// Groups to run, all groups when omitted.
    #[arg(long = "include-group")]
    include_groups: Vec<String>,
    /// Groups to skip.
    #[arg(long = "exclude-group")]
    exclude_groups: Vec<String>,
    #[arg(long, default_value = ".")]
    outdir: PathBuf,
    /// Only report which plots already exist.
    #[arg(long)]
    find_only: bool,
}

#[derive(Args, Debug)]
struct MakeGroupsArgs {
    #[arg(long)]
    output_yaml: PathBuf,
    #[arg(long)]
    plotter_yaml: PathBuf,
    #[arg(long)]
    dataset_yaml: PathBuf,
    #[arg(long)]
    plotter_list_name: String,
    #[arg(long, default_value = "")]
    output_prefix: String,
    /// Dataset lists to pair, every list when omitted.
    #[arg(long = "dataset-list-name")]
    dataset_list_names: Vec<String>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "railyard=info,railyard_libs=info".into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Running {:?}", cli.command);

    match cli.command {
        Command::Inspect(args) => commands::inspect(&args),
        Command::Build(args) => commands::build(&args),
        Command::Reduce(args) => commands::reduce(&args),
        Command::Subsample(args) => commands::subsample(&args),
        Command::Run(RunCommand::Single(args)) => commands::run_single(&args),
        Command::Run(RunCommand::Catalog(args)) => commands::run_catalog(&args),
        Command::Plot(PlotCommand::Run(args)) => commands::plot_run(&args),
        Command::Plot(PlotCommand::MakeGroups(args)) => commands::make_groups(&args),
    }
}
