//! Swap-station simulator entry point: CLI wiring and config-driven runs.

use std::fs;
use std::path::Path;
use std::process;

use tracing::Level;

use swap_sim::config::ScenarioConfig;
use swap_sim::io::export::export_csv;
use swap_sim::runner::run_scenario;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    days_override: Option<usize>,
    telemetry_out: Option<String>,
    summary_json: Option<String>,
    print_steps: bool,
    log_level: Level,
}

fn print_help() {
    eprintln!("swap-sim: battery-swap station simulator");
    eprintln!();
    eprintln!("Usage: swap-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --days <n>               Override number of simulated days");
    eprintln!("  --telemetry-out <path>   Export step results to CSV");
    eprintln!("  --summary-json <path>    Write the KPI report as JSON");
    eprintln!("  --steps                  Print every step result");
    eprintln!("  --verbose                Log debug detail to stderr");
    eprintln!("  --quiet                  Log errors only");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
}

/// Returns the value following flag `args[*i]`, exiting if it is missing.
fn flag_value(args: &[String], i: &mut usize, what: &str) -> String {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: {} requires {what}", args[*i - 1]);
        process::exit(1);
    }
    args[*i].clone()
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        days_override: None,
        telemetry_out: None,
        summary_json: None,
        print_steps: false,
        log_level: Level::WARN,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => cli.scenario_path = Some(flag_value(&args, &mut i, "a path argument")),
            "--preset" => cli.preset = Some(flag_value(&args, &mut i, "a name argument")),
            "--seed" => {
                let raw = flag_value(&args, &mut i, "a u64 argument");
                if let Ok(s) = raw.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{raw}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--days" => {
                let raw = flag_value(&args, &mut i, "a day count");
                match raw.parse::<usize>() {
                    Ok(d) if d > 0 => cli.days_override = Some(d),
                    _ => {
                        eprintln!("error: --days value \"{raw}\" is not a positive integer");
                        process::exit(1);
                    }
                }
            }
            "--telemetry-out" => {
                cli.telemetry_out = Some(flag_value(&args, &mut i, "a path argument"));
            }
            "--summary-json" => {
                cli.summary_json = Some(flag_value(&args, &mut i, "a path argument"));
            }
            "--steps" => cli.print_steps = true,
            "--verbose" | "-v" => cli.log_level = Level::DEBUG,
            "--quiet" | "-q" => cli.log_level = Level::ERROR,
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    let cli = parse_args();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    // Load config: --scenario takes priority, then --preset, then baseline default
    let loaded = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }
    if let Some(days) = cli.days_override {
        scenario.simulation.days = days;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let run = run_scenario(&scenario);

    if cli.print_steps {
        for r in &run.results {
            println!("{r}");
        }
        println!();
    }

    println!("{}", run.kpi);

    if let Some(ref path) = cli.telemetry_out {
        if let Err(e) = export_csv(&run.results, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Telemetry written to {path}");
    }

    if let Some(ref path) = cli.summary_json {
        let written = serde_json::to_string_pretty(&run.kpi)
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("error: failed to write summary: {e}");
            process::exit(1);
        }
        eprintln!("Summary written to {path}");
    }
}
