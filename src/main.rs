use chrono::{Local, NaiveDateTime};
use clap::{Parser, ValueEnum};
use log::{error, info, LevelFilter};
use statement_mapper::{InputFormat, MapperConfig, MapperError, OutputFormat, RunOptions, StatementProcessor};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormatArg {
    Standard,
    Bs,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Standard => OutputFormat::Standard,
            OutputFormatArg::Bs => OutputFormat::Bs,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum InputFormatArg {
    #[value(name = "balance_seat")]
    BalanceSeat,
    Jpcrp,
}

impl From<InputFormatArg> for InputFormat {
    fn from(arg: InputFormatArg) -> Self {
        match arg {
            InputFormatArg::BalanceSeat => InputFormat::BalanceSeat,
            InputFormatArg::Jpcrp => InputFormat::Jpcrp,
        }
    }
}

/// Map account items in a statement CSV to standard names, optionally as a balance sheet.
#[derive(Parser, Debug)]
#[command(name = "statement-mapper", version)]
struct Cli {
    /// Input CSV file
    #[arg(short = 'i', long = "input", required_unless_present = "print_config_schema")]
    input: Option<PathBuf>,

    /// JSON config file
    #[arg(short = 'c', long = "config", default_value = "config.json")]
    config: PathBuf,

    /// Output file (default: MMDDHHMM.csv from the current local time)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Log per-row decisions and warnings
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Check column discovery and mapping without writing anything
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Output format; overrides output.format in the config
    #[arg(short = 'f', long = "format", value_enum)]
    format: Option<OutputFormatArg>,

    /// Input format; overrides input.format in the config
    #[arg(long = "input-format", value_enum)]
    input_format: Option<InputFormatArg>,

    /// Print the JSON schema of the config file and exit
    #[arg(long = "print-config-schema")]
    print_config_schema: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_config_schema {
        return match MapperConfig::schema_as_json() {
            Ok(schema) => {
                println!("{}", schema);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render config schema: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let result = run(cli);
    if let Err(message) = &result {
        error!("{}", message);
    }
    ExitCode::from(exit_status(&result))
}

fn exit_status(result: &Result<(), String>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(&cli.config);

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        config
            .as_ref()
            .ok()
            .and_then(|config| config.logging.level_filter().ok())
            .unwrap_or(LevelFilter::Info)
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    execute(&cli, config)
}

/// A missing config file falls back to the defaults so logging can start; `check_paths` reports it.
fn load_config(path: &Path) -> Result<MapperConfig, String> {
    if path.is_file() {
        MapperConfig::from_path(path).map_err(|e| e.to_string())
    } else {
        Ok(MapperConfig::default())
    }
}

fn execute(cli: &Cli, config: Result<MapperConfig, String>) -> Result<(), String> {
    let input = cli.input.clone().ok_or("--input is required")?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_name(&Local::now().naive_local()));

    check_paths(&input, &cli.config, &output, cli.dry_run)?;

    let mut config = config?;
    apply_overrides(&mut config, cli);

    info!("Input:  {}", input.display());
    info!("Config: {}", cli.config.display());
    info!("Output: {}", output.display());
    info!("Format: {} -> {}", config.input.format, config.output.format);

    let options = RunOptions {
        dry_run: cli.dry_run,
    };
    let summary = StatementProcessor::new(&config)
        .and_then(|processor| processor.run(&input, &output, &options))
        .map_err(|e: MapperError| e.to_string())?;

    if summary.dry_run {
        info!(
            "Dry run complete: {} rows would be mapped, {} passed through",
            summary.mapped, summary.passed_through
        );
    } else {
        info!("Done: {} rows written to {}", summary.rows_written, output.display());
    }
    Ok(())
}

/// `MMDDHHMM.csv` in the working directory.
fn default_output_name(now: &NaiveDateTime) -> PathBuf {
    PathBuf::from(now.format("%m%d%H%M.csv").to_string())
}

fn check_paths(input: &Path, config: &Path, output: &Path, dry_run: bool) -> Result<(), String> {
    if !input.is_file() {
        return Err(format!("Input file not found: {}", input.display()));
    }
    if !config.is_file() {
        return Err(format!("Config file not found: {}", config.display()));
    }
    if !dry_run && output.exists() {
        return Err(format!(
            "Output file already exists: {} (refusing to overwrite)",
            output.display()
        ));
    }
    Ok(())
}

fn apply_overrides(config: &mut MapperConfig, cli: &Cli) {
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }
    if let Some(format) = cli.input_format {
        config.input.format = format.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("statement-mapper").chain(args.iter().copied())).unwrap()
    }

    fn workspace(input: &str) -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let input_path = dir.path().join("input.csv");
        let config_path = dir.path().join("config.json");
        fs::write(&input_path, input).unwrap();
        fs::write(
            &config_path,
            r#"{"account_mapping": {"流動資産": {"現金": "現金及び預金"}}, "logging": {"level": "WARNING"}}"#,
        )
        .unwrap();
        (dir, input_path, config_path)
    }

    #[test]
    fn test_default_output_name_uses_month_day_hour_minute() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 59)
            .unwrap();
        assert_eq!(default_output_name(&now), PathBuf::from("03051407.csv"));
    }

    #[test]
    fn test_input_is_required_unless_printing_schema() {
        assert!(Cli::try_parse_from(["statement-mapper"]).is_err());

        let cli = parse(&["--print-config-schema"]);
        assert!(cli.print_config_schema);
        assert!(cli.input.is_none());
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }

    #[test]
    fn test_format_flags_override_config() {
        let cli = parse(&["-i", "in.csv", "-f", "bs", "--input-format", "balance_seat"]);
        let mut config = MapperConfig::default();
        config.input.format = InputFormat::Jpcrp;
        apply_overrides(&mut config, &cli);
        assert_eq!(config.output.format, OutputFormat::Bs);
        assert_eq!(config.input.format, InputFormat::BalanceSeat);

        let mut untouched = MapperConfig::default();
        apply_overrides(&mut untouched, &parse(&["-i", "in.csv"]));
        assert_eq!(untouched.output.format, OutputFormat::Standard);
    }

    #[test]
    fn test_check_paths_refuses_existing_output() {
        let (dir, input, config) = workspace("科目\t金額\n");
        let output = dir.path().join("out.csv");
        assert!(check_paths(&input, &config, &output, false).is_ok());

        fs::write(&output, "old").unwrap();
        let message = check_paths(&input, &config, &output, false).unwrap_err();
        assert!(message.contains("already exists"));
        assert!(check_paths(&input, &config, &output, true).is_ok());

        let missing = dir.path().join("missing.csv");
        assert!(check_paths(&missing, &config, &output, true)
            .unwrap_err()
            .contains("Input file not found"));
        assert!(check_paths(&input, &missing, &output, true)
            .unwrap_err()
            .contains("Config file not found"));
    }

    #[test]
    fn test_execute_writes_output_and_exits_zero() {
        let (dir, input, config) = workspace("科目\t金額\n現金\t500\n");
        let output = dir.path().join("out.csv");
        let cli = parse(&[
            "-i",
            input.to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ]);

        let result = execute(&cli, load_config(&cli.config));
        assert_eq!(exit_status(&result), 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "科目,金額\n現金及び預金,500\n");
    }

    #[test]
    fn test_execute_fails_with_status_one_on_unknown_headers() {
        let (dir, input, config) = workspace("foo\tbar\n現金\t500\n");
        let output = dir.path().join("out.csv");
        let cli = parse(&[
            "-i",
            input.to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ]);

        let result = execute(&cli, load_config(&cli.config));
        assert!(result.as_ref().unwrap_err().contains("item name"));
        assert_eq!(exit_status(&result), 1);
        assert!(!output.exists());
    }
}
