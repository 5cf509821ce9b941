use chrono::NaiveDate;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Range { start: NaiveDate, end: NaiveDate },
    All,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub mode: RunMode,
}

enum ParseOutcome {
    Args(CliArgs),
    Help,
}

fn usage() {
    eprintln!(
        "usage:
  cardsight-rollup [--config <path>] --start <YYYY-MM-DD> [--end <YYYY-MM-DD>]
  cardsight-rollup [--config <path>] --all
"
    );
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{flag} expects a YYYY-MM-DD date, got `{value}`"))
}

fn parse_args_impl(mut args: impl Iterator<Item = String>) -> Result<ParseOutcome, String> {
    let mut config_path: Option<PathBuf> = None;
    let mut start: Option<NaiveDate> = None;
    let mut end: Option<NaiveDate> = None;
    let mut all = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--start" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--start requires a value".to_string())?;
                start = Some(parse_date("--start", &value)?);
            }
            "--end" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--end requires a value".to_string())?;
                end = Some(parse_date("--end", &value)?);
            }
            "--all" => {
                all = true;
            }
            "-h" | "--help" | "help" => {
                return Ok(ParseOutcome::Help);
            }
            other => {
                return Err(format!("unrecognized argument `{other}`"));
            }
        }
    }

    let mode = if all {
        if start.is_some() || end.is_some() {
            return Err("--all cannot be combined with --start/--end".to_string());
        }
        RunMode::All
    } else {
        let start = start.ok_or_else(|| "either --start or --all is required".to_string())?;
        let end = end.unwrap_or(start);
        if start > end {
            return Err(format!("start date {start} is after end date {end}"));
        }
        RunMode::Range { start, end }
    };

    Ok(ParseOutcome::Args(CliArgs {
        config_path: cardsight_config::resolve_config_path(config_path),
        mode,
    }))
}

pub fn parse_args() -> CliArgs {
    match parse_args_impl(std::env::args().skip(1)) {
        Ok(ParseOutcome::Args(args)) => args,
        Ok(ParseOutcome::Help) => {
            usage();
            std::process::exit(0);
        }
        Err(error) => {
            eprintln!("error: {error}");
            usage();
            std::process::exit(2);
        }
    }
}
