//! Command-line parsing for the ROI / equity toolkit.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! analysis code. Each command's args are turned into plain library config
//! structs in `app` before anything runs.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::InequalityMethod;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "roi",
    version,
    about = "Earnings premiums and equity decomposition for education programs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the earnings model on survey microdata and write the coefficients.
    Fit(FitArgs),
    /// Compute earnings premiums for program participants.
    Premium(PremiumArgs),
    /// Decompose inequality of a value column across groups.
    Equity(EquityArgs),
    /// Resolve participants to block-group SES scores.
    Ses(SesArgs),
    /// Completion and employment outcomes by program.
    Outcomes(OutcomesArgs),
    /// Run the whole workflow offline on synthetic data.
    Demo(DemoArgs),
}

/// Options for fitting the earnings model.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Survey microdata CSV (CPS-style extract).
    #[arg(long, value_name = "CSV", required_unless_present = "synthetic")]
    pub survey: Option<PathBuf>,

    /// Fit on N synthetic survey records instead of a file.
    #[arg(long, value_name = "N", conflicts_with = "survey")]
    pub synthetic: Option<usize>,

    /// Random seed for synthetic records.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Drop records with more potential experience than this (years).
    #[arg(long, default_value_t = 50.0)]
    pub max_experience: f64,

    /// Keep every record regardless of experience.
    #[arg(long, conflicts_with = "max_experience")]
    pub no_experience_cap: bool,

    /// Ignore survey weights.
    #[arg(long)]
    pub unweighted: bool,

    /// Restate wages in this year's dollars using CPI-U (needs BLS_API_KEY).
    #[arg(long, value_name = "YEAR")]
    pub cpi_base_year: Option<i32>,

    /// Coefficient JSON to write.
    #[arg(long, short = 'o', value_name = "JSON")]
    pub out: Option<PathBuf>,
}

/// Column names shared by commands that read a participant CSV.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Participant CSV.
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Id column.
    #[arg(long, default_value = "id")]
    pub id_column: String,
}

/// Options for the premium calculator.
#[derive(Debug, Parser, Clone)]
pub struct PremiumArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Coefficient JSON produced by `roi fit --out`.
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,

    /// Grouping column (repeat for joint groups).
    #[arg(long = "group", default_value = "program")]
    pub groups: Vec<String>,

    #[arg(long, default_value = "state")]
    pub state_column: String,

    /// Column with CPS education codes.
    #[arg(long, default_value = "educ")]
    pub educ_column: String,

    #[arg(long, default_value = "age")]
    pub age_column: String,

    #[arg(long, default_value = "earnings")]
    pub wage_column: String,

    /// Leave intercept-fallback predictions out of group means.
    #[arg(long)]
    pub exclude_fallback: bool,

    /// Also decompose premiums by group (variance decomposition).
    #[arg(long)]
    pub decompose: bool,

    /// Show top-N groups on each side.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Export per-person premiums to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

/// Options for the equity decomposition.
#[derive(Debug, Parser, Clone)]
pub struct EquityArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Numeric column to decompose.
    #[arg(long, default_value = "earnings")]
    pub value: String,

    /// Grouping column (repeat for joint groups).
    #[arg(long = "group", required = true)]
    pub groups: Vec<String>,

    /// Method(s) to run; all by default.
    #[arg(long = "method", value_enum)]
    pub methods: Vec<InequalityMethod>,

    /// Deprivation table CSV; adds an `ses_band` column from `--fips-column`.
    #[arg(long, value_name = "CSV", requires = "fips_column")]
    pub ses_table: Option<PathBuf>,

    /// Column holding 12-digit block-group codes.
    #[arg(long)]
    pub fips_column: Option<String>,

    /// Export per-group results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

/// Options for SES resolution.
#[derive(Debug, Parser, Clone)]
pub struct SesArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Deprivation table CSV (`fips`, `adi_natrank`, `adi_staternk`).
    #[arg(long, value_name = "CSV")]
    pub table: PathBuf,

    /// Geocode this address column with the Census geocoder.
    #[arg(long, required_unless_present = "fips_column", conflicts_with = "fips_column")]
    pub address_column: Option<String>,

    /// Use block-group codes already present in this column.
    #[arg(long)]
    pub fips_column: Option<String>,

    /// Maximum in-flight geocoder calls.
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Per-call geocoder timeout in seconds.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Attempts per address for transient failures (at most 10).
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Base retry delay in milliseconds (doubles each attempt).
    #[arg(long, default_value_t = 250)]
    pub backoff_ms: u64,

    /// Export per-record results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

/// Options for completion and employment outcomes.
#[derive(Debug, Parser, Clone)]
pub struct OutcomesArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Grouping column (repeat for joint groups).
    #[arg(long = "group", default_value = "program")]
    pub groups: Vec<String>,

    /// Only report completion.
    #[arg(long, conflicts_with = "employment_only")]
    pub completion_only: bool,

    /// Only report employment.
    #[arg(long)]
    pub employment_only: bool,

    /// Net out statewide employment changes with BLS LAUS rates (needs BLS_API_KEY).
    #[arg(long)]
    pub labor_market: bool,

    /// 0/1 completion flag column.
    #[arg(long, default_value = "completed")]
    pub completed_column: String,

    #[arg(long, default_value = "entry_year")]
    pub entry_year_column: String,

    #[arg(long, default_value = "exit_year")]
    pub exit_year_column: String,

    #[arg(long, default_value = "state")]
    pub state_column: String,

    /// Entry month column (`YYYY-MM`).
    #[arg(long, default_value = "entry_month")]
    pub entry_month_column: String,

    #[arg(long, default_value = "exit_month")]
    pub exit_month_column: String,

    #[arg(long, default_value = "employed_start")]
    pub employed_start_column: String,

    #[arg(long, default_value = "employed_end")]
    pub employed_end_column: String,
}

/// Options for the offline demo.
#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Synthetic survey records used to fit the model.
    #[arg(long, default_value_t = 4000)]
    pub survey_size: usize,

    /// Synthetic program participants.
    #[arg(long, default_value_t = 600)]
    pub cohort_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equity_accepts_repeated_groups_and_methods() {
        let cli = Cli::try_parse_from([
            "roi", "equity", "--data", "p.csv", "--group", "race", "--group", "gender",
            "--method", "theil-t", "--method", "variance",
        ])
        .unwrap();
        let Command::Equity(args) = cli.command else {
            panic!("expected equity command");
        };
        assert_eq!(args.groups, vec!["race", "gender"]);
        assert_eq!(
            args.methods,
            vec![InequalityMethod::TheilT, InequalityMethod::VarianceDecomposition]
        );
        assert_eq!(args.value, "earnings");
    }

    #[test]
    fn ses_requires_exactly_one_source_column() {
        assert!(Cli::try_parse_from(["roi", "ses", "--data", "p.csv", "--table", "t.csv"]).is_err());
        assert!(
            Cli::try_parse_from([
                "roi", "ses", "--data", "p.csv", "--table", "t.csv", "--address-column", "a",
                "--fips-column", "f",
            ])
            .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "roi", "ses", "--data", "p.csv", "--table", "t.csv", "--fips-column", "f",
            ])
            .is_ok()
        );
    }

    #[test]
    fn outcomes_modes_are_exclusive() {
        assert!(
            Cli::try_parse_from([
                "roi", "outcomes", "--data", "p.csv", "--completion-only", "--employment-only",
            ])
            .is_err()
        );
        let cli = Cli::try_parse_from(["roi", "outcomes", "--data", "p.csv", "--labor-market"])
            .unwrap();
        let Command::Outcomes(args) = cli.command else {
            panic!("expected outcomes command");
        };
        assert!(args.labor_market);
        assert_eq!(args.groups, vec!["program"]);
    }

    #[test]
    fn fit_needs_a_survey_source() {
        assert!(Cli::try_parse_from(["roi", "fit"]).is_err());
        assert!(Cli::try_parse_from(["roi", "fit", "--synthetic", "500"]).is_ok());
    }
}
