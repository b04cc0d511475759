//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments into library config structs
//! - runs the matching workflow from `pipeline`
//! - prints reports and writes optional exports

use std::time::Duration;

use clap::Parser;

use crate::analysis::{AnalysisRequest, EquityAnalysis};
use crate::cli::{
    Cli, Command, DemoArgs, EquityArgs, FitArgs, OutcomesArgs, PremiumArgs, SesArgs,
};
use crate::data::SyntheticConfig;
use crate::domain::InequalityMethod;
use crate::earnings::{FallbackPolicy, FitOptions};
use crate::error::AppError;
use crate::io::{OutcomeColumns, PremiumColumns, normalize_header_name};
use crate::report::{
    format_analysis, format_completion, format_coverage, format_employment, format_fit_summary,
    format_methods, format_premiums, rank_group_premiums,
};
use crate::ses::{MAX_ATTEMPTS_LIMIT, ResolverConfig};

pub mod pipeline;

use pipeline::SurveySource;

/// Entry point for the `roi` binary.
pub fn run() -> Result<(), AppError> {
    crate::logging::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Premium(args) => handle_premium(args),
        Command::Equity(args) => handle_equity(args),
        Command::Ses(args) => handle_ses(args),
        Command::Outcomes(args) => handle_outcomes(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let source = match (&args.survey, args.synthetic) {
        (Some(path), _) => SurveySource::File(path.clone()),
        (None, Some(records)) => SurveySource::Synthetic {
            records,
            seed: args.seed,
        },
        (None, None) => return Err(AppError::new(2, "either --survey or --synthetic is required")),
    };
    let mut records = pipeline::load_survey(&source)?;
    if let Some(base_year) = args.cpi_base_year {
        pipeline::restate_survey_wages(&mut records, base_year)?;
    }

    let report = pipeline::fit_model(&records, &fit_options_from_args(&args))?;
    println!("{}", format_fit_summary(&report));

    if let Some(path) = &args.out {
        crate::io::write_coefficients_json(path, &report.coefficients)?;
    }
    Ok(())
}

pub fn fit_options_from_args(args: &FitArgs) -> FitOptions {
    FitOptions {
        max_experience: (!args.no_experience_cap).then_some(args.max_experience),
        unweighted: args.unweighted,
    }
}

fn handle_premium(args: PremiumArgs) -> Result<(), AppError> {
    let dataset = crate::io::load_dataset(&args.data.data, &args.data.id_column)?.data;
    let coefficients = crate::io::read_coefficients_json(&args.model)?;
    let policy = if args.exclude_fallback {
        FallbackPolicy::Exclude
    } else {
        FallbackPolicy::Include
    };

    let run = pipeline::run_premiums(&dataset, coefficients, &premium_columns_from_args(&args), policy)?;
    let rankings = rank_group_premiums(&run.result, args.top);
    println!("{}", format_premiums(&run.result, &rankings));

    if args.decompose {
        let results =
            EquityAnalysis::run_premiums(&run.result, &[InequalityMethod::VarianceDecomposition])?;
        println!("{}", format_methods(results.values()));
    }
    if let Some(path) = &args.export {
        crate::io::write_premiums_csv(path, &run.result)?;
    }
    Ok(())
}

pub fn premium_columns_from_args(args: &PremiumArgs) -> PremiumColumns {
    PremiumColumns {
        group_columns: args.groups.iter().map(|g| normalize_header_name(g)).collect(),
        state: normalize_header_name(&args.state_column),
        educ: normalize_header_name(&args.educ_column),
        age: normalize_header_name(&args.age_column),
        wage: normalize_header_name(&args.wage_column),
    }
}

fn handle_equity(args: EquityArgs) -> Result<(), AppError> {
    let mut dataset = crate::io::load_dataset(&args.data.data, &args.data.id_column)?.data;

    if let (Some(table_path), Some(fips_column)) = (&args.ses_table, &args.fips_column) {
        let table = crate::io::load_deprivation_index(table_path)?.data;
        let batch = pipeline::attach_known_unit_bands(
            &mut dataset,
            &normalize_header_name(fips_column),
            table,
        )?;
        println!("{}", format_coverage(&batch.coverage));
    }

    let report = EquityAnalysis::run(&dataset, &analysis_request_from_args(&args))?;
    println!("{}", format_analysis(&report));

    if let Some(path) = &args.export {
        crate::io::write_decomposition_csv(path, &report)?;
    }
    Ok(())
}

pub fn analysis_request_from_args(args: &EquityArgs) -> AnalysisRequest {
    let request = AnalysisRequest::new(
        normalize_header_name(&args.value),
        args.groups.iter().map(|g| normalize_header_name(g)).collect(),
    );
    if args.methods.is_empty() {
        request
    } else {
        request.with_methods(args.methods.clone())
    }
}

fn handle_ses(args: SesArgs) -> Result<(), AppError> {
    let mut dataset = crate::io::load_dataset(&args.data.data, &args.data.id_column)?.data;
    let table = crate::io::load_deprivation_index(&args.table)?.data;

    let batch = match (&args.address_column, &args.fips_column) {
        (Some(address), _) => pipeline::resolve_addresses(
            &dataset,
            &normalize_header_name(address),
            table,
            resolver_config_from_args(&args),
        )?,
        (None, Some(fips)) => {
            pipeline::attach_known_unit_bands(&mut dataset, &normalize_header_name(fips), table)?
        }
        (None, None) => {
            return Err(AppError::new(2, "either --address-column or --fips-column is required"));
        }
    };
    println!("{}", format_coverage(&batch.coverage));

    if let Some(path) = &args.export {
        crate::io::write_resolution_csv(path, &batch)?;
    }
    Ok(())
}

pub fn resolver_config_from_args(args: &SesArgs) -> ResolverConfig {
    ResolverConfig {
        concurrency: args.concurrency.max(1),
        timeout: Duration::from_secs(args.timeout_secs),
        max_attempts: args.max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
        backoff_base: Duration::from_millis(args.backoff_ms),
    }
}

fn handle_outcomes(args: OutcomesArgs) -> Result<(), AppError> {
    let dataset = crate::io::load_dataset(&args.data.data, &args.data.id_column)?.data;
    let columns = outcome_columns_from_args(&args);

    if !args.employment_only {
        let completion = pipeline::run_completion(&dataset, &columns)?;
        println!("{}", format_completion(&completion));
    }
    if !args.completion_only {
        let employment = pipeline::run_employment(&dataset, &columns, args.labor_market)?;
        println!("{}", format_employment(&employment));
    }
    Ok(())
}

pub fn outcome_columns_from_args(args: &OutcomesArgs) -> OutcomeColumns {
    OutcomeColumns {
        group_columns: args.groups.iter().map(|g| normalize_header_name(g)).collect(),
        completed: normalize_header_name(&args.completed_column),
        entry_year: normalize_header_name(&args.entry_year_column),
        exit_year: normalize_header_name(&args.exit_year_column),
        state: normalize_header_name(&args.state_column),
        entry_month: normalize_header_name(&args.entry_month_column),
        exit_month: normalize_header_name(&args.exit_month_column),
        employed_at_start: normalize_header_name(&args.employed_start_column),
        employed_at_end: normalize_header_name(&args.employed_end_column),
    }
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = SyntheticConfig {
        seed: args.seed,
        survey_size: args.survey_size,
        cohort_size: args.cohort_size,
        ..SyntheticConfig::default()
    };
    let out = pipeline::run_demo(&config)?;

    println!("{}", format_fit_summary(&out.fit));
    println!("{}", format_coverage(&out.resolution.coverage));
    let rankings = rank_group_premiums(&out.premiums, 5);
    println!("{}", format_premiums(&out.premiums, &rankings));
    println!("{}", format_methods(out.premium_decomposition.values()));
    println!("{}", format_analysis(&out.earnings_by_program));
    println!("{}", format_analysis(&out.earnings_by_ses));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Command {
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn equity_args_become_a_normalized_request() {
        let Command::Equity(args) = parse(&[
            "roi", "equity", "--data", "p.csv", "--value", "Earnings", "--group", " Race ",
        ]) else {
            panic!("expected equity");
        };
        let request = analysis_request_from_args(&args);
        assert_eq!(request.value_column, "earnings");
        assert_eq!(request.group_columns, vec!["race"]);
        assert_eq!(request.methods, InequalityMethod::ALL.to_vec());
    }

    #[test]
    fn fit_args_map_to_options() {
        let Command::Fit(args) = parse(&["roi", "fit", "--synthetic", "10", "--no-experience-cap"])
        else {
            panic!("expected fit");
        };
        let opts = fit_options_from_args(&args);
        assert_eq!(opts.max_experience, None);
        assert!(!opts.unweighted);
    }

    #[test]
    fn outcome_defaults_match_library_defaults() {
        let Command::Outcomes(args) = parse(&["roi", "outcomes", "--data", "p.csv"]) else {
            panic!("expected outcomes");
        };
        assert_eq!(outcome_columns_from_args(&args), OutcomeColumns::default());
    }

    #[test]
    fn resolver_args_are_clamped() {
        let Command::Ses(args) = parse(&[
            "roi", "ses", "--data", "p.csv", "--table", "t.csv", "--fips-column", "fips",
            "--concurrency", "0", "--max-attempts", "0",
        ]) else {
            panic!("expected ses");
        };
        let config = resolver_config_from_args(&args);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.timeout, Duration::from_secs(10));

        let Command::Ses(args) = parse(&[
            "roi", "ses", "--data", "p.csv", "--table", "t.csv", "--fips-column", "fips",
            "--max-attempts", "40",
        ]) else {
            panic!("expected ses");
        };
        assert_eq!(resolver_config_from_args(&args).max_attempts, MAX_ATTEMPTS_LIMIT);
    }
}
