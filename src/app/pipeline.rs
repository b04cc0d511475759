//! Shared workflow steps used by the CLI commands and the offline demo.
//!
//! Keeping these in one place avoids duplicating the core workflow:
//! survey -> earnings model -> premiums, and dataset -> SES bands -> decomposition.
//! The command handlers in `app` then only deal with printing and exports.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Datelike;
use tracing::{info, warn};

use crate::analysis::{AnalysisReport, AnalysisRequest, EquityAnalysis, attach_ses_bands};
use crate::data::{
    BlsClient, CPI_U_SERIES, CpiTable, LausMeasure, SyntheticConfig, employment_series_id,
    generate_cohort, generate_survey,
};
use crate::domain::{Dataset, InequalityMethod};
use crate::earnings::{
    EarningsModel, EarningsModelCoefficients, FallbackPolicy, FitOptions, FitReport,
    PremiumCalculator, PremiumResult, SurveyRecord, fit_earnings_model,
};
use crate::equity::DecompositionResult;
use crate::error::AppError;
use crate::io::{
    OutcomeColumns, PremiumColumns, RowError, address_records, completion_records,
    employment_records, known_unit_records, premium_inputs,
};
use crate::outcomes::{
    CompletionReport, EmploymentRecord, EmploymentReport, StateEmploymentRates,
    employment_outcomes, summarize_completion,
};
use crate::ses::{
    BatchResolution, CancellationToken, CensusGeocoder, DeprivationIndex, Geocoder,
    ResolverConfig, SesResolver,
};

/// Column added by SES resolution.
pub const SES_BAND_COLUMN: &str = "ses_band";

/// Where survey microdata comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SurveySource {
    File(PathBuf),
    Synthetic { records: usize, seed: u64 },
}

pub fn load_survey(source: &SurveySource) -> Result<Vec<SurveyRecord>, AppError> {
    match source {
        SurveySource::File(path) => {
            let loaded = crate::io::load_survey(path)?;
            log_row_errors("survey", &loaded.row_errors);
            Ok(loaded.data)
        }
        SurveySource::Synthetic { records, seed } => Ok(generate_survey(&SyntheticConfig {
            seed: *seed,
            survey_size: *records,
            ..SyntheticConfig::default()
        })?),
    }
}

/// Restate survey wages in `base_year` dollars with CPI-U from BLS.
///
/// Returns how many records carried a year and were adjusted.
pub fn restate_survey_wages(
    records: &mut [SurveyRecord],
    base_year: i32,
) -> Result<usize, AppError> {
    let first_year = records
        .iter()
        .filter_map(|r| r.year)
        .min()
        .unwrap_or(base_year)
        .min(base_year);
    let client = BlsClient::from_env()?;
    let series = client.fetch_series(CPI_U_SERIES, first_year, base_year)?;
    let cpi = CpiTable::from_series(&series)?;
    let adjusted = cpi.restate_survey(records, base_year)?;
    info!(base_year, adjusted, "restated survey wages to constant dollars");
    Ok(adjusted)
}

pub fn fit_model(records: &[SurveyRecord], options: &FitOptions) -> Result<FitReport, AppError> {
    Ok(fit_earnings_model(records, options)?)
}

/// Premiums plus the dataset rows that could not be turned into inputs.
#[derive(Debug, Clone)]
pub struct PremiumRun {
    pub result: PremiumResult,
    pub row_errors: Vec<RowError>,
}

pub fn run_premiums(
    dataset: &Dataset,
    coefficients: EarningsModelCoefficients,
    columns: &PremiumColumns,
    policy: FallbackPolicy,
) -> Result<PremiumRun, AppError> {
    let model = EarningsModel::new(coefficients)?;
    let (inputs, row_errors) = premium_inputs(dataset, columns)?;
    log_row_errors("premium inputs", &row_errors);
    let result = PremiumCalculator::new(model)
        .with_fallback_policy(policy)
        .calculate(&inputs);
    Ok(PremiumRun { result, row_errors })
}

pub fn run_completion(
    dataset: &Dataset,
    columns: &OutcomeColumns,
) -> Result<CompletionReport, AppError> {
    let (records, row_errors) = completion_records(dataset, columns)?;
    log_row_errors("completion", &row_errors);
    Ok(summarize_completion(&records))
}

/// Employment outcomes; with `correct_for_labor_market` the statewide LAUS
/// rates are fetched from BLS and the employment premium is computed.
pub fn run_employment(
    dataset: &Dataset,
    columns: &OutcomeColumns,
    correct_for_labor_market: bool,
) -> Result<EmploymentReport, AppError> {
    let (records, row_errors) = employment_records(dataset, columns)?;
    log_row_errors("employment", &row_errors);
    if !correct_for_labor_market {
        return Ok(employment_outcomes(&records, None));
    }
    let client = BlsClient::from_env()?;
    let rates = fetch_state_employment_rates(&client, &records)?;
    Ok(employment_outcomes(&records, Some(&rates)))
}

/// Statewide unemployment-rate series covering every state and month in `records`.
pub fn fetch_state_employment_rates(
    client: &BlsClient,
    records: &[EmploymentRecord],
) -> Result<StateEmploymentRates, AppError> {
    let states: BTreeSet<&str> = records.iter().filter_map(|r| r.state.as_deref()).collect();
    let years: Vec<i32> = records
        .iter()
        .flat_map(|r| [r.entry_month, r.exit_month])
        .flatten()
        .map(|m| m.year())
        .collect();
    let mut rates = StateEmploymentRates::new();
    let (Some(&first), Some(&last)) = (years.iter().min(), years.iter().max()) else {
        warn!("no entry or exit months; skipping statewide employment rates");
        return Ok(rates);
    };

    for state in states {
        let series_id = employment_series_id(state, LausMeasure::UnemploymentRate)?;
        let series = client.fetch_series(&series_id, first, last)?;
        rates.insert_unemployment_series(state, &series)?;
    }
    info!(states = rates.states().count(), first, last, "loaded statewide employment rates");
    Ok(rates)
}

/// Score rows that already carry a block-group code and attach their bands.
pub fn attach_known_unit_bands(
    dataset: &mut Dataset,
    fips_column: &str,
    table: DeprivationIndex,
) -> Result<BatchResolution, AppError> {
    let records = known_unit_records(dataset, fips_column)?;
    let resolver = SesResolver::new(Arc::new(table), ResolverConfig::default());
    let batch = resolver.resolve_known_units(&records);
    attach_ses_bands(dataset, &batch, SES_BAND_COLUMN)?;
    Ok(batch)
}

/// Geocode an address column with the Census geocoder and score the results.
///
/// Ctrl-C cancels the batch: records already scored keep their result, the
/// rest (including calls in flight) are reported as cancelled.
pub fn resolve_addresses(
    dataset: &Dataset,
    address_column: &str,
    table: DeprivationIndex,
    config: ResolverConfig,
) -> Result<BatchResolution, AppError> {
    let geocoder = CensusGeocoder::from_env(config.timeout)?;
    resolve_with(geocoder, dataset, address_column, table, config, true)
}

fn resolve_with<G: Geocoder + 'static>(
    geocoder: G,
    dataset: &Dataset,
    address_column: &str,
    table: DeprivationIndex,
    config: ResolverConfig,
    cancel_on_ctrl_c: bool,
) -> Result<BatchResolution, AppError> {
    let records = address_records(dataset, address_column)?;
    let resolver = SesResolver::new(Arc::new(table), config);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::new(4, format!("failed to start async runtime: {e}")))?;

    let cancel = CancellationToken::new();
    let batch = runtime.block_on(async {
        let watcher = cancel_on_ctrl_c.then(|| {
            let token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling SES resolution");
                    token.cancel();
                }
            })
        });
        let batch = resolver
            .resolve_batch(Arc::new(geocoder), &records, &cancel)
            .await;
        if let Some(handle) = watcher {
            handle.abort();
        }
        batch
    });
    Ok(batch)
}

/// Everything the offline demo computes.
#[derive(Debug, Clone)]
pub struct DemoOutput {
    pub fit: FitReport,
    pub resolution: BatchResolution,
    pub premiums: PremiumResult,
    pub premium_decomposition: BTreeMap<InequalityMethod, DecompositionResult>,
    pub earnings_by_program: AnalysisReport,
    pub earnings_by_ses: AnalysisReport,
}

/// Synthetic end-to-end run: fit, resolve, premiums and decompositions.
pub fn run_demo(config: &SyntheticConfig) -> Result<DemoOutput, AppError> {
    let survey = generate_survey(config)?;
    let fit = fit_earnings_model(&survey, &FitOptions::default())?;

    let cohort = generate_cohort(config)?;
    let mut dataset = cohort.dataset()?;
    let resolution = resolve_with(
        cohort.directory,
        &dataset,
        "address",
        cohort.deprivation,
        ResolverConfig::default(),
        false,
    )?;
    attach_ses_bands(&mut dataset, &resolution, SES_BAND_COLUMN)?;

    let premiums = run_premiums(
        &dataset,
        fit.coefficients.clone(),
        &PremiumColumns::default(),
        FallbackPolicy::Include,
    )?
    .result;
    let premium_decomposition =
        EquityAnalysis::run_premiums(&premiums, &[InequalityMethod::VarianceDecomposition])?;

    let earnings_by_program = EquityAnalysis::run(
        &dataset,
        &AnalysisRequest::new("earnings", vec!["program".to_string()]),
    )?;
    let earnings_by_ses = EquityAnalysis::run(
        &dataset,
        &AnalysisRequest::new("earnings", vec![SES_BAND_COLUMN.to_string()]),
    )?;

    Ok(DemoOutput {
        fit,
        resolution,
        premiums,
        premium_decomposition,
        earnings_by_program,
        earnings_by_ses,
    })
}

fn log_row_errors(source: &str, errors: &[RowError]) {
    if errors.is_empty() {
        return;
    }
    warn!(source, skipped = errors.len(), "rows skipped during ingest");
    for e in errors.iter().take(5) {
        warn!(
            source,
            line = e.line,
            id = e.id.as_deref().unwrap_or(""),
            reason = %e.message,
            "skipped row"
        );
    }
}
