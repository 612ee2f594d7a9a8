//! Predefined analysis sequences
//!
//! Each sequence is built once on first use and shared read-only by every
//! run. Nothing here is validated; unknown tools fail when a step runs.

use serde_json::json;
use std::sync::LazyLock;

use crate::param::ParamSource;
use crate::step::{ExecutionStep, OnFailure, Sequence};

pub const FINANCIAL_ANALYSIS: &str = "financial_analysis";
pub const INDUSTRY_ANALYSIS: &str = "industry_analysis";
pub const VALUATION_ANALYSIS: &str = "valuation_analysis";
pub const INTEGRATION_ANALYSIS: &str = "integration_analysis";

/// Tool names used by the predefined sequences
pub mod tools {
    pub const GET_FINANCIAL_DATA: &str = "get_financial_data";
    pub const CALCULATE_FINANCIAL_RATIOS: &str = "calculate_financial_ratios";
    pub const CALCULATE_FINANCIAL_HEALTH_SCORE: &str = "calculate_financial_health_score";
    pub const PREPARE_ANALYSIS_DATA_FOR_LLM: &str = "prepare_analysis_data_for_llm";

    pub const GET_INDUSTRY_DATA: &str = "get_industry_data";
    pub const GET_INDUSTRY_COMPARISON: &str = "get_industry_comparison";
    pub const ANALYZE_COMPETITIVE_POSITION: &str = "analyze_competitive_position";
    pub const IDENTIFY_INDUSTRY_TRENDS: &str = "identify_industry_trends";
    pub const ASSESS_INDUSTRY_RISKS: &str = "assess_industry_risks";
    pub const GENERATE_INDUSTRY_ANALYSIS_REPORT: &str = "generate_industry_analysis_report";

    pub const GET_MARKET_DATA: &str = "get_market_data";
    pub const CALCULATE_VALUATION_METRICS: &str = "calculate_valuation_metrics";
    pub const PERFORM_RELATIVE_VALUATION: &str = "perform_relative_valuation";
    pub const ANALYZE_TECHNICAL_INDICATORS: &str = "analyze_technical_indicators";
    pub const CALCULATE_INTRINSIC_VALUE: &str = "calculate_intrinsic_value";
    pub const ASSESS_VALUATION_RISK: &str = "assess_valuation_risk";
    pub const GENERATE_VALUATION_ANALYSIS_REPORT: &str = "generate_valuation_analysis_report";

    pub const COLLECT_ANALYSIS_RESULTS: &str = "collect_analysis_results";
    pub const ANALYZE_CONSISTENCY: &str = "analyze_consistency";
    pub const CALCULATE_COMPREHENSIVE_SCORE: &str = "calculate_comprehensive_score";
    pub const IDENTIFY_RISKS_AND_CATALYSTS: &str = "identify_risks_and_catalysts";
    pub const DEVELOP_INVESTMENT_STRATEGY: &str = "develop_investment_strategy";
    pub const GENERATE_COMPREHENSIVE_REPORT: &str = "generate_comprehensive_report";
}

use tools::*;

static FINANCIAL: LazyLock<Sequence> = LazyLock::new(|| {
    Sequence::builder(FINANCIAL_ANALYSIS)
        .step(ExecutionStep::new(GET_FINANCIAL_DATA, "Fetch financial statements").with_arg("years", json!(3)))
        .step(
            ExecutionStep::new(CALCULATE_FINANCIAL_RATIOS, "Calculate financial ratios")
                .depends_on(GET_FINANCIAL_DATA)
                .map_param("financial_data", ParamSource::full_result()),
        )
        .step(
            ExecutionStep::new(CALCULATE_FINANCIAL_HEALTH_SCORE, "Score financial health")
                .depends_on(CALCULATE_FINANCIAL_RATIOS)
                .map_param("ratios", ParamSource::full_result())
                .map_param("financial_data", ParamSource::full_result_of(GET_FINANCIAL_DATA)),
        )
        .step(
            ExecutionStep::new(PREPARE_ANALYSIS_DATA_FOR_LLM, "Prepare data for report generation")
                .depends_on(CALCULATE_FINANCIAL_HEALTH_SCORE)
                .map_param("analysis_data", ParamSource::all_results()),
        )
        .build()
});

static INDUSTRY: LazyLock<Sequence> = LazyLock::new(|| {
    Sequence::builder(INDUSTRY_ANALYSIS)
        .step(ExecutionStep::new(GET_INDUSTRY_DATA, "Fetch industry data"))
        .step(
            ExecutionStep::new(GET_INDUSTRY_COMPARISON, "Fetch peer comparison data")
                .with_arg("comparison_years", json!(2)),
        )
        .step(
            ExecutionStep::new(ANALYZE_COMPETITIVE_POSITION, "Analyze competitive position")
                .depends_on(GET_INDUSTRY_COMPARISON),
        )
        .step(
            ExecutionStep::new(IDENTIFY_INDUSTRY_TRENDS, "Identify industry trends")
                .depends_on(GET_INDUSTRY_DATA)
                .on_failure(OnFailure::Continue),
        )
        .step(
            ExecutionStep::new(ASSESS_INDUSTRY_RISKS, "Assess industry risks")
                .depends_on(ANALYZE_COMPETITIVE_POSITION),
        )
        .step(
            ExecutionStep::new(GENERATE_INDUSTRY_ANALYSIS_REPORT, "Generate industry analysis report")
                .depends_on(ASSESS_INDUSTRY_RISKS),
        )
        .build()
});

static VALUATION: LazyLock<Sequence> = LazyLock::new(|| {
    Sequence::builder(VALUATION_ANALYSIS)
        .step(ExecutionStep::new(GET_MARKET_DATA, "Fetch market data"))
        .step(
            ExecutionStep::new(CALCULATE_VALUATION_METRICS, "Calculate valuation metrics")
                .with_arg("method", json!("dcf")),
        )
        .step(
            ExecutionStep::new(PERFORM_RELATIVE_VALUATION, "Perform relative valuation")
                .depends_on(CALCULATE_VALUATION_METRICS),
        )
        .step(
            ExecutionStep::new(ANALYZE_TECHNICAL_INDICATORS, "Analyze technical indicators")
                .depends_on(GET_MARKET_DATA)
                .on_failure(OnFailure::Continue),
        )
        .step(
            ExecutionStep::new(CALCULATE_INTRINSIC_VALUE, "Calculate intrinsic value")
                .depends_on(PERFORM_RELATIVE_VALUATION),
        )
        .step(
            ExecutionStep::new(ASSESS_VALUATION_RISK, "Assess valuation risk")
                .depends_on(CALCULATE_INTRINSIC_VALUE),
        )
        .step(
            ExecutionStep::new(GENERATE_VALUATION_ANALYSIS_REPORT, "Generate valuation analysis report")
                .depends_on(ASSESS_VALUATION_RISK),
        )
        .build()
});

static INTEGRATION: LazyLock<Sequence> = LazyLock::new(|| {
    Sequence::builder(INTEGRATION_ANALYSIS)
        .step(ExecutionStep::new(COLLECT_ANALYSIS_RESULTS, "Collect stage results"))
        .step(
            ExecutionStep::new(ANALYZE_CONSISTENCY, "Check consistency across stages")
                .depends_on(COLLECT_ANALYSIS_RESULTS),
        )
        .step(
            ExecutionStep::new(CALCULATE_COMPREHENSIVE_SCORE, "Calculate comprehensive score")
                .depends_on(ANALYZE_CONSISTENCY),
        )
        .step(
            ExecutionStep::new(IDENTIFY_RISKS_AND_CATALYSTS, "Identify risks and catalysts")
                .depends_on(CALCULATE_COMPREHENSIVE_SCORE),
        )
        .step(
            ExecutionStep::new(DEVELOP_INVESTMENT_STRATEGY, "Develop investment strategy")
                .depends_on(IDENTIFY_RISKS_AND_CATALYSTS),
        )
        .step(
            ExecutionStep::new(GENERATE_COMPREHENSIVE_REPORT, "Generate comprehensive report")
                .depends_on(DEVELOP_INVESTMENT_STRATEGY),
        )
        .build()
});

/// Financial statements, ratios, health score
pub fn financial_analysis() -> &'static Sequence {
    &FINANCIAL
}

/// Industry position, trends, risks
pub fn industry_analysis() -> &'static Sequence {
    &INDUSTRY
}

/// Valuation metrics, intrinsic value, technicals
pub fn valuation_analysis() -> &'static Sequence {
    &VALUATION
}

/// Cross-stage synthesis into one recommendation
pub fn integration_analysis() -> &'static Sequence {
    &INTEGRATION
}

/// Look up a predefined sequence by name
///
/// Accepts the full sequence name (`"financial_analysis"`) or the stage
/// name alone (`"financial"`).
pub fn predefined(name: &str) -> Option<&'static Sequence> {
    let stage = name.strip_suffix("_analysis").unwrap_or(name);
    match stage {
        "financial" => Some(financial_analysis()),
        "industry" => Some(industry_analysis()),
        "valuation" => Some(valuation_analysis()),
        "integration" => Some(integration_analysis()),
        _ => None,
    }
}

/// All predefined sequences in stage order
pub fn all() -> [&'static Sequence; 4] {
    [
        financial_analysis(),
        industry_analysis(),
        valuation_analysis(),
        integration_analysis(),
    ]
}
