//! Analysis stages

use serde::{Deserialize, Serialize};
use stockflow_executor::{Sequence, sequences};

/// One stage of a full analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Financial,
    Industry,
    Valuation,
    Integration,
}

impl AnalysisStage {
    /// Every stage in run order
    pub const ALL: [AnalysisStage; 4] = [
        AnalysisStage::Financial,
        AnalysisStage::Industry,
        AnalysisStage::Valuation,
        AnalysisStage::Integration,
    ];

    /// The stages integration consumes
    pub const RESEARCH: [AnalysisStage; 3] = [
        AnalysisStage::Financial,
        AnalysisStage::Industry,
        AnalysisStage::Valuation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisStage::Financial => "financial",
            AnalysisStage::Industry => "industry",
            AnalysisStage::Valuation => "valuation",
            AnalysisStage::Integration => "integration",
        }
    }

    /// The predefined sequence for this stage
    pub fn sequence(&self) -> &'static Sequence {
        match self {
            AnalysisStage::Financial => sequences::financial_analysis(),
            AnalysisStage::Industry => sequences::industry_analysis(),
            AnalysisStage::Valuation => sequences::valuation_analysis(),
            AnalysisStage::Integration => sequences::integration_analysis(),
        }
    }

    /// Context key later stages read this stage's report from
    pub fn report_key(&self) -> &'static str {
        match self {
            AnalysisStage::Financial => "financial_report",
            AnalysisStage::Industry => "industry_report",
            AnalysisStage::Valuation => "valuation_report",
            AnalysisStage::Integration => "final_report",
        }
    }
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for AnalysisStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stage = s.trim().to_ascii_lowercase();
        let stage = stage.strip_suffix("_analysis").unwrap_or(&stage);
        AnalysisStage::ALL
            .into_iter()
            .find(|candidate| candidate.name() == stage)
            .ok_or_else(|| format!("unknown analysis stage: {s}"))
    }
}
