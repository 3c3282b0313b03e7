//! The record types carried between the coordinator's three phases.

use crate::indicators::IndicatorConfig;
use crate::session::AddedBy;
use sessionr_data::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    NewSymbol,
    UpgradeSymbol,
    ExistingSymbol,
    NewInterval,
    NewIndicator,
}

/// One ordered unit of provisioning work. Execution stops at the
/// first failing step and never rolls back: the store's idempotent
/// registration makes a retry of the whole request safe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionStep {
    CreateSymbol,
    UpgradeSymbol,
    AddInterval(Interval),
    RegisterIndicator(IndicatorConfig),
    LoadHistorical,
    CalculateQuality,
}

impl ProvisionStep {
    pub fn describe(&self) -> String {
        match self {
            ProvisionStep::CreateSymbol => "create_symbol".to_string(),
            ProvisionStep::UpgradeSymbol => "upgrade_symbol".to_string(),
            ProvisionStep::AddInterval(interval) => format!("add_interval_{interval}"),
            ProvisionStep::RegisterIndicator(config) => {
                format!("register_indicator_{}", config.key())
            }
            ProvisionStep::LoadHistorical => "load_historical".to_string(),
            ProvisionStep::CalculateQuality => "calculate_quality".to_string(),
        }
    }
}

/// Phase-2 verdict with its boolean sub-flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub can_proceed: bool,
    pub reason: Option<String>,
    pub data_source_available: bool,
    pub historical_available: bool,
    pub intervals_derivable: bool,
    pub duplicate: bool,
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            can_proceed: true,
            reason: None,
            data_source_available: true,
            historical_available: true,
            intervals_derivable: true,
            duplicate: false,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            can_proceed: false,
            reason: Some(reason.into()),
            ..Self::passed()
        }
    }
}

/// Phase-1 output: everything the later phases need to know about one
/// request.
#[derive(Debug, Clone)]
pub struct ProvisioningRequirements {
    pub operation: OperationKind,
    pub symbol: String,
    pub source: AddedBy,
    pub required_intervals: Vec<Interval>,
    pub base_interval: Interval,
    pub historical_days: u32,
    pub needs_session: bool,
    pub indicator: Option<IndicatorConfig>,
    pub meets_session_config_requirements: bool,
    pub auto_provisioned: bool,
    pub steps: Vec<ProvisionStep>,
    pub validation: ValidationResult,
}

/// What a public entry point hands back: never a panic, never an
/// error type, just success plus a reason on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

impl ProvisionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Per-symbol result of batch initialization.
#[derive(Debug, Clone)]
pub struct SymbolReport {
    pub symbol: String,
    pub outcome: ProvisionOutcome,
    pub quality: Option<f64>,
}
