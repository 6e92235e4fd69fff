//! Run variants: which dispatch, fault-injection and human-interaction
//! behavior a run exercises.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchStrategy;
use crate::error::SagaError;
use crate::order_fulfillment::SAGA_TYPE;

/// The scenario a run exercises. Fixed when the run is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaRunVariant {
    #[default]
    HappyPath,
    AdvancedVisibility,
    HumanInLoopSignal,
    HumanInLoopUpdate,
    ChildWorkflow,
    NexusOperation,
    #[serde(rename = "APIFailure")]
    ApiFailure,
    RecoverableFailure,
    NonRecoverableFailure,
}

impl SagaRunVariant {
    /// Every variant, in the order scenarios are offered.
    pub const ALL: [SagaRunVariant; 9] = [
        SagaRunVariant::HappyPath,
        SagaRunVariant::AdvancedVisibility,
        SagaRunVariant::HumanInLoopSignal,
        SagaRunVariant::HumanInLoopUpdate,
        SagaRunVariant::ChildWorkflow,
        SagaRunVariant::NexusOperation,
        SagaRunVariant::ApiFailure,
        SagaRunVariant::RecoverableFailure,
        SagaRunVariant::NonRecoverableFailure,
    ];

    /// Returns the scenario name, e.g. `HumanInLoopUpdate`.
    pub fn scenario_name(&self) -> &'static str {
        match self {
            SagaRunVariant::HappyPath => "HappyPath",
            SagaRunVariant::AdvancedVisibility => "AdvancedVisibility",
            SagaRunVariant::HumanInLoopSignal => "HumanInLoopSignal",
            SagaRunVariant::HumanInLoopUpdate => "HumanInLoopUpdate",
            SagaRunVariant::ChildWorkflow => "ChildWorkflow",
            SagaRunVariant::NexusOperation => "NexusOperation",
            SagaRunVariant::ApiFailure => "APIFailure",
            SagaRunVariant::RecoverableFailure => "RecoverableFailure",
            SagaRunVariant::NonRecoverableFailure => "NonRecoverableFailure",
        }
    }

    /// Returns the run type name, e.g. `OrderWorkflowHumanInLoopUpdate`.
    pub fn run_type(&self) -> String {
        format!("{SAGA_TYPE}{}", self.scenario_name())
    }

    /// Strategy used to ship each item.
    pub fn dispatch_strategy(&self) -> DispatchStrategy {
        match self {
            SagaRunVariant::ChildWorkflow => DispatchStrategy::ChildExecution,
            SagaRunVariant::NexusOperation => DispatchStrategy::RemoteOperation,
            _ => DispatchStrategy::Direct,
        }
    }

    /// Returns true if the run opens the address-correction window.
    pub fn awaits_address_update(&self) -> bool {
        matches!(
            self,
            SagaRunVariant::HumanInLoopSignal | SagaRunVariant::HumanInLoopUpdate
        )
    }

    /// Returns true if the run projects status labels for external indexing.
    pub fn projects_status(&self) -> bool {
        matches!(self, SagaRunVariant::AdvancedVisibility)
    }

    /// Returns true if the run raises the deliberate defect after charging.
    pub fn injects_simulated_fault(&self) -> bool {
        matches!(self, SagaRunVariant::RecoverableFailure)
    }
}

impl std::fmt::Display for SagaRunVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scenario_name())
    }
}

impl FromStr for SagaRunVariant {
    type Err = SagaError;

    /// Accepts a scenario name (`ChildWorkflow`) or a run type
    /// (`OrderWorkflowChildWorkflow`), ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let scenario = match trimmed.get(..SAGA_TYPE.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(SAGA_TYPE) => &trimmed[SAGA_TYPE.len()..],
            _ => trimmed,
        };
        Self::ALL
            .into_iter()
            .find(|variant| variant.scenario_name().eq_ignore_ascii_case(scenario))
            .ok_or_else(|| SagaError::UnknownScenario(s.to_string()))
    }
}
