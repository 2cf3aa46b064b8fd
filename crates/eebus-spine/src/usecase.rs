//! Registry of use cases the local device supports, served via
//! `nodeManagementUseCaseData`.

use std::collections::HashMap;

use crate::model::nodemanagement::{NodeManagementUseCaseData, UseCaseInformationData, UseCaseSupport};
use crate::model::{UseCaseActor, UseCaseName};

#[derive(Debug, Default)]
pub struct UseCaseManager {
    support: HashMap<UseCaseActor, Vec<UseCaseSupport>>,
}

impl UseCaseManager {
    pub fn add(
        &mut self,
        actor: UseCaseActor,
        name: UseCaseName,
        version: impl Into<String>,
        scenarios: Vec<u32>,
    ) {
        self.support.entry(actor).or_default().push(UseCaseSupport {
            use_case_name: Some(name),
            use_case_version: Some(version.into()),
            scenario_support: scenarios,
        });
    }

    pub fn use_case_information(&self) -> NodeManagementUseCaseData {
        let use_case_information = self
            .support
            .iter()
            .map(|(actor, support)| UseCaseInformationData {
                address: None,
                actor: Some(*actor),
                use_case_support: support.clone(),
            })
            .collect();
        NodeManagementUseCaseData {
            use_case_information,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_support_per_actor() {
        let mut manager = UseCaseManager::default();
        manager.add(
            UseCaseActor::Cem,
            UseCaseName::new("measurementOfElectricityDuringEvCharging"),
            "1.0.1",
            vec![1, 2, 3],
        );
        manager.add(
            UseCaseActor::Cem,
            UseCaseName::new("evseCommissioningAndConfiguration"),
            "1.0.1",
            vec![1, 2],
        );

        let data = manager.use_case_information();
        assert_eq!(data.use_case_information.len(), 1);
        assert_eq!(data.use_case_information[0].use_case_support.len(), 2);
    }
}
