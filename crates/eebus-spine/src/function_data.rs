//! Per-feature typed storage for function payloads.
//!
//! Each feature holds at most one current value per function. Scalar
//! payloads overwrite on update; list payloads merge element-wise with
//! optional partial/delete filters (see [`crate::model::update_list`]).

use std::collections::HashMap;

use crate::error::SpineError;
use crate::model::{CmdData, Filter, FilterScope, Function, update_list};

#[derive(Debug, Default)]
pub struct FunctionDataStore {
    entries: HashMap<Function, CmdData>,
}

impl FunctionDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for a function, if one was ever stored.
    pub fn get(&self, function: Function) -> Option<&CmdData> {
        self.entries.get(&function)
    }

    /// Like [`get`](Self::get), failing with `DataNotAvailable` instead of
    /// returning `None`.
    pub fn data(&self, function: Function) -> Result<CmdData, SpineError> {
        self.entries
            .get(&function)
            .cloned()
            .ok_or(SpineError::DataNotAvailable { function })
    }

    /// Replace the stored value wholesale, regardless of payload shape.
    pub fn set(&mut self, data: CmdData) {
        self.entries.insert(data.function(), data);
    }

    /// Apply an incoming payload: lists merge, scalars overwrite.
    pub fn update(
        &mut self,
        data: CmdData,
        filter_partial: Option<&Filter>,
        filter_delete: Option<&Filter>,
    ) -> Result<(), SpineError> {
        let function = data.function();
        match data {
            CmdData::MeasurementListData(incoming) => {
                let mut current = match self.entries.remove(&function) {
                    Some(CmdData::MeasurementListData(d)) => d,
                    _ => Default::default(),
                };
                let partial = filter_partial.map(|f| {
                    FilterScope::from_selector(f.measurement_list_data_selectors.as_ref())
                });
                let delete = filter_delete.map(|f| {
                    FilterScope::from_selector(f.measurement_list_data_selectors.as_ref())
                });
                let result = update_list(
                    &mut current.measurement_data,
                    &incoming.measurement_data,
                    partial,
                    delete,
                );
                self.entries.insert(function, CmdData::MeasurementListData(current));
                result
            }
            CmdData::DeviceConfigurationKeyValueListData(incoming) => {
                let mut current = match self.entries.remove(&function) {
                    Some(CmdData::DeviceConfigurationKeyValueListData(d)) => d,
                    _ => Default::default(),
                };
                let partial = filter_partial.map(|f| {
                    FilterScope::from_selector(
                        f.device_configuration_key_value_list_data_selectors.as_ref(),
                    )
                });
                let delete = filter_delete.map(|f| {
                    FilterScope::from_selector(
                        f.device_configuration_key_value_list_data_selectors.as_ref(),
                    )
                });
                let result = update_list(
                    &mut current.device_configuration_key_value_data,
                    &incoming.device_configuration_key_value_data,
                    partial,
                    delete,
                );
                self.entries
                    .insert(function, CmdData::DeviceConfigurationKeyValueListData(current));
                result
            }
            CmdData::DeviceConfigurationKeyValueDescriptionListData(incoming) => {
                let mut current = match self.entries.remove(&function) {
                    Some(CmdData::DeviceConfigurationKeyValueDescriptionListData(d)) => d,
                    _ => Default::default(),
                };
                let partial = filter_partial.map(|f| {
                    FilterScope::from_selector(
                        f.device_configuration_key_value_description_list_data_selectors
                            .as_ref(),
                    )
                });
                let delete = filter_delete.map(|f| {
                    FilterScope::from_selector(
                        f.device_configuration_key_value_description_list_data_selectors
                            .as_ref(),
                    )
                });
                let result = update_list(
                    &mut current.device_configuration_key_value_description_data,
                    &incoming.device_configuration_key_value_description_data,
                    partial,
                    delete,
                );
                self.entries.insert(
                    function,
                    CmdData::DeviceConfigurationKeyValueDescriptionListData(current),
                );
                result
            }
            scalar => {
                self.entries.insert(function, scalar);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::measurement::{MeasurementData, MeasurementListData, MeasurementListDataSelectors};
    use crate::model::ScaledNumber;

    fn measurement(id: u32, value: i64) -> MeasurementData {
        MeasurementData {
            measurement_id: Some(id),
            value: Some(ScaledNumber::new(value)),
            ..Default::default()
        }
    }

    fn list(data: Vec<MeasurementData>) -> CmdData {
        CmdData::MeasurementListData(MeasurementListData {
            measurement_data: data,
        })
    }

    fn stored(store: &FunctionDataStore) -> Vec<MeasurementData> {
        match store.get(Function::MeasurementListData) {
            Some(CmdData::MeasurementListData(d)) => d.measurement_data.clone(),
            _ => panic!("no measurement list stored"),
        }
    }

    #[test]
    fn incoming_list_merges_by_measurement_id() {
        let mut store = FunctionDataStore::new();
        store
            .update(list(vec![measurement(0, 5), measurement(1, 7)]), None, None)
            .unwrap();
        store.update(list(vec![measurement(1, 9)]), None, None).unwrap();

        assert_eq!(stored(&store), vec![measurement(0, 5), measurement(1, 9)]);
    }

    #[test]
    fn delete_filter_removes_selected_element() {
        let mut store = FunctionDataStore::new();
        store
            .update(list(vec![measurement(0, 5), measurement(1, 7)]), None, None)
            .unwrap();

        let mut delete = Filter::delete();
        delete.measurement_list_data_selectors = Some(MeasurementListDataSelectors {
            measurement_id: Some(0),
            value_type: None,
        });
        store
            .update(list(vec![measurement(1, 9)]), None, Some(&delete))
            .unwrap();

        assert_eq!(stored(&store), vec![measurement(1, 9)]);
    }

    #[test]
    fn scalar_overwrites() {
        use crate::model::deviceclassification::DeviceClassificationManufacturerData;

        let mut store = FunctionDataStore::new();
        let first = DeviceClassificationManufacturerData {
            device_name: Some("one".into()),
            brand_name: Some("acme".into()),
            ..Default::default()
        };
        let second = DeviceClassificationManufacturerData {
            device_name: Some("two".into()),
            ..Default::default()
        };

        store
            .update(CmdData::DeviceClassificationManufacturerData(first), None, None)
            .unwrap();
        store
            .update(
                CmdData::DeviceClassificationManufacturerData(second.clone()),
                None,
                None,
            )
            .unwrap();

        // A scalar update replaces the whole record, absent fields included.
        assert_eq!(
            store.get(Function::DeviceClassificationManufacturerData),
            Some(&CmdData::DeviceClassificationManufacturerData(second))
        );
    }

    #[test]
    fn data_surfaces_not_available() {
        let store = FunctionDataStore::new();
        let err = store.data(Function::MeasurementListData).unwrap_err();
        assert_eq!(
            err,
            SpineError::DataNotAvailable {
                function: Function::MeasurementListData
            }
        );
    }
}
