use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ExecutionFilter, FilterOperator, NormType, RelationOperator, ThresholdCondition};

/// Main property condition of a property-value norm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyCondition {
    pub target_name: String,
    pub property_name: String,
    pub operator: FilterOperator,
    /// Coerced per the main filter's data type.
    pub value: Value,
    #[serde(default)]
    pub aggregation_properties: Vec<String>,
}

/// Type-specific fields of a created norm, tagged with the backend's norm type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "norm_type")]
pub enum NormSpec {
    #[serde(rename = "AverageTimeBetweenActivitiesNorm")]
    AverageTimeBetweenActivities {
        activity_a: String,
        activity_b: String,
        threshold_seconds: i64,
        threshold_condition: ThresholdCondition,
        #[serde(default)]
        aggregation_properties: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        df_type_prop_value: Option<String>,
    },
    #[serde(rename = "EntityFollowsEntityNorm")]
    EntityFollowsEntity {
        entity_type_a: String,
        entity_type_b: String,
        #[serde(default)]
        aggregation_properties: Vec<String>,
    },
    #[serde(rename = "EventToEntityRelationshipNorm")]
    EventToEntityRelationship {
        context_entity_type: String,
        target_activity: String,
        operator: RelationOperator,
        count: i64,
        #[serde(default)]
        aggregation_properties: Vec<String>,
    },
    #[serde(rename = "ActivityDirectlyFollowsNorm")]
    ActivityDirectlyFollows {
        activity_a: String,
        activity_b: String,
        forbidden: bool,
    },
    #[serde(rename = "EventPropertyValueNorm")]
    EventPropertyValue(PropertyCondition),
    #[serde(rename = "EntityPropertyValueNorm")]
    EntityPropertyValue(PropertyCondition),
}

impl NormSpec {
    pub fn norm_type(&self) -> NormType {
        match self {
            NormSpec::AverageTimeBetweenActivities { .. } => NormType::AverageTimeBetweenActivities,
            NormSpec::EntityFollowsEntity { .. } => NormType::EntityFollowsEntity,
            NormSpec::EventToEntityRelationship { .. } => NormType::EventToEntityRelationship,
            NormSpec::ActivityDirectlyFollows { .. } => NormType::ActivityDirectlyFollows,
            NormSpec::EventPropertyValue(_) => NormType::EventPropertyValue,
            NormSpec::EntityPropertyValue(_) => NormType::EntityPropertyValue,
        }
    }

    pub fn aggregation_properties(&self) -> &[String] {
        match self {
            NormSpec::AverageTimeBetweenActivities {
                aggregation_properties,
                ..
            }
            | NormSpec::EntityFollowsEntity {
                aggregation_properties,
                ..
            }
            | NormSpec::EventToEntityRelationship {
                aggregation_properties,
                ..
            } => aggregation_properties,
            NormSpec::EventPropertyValue(c) | NormSpec::EntityPropertyValue(c) => {
                &c.aggregation_properties
            }
            NormSpec::ActivityDirectlyFollows { .. } => &[],
        }
    }
}

/// A finished norm, as handed to the analysis service and the norm store.
///
/// Field names are a wire contract; renaming any of them breaks consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedNorm {
    pub norm_id: String,
    pub description: String,
    pub weight: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub spec: NormSpec,
    #[serde(default)]
    pub execution_filters: Vec<ExecutionFilter>,
}

fn default_enabled() -> bool {
    true
}

impl CreatedNorm {
    pub fn norm_type(&self) -> NormType {
        self.spec.norm_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn created_norm_serializes_flat_with_type_tag() {
        let norm = CreatedNorm {
            norm_id: "df-1".into(),
            description: "d".into(),
            weight: 1.0,
            enabled: true,
            spec: NormSpec::ActivityDirectlyFollows {
                activity_a: "A".into(),
                activity_b: "B".into(),
                forbidden: true,
            },
            execution_filters: vec![],
        };
        let v = serde_json::to_value(&norm).unwrap();
        assert_eq!(
            v,
            json!({
                "norm_id": "df-1",
                "description": "d",
                "weight": 1.0,
                "enabled": true,
                "norm_type": "ActivityDirectlyFollowsNorm",
                "activity_a": "A",
                "activity_b": "B",
                "forbidden": true,
                "execution_filters": []
            })
        );
    }

    #[test]
    fn stored_norm_without_enabled_flag_loads_enabled() {
        let raw = json!({
            "norm_id": "pv-1",
            "description": "d",
            "weight": 2.0,
            "norm_type": "EventPropertyValueNorm",
            "target_name": "Approve Invoice",
            "property_name": "amount",
            "operator": ">=",
            "value": 1000
        });
        let norm: CreatedNorm = serde_json::from_value(raw).unwrap();
        assert!(norm.enabled);
        assert_eq!(norm.norm_type(), NormType::EventPropertyValue);
        assert!(norm.execution_filters.is_empty());
        match norm.spec {
            NormSpec::EventPropertyValue(c) => assert_eq!(c.value, json!(1000)),
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn avg_time_omits_empty_relationship_label() {
        let spec = NormSpec::AverageTimeBetweenActivities {
            activity_a: "A".into(),
            activity_b: "B".into(),
            threshold_seconds: 60,
            threshold_condition: ThresholdCondition::LessThan,
            aggregation_properties: vec!["region".into()],
            df_type_prop_value: None,
        };
        let v = serde_json::to_value(&spec).unwrap();
        assert!(v.get("df_type_prop_value").is_none());
        assert_eq!(v["threshold_condition"], "less than");
    }
}
