//! Per-norm form state.
//!
//! `NormDetails` carries the fields every norm shares plus one variant per
//! norm type. `NormDetails::for_type` is the only way to move between types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Filter, GlobalProcessConfig, NormType, StorageLocation};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, schemars::JsonSchema)]
pub enum ThresholdCondition {
    #[default]
    #[serde(rename = "less than")]
    LessThan,
    #[serde(rename = "greater than")]
    GreaterThan,
}

impl ThresholdCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdCondition::LessThan => "less than",
            ThresholdCondition::GreaterThan => "greater than",
        }
    }
}

impl fmt::Display for ThresholdCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many correlated events an entity must have.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, schemars::JsonSchema)]
pub enum RelationOperator {
    #[default]
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "not exists")]
    NotExists,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl RelationOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationOperator::Exists => "exists",
            RelationOperator::NotExists => "not exists",
            RelationOperator::Eq => "==",
            RelationOperator::Ne => "!=",
            RelationOperator::Gt => ">",
            RelationOperator::Lt => "<",
            RelationOperator::Ge => ">=",
            RelationOperator::Le => "<=",
        }
    }

    /// `exists` and `not exists` imply their count; the others read it from input.
    pub fn implied_count(self) -> Option<i64> {
        match self {
            RelationOperator::Exists => Some(1),
            RelationOperator::NotExists => Some(0),
            _ => None,
        }
    }
}

impl fmt::Display for RelationOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dimension compliance results are grouped by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, schemars::JsonSchema)]
pub struct AggregationProperty {
    pub name: String,
    #[serde(default)]
    pub storage: StorageLocation,
}

/// Graph relationship a two-node norm is drawn along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    DirectlyFollows,
    EntityDirectlyFollows,
    Correlation,
}

impl Relation {
    pub fn of(norm_type: NormType) -> Option<Relation> {
        match norm_type {
            NormType::AverageTimeBetweenActivities | NormType::ActivityDirectlyFollows => {
                Some(Relation::DirectlyFollows)
            }
            NormType::EntityFollowsEntity => Some(Relation::EntityDirectlyFollows),
            NormType::EventToEntityRelationship => Some(Relation::Correlation),
            NormType::EventPropertyValue | NormType::EntityPropertyValue => None,
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            Relation::DirectlyFollows => "DF",
            Relation::EntityDirectlyFollows => "DF_ENTITY",
            Relation::Correlation => "corr",
        }
    }

    pub fn configured_name(self, config: &GlobalProcessConfig) -> &str {
        match self {
            Relation::DirectlyFollows => &config.df_rel_name,
            Relation::EntityDirectlyFollows => &config.df_entity_rel_name,
            Relation::Correlation => &config.corr_rel_name,
        }
    }
}

// --- Per-type fields ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AverageTimeDetails {
    /// Raw form input; validated as numeric before assembly.
    pub threshold_seconds: String,
    pub threshold_condition: ThresholdCondition,
    pub aggregation_properties: Vec<AggregationProperty>,
    pub df_type_prop_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EntityFollowsDetails {
    pub aggregation_properties: Vec<AggregationProperty>,
    pub df_entity_type_prop_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EventToEntityDetails {
    pub operator: RelationOperator,
    /// Raw form input; only read for counting operators.
    pub count: String,
    pub aggregation_properties: Vec<AggregationProperty>,
    pub corr_type_prop_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DirectlyFollowsDetails {
    pub forbidden: bool,
    pub df_type_prop_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PropertyValueDetails {
    pub aggregation_properties: Vec<AggregationProperty>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "norm_type")]
pub enum NormKindDetails {
    #[serde(rename = "AverageTimeBetweenActivitiesNorm")]
    AverageTime(AverageTimeDetails),
    #[serde(rename = "EntityFollowsEntityNorm")]
    EntityFollows(EntityFollowsDetails),
    #[serde(rename = "EventToEntityRelationshipNorm")]
    EventToEntity(EventToEntityDetails),
    #[serde(rename = "ActivityDirectlyFollowsNorm")]
    DirectlyFollows(DirectlyFollowsDetails),
    #[serde(rename = "EventPropertyValueNorm")]
    EventPropertyValue(PropertyValueDetails),
    #[serde(rename = "EntityPropertyValueNorm")]
    EntityPropertyValue(PropertyValueDetails),
}

impl NormKindDetails {
    pub fn defaults(norm_type: NormType) -> Self {
        match norm_type {
            NormType::AverageTimeBetweenActivities => Self::AverageTime(Default::default()),
            NormType::EntityFollowsEntity => Self::EntityFollows(Default::default()),
            NormType::EventToEntityRelationship => Self::EventToEntity(Default::default()),
            NormType::ActivityDirectlyFollows => Self::DirectlyFollows(Default::default()),
            NormType::EventPropertyValue => Self::EventPropertyValue(Default::default()),
            NormType::EntityPropertyValue => Self::EntityPropertyValue(Default::default()),
        }
    }

    pub fn norm_type(&self) -> NormType {
        match self {
            Self::AverageTime(_) => NormType::AverageTimeBetweenActivities,
            Self::EntityFollows(_) => NormType::EntityFollowsEntity,
            Self::EventToEntity(_) => NormType::EventToEntityRelationship,
            Self::DirectlyFollows(_) => NormType::ActivityDirectlyFollows,
            Self::EventPropertyValue(_) => NormType::EventPropertyValue,
            Self::EntityPropertyValue(_) => NormType::EntityPropertyValue,
        }
    }

    /// User-facing relationship label shown on the edge, if this type has one.
    pub fn relation_label(&self) -> Option<&str> {
        match self {
            Self::AverageTime(d) => Some(&d.df_type_prop_value),
            Self::DirectlyFollows(d) => Some(&d.df_type_prop_value),
            Self::EntityFollows(d) => Some(&d.df_entity_type_prop_value),
            Self::EventToEntity(d) => Some(&d.corr_type_prop_value),
            Self::EventPropertyValue(_) | Self::EntityPropertyValue(_) => None,
        }
    }

    pub fn relation_label_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::AverageTime(d) => Some(&mut d.df_type_prop_value),
            Self::DirectlyFollows(d) => Some(&mut d.df_type_prop_value),
            Self::EntityFollows(d) => Some(&mut d.df_entity_type_prop_value),
            Self::EventToEntity(d) => Some(&mut d.corr_type_prop_value),
            Self::EventPropertyValue(_) | Self::EntityPropertyValue(_) => None,
        }
    }

    pub fn aggregation_properties(&self) -> &[AggregationProperty] {
        match self {
            Self::AverageTime(d) => &d.aggregation_properties,
            Self::EntityFollows(d) => &d.aggregation_properties,
            Self::EventToEntity(d) => &d.aggregation_properties,
            Self::EventPropertyValue(d) | Self::EntityPropertyValue(d) => &d.aggregation_properties,
            Self::DirectlyFollows(_) => &[],
        }
    }

    /// `None` for norm types that do not aggregate.
    pub fn aggregation_properties_mut(&mut self) -> Option<&mut Vec<AggregationProperty>> {
        match self {
            Self::AverageTime(d) => Some(&mut d.aggregation_properties),
            Self::EntityFollows(d) => Some(&mut d.aggregation_properties),
            Self::EventToEntity(d) => Some(&mut d.aggregation_properties),
            Self::EventPropertyValue(d) | Self::EntityPropertyValue(d) => {
                Some(&mut d.aggregation_properties)
            }
            Self::DirectlyFollows(_) => None,
        }
    }
}

/// Fields that survive a norm type change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonDetails {
    /// Blank means "generate one at assembly".
    pub norm_id: String,
    /// Blank means "generate from the norm's fields".
    pub description: String,
    pub weight: f64,
}

impl Default for CommonDetails {
    fn default() -> Self {
        Self {
            norm_id: String::new(),
            description: String::new(),
            weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormDetails {
    #[serde(flatten)]
    pub common: CommonDetails,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(flatten)]
    pub kind: NormKindDetails,
}

impl NormDetails {
    /// Fresh details for a type, with the relationship label seeded from config.
    pub fn new(norm_type: NormType, config: &GlobalProcessConfig) -> Self {
        let mut details = Self {
            common: CommonDetails::default(),
            filters: default_filters(norm_type),
            kind: NormKindDetails::defaults(norm_type),
        };
        if let (Some(relation), Some(slot)) =
            (Relation::of(norm_type), details.kind.relation_label_mut())
        {
            *slot = relation.configured_name(config).to_string();
        }
        details
    }

    /// Details for `norm_type` derived from the previous details.
    ///
    /// Keeps id, description and weight. Every other field takes the type
    /// default, except the relationship label, which carries over a custom
    /// value when the previous type was drawn along the same relationship.
    pub fn for_type(
        previous: &NormDetails,
        norm_type: NormType,
        config: &GlobalProcessConfig,
    ) -> Self {
        let mut details = Self::new(norm_type, config);
        details.common = previous.common.clone();

        let same_relation = Relation::of(norm_type).is_some()
            && Relation::of(previous.norm_type()) == Relation::of(norm_type);
        if same_relation {
            let carried = previous
                .kind
                .relation_label()
                .filter(|label| !label.trim().is_empty());
            if let (Some(carried), Some(slot)) = (carried, details.kind.relation_label_mut()) {
                *slot = carried.to_string();
            }
        }
        details
    }

    /// Replace a relationship label that still follows the configuration.
    ///
    /// A label that is blank or equal to the old configured name is taken to
    /// be a seeded default rather than user input.
    pub fn reseed_relation_label(
        &mut self,
        old_config: &GlobalProcessConfig,
        new_config: &GlobalProcessConfig,
    ) {
        let Some(relation) = Relation::of(self.norm_type()) else {
            return;
        };
        if let Some(slot) = self.kind.relation_label_mut() {
            if slot.trim().is_empty() || slot.as_str() == relation.configured_name(old_config) {
                *slot = relation.configured_name(new_config).to_string();
            }
        }
    }

    pub fn norm_type(&self) -> NormType {
        self.kind.norm_type()
    }

    /// True for a directly-follows norm marked as forbidden.
    pub fn is_forbidden(&self) -> bool {
        matches!(&self.kind, NormKindDetails::DirectlyFollows(d) if d.forbidden)
    }
}

fn default_filters(norm_type: NormType) -> Vec<Filter> {
    if norm_type.is_property_value() {
        vec![Filter::default()]
    } else {
        Vec::new()
    }
}
