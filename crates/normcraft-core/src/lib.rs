pub mod assemble;
pub mod details;
pub mod filter;
pub mod guide;
pub mod norm;
pub mod session;
pub mod store;
pub mod template;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use assemble::NormError;
pub use details::{
    AggregationProperty, AverageTimeDetails, CommonDetails, DirectlyFollowsDetails,
    EntityFollowsDetails, EventToEntityDetails, NormDetails, NormKindDetails,
    PropertyValueDetails, Relation, RelationOperator, ThresholdCondition,
};
pub use filter::{ExecutionFilter, Filter, FilterDataType, FilterError, FilterOperator, FilterValue};
pub use norm::{CreatedNorm, NormSpec, PropertyCondition};
pub use session::EditorSession;
pub use store::{Store, StoreError};

// --- Norm types ---

/// The closed set of norm kinds the analysis service understands.
///
/// Serialized with the tags the analysis backend dispatches on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
pub enum NormType {
    #[serde(rename = "AverageTimeBetweenActivitiesNorm")]
    AverageTimeBetweenActivities,
    #[serde(rename = "EntityFollowsEntityNorm")]
    EntityFollowsEntity,
    #[serde(rename = "EventToEntityRelationshipNorm")]
    EventToEntityRelationship,
    #[serde(rename = "ActivityDirectlyFollowsNorm")]
    ActivityDirectlyFollows,
    #[serde(rename = "EventPropertyValueNorm")]
    EventPropertyValue,
    #[serde(rename = "EntityPropertyValueNorm")]
    EntityPropertyValue,
}

impl NormType {
    pub const ALL: [NormType; 6] = [
        NormType::AverageTimeBetweenActivities,
        NormType::EntityFollowsEntity,
        NormType::EventToEntityRelationship,
        NormType::ActivityDirectlyFollows,
        NormType::EventPropertyValue,
        NormType::EntityPropertyValue,
    ];

    /// Wire tag, e.g. "ActivityDirectlyFollowsNorm".
    pub fn tag(self) -> &'static str {
        match self {
            NormType::AverageTimeBetweenActivities => "AverageTimeBetweenActivitiesNorm",
            NormType::EntityFollowsEntity => "EntityFollowsEntityNorm",
            NormType::EventToEntityRelationship => "EventToEntityRelationshipNorm",
            NormType::ActivityDirectlyFollows => "ActivityDirectlyFollowsNorm",
            NormType::EventPropertyValue => "EventPropertyValueNorm",
            NormType::EntityPropertyValue => "EntityPropertyValueNorm",
        }
    }

    pub fn is_property_value(self) -> bool {
        matches!(
            self,
            NormType::EventPropertyValue | NormType::EntityPropertyValue
        )
    }

    /// Two-node norms are drawn as source → target with a single edge.
    pub fn is_two_node(self) -> bool {
        !self.is_property_value()
    }
}

impl fmt::Display for NormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// --- Graph (canvas) types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Source,
    Target,
    Single,
}

impl NodeRole {
    /// Reserved canvas id for the node playing this role.
    pub fn node_id(self) -> &'static str {
        match self {
            NodeRole::Source => "source-node",
            NodeRole::Target => "target-node",
            NodeRole::Single => "single-node",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeRole::Source => "source",
            NodeRole::Target => "target",
            NodeRole::Single => "single",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a node stands for a logged activity occurrence or a business object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeConcept {
    Event,
    Entity,
}

impl NodeConcept {
    /// Configured graph label for this concept.
    pub fn label(self, config: &GlobalProcessConfig) -> &str {
        match self {
            NodeConcept::Event => &config.event_node_label,
            NodeConcept::Entity => &config.entity_node_label,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            NodeConcept::Event => "calendar",
            NodeConcept::Entity => "box",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormNodeData {
    pub role: NodeRole,
    /// Configured event or entity label, e.g. "Event".
    #[serde(rename = "type")]
    pub node_type: String,
    /// Activity or entity identifier the norm will reference.
    #[serde(default)]
    pub name: String,
    pub label: String,
    pub icon: String,
}

/// A node on the norm canvas. Matches ReactFlow's Node structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub kind: String,
    #[serde(default)]
    pub position: Position,
    pub data: NormNodeData,
}

fn default_node_type() -> String {
    "normNode".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormEdgeData {
    pub label: String,
    #[serde(default)]
    pub forbidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeStyle {
    pub stroke: String,
}

/// An edge on the norm canvas. Matches ReactFlow's Edge structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    pub data: NormEdgeData,
    pub style: EdgeStyle,
}

/// Nodes and edges currently on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NormGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl NormGraph {
    pub fn node(&self, role: NodeRole) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.data.role == role)
    }

    pub fn node_mut(&mut self, role: NodeRole) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.data.role == role)
    }
}

/// Generate an edge ID from source and target node IDs.
pub fn make_edge_id(source: &str, target: &str) -> String {
    format!("edge-{}-{}", source, target)
}

// --- Global process configuration ---

/// Where an attribute lives in the graph: inline on the node, or as a
/// separate attribute node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    #[default]
    Property,
    Node,
}

/// Mapping of norm concepts onto the event knowledge graph schema.
///
/// Read-only for the editor core: it only seeds labels and relationship names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalProcessConfig {
    pub event_node_label: String,
    pub entity_node_label: String,
    pub activity_property: String,
    pub entity_filter_property: String,
    pub timestamp_property: String,
    pub df_rel_name: String,
    pub corr_rel_name: String,
    pub df_entity_rel_name: String,
    pub attribute_storage_strategy: StorageLocation,
    pub attribute_node_label: String,
    pub attribute_rel_name: String,
    pub attribute_name_property: String,
    pub attribute_value_property: String,
    pub diagnostic_node_label: String,
    pub compliance_rel_name: String,
}

impl Default for GlobalProcessConfig {
    fn default() -> Self {
        Self {
            event_node_label: "Event".to_string(),
            entity_node_label: "Entity".to_string(),
            activity_property: "type".to_string(),
            entity_filter_property: "type".to_string(),
            timestamp_property: "time".to_string(),
            df_rel_name: "DF".to_string(),
            corr_rel_name: "CORR".to_string(),
            df_entity_rel_name: "DF_ENTITY".to_string(),
            attribute_storage_strategy: StorageLocation::Property,
            attribute_node_label: "Attribute".to_string(),
            attribute_rel_name: "HAS_ATTRIBUTE".to_string(),
            attribute_name_property: "name".to_string(),
            attribute_value_property: "value".to_string(),
            diagnostic_node_label: "Diagnostic".to_string(),
            compliance_rel_name: "COMPLIES_WITH".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_type_serializes_as_backend_tag() {
        let json = serde_json::to_string(&NormType::EventPropertyValue).unwrap();
        assert_eq!(json, "\"EventPropertyValueNorm\"");
    }

    #[test]
    fn partial_config_fills_missing_fields_with_defaults() {
        let config: GlobalProcessConfig =
            serde_json::from_str(r#"{"event_node_label":"Ev","attribute_storage_strategy":"node"}"#)
                .unwrap();
        assert_eq!(config.event_node_label, "Ev");
        assert_eq!(config.entity_node_label, "Entity");
        assert_eq!(config.attribute_storage_strategy, StorageLocation::Node);
    }
}
