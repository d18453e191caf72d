//! Canvas skeletons for each norm type.
//!
//! Everything here is a pure function of (norm type, details, config). The
//! resolved graph always replaces the previous one wholesale.

use crate::{
    make_edge_id, EdgeStyle, GlobalProcessConfig, GraphEdge, GraphNode, NodeConcept, NodeRole,
    NormDetails, NormEdgeData, NormGraph, NormNodeData, NormType, Position, Relation,
};

pub const SOURCE_POSITION: Position = Position { x: 100.0, y: 150.0 };
pub const TARGET_POSITION: Position = Position { x: 450.0, y: 150.0 };
pub const SINGLE_POSITION: Position = Position { x: 275.0, y: 150.0 };

pub const EDGE_STROKE: &str = "#555555";
pub const FORBIDDEN_STROKE: &str = "#e53e3e";
pub const WARNING_GLYPH: &str = "⚠";

/// Roles a norm type draws, with the concept each role stands for.
pub fn roles(norm_type: NormType) -> &'static [(NodeRole, NodeConcept)] {
    use NodeConcept::{Entity, Event};
    use NodeRole::{Single, Source, Target};
    match norm_type {
        NormType::EventPropertyValue => &[(Single, Event)],
        NormType::EntityPropertyValue => &[(Single, Entity)],
        NormType::AverageTimeBetweenActivities | NormType::ActivityDirectlyFollows => {
            &[(Source, Event), (Target, Event)]
        }
        NormType::EntityFollowsEntity => &[(Source, Entity), (Target, Entity)],
        // Context entity on the left, measured activity on the right.
        NormType::EventToEntityRelationship => &[(Source, Entity), (Target, Event)],
    }
}

/// Label shown on a node until the user names it.
pub fn placeholder(norm_type: NormType, role: NodeRole) -> &'static str {
    match (norm_type, role) {
        (NormType::EventToEntityRelationship, NodeRole::Source) => "Context Entity",
        (NormType::EventToEntityRelationship, _) => "Target Activity",
        (NormType::EntityFollowsEntity, NodeRole::Source) => "Entity A",
        (NormType::EntityFollowsEntity, _) => "Entity B",
        (NormType::EventPropertyValue, _) => "Activity",
        (NormType::EntityPropertyValue, _) => "Entity",
        (_, NodeRole::Source) => "Activity A",
        (_, _) => "Activity B",
    }
}

/// Display label for a node: its name, or the placeholder while unnamed.
pub fn node_label(norm_type: NormType, role: NodeRole, name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        placeholder(norm_type, role).to_string()
    } else {
        name.to_string()
    }
}

fn default_position(role: NodeRole) -> Position {
    match role {
        NodeRole::Source => SOURCE_POSITION,
        NodeRole::Target => TARGET_POSITION,
        NodeRole::Single => SINGLE_POSITION,
    }
}

/// Build the node/edge skeleton for a norm type.
pub fn resolve(
    norm_type: NormType,
    details: &NormDetails,
    config: &GlobalProcessConfig,
) -> NormGraph {
    let nodes: Vec<GraphNode> = roles(norm_type)
        .iter()
        .map(|&(role, concept)| GraphNode {
            id: role.node_id().to_string(),
            kind: "normNode".to_string(),
            position: default_position(role),
            data: NormNodeData {
                role,
                node_type: concept.label(config).to_string(),
                name: String::new(),
                label: placeholder(norm_type, role).to_string(),
                icon: concept.icon().to_string(),
            },
        })
        .collect();

    let mut edges = Vec::new();
    if nodes.len() == 2 {
        let source = NodeRole::Source.node_id();
        let target = NodeRole::Target.node_id();
        let mut edge = GraphEdge {
            id: make_edge_id(source, target),
            source: source.to_string(),
            target: target.to_string(),
            label: String::new(),
            data: NormEdgeData {
                label: String::new(),
                forbidden: false,
            },
            style: EdgeStyle {
                stroke: EDGE_STROKE.to_string(),
            },
        };
        style_edge(&mut edge, norm_type, details, config);
        edges.push(edge);
    }

    NormGraph { nodes, edges }
}

/// Relationship label for a norm's edge.
///
/// Falls back from the user's label, to the configured relationship name, to
/// the built-in default. `None` for single-node norm types.
pub fn edge_label(
    norm_type: NormType,
    details: &NormDetails,
    config: &GlobalProcessConfig,
) -> Option<String> {
    let relation = Relation::of(norm_type)?;
    let user = if Relation::of(details.norm_type()) == Some(relation) {
        details.kind.relation_label()
    } else {
        None
    };
    let label = [user, Some(relation.configured_name(config))]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(relation.default_label());
    Some(label.to_string())
}

/// Restyle an existing edge in place (label, warning glyph, stroke).
///
/// Touches only the edge, never nodes or their positions.
pub fn style_edge(
    edge: &mut GraphEdge,
    norm_type: NormType,
    details: &NormDetails,
    config: &GlobalProcessConfig,
) {
    let label = edge_label(norm_type, details, config).unwrap_or_default();
    let forbidden = norm_type == NormType::ActivityDirectlyFollows && details.is_forbidden();

    edge.label = if forbidden {
        format!("{} {}", WARNING_GLYPH, label)
    } else {
        label.clone()
    };
    edge.data = NormEdgeData { label, forbidden };
    edge.style.stroke = if forbidden { FORBIDDEN_STROKE } else { EDGE_STROKE }.to_string();
}
