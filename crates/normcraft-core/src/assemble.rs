//! Validation and assembly of a finished norm from canvas nodes and details.

use chrono::{DateTime, Utc};

use crate::{
    AggregationProperty, CreatedNorm, ExecutionFilter, Filter, GlobalProcessConfig, GraphNode,
    NodeRole, NormDetails, NormKindDetails, NormSpec, NormType, PropertyCondition,
    RelationOperator, ThresholdCondition,
};

/// Why a norm cannot be assembled yet. Messages are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormError {
    #[error("Details are for {found}, but the selected norm type is {expected}.")]
    DetailsMismatch { expected: NormType, found: NormType },
    #[error("Please enter a name for the {0} node.")]
    MissingNodeName(NodeRole),
    #[error("Threshold (seconds) must be a number.")]
    InvalidThreshold,
    #[error("Threshold (seconds) cannot be negative.")]
    NegativeThreshold,
    #[error("Add at least one filter to define the property condition.")]
    MissingFilter,
    #[error("The main filter needs both a property name and a value.")]
    IncompleteMainFilter,
    #[error("Filter {position} needs both a property name and a value.")]
    IncompleteFilter { position: usize },
    #[error("Count must be a whole number for operator \"{0}\".")]
    InvalidCount(RelationOperator),
    #[error("Filter \"{name}\" expects a number.")]
    InvalidNumber { name: String },
}

fn node_name(nodes: &[GraphNode], role: NodeRole) -> &str {
    nodes
        .iter()
        .find(|n| n.data.role == role)
        .map(|n| n.data.name.trim())
        .unwrap_or("")
}

fn require_name(nodes: &[GraphNode], role: NodeRole) -> Result<&str, NormError> {
    let name = node_name(nodes, role);
    if name.is_empty() {
        Err(NormError::MissingNodeName(role))
    } else {
        Ok(name)
    }
}

fn parse_threshold(raw: &str) -> Result<f64, NormError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if !v.is_finite() => Err(NormError::InvalidThreshold),
        Ok(v) if v < 0.0 => Err(NormError::NegativeThreshold),
        Ok(v) => Ok(v),
        Err(_) => Err(NormError::InvalidThreshold),
    }
}

fn parse_count(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Check that nodes and details are complete enough to assemble.
///
/// Reports the first failing rule only.
pub fn validate(
    norm_type: NormType,
    nodes: &[GraphNode],
    details: &NormDetails,
) -> Result<(), NormError> {
    if details.norm_type() != norm_type {
        return Err(NormError::DetailsMismatch {
            expected: norm_type,
            found: details.norm_type(),
        });
    }

    if norm_type.is_two_node() {
        require_name(nodes, NodeRole::Source)?;
        require_name(nodes, NodeRole::Target)?;
    }

    if let NormKindDetails::AverageTime(d) = &details.kind {
        parse_threshold(&d.threshold_seconds)?;
    }

    if norm_type.is_property_value() {
        require_name(nodes, NodeRole::Single)?;
        let main = details.filters.first().ok_or(NormError::MissingFilter)?;
        if !main.is_complete() {
            return Err(NormError::IncompleteMainFilter);
        }
    }

    if let Some(i) = details.filters.iter().position(|f| !f.is_complete()) {
        return Err(NormError::IncompleteFilter { position: i + 1 });
    }

    if let NormKindDetails::EventToEntity(d) = &details.kind {
        if d.operator.implied_count().is_none() && parse_count(&d.count).is_none() {
            return Err(NormError::InvalidCount(d.operator));
        }
    }

    if let Some(f) = details.filters.iter().find(|f| f.has_invalid_number()) {
        return Err(NormError::InvalidNumber {
            name: f.name.trim().to_string(),
        });
    }

    Ok(())
}

fn aggregation_names(props: &[AggregationProperty]) -> Vec<String> {
    props
        .iter()
        .map(|p| p.name.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Filters after the main one.
///
/// When none remain and the norm is not a property-value norm, every filter is
/// used instead. Kept for compatibility with norm sets already in use.
fn execution_filters(norm_type: NormType, filters: &[Filter]) -> Vec<ExecutionFilter> {
    let rest: Vec<ExecutionFilter> = filters.iter().skip(1).map(Filter::to_execution).collect();
    if rest.is_empty() && !norm_type.is_property_value() {
        filters.iter().map(Filter::to_execution).collect()
    } else {
        rest
    }
}

/// Validate, then build the norm record.
///
/// `now` stamps generated identifiers as `<tag>-<unix millis>`. Two norms
/// created in the same millisecond get the same id.
pub fn assemble(
    norm_type: NormType,
    nodes: &[GraphNode],
    details: &NormDetails,
    config: &GlobalProcessConfig,
    now: DateTime<Utc>,
) -> Result<CreatedNorm, NormError> {
    validate(norm_type, nodes, details)?;

    let spec = match &details.kind {
        NormKindDetails::AverageTime(d) => {
            let threshold = parse_threshold(&d.threshold_seconds)?;
            let label = d.df_type_prop_value.trim();
            NormSpec::AverageTimeBetweenActivities {
                activity_a: require_name(nodes, NodeRole::Source)?.to_string(),
                activity_b: require_name(nodes, NodeRole::Target)?.to_string(),
                threshold_seconds: threshold.trunc() as i64,
                threshold_condition: d.threshold_condition,
                aggregation_properties: aggregation_names(&d.aggregation_properties),
                df_type_prop_value: (!label.is_empty()).then(|| label.to_string()),
            }
        }
        NormKindDetails::EntityFollows(d) => NormSpec::EntityFollowsEntity {
            entity_type_a: require_name(nodes, NodeRole::Source)?.to_string(),
            entity_type_b: require_name(nodes, NodeRole::Target)?.to_string(),
            aggregation_properties: aggregation_names(&d.aggregation_properties),
        },
        NormKindDetails::EventToEntity(d) => {
            let count = match d.operator.implied_count() {
                Some(c) => c,
                None => parse_count(&d.count).ok_or(NormError::InvalidCount(d.operator))?,
            };
            NormSpec::EventToEntityRelationship {
                context_entity_type: require_name(nodes, NodeRole::Source)?.to_string(),
                target_activity: require_name(nodes, NodeRole::Target)?.to_string(),
                operator: d.operator,
                count,
                aggregation_properties: aggregation_names(&d.aggregation_properties),
            }
        }
        NormKindDetails::DirectlyFollows(d) => NormSpec::ActivityDirectlyFollows {
            activity_a: require_name(nodes, NodeRole::Source)?.to_string(),
            activity_b: require_name(nodes, NodeRole::Target)?.to_string(),
            forbidden: d.forbidden,
        },
        NormKindDetails::EventPropertyValue(d) | NormKindDetails::EntityPropertyValue(d) => {
            let main = details.filters.first().ok_or(NormError::MissingFilter)?;
            let condition = PropertyCondition {
                target_name: require_name(nodes, NodeRole::Single)?.to_string(),
                property_name: main.name.trim().to_string(),
                operator: main.operator,
                value: main.coerced_value(),
                aggregation_properties: aggregation_names(&d.aggregation_properties),
            };
            if norm_type == NormType::EventPropertyValue {
                NormSpec::EventPropertyValue(condition)
            } else {
                NormSpec::EntityPropertyValue(condition)
            }
        }
    };

    let norm_id = match details.common.norm_id.trim() {
        "" => format!("{}-{}", norm_type.tag(), now.timestamp_millis()),
        id => id.to_string(),
    };
    let description = match details.common.description.trim() {
        "" => describe(&spec, details.filters.first(), config),
        text => text.to_string(),
    };

    Ok(CreatedNorm {
        norm_id,
        description,
        weight: details.common.weight,
        enabled: true,
        spec,
        execution_filters: execution_filters(norm_type, &details.filters),
    })
}

/// Generated human-readable description of a norm.
pub fn describe(spec: &NormSpec, main: Option<&Filter>, config: &GlobalProcessConfig) -> String {
    let event = &config.event_node_label;
    let entity = &config.entity_node_label;
    match spec {
        NormSpec::AverageTimeBetweenActivities {
            activity_a,
            activity_b,
            threshold_seconds,
            threshold_condition,
            ..
        } => format!(
            "Avg. time between {event} \"{activity_a}\" and \"{activity_b}\" should be {} {threshold_seconds}s.",
            match threshold_condition {
                ThresholdCondition::LessThan => "less than",
                ThresholdCondition::GreaterThan => "greater than",
            }
        ),
        NormSpec::EntityFollowsEntity {
            entity_type_a,
            entity_type_b,
            ..
        } => format!("{entity} \"{entity_type_a}\" should follow {entity} \"{entity_type_b}\"."),
        NormSpec::EventToEntityRelationship {
            context_entity_type,
            target_activity,
            operator,
            count,
            ..
        } => {
            let phrase = match operator {
                RelationOperator::Exists => "at least one".to_string(),
                RelationOperator::NotExists => "zero".to_string(),
                op => format!("{op} {count}"),
            };
            format!(
                "Each {entity} \"{context_entity_type}\" should have {phrase} {event} \"{target_activity}\"."
            )
        }
        NormSpec::ActivityDirectlyFollows {
            activity_a,
            activity_b,
            forbidden: true,
        } => format!(
            "It is forbidden for \"{activity_a}\" to be directly followed by \"{activity_b}\"."
        ),
        NormSpec::ActivityDirectlyFollows {
            activity_a,
            activity_b,
            forbidden: false,
        } => format!("\"{activity_a}\" should be directly followed by \"{activity_b}\"."),
        NormSpec::EventPropertyValue(c) => describe_property(event, c, main),
        NormSpec::EntityPropertyValue(c) => describe_property(entity, c, main),
    }
}

fn describe_property(label: &str, c: &PropertyCondition, main: Option<&Filter>) -> String {
    let value = main
        .map(Filter::display_value)
        .unwrap_or_else(|| format!("\"{}\"", c.value));
    format!(
        "{label} \"{}\" must have property \"{}\" {} {value}.",
        c.target_name, c.property_name, c.operator
    )
}
