//! Cypher the analysis service runs for a norm, rendered locally for preview.
//!
//! Every norm yields two queries: a diagnostic query that MERGEs one
//! diagnostic node per checked element (with a `complies` flag), and an
//! aggregation query that summarises those diagnostics, optionally grouped by
//! the norm's aggregation properties.

use serde::Serialize;
use serde_json::{json, Map, Value};

use normcraft_core::{
    CreatedNorm, FilterOperator, GlobalProcessConfig, NormSpec, PropertyCondition, RelationOperator,
    StorageLocation, ThresholdCondition,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CypherQuery {
    pub text: String,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryPreview {
    pub norm_id: String,
    pub diagnostic: CypherQuery,
    pub aggregation: CypherQuery,
}

/// Backtick-quote a label, relationship type or property key.
fn ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn preview(norm: &CreatedNorm, config: &GlobalProcessConfig) -> QueryPreview {
    QueryPreview {
        norm_id: norm.norm_id.clone(),
        diagnostic: diagnostic(norm, config),
        aggregation: aggregation(norm, config),
    }
}

/// Tail shared by every diagnostic query: upsert the diagnostic node and link
/// the checked elements to it.
fn merge_diagnostic(
    config: &GlobalProcessConfig,
    related_id: &str,
    extra_fields: &[&str],
    linked: &[&str],
) -> Vec<String> {
    let mut set = vec!["diag.complies = complies".to_string()];
    set.extend(extra_fields.iter().map(|f| format!("diag.{f} = {f}")));
    set.push("diag.last_checked = datetime()".to_string());
    let set = set.join(", ");

    let mut lines = vec![
        format!(
            "MERGE (diag:{} {{ norm_id: $norm_id, related_id: {related_id} }})",
            ident(&config.diagnostic_node_label)
        ),
        format!("ON CREATE SET {set}"),
        format!("SET {set}"),
    ];
    for alias in linked {
        lines.push(format!(
            "MERGE ({alias})-[:{}]->(diag)",
            ident(&config.compliance_rel_name)
        ));
    }
    lines
}

fn diagnostic(norm: &CreatedNorm, config: &GlobalProcessConfig) -> CypherQuery {
    let event = ident(&config.event_node_label);
    let entity = ident(&config.entity_node_label);
    let activity = ident(&config.activity_property);
    let entity_type = ident(&config.entity_filter_property);
    let norm_id = json!(norm.norm_id);

    match &norm.spec {
        NormSpec::AverageTimeBetweenActivities {
            activity_a,
            activity_b,
            threshold_seconds,
            threshold_condition,
            ..
        } => {
            let ts = ident(&config.timestamp_property);
            let op = match threshold_condition {
                ThresholdCondition::LessThan => "<",
                ThresholdCondition::GreaterThan => ">",
            };
            let mut lines = vec![
                format!("MATCH (ev_a:{event} {{ {activity}: $activity_a }})"),
                format!("MATCH (ev_b:{event} {{ {activity}: $activity_b }})"),
                format!("WHERE ev_a.{ts} < ev_b.{ts}"),
                format!("WITH ev_a, ev_b, duration.inSeconds(ev_a.{ts}, ev_b.{ts}) AS dur"),
                "WHERE dur IS NOT NULL".to_string(),
                format!(
                    "WITH ev_a, ev_b, dur.seconds AS duration_seconds, (dur.seconds {op} $threshold_seconds) AS complies"
                ),
            ];
            lines.extend(merge_diagnostic(
                config,
                "elementId(ev_a) + '_' + elementId(ev_b)",
                &["duration_seconds"],
                &["ev_a", "ev_b"],
            ));
            CypherQuery {
                text: lines.join("\n"),
                params: params(&[
                    ("activity_a", json!(activity_a)),
                    ("activity_b", json!(activity_b)),
                    ("threshold_seconds", json!(threshold_seconds)),
                    ("norm_id", norm_id),
                ]),
            }
        }
        NormSpec::EntityFollowsEntity {
            entity_type_a,
            entity_type_b,
            ..
        } => {
            let mut lines = vec![
                format!("MATCH (ea:{entity} {{ {entity_type}: $entity_type_a }})"),
                format!(
                    "OPTIONAL MATCH (ea)-[:{}]->(eb:{entity} {{ {entity_type}: $entity_type_b }})",
                    ident(&config.df_entity_rel_name)
                ),
                "WITH ea, (eb IS NOT NULL) AS complies".to_string(),
            ];
            lines.extend(merge_diagnostic(config, "elementId(ea)", &[], &["ea"]));
            CypherQuery {
                text: lines.join("\n"),
                params: params(&[
                    ("entity_type_a", json!(entity_type_a)),
                    ("entity_type_b", json!(entity_type_b)),
                    ("norm_id", norm_id),
                ]),
            }
        }
        NormSpec::EventToEntityRelationship {
            context_entity_type,
            target_activity,
            operator,
            count,
            ..
        } => {
            // exists / not exists compare the correlated count against zero.
            let (op, count) = match operator {
                RelationOperator::Exists => (">", 0),
                RelationOperator::NotExists => ("=", 0),
                RelationOperator::Eq => ("=", *count),
                RelationOperator::Ne => ("<>", *count),
                other => (other.as_str(), *count),
            };
            let mut lines = vec![
                format!("MATCH (ctx:{entity} {{ {entity_type}: $context_entity_type }})"),
                format!(
                    "OPTIONAL MATCH (ctx)<-[:{}]-(ev:{event} {{ {activity}: $target_activity }})",
                    ident(&config.corr_rel_name)
                ),
                "WITH ctx, count(ev) AS actual_count".to_string(),
                format!("WITH ctx, actual_count, (actual_count {op} $count) AS complies"),
            ];
            lines.extend(merge_diagnostic(config, "elementId(ctx)", &["actual_count"], &["ctx"]));
            CypherQuery {
                text: lines.join("\n"),
                params: params(&[
                    ("context_entity_type", json!(context_entity_type)),
                    ("target_activity", json!(target_activity)),
                    ("count", json!(count)),
                    ("norm_id", norm_id),
                ]),
            }
        }
        NormSpec::ActivityDirectlyFollows {
            activity_a,
            activity_b,
            forbidden,
        } => {
            let mut lines = vec![
                format!("MATCH (ev_a:{event} {{ {activity}: $activity_a }})"),
                format!(
                    "OPTIONAL MATCH (ev_a)-[:{}]->(ev_b:{event} {{ {activity}: $activity_b }})",
                    ident(&config.df_rel_name)
                ),
                "WITH ev_a, (ev_b IS NOT NULL) AS directly_follows".to_string(),
                format!(
                    "WITH ev_a, directly_follows, (directly_follows = {}) AS complies",
                    !forbidden
                ),
            ];
            lines.extend(merge_diagnostic(config, "elementId(ev_a)", &[], &["ev_a"]));
            CypherQuery {
                text: lines.join("\n"),
                params: params(&[
                    ("activity_a", json!(activity_a)),
                    ("activity_b", json!(activity_b)),
                    ("norm_id", norm_id),
                ]),
            }
        }
        NormSpec::EventPropertyValue(cond) => property_value(
            format!("MATCH (n:{event} {{ {activity}: $target_name }})"),
            cond,
            config,
            norm_id,
        ),
        NormSpec::EntityPropertyValue(cond) => property_value(
            format!("MATCH (n:{entity} {{ {entity_type}: $target_name }})"),
            cond,
            config,
            norm_id,
        ),
    }
}

/// Comparison of `subject` against `$value` for a filter operator.
fn comparison(subject: &str, operator: FilterOperator) -> String {
    match operator {
        FilterOperator::Between => {
            format!("{subject} >= $value[0] AND {subject} <= $value[1]")
        }
        FilterOperator::Eq => format!("{subject} = $value"),
        FilterOperator::Ne => format!("{subject} <> $value"),
        FilterOperator::In => format!("{subject} IN $value"),
        FilterOperator::NotIn => format!("NOT {subject} IN $value"),
        other => format!("{subject} {} $value", other.as_str()),
    }
}

fn property_value(
    node_match: String,
    cond: &PropertyCondition,
    config: &GlobalProcessConfig,
    norm_id: Value,
) -> CypherQuery {
    let mut lines = vec![node_match];
    match config.attribute_storage_strategy {
        StorageLocation::Node => {
            let value = format!("attr.{}", ident(&config.attribute_value_property));
            lines.push("WITH n".to_string());
            lines.push(format!(
                "OPTIONAL MATCH (n)-[:{}]->(attr:{} {{ {}: $property_name }})",
                ident(&config.attribute_rel_name),
                ident(&config.attribute_node_label),
                ident(&config.attribute_name_property),
            ));
            lines.push(format!(
                "WITH n, (attr IS NOT NULL AND {}) AS complies",
                comparison(&value, cond.operator)
            ));
        }
        StorageLocation::Property => {
            let value = format!("n.{}", ident(&cond.property_name));
            lines.push(format!(
                "WITH n, ({value} IS NOT NULL AND {}) AS complies",
                comparison(&value, cond.operator)
            ));
        }
    }
    lines.extend(merge_diagnostic(config, "elementId(n)", &[], &["n"]));
    CypherQuery {
        text: lines.join("\n"),
        params: params(&[
            ("value", cond.value.clone()),
            ("norm_id", norm_id),
            ("target_name", json!(cond.target_name)),
            ("property_name", json!(cond.property_name)),
        ]),
    }
}

fn aggregation(norm: &CreatedNorm, config: &GlobalProcessConfig) -> CypherQuery {
    let (alias, filter, expressions): (&str, Option<&str>, &[&str]) = match &norm.spec {
        NormSpec::AverageTimeBetweenActivities { .. } => (
            "start_node",
            Some("diag.duration_seconds IS NOT NULL"),
            &[
                "avg(diag.duration_seconds) AS avg_duration",
                "min(diag.duration_seconds) AS min_duration",
                "max(diag.duration_seconds) AS max_duration",
                "count(diag) AS total_instances",
                "sum(CASE WHEN diag.complies THEN 1 ELSE 0 END) AS compliant_instances",
            ],
        ),
        NormSpec::EntityFollowsEntity { .. } => (
            "entity",
            None,
            &[
                "count(diag) AS total_entities",
                "sum(CASE WHEN diag.complies THEN 1 ELSE 0 END) AS compliant_entities",
            ],
        ),
        NormSpec::EventToEntityRelationship { .. } => (
            "ctx",
            Some("diag.actual_count IS NOT NULL"),
            &[
                "avg(diag.actual_count) AS avg_count",
                "min(diag.actual_count) AS min_count",
                "max(diag.actual_count) AS max_count",
                "count(diag) AS total_entities",
                "sum(CASE WHEN diag.complies THEN 1 ELSE 0 END) AS compliant_entities",
            ],
        ),
        NormSpec::ActivityDirectlyFollows { .. } => (
            "event",
            None,
            &[
                "count(diag) AS total_instances",
                "sum(CASE WHEN diag.complies THEN 1 ELSE 0 END) AS compliant_instances",
            ],
        ),
        NormSpec::EventPropertyValue(_) | NormSpec::EntityPropertyValue(_) => (
            "n",
            None,
            &[
                "count(diag) AS total_nodes",
                "sum(CASE WHEN diag.complies THEN 1 ELSE 0 END) AS compliant_nodes",
            ],
        ),
    };

    let mut lines = vec![format!(
        "MATCH (diag:{} {{ norm_id: $norm_id }})<-[:{}]-({alias})",
        ident(&config.diagnostic_node_label),
        ident(&config.compliance_rel_name)
    )];
    if let Some(filter) = filter {
        lines.push(format!("WHERE {filter}"));
    }

    let mut query_params = params(&[("norm_id", json!(norm.norm_id))]);
    let grouping = norm.spec.aggregation_properties();
    let grouping_key = if grouping.is_empty() {
        "'Overall'".to_string()
    } else {
        let parts: Vec<String> = match config.attribute_storage_strategy {
            StorageLocation::Property => grouping
                .iter()
                .map(|p| format!("coalesce(toString({alias}.{}), 'N/A')", ident(p)))
                .collect(),
            StorageLocation::Node => grouping
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let param = format!("group_{i}");
                    lines.push(format!(
                        "OPTIONAL MATCH ({alias})-[:{}]->(attr_{i}:{} {{ {}: ${param} }})",
                        ident(&config.attribute_rel_name),
                        ident(&config.attribute_node_label),
                        ident(&config.attribute_name_property),
                    ));
                    query_params.insert(param, json!(p));
                    format!(
                        "coalesce(toString(attr_{i}.{}), 'N/A')",
                        ident(&config.attribute_value_property)
                    )
                })
                .collect(),
        };
        format!("[{}]", parts.join(", "))
    };

    lines.push(format!("RETURN {grouping_key} AS grouping_key,"));
    lines.push(format!("       {}", expressions.join(",\n       ")));

    CypherQuery {
        text: lines.join("\n"),
        params: query_params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(spec: NormSpec) -> CreatedNorm {
        CreatedNorm {
            norm_id: "n-1".into(),
            description: "d".into(),
            weight: 1.0,
            enabled: true,
            spec,
            execution_filters: vec![],
        }
    }

    fn amount_check(operator: FilterOperator, value: Value) -> NormSpec {
        NormSpec::EventPropertyValue(PropertyCondition {
            target_name: "Approve Invoice".into(),
            property_name: "amount".into(),
            operator,
            value,
            aggregation_properties: vec![],
        })
    }

    #[test]
    fn avg_time_uses_threshold_condition_and_config_names() {
        let config = GlobalProcessConfig {
            event_node_label: "Activity".into(),
            timestamp_property: "ts".into(),
            ..GlobalProcessConfig::default()
        };
        let p = preview(
            &norm(NormSpec::AverageTimeBetweenActivities {
                activity_a: "A".into(),
                activity_b: "B".into(),
                threshold_seconds: 3600,
                threshold_condition: ThresholdCondition::GreaterThan,
                aggregation_properties: vec![],
                df_type_prop_value: None,
            }),
            &config,
        );
        let text = &p.diagnostic.text;
        assert!(text.contains("MATCH (ev_a:`Activity` { `type`: $activity_a })"));
        assert!(text.contains("ev_a.`ts` < ev_b.`ts`"));
        assert!(text.contains("(dur.seconds > $threshold_seconds)"));
        assert!(text.contains("MERGE (ev_b)-[:`COMPLIES_WITH`]->(diag)"));
        assert_eq!(p.diagnostic.params["threshold_seconds"], json!(3600));
        assert_eq!(p.diagnostic.params["norm_id"], json!("n-1"));
        assert!(p.aggregation.text.contains("WHERE diag.duration_seconds IS NOT NULL"));
        assert!(p.aggregation.text.contains("RETURN 'Overall' AS grouping_key"));
    }

    #[test]
    fn event_to_entity_exists_compares_against_zero() {
        let p = preview(
            &norm(NormSpec::EventToEntityRelationship {
                context_entity_type: "Order".into(),
                target_activity: "Ship".into(),
                operator: RelationOperator::Exists,
                count: 1,
                aggregation_properties: vec![],
            }),
            &GlobalProcessConfig::default(),
        );
        assert!(p.diagnostic.text.contains("(actual_count > $count)"));
        assert_eq!(p.diagnostic.params["count"], json!(0));
        assert!(p.diagnostic.text.contains("<-[:`CORR`]-"));
        assert!(p.aggregation.text.contains("avg(diag.actual_count) AS avg_count"));
    }

    #[test]
    fn event_to_entity_maps_inequality() {
        let p = preview(
            &norm(NormSpec::EventToEntityRelationship {
                context_entity_type: "Order".into(),
                target_activity: "Ship".into(),
                operator: RelationOperator::Ne,
                count: 2,
                aggregation_properties: vec![],
            }),
            &GlobalProcessConfig::default(),
        );
        assert!(p.diagnostic.text.contains("(actual_count <> $count)"));
        assert_eq!(p.diagnostic.params["count"], json!(2));
    }

    #[test]
    fn forbidden_directly_follows_expects_absence() {
        let p = preview(
            &norm(NormSpec::ActivityDirectlyFollows {
                activity_a: "A".into(),
                activity_b: "B".into(),
                forbidden: true,
            }),
            &GlobalProcessConfig::default(),
        );
        assert!(p.diagnostic.text.contains("(directly_follows = false)"));
        assert!(p.diagnostic.text.contains("-[:`DF`]->"));
    }

    #[test]
    fn property_value_on_node_property() {
        let p = preview(
            &norm(amount_check(FilterOperator::Ge, json!(1000))),
            &GlobalProcessConfig::default(),
        );
        assert!(p
            .diagnostic
            .text
            .contains("(n.`amount` IS NOT NULL AND n.`amount` >= $value)"));
        assert_eq!(p.diagnostic.params["value"], json!(1000));
    }

    #[test]
    fn property_value_on_attribute_nodes() {
        let config = GlobalProcessConfig {
            attribute_storage_strategy: StorageLocation::Node,
            ..GlobalProcessConfig::default()
        };
        let p = preview(
            &norm(amount_check(FilterOperator::NotIn, json!(["x", "y"]))),
            &config,
        );
        let text = &p.diagnostic.text;
        assert!(
            text.contains("-[:`HAS_ATTRIBUTE`]->(attr:`Attribute` { `name`: $property_name })")
        );
        assert!(text.contains("NOT attr.`value` IN $value"));
    }

    #[test]
    fn between_checks_both_bounds() {
        let p = preview(
            &norm(amount_check(
                FilterOperator::Between,
                json!(["2024-01-01", "2024-12-31"]),
            )),
            &GlobalProcessConfig::default(),
        );
        assert!(p
            .diagnostic
            .text
            .contains("n.`amount` >= $value[0] AND n.`amount` <= $value[1]"));
    }

    #[test]
    fn aggregation_groups_by_property_or_attribute_node() {
        let spec = NormSpec::EntityFollowsEntity {
            entity_type_a: "Order".into(),
            entity_type_b: "Invoice".into(),
            aggregation_properties: vec!["region".into(), "channel".into()],
        };

        let by_property = preview(&norm(spec.clone()), &GlobalProcessConfig::default());
        assert!(by_property.aggregation.text.contains(
            "RETURN [coalesce(toString(entity.`region`), 'N/A'), coalesce(toString(entity.`channel`), 'N/A')] AS grouping_key"
        ));

        let config = GlobalProcessConfig {
            attribute_storage_strategy: StorageLocation::Node,
            ..GlobalProcessConfig::default()
        };
        let by_node = preview(&norm(spec), &config);
        assert!(by_node.aggregation.text.contains(
            "OPTIONAL MATCH (entity)-[:`HAS_ATTRIBUTE`]->(attr_1:`Attribute` { `name`: $group_1 })"
        ));
        assert_eq!(by_node.aggregation.params["group_0"], json!("region"));
        assert!(by_node
            .aggregation
            .text
            .contains("coalesce(toString(attr_0.`value`), 'N/A')"));
    }

    #[test]
    fn identifiers_are_escaped() {
        assert_eq!(ident("weird`label"), "`weird``label`");
    }
}
