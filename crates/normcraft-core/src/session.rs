//! The editing session: one norm being drawn plus the list of norms created so far.
//!
//! All updates go through the `on_*` handlers below. Handlers never call each
//! other, so a change can only flow forward: type/config changes rebuild the
//! canvas, detail edits restyle the edge.

use chrono::{DateTime, Utc};

use crate::assemble::{self, NormError};
use crate::template;
use crate::{
    CreatedNorm, Filter, FilterError, GlobalProcessConfig, NodeRole, NormDetails, NormGraph,
    NormType, Position,
};

#[derive(Debug, Clone)]
pub struct EditorSession {
    config: GlobalProcessConfig,
    details: NormDetails,
    graph: NormGraph,
    selected: Option<String>,
    norms: Vec<CreatedNorm>,
}

impl EditorSession {
    pub fn new(config: GlobalProcessConfig) -> Self {
        Self::with_norm_type(NormType::AverageTimeBetweenActivities, config)
    }

    pub fn with_norm_type(norm_type: NormType, config: GlobalProcessConfig) -> Self {
        let details = NormDetails::new(norm_type, &config);
        let graph = template::resolve(norm_type, &details, &config);
        Self {
            config,
            details,
            graph,
            selected: None,
            norms: Vec::new(),
        }
    }

    pub fn config(&self) -> &GlobalProcessConfig {
        &self.config
    }

    pub fn details(&self) -> &NormDetails {
        &self.details
    }

    pub fn graph(&self) -> &NormGraph {
        &self.graph
    }

    pub fn norm_type(&self) -> NormType {
        self.details.norm_type()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn norms(&self) -> &[CreatedNorm] {
        &self.norms
    }

    /// Switch the norm being edited. Returns false when the type is unchanged.
    pub fn on_norm_type_changed(&mut self, norm_type: NormType) -> bool {
        if norm_type == self.norm_type() {
            return false;
        }
        tracing::debug!(from = %self.norm_type(), to = %norm_type, "norm type changed");
        self.details = NormDetails::for_type(&self.details, norm_type, &self.config);
        self.rebuild_graph();
        true
    }

    /// Adopt a new process configuration and rebuild the canvas.
    pub fn on_config_changed(&mut self, config: GlobalProcessConfig) {
        if config == self.config {
            return;
        }
        tracing::debug!("process configuration changed");
        self.details.reseed_relation_label(&self.config, &config);
        self.config = config;
        self.rebuild_graph();
    }

    /// Edit the detail form. Only the edge is restyled; nodes keep their
    /// names, positions and selection.
    ///
    /// The update must not change the norm type; use `on_norm_type_changed`.
    pub fn on_details_changed<T>(
        &mut self,
        update: impl FnOnce(&mut NormDetails) -> T,
    ) -> Result<T, NormError> {
        let mut next = self.details.clone();
        let out = update(&mut next);
        if next.norm_type() != self.norm_type() {
            return Err(NormError::DetailsMismatch {
                expected: self.norm_type(),
                found: next.norm_type(),
            });
        }
        self.details = next;
        self.restyle_edge();
        Ok(out)
    }

    /// Append a filter and return its index.
    pub fn add_filter(&mut self, filter: Filter) -> usize {
        self.details.filters.push(filter);
        self.details.filters.len() - 1
    }

    /// Edit the filter at `index`. The change is kept only if `update`
    /// succeeds. `None` when there is no such filter.
    pub fn update_filter(
        &mut self,
        index: usize,
        update: impl FnOnce(&mut Filter) -> Result<(), FilterError>,
    ) -> Option<Result<(), FilterError>> {
        let mut next = self.details.filters.get(index)?.clone();
        if let Err(e) = update(&mut next) {
            return Some(Err(e));
        }
        self.details.filters[index] = next;
        Some(Ok(()))
    }

    pub fn remove_filter(&mut self, index: usize) -> Option<Filter> {
        (index < self.details.filters.len()).then(|| self.details.filters.remove(index))
    }

    /// Set the activity/entity name of a node. Returns false if the current
    /// norm type has no node in that role.
    pub fn set_node_name(&mut self, role: NodeRole, name: &str) -> bool {
        let norm_type = self.norm_type();
        let Some(node) = self.graph.node_mut(role) else {
            return false;
        };
        node.data.name = name.trim().to_string();
        node.data.label = template::node_label(norm_type, role, name);
        true
    }

    pub fn select_node(&mut self, node_id: Option<&str>) {
        self.selected = node_id
            .filter(|id| self.graph.nodes.iter().any(|n| n.id == *id))
            .map(str::to_string);
    }

    /// Record a drag. Returns false for unknown node ids.
    pub fn move_node(&mut self, node_id: &str, position: Position) -> bool {
        match self.graph.nodes.iter_mut().find(|n| n.id == node_id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    /// Node deletion from the canvas is suppressed; nodes only go away when
    /// the norm type changes. Always returns 0.
    pub fn delete_nodes(&mut self, node_ids: &[String]) -> usize {
        if !node_ids.is_empty() {
            tracing::debug!(count = node_ids.len(), "ignoring node delete request");
        }
        0
    }

    /// Validate the current canvas and details without creating anything.
    pub fn validate(&self) -> Result<(), NormError> {
        assemble::validate(self.norm_type(), &self.graph.nodes, &self.details)
    }

    /// Assemble the current norm and append it to the list.
    pub fn create_norm(&mut self) -> Result<&CreatedNorm, NormError> {
        self.create_norm_at(Utc::now())
    }

    pub fn create_norm_at(&mut self, now: DateTime<Utc>) -> Result<&CreatedNorm, NormError> {
        let norm = assemble::assemble(
            self.norm_type(),
            &self.graph.nodes,
            &self.details,
            &self.config,
            now,
        )?;
        tracing::info!(norm_id = %norm.norm_id, norm_type = %norm.norm_type(), "norm created");
        self.norms.push(norm);
        Ok(&self.norms[self.norms.len() - 1])
    }

    /// Flip `enabled` on the first norm with this id. Returns the new state.
    pub fn toggle_norm(&mut self, norm_id: &str) -> Option<bool> {
        let norm = self.norms.iter_mut().find(|n| n.norm_id == norm_id)?;
        norm.enabled = !norm.enabled;
        Some(norm.enabled)
    }

    /// Remove the first norm with this id.
    pub fn remove_norm(&mut self, norm_id: &str) -> Option<CreatedNorm> {
        let idx = self.norms.iter().position(|n| n.norm_id == norm_id)?;
        Some(self.norms.remove(idx))
    }

    /// Replace the norm list, e.g. after loading a stored norm set.
    pub fn replace_norms(&mut self, norms: Vec<CreatedNorm>) {
        self.norms = norms;
    }

    /// Norms that take part in the next analysis run.
    pub fn enabled_norms(&self) -> Vec<CreatedNorm> {
        self.norms.iter().filter(|n| n.enabled).cloned().collect()
    }

    fn rebuild_graph(&mut self) {
        self.graph = template::resolve(self.norm_type(), &self.details, &self.config);
        self.selected = None;
    }

    fn restyle_edge(&mut self) {
        let norm_type = self.norm_type();
        for edge in &mut self.graph.edges {
            template::style_edge(edge, norm_type, &self.details, &self.config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Filter, FilterDataType, FilterOperator, FilterValue, NormKindDetails, NormSpec};
    use crate::template::FORBIDDEN_STROKE;

    fn session(norm_type: NormType) -> EditorSession {
        EditorSession::with_norm_type(norm_type, GlobalProcessConfig::default())
    }

    #[test]
    fn type_change_replaces_nodes_and_keeps_common_fields() {
        let mut s = session(NormType::AverageTimeBetweenActivities);
        s.on_details_changed(|d| d.common.norm_id = "keep".into()).unwrap();
        s.set_node_name(NodeRole::Source, "Create PO");

        assert!(s.on_norm_type_changed(NormType::EventPropertyValue));
        assert_eq!(s.graph().nodes.len(), 1);
        assert_eq!(s.graph().nodes[0].data.role, NodeRole::Single);
        assert_eq!(s.details().common.norm_id, "keep");
        assert_eq!(s.details().filters.len(), 1);

        assert!(!s.on_norm_type_changed(NormType::EventPropertyValue));
    }

    #[test]
    fn detail_edits_restyle_edge_without_touching_nodes() {
        let mut s = session(NormType::ActivityDirectlyFollows);
        s.set_node_name(NodeRole::Source, "Create PO");
        s.move_node("target-node", Position { x: 9.0, y: 9.0 });
        s.select_node(Some("source-node"));

        s.on_details_changed(|d| {
            if let NormKindDetails::DirectlyFollows(df) = &mut d.kind {
                df.forbidden = true;
                df.df_type_prop_value = "NEXT".into();
            }
        })
        .unwrap();

        let g = s.graph();
        assert_eq!(g.edges[0].label, "⚠ NEXT");
        assert_eq!(g.edges[0].style.stroke, FORBIDDEN_STROKE);
        assert_eq!(g.node(NodeRole::Source).unwrap().data.name, "Create PO");
        assert_eq!(g.node(NodeRole::Target).unwrap().position, Position { x: 9.0, y: 9.0 });
        assert_eq!(s.selected(), Some("source-node"));
    }

    #[test]
    fn detail_update_cannot_switch_type() {
        let mut s = session(NormType::ActivityDirectlyFollows);
        let cfg = s.config().clone();
        let err = s
            .on_details_changed(|d| *d = NormDetails::new(NormType::EntityFollowsEntity, &cfg))
            .unwrap_err();
        assert!(matches!(err, NormError::DetailsMismatch { .. }));
        assert_eq!(s.norm_type(), NormType::ActivityDirectlyFollows);
    }

    #[test]
    fn node_names_drive_labels() {
        let mut s = session(NormType::EntityFollowsEntity);
        assert!(s.set_node_name(NodeRole::Target, " Invoice "));
        assert_eq!(s.graph().node(NodeRole::Target).unwrap().data.label, "Invoice");
        assert!(s.set_node_name(NodeRole::Target, ""));
        assert_eq!(s.graph().node(NodeRole::Target).unwrap().data.label, "Entity B");
        assert!(!s.set_node_name(NodeRole::Single, "x"));
    }

    #[test]
    fn filter_edits_are_all_or_nothing() {
        let mut s = session(NormType::EntityPropertyValue);
        let idx = s.add_filter(Filter::default());
        assert_eq!(idx, 1);

        let err = s
            .update_filter(idx, |f| {
                f.name = "status".into();
                f.set_operator(FilterOperator::Between)
            })
            .unwrap();
        assert!(err.is_err());
        assert_eq!(s.details().filters[idx].name, "");

        s.update_filter(idx, |f| {
            f.name = "status".into();
            f.set_value(FilterValue::Scalar("open".into()))
        })
        .unwrap()
        .unwrap();
        assert_eq!(s.details().filters[idx].name, "status");

        assert!(s.update_filter(9, |_| Ok(())).is_none());
        assert!(s.remove_filter(9).is_none());
        assert_eq!(s.remove_filter(0).map(|f| f.name), Some(String::new()));
        assert_eq!(s.details().filters.len(), 1);
    }

    #[test]
    fn deletes_are_suppressed() {
        let mut s = session(NormType::ActivityDirectlyFollows);
        assert_eq!(s.delete_nodes(&["source-node".to_string()]), 0);
        assert_eq!(s.graph().nodes.len(), 2);
    }

    #[test]
    fn config_change_reseeds_labels_and_rebuilds() {
        let mut s = session(NormType::ActivityDirectlyFollows);
        s.set_node_name(NodeRole::Source, "A");
        s.on_config_changed(GlobalProcessConfig {
            df_rel_name: "FOLLOWS".into(),
            event_node_label: "Activity".into(),
            ..GlobalProcessConfig::default()
        });
        assert_eq!(s.details().kind.relation_label(), Some("FOLLOWS"));
        assert_eq!(s.graph().edges[0].label, "FOLLOWS");
        assert_eq!(s.graph().nodes[0].data.node_type, "Activity");
        assert_eq!(s.graph().nodes[0].data.name, "");
    }

    #[test]
    fn create_appends_only_on_success() {
        let mut s = session(NormType::EventPropertyValue);
        assert!(s.create_norm().is_err());
        assert!(s.norms().is_empty());

        s.set_node_name(NodeRole::Single, "Approve Invoice");
        s.on_details_changed(|d| {
            let f = &mut d.filters[0];
            f.name = "amount".into();
            f.set_data_type(FilterDataType::Number);
            f.set_operator(FilterOperator::Ge)?;
            f.set_value(FilterValue::Scalar("1000".into()))
        })
        .unwrap()
        .unwrap();

        let norm = s.create_norm().unwrap();
        assert!(matches!(norm.spec, NormSpec::EventPropertyValue(_)));
        assert_eq!(s.norms().len(), 1);
    }

    #[test]
    fn failed_create_appends_nothing_for_any_type() {
        for t in NormType::ALL {
            let mut s = session(t);
            assert!(s.create_norm().is_err(), "{t}");

            if t.is_two_node() {
                s.set_node_name(NodeRole::Source, "A");
                s.set_node_name(NodeRole::Target, "B");
            } else {
                s.set_node_name(NodeRole::Single, "A");
            }
            s.on_details_changed(|d| {
                if let NormKindDetails::AverageTime(a) = &mut d.kind {
                    a.threshold_seconds = "60".into();
                }
            })
            .unwrap();
            s.add_filter(Filter {
                name: "region".into(),
                ..Filter::default()
            });
            assert!(s.create_norm().is_err(), "{t}");
            assert!(s.norms().is_empty(), "{t}");
        }
    }

    #[test]
    fn toggle_and_remove_created_norms() {
        let mut s = session(NormType::ActivityDirectlyFollows);
        s.set_node_name(NodeRole::Source, "A");
        s.set_node_name(NodeRole::Target, "B");
        s.on_details_changed(|d| d.common.norm_id = "df-ab".into()).unwrap();
        s.create_norm().unwrap();

        assert_eq!(s.toggle_norm("df-ab"), Some(false));
        assert!(s.enabled_norms().is_empty());
        assert_eq!(s.toggle_norm("df-ab"), Some(true));
        assert_eq!(s.enabled_norms().len(), 1);
        assert_eq!(s.toggle_norm("missing"), None);

        assert!(s.remove_norm("df-ab").is_some());
        assert!(s.norms().is_empty());
    }

    #[test]
    fn created_norms_survive_later_edits() {
        let mut s = session(NormType::ActivityDirectlyFollows);
        s.set_node_name(NodeRole::Source, "A");
        s.set_node_name(NodeRole::Target, "B");
        s.create_norm().unwrap();
        let before = s.norms()[0].clone();

        s.on_norm_type_changed(NormType::EntityFollowsEntity);
        s.set_node_name(NodeRole::Source, "Order");
        assert_eq!(s.norms()[0], before);
    }
}
