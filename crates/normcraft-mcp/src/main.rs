use std::sync::{Arc, Mutex, MutexGuard};

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use normcraft_analysis::{query, AnalysisRequest, AnalysisRunner};
use normcraft_core::{
    AggregationProperty, EditorSession, Filter, FilterDataType, FilterError, FilterOperator,
    FilterValue, GlobalProcessConfig, NodeRole, NormDetails, NormKindDetails, NormType, Position,
    RelationOperator, StorageLocation, Store, ThresholdCondition,
};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetConfigRequest {
    /// The process configuration as a JSON object. Omitted keys take their defaults: event_node_label "Event", entity_node_label "Entity", activity_property "type", entity_filter_property "type", timestamp_property "time", df_rel_name "DF", corr_rel_name "CORR", df_entity_rel_name "DF_ENTITY", attribute_storage_strategy "property" or "node", attribute_node_label "Attribute", attribute_rel_name "HAS_ATTRIBUTE", attribute_name_property "name", attribute_value_property "value", diagnostic_node_label "Diagnostic", compliance_rel_name "COMPLIES_WITH".
    config: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SelectNormTypeRequest {
    /// Norm type to edit, e.g. "ActivityDirectlyFollowsNorm"
    norm_type: NormType,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetNodeNameRequest {
    /// "source" or "target" for two-node norms, "single" for property-value norms
    role: NodeRole,
    /// Activity or entity type name. Empty clears it.
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct MoveNodeRequest {
    /// Node id, e.g. "source-node"
    node_id: String,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SelectNodeRequest {
    /// Node id to select. Omit to clear the selection.
    node_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteNodesRequest {
    node_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
struct UpdateDetailsRequest {
    /// Norm identifier. Empty means generate one on create.
    norm_id: Option<String>,
    /// Description. Empty means generate one on create.
    description: Option<String>,
    /// Weight of the norm in the analysis (default 1.0)
    weight: Option<f64>,
    /// AverageTimeBetweenActivitiesNorm only: threshold in seconds
    threshold_seconds: Option<String>,
    /// AverageTimeBetweenActivitiesNorm only
    threshold_condition: Option<ThresholdCondition>,
    /// EventToEntityRelationshipNorm only: "exists", "not exists", "==", "!=", ">", "<", ">=", "<="
    operator: Option<RelationOperator>,
    /// EventToEntityRelationshipNorm only: required unless operator is exists/not exists
    count: Option<String>,
    /// ActivityDirectlyFollowsNorm only
    forbidden: Option<bool>,
    /// Relationship type drawn on the edge (two-node norms only). Empty reverts to the configured name.
    relationship_label: Option<String>,
    /// Replaces the aggregation properties (not available for ActivityDirectlyFollowsNorm)
    aggregation_properties: Option<Vec<AggregationProperty>>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
struct FilterFields {
    /// Property name
    name: Option<String>,
    /// "string", "number" or "datetime". Changing it resets operator and value.
    data_type: Option<FilterDataType>,
    /// string: in, not in, ==, != | number: ==, !=, >, <, >=, <= | datetime: ==, <, <=, >, >=, between
    operator: Option<FilterOperator>,
    /// A string, or {"start": ..., "end": ...} for between. Lists for in / not in are comma-separated.
    value: Option<FilterValue>,
    /// Where the property lives: "property" or "node"
    storage: Option<StorageLocation>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdateFilterRequest {
    /// 0-based filter position. Position 0 is the main condition of a property-value norm.
    index: usize,
    #[serde(flatten)]
    fields: FilterFields,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RemoveFilterRequest {
    /// 0-based filter position
    index: usize,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct NormIdRequest {
    norm_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct NormSetRequest {
    /// Name of the stored norm set
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PreviewQueriesRequest {
    /// Only this norm. Omit for every created norm.
    norm_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
struct RunAnalysisRequest {
    /// Passed through to the analysis service
    run_type: Option<String>,
    /// Passed through to the analysis service
    schedule: Option<String>,
}

// --- Editor view ---

#[derive(Serialize)]
struct EditorView<'a> {
    norm_type: NormType,
    details: &'a NormDetails,
    graph: &'a normcraft_core::NormGraph,
    selected: Option<&'a str>,
    /// First problem that would block `create_norm`, if any.
    blocking_issue: Option<String>,
}

// --- Server ---

#[derive(Clone)]
pub struct NormcraftServer {
    tool_router: ToolRouter<Self>,
    session: Arc<Mutex<EditorSession>>,
    runner: Arc<AnalysisRunner>,
    store: Store,
}

#[tool_router]
impl NormcraftServer {
    pub fn new(store: Store, runner: AnalysisRunner) -> Self {
        let config = store.read_config().unwrap_or_default();
        Self {
            tool_router: Self::tool_router(),
            session: Arc::new(Mutex::new(EditorSession::new(config))),
            runner: Arc::new(runner),
            store,
        }
    }

    fn session(&self) -> Result<MutexGuard<'_, EditorSession>, McpError> {
        self.session
            .lock()
            .map_err(|_| McpError::internal_error("editor session lock poisoned", None))
    }

    #[tool(description = "Get the process configuration: how events, entities and relationships are named in the graph database. Reports whether a configuration has been saved.")]
    fn get_config(&self) -> Result<CallToolResult, McpError> {
        let saved = self.store.read_config().is_some();
        let session = self.session()?;
        let body = serde_json::json!({ "saved": saved, "config": session.config() });
        Ok(json_result(&body))
    }

    #[tool(description = "Save the process configuration and apply it to the editor. Rebuilds the canvas; node names must be entered again.")]
    fn set_config(
        &self,
        Parameters(req): Parameters<SetConfigRequest>,
    ) -> Result<CallToolResult, McpError> {
        let config: GlobalProcessConfig = match serde_json::from_str(&req.config) {
            Ok(c) => c,
            Err(e) => return Ok(error_result(format!("Invalid configuration JSON: {e}"))),
        };
        if let Err(e) = self.store.write_config(&config) {
            return Ok(error_result(format!("Failed to save configuration: {e}")));
        }
        self.session()?.on_config_changed(config);
        Ok(text_result("Configuration saved."))
    }

    #[tool(description = "Switch the norm type being edited. Resets type-specific fields and redraws the canvas; norm id, description and weight are kept.")]
    fn select_norm_type(
        &self,
        Parameters(req): Parameters<SelectNormTypeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let changed = self.session()?.on_norm_type_changed(req.norm_type);
        Ok(text_result(if changed {
            format!("Now editing {}.", req.norm_type)
        } else {
            format!("Already editing {}.", req.norm_type)
        }))
    }

    #[tool(description = "Get the norm being edited: its type, detail fields, filters, canvas nodes and edges, and the first issue that would block creating it.")]
    fn get_editor(&self) -> Result<CallToolResult, McpError> {
        let session = self.session()?;
        let view = EditorView {
            norm_type: session.norm_type(),
            details: session.details(),
            graph: session.graph(),
            selected: session.selected(),
            blocking_issue: session.validate().err().map(|e| e.to_string()),
        };
        Ok(json_result(&view))
    }

    #[tool(description = "Name the activity or entity type a canvas node stands for")]
    fn set_node_name(
        &self,
        Parameters(req): Parameters<SetNodeNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.session()?;
        if session.set_node_name(req.role, &req.name) {
            Ok(text_result(format!("Named {} node.", req.role)))
        } else {
            Ok(error_result(format!(
                "{} has no {} node.",
                session.norm_type(),
                req.role
            )))
        }
    }

    #[tool(description = "Move a canvas node")]
    fn move_node(
        &self,
        Parameters(req): Parameters<MoveNodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let moved = self
            .session()?
            .move_node(&req.node_id, Position { x: req.x, y: req.y });
        if moved {
            Ok(text_result("Moved."))
        } else {
            Ok(error_result(format!("Node {} not found.", req.node_id)))
        }
    }

    #[tool(description = "Select a canvas node, or clear the selection")]
    fn select_node(
        &self,
        Parameters(req): Parameters<SelectNodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.session()?;
        session.select_node(req.node_id.as_deref());
        Ok(text_result(match session.selected() {
            Some(id) => format!("Selected {id}."),
            None => "Selection cleared.".to_string(),
        }))
    }

    #[tool(description = "Delete canvas nodes. Nodes belong to the norm type and cannot be deleted; switch norm type instead.")]
    fn delete_nodes(
        &self,
        Parameters(req): Parameters<DeleteNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let removed = self.session()?.delete_nodes(&req.node_ids);
        Ok(text_result(format!(
            "Deleted {removed} nodes. Canvas nodes are fixed by the norm type."
        )))
    }

    #[tool(description = "Update detail fields of the norm being edited. Only fields that apply to the current norm type are accepted.")]
    fn update_details(
        &self,
        Parameters(req): Parameters<UpdateDetailsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.session()?;
        let mut next = session.details().clone();
        if let Err(e) = apply_details(&mut next, &req) {
            return Ok(error_result(e));
        }
        match session.on_details_changed(|d| *d = next) {
            Ok(()) => Ok(text_result("Details updated.")),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }

    #[tool(description = "Append a filter. For property-value norms the first filter is the condition being checked; later filters narrow which nodes are checked.")]
    fn add_filter(
        &self,
        Parameters(req): Parameters<FilterFields>,
    ) -> Result<CallToolResult, McpError> {
        let mut filter = Filter::default();
        if let Err(e) = apply_filter(&mut filter, &req) {
            return Ok(error_result(e.to_string()));
        }
        let index = self.session()?.add_filter(filter);
        Ok(text_result(format!("Filter added at index {index}.")))
    }

    #[tool(description = "Change a filter. Changing data_type resets operator and value.")]
    fn update_filter(
        &self,
        Parameters(req): Parameters<UpdateFilterRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .session()?
            .update_filter(req.index, |f| apply_filter(f, &req.fields))
        {
            Some(Ok(())) => Ok(text_result("Filter updated.")),
            Some(Err(e)) => Ok(error_result(e.to_string())),
            None => Ok(error_result(format!("No filter at index {}.", req.index))),
        }
    }

    #[tool(description = "Remove a filter")]
    fn remove_filter(
        &self,
        Parameters(req): Parameters<RemoveFilterRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.session()?.remove_filter(req.index) {
            Some(_) => Ok(text_result("Filter removed.")),
            None => Ok(error_result(format!("No filter at index {}.", req.index))),
        }
    }

    #[tool(description = "Validate the norm being edited and append it to the created norms. Returns the created norm.")]
    fn create_norm(&self) -> Result<CallToolResult, McpError> {
        let mut session = self.session()?;
        match session.create_norm() {
            Ok(norm) => Ok(json_result(norm)),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }

    #[tool(description = "List created norms in creation order")]
    fn list_norms(&self) -> Result<CallToolResult, McpError> {
        let session = self.session()?;
        if session.norms().is_empty() {
            return Ok(text_result("No norms created yet. Use create_norm."));
        }
        Ok(json_result(&session.norms()))
    }

    #[tool(description = "Enable or disable a created norm. Disabled norms are not sent to the analysis service.")]
    fn toggle_norm(
        &self,
        Parameters(req): Parameters<NormIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.session()?.toggle_norm(&req.norm_id) {
            Some(true) => Ok(text_result(format!("{} enabled.", req.norm_id))),
            Some(false) => Ok(text_result(format!("{} disabled.", req.norm_id))),
            None => Ok(error_result(format!("Norm {} not found.", req.norm_id))),
        }
    }

    #[tool(description = "Remove a created norm")]
    fn remove_norm(
        &self,
        Parameters(req): Parameters<NormIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.session()?.remove_norm(&req.norm_id) {
            Some(_) => Ok(text_result(format!("{} removed.", req.norm_id))),
            None => Ok(error_result(format!("Norm {} not found.", req.norm_id))),
        }
    }

    #[tool(description = "List stored norm sets")]
    fn list_norm_sets(&self) -> Result<CallToolResult, McpError> {
        match self.store.list_norm_sets() {
            Ok(names) if names.is_empty() => {
                Ok(text_result("No norm sets found. Use save_norms to create one."))
            }
            Ok(names) => Ok(text_result(names.join("\n"))),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }

    #[tool(description = "Save the created norms as a named norm set, replacing any set with that name")]
    fn save_norms(
        &self,
        Parameters(req): Parameters<NormSetRequest>,
    ) -> Result<CallToolResult, McpError> {
        let norms = self.session()?.norms().to_vec();
        match self.store.write_norm_set(&req.name, &norms) {
            Ok(()) => Ok(text_result(format!("Saved {} norms to {}.", norms.len(), req.name))),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }

    #[tool(description = "Replace the created norms with a stored norm set")]
    fn load_norms(
        &self,
        Parameters(req): Parameters<NormSetRequest>,
    ) -> Result<CallToolResult, McpError> {
        let norms = match self.store.read_norm_set(&req.name) {
            Ok(n) => n,
            Err(e) => return Ok(error_result(format!("Failed to load {}: {e}", req.name))),
        };
        let count = norms.len();
        self.session()?.replace_norms(norms);
        Ok(text_result(format!("Loaded {count} norms from {}.", req.name)))
    }

    #[tool(description = "Delete a stored norm set")]
    fn delete_norm_set(
        &self,
        Parameters(req): Parameters<NormSetRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.store.delete_norm_set(&req.name) {
            Ok(()) => Ok(text_result(format!("Deleted {}.", req.name))),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }

    #[tool(description = "Show the Cypher the analysis service runs for created norms: a diagnostic query and an aggregation query per norm, with parameters")]
    fn preview_queries(
        &self,
        Parameters(req): Parameters<PreviewQueriesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.session()?;
        let previews: Vec<query::QueryPreview> = session
            .norms()
            .iter()
            .filter(|n| req.norm_id.as_ref().map_or(true, |id| &n.norm_id == id))
            .map(|n| query::preview(n, session.config()))
            .collect();
        if previews.is_empty() {
            return Ok(error_result(match req.norm_id {
                Some(id) => format!("Norm {id} not found."),
                None => "No norms created yet.".to_string(),
            }));
        }
        Ok(json_result(&previews))
    }

    #[tool(description = "Send the configuration and all enabled norms to the analysis service and wait for the results. Fails immediately if a run is already in progress.")]
    async fn run_analysis(
        &self,
        Parameters(req): Parameters<RunAnalysisRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut request = {
            let session = self.session()?;
            AnalysisRequest::from_session(&session)
        };
        if request.norms.is_empty() {
            return Ok(error_result("No enabled norms to analyse."));
        }
        request.run_type = req.run_type;
        request.schedule = req.schedule;

        match self.runner.run(&request).await {
            Ok(results) => Ok(match results {
                serde_json::Value::String(report) => text_result(report),
                other => json_result(&other),
            }),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }

    #[tool(description = "Status of the latest analysis run: idle, running, succeeded (with results) or failed (with message)")]
    fn analysis_status(&self) -> Result<CallToolResult, McpError> {
        Ok(json_result(&self.runner.status()))
    }

    #[tool(description = "Get the norm authoring guide: what each norm type checks and which fields it needs")]
    fn get_guide(&self) -> Result<CallToolResult, McpError> {
        Ok(text_result(normcraft_core::guide::GUIDE))
    }
}

#[tool_handler]
impl ServerHandler for NormcraftServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!(
            "{}\n\n## Norm Guide\n{}",
            INSTRUCTIONS,
            normcraft_core::guide::GUIDE
        );
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

fn error_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text.into())])
}

fn json_result<T: Serialize + ?Sized>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(json) => text_result(json),
        Err(e) => error_result(format!("Serialization error: {e}")),
    }
}

/// Apply a details update. Rejects fields that do not belong to the norm type.
fn apply_details(details: &mut NormDetails, req: &UpdateDetailsRequest) -> Result<(), String> {
    let norm_type = details.norm_type();
    let not_for = |field: &str| format!("{field} does not apply to {norm_type}.");

    if let Some(v) = &req.norm_id {
        details.common.norm_id = v.trim().to_string();
    }
    if let Some(v) = &req.description {
        details.common.description = v.clone();
    }
    if let Some(v) = req.weight {
        if !v.is_finite() || v < 0.0 {
            return Err("weight must be a non-negative number.".to_string());
        }
        details.common.weight = v;
    }

    if req.threshold_seconds.is_some() || req.threshold_condition.is_some() {
        let NormKindDetails::AverageTime(d) = &mut details.kind else {
            return Err(not_for("threshold"));
        };
        if let Some(v) = &req.threshold_seconds {
            d.threshold_seconds = v.trim().to_string();
        }
        if let Some(v) = req.threshold_condition {
            d.threshold_condition = v;
        }
    }

    if req.operator.is_some() || req.count.is_some() {
        let NormKindDetails::EventToEntity(d) = &mut details.kind else {
            return Err(not_for("operator/count"));
        };
        if let Some(v) = req.operator {
            d.operator = v;
        }
        if let Some(v) = &req.count {
            d.count = v.trim().to_string();
        }
    }

    if let Some(v) = req.forbidden {
        let NormKindDetails::DirectlyFollows(d) = &mut details.kind else {
            return Err(not_for("forbidden"));
        };
        d.forbidden = v;
    }

    if let Some(v) = &req.relationship_label {
        let Some(slot) = details.kind.relation_label_mut() else {
            return Err(not_for("relationship_label"));
        };
        *slot = v.trim().to_string();
    }

    if let Some(v) = &req.aggregation_properties {
        let Some(props) = details.kind.aggregation_properties_mut() else {
            return Err(not_for("aggregation_properties"));
        };
        *props = v
            .iter()
            .filter(|p| !p.name.trim().is_empty())
            .cloned()
            .collect();
    }
    Ok(())
}

fn apply_filter(filter: &mut Filter, fields: &FilterFields) -> Result<(), FilterError> {
    if let Some(name) = &fields.name {
        filter.name = name.trim().to_string();
    }
    if let Some(data_type) = fields.data_type {
        filter.set_data_type(data_type);
    }
    if let Some(operator) = fields.operator {
        filter.set_operator(operator)?;
    }
    if let Some(value) = &fields.value {
        filter.set_value(value.clone())?;
    }
    if let Some(storage) = fields.storage {
        filter.storage = storage;
    }
    Ok(())
}

const INSTRUCTIONS: &str = r#"normcraft edits process conformance norms: rules over an event knowledge graph (events, entities, directly-follows and correlation relationships) that an analysis service checks in a graph database.

## Workflow
1. `get_config` / `set_config`: make sure the process configuration matches the graph's labels and relationship types.
2. `select_norm_type`, then `set_node_name` for each node and `update_details` for the type's fields. Property-value norms also need `add_filter`.
3. `get_editor` shows the current state and the first blocking issue. `create_norm` appends the norm when valid.
4. Repeat for more norms. `toggle_norm` / `remove_norm` manage the list; `save_norms` / `load_norms` persist it.
5. `preview_queries` shows the Cypher each norm will run. `run_analysis` submits the enabled norms; `analysis_status` reports the latest run."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the MCP protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("normcraft=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let store = Store::open_default();
    tracing::info!(root = %store.root().display(), "starting normcraft MCP server");

    let service = NormcraftServer::new(store, AnalysisRunner::from_env())
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}
