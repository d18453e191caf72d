/// Norm authoring guide. Shared by the MCP server instructions and the `get_guide` tool.
pub const GUIDE: &str = "\
1. Pick a norm type first. Switching type rebuilds the canvas and resets every type-specific \
field. Only the norm id, description and weight survive a switch.\n\
2. AverageTimeBetweenActivitiesNorm: two activities joined by a directly-follows relationship. \
Requires a non-negative threshold in seconds and a condition (\"less than\" or \"greater than\"). \
Optional aggregation properties group the measurement.\n\
3. EntityFollowsEntityNorm: two entity types joined by an entity-level directly-follows \
relationship (DF_ENTITY by default).\n\
4. EventToEntityRelationshipNorm: the source node is the context entity and the target node is \
the activity. \"exists\" and \"not exists\" imply a count of 1 and 0. Every other operator \
(==, !=, >, <, >=, <=) needs a whole-number count.\n\
5. ActivityDirectlyFollowsNorm: two activities. Mark it forbidden to state that the pair must \
never occur directly after each other.\n\
6. EventPropertyValueNorm and EntityPropertyValueNorm: one node. The first filter is the \
property condition the norm checks. Later filters only narrow which events or entities are \
checked.\n\
7. Filter operators depend on the data type. string: in, not in, ==, !=. number: ==, !=, >, <, \
>=, <=. datetime: ==, <, <=, >, >=, between. Changing the data type resets operator and value. \
\"between\" takes a start and an end value. \"in\" and \"not in\" take a comma-separated list.\n\
8. Relationship labels default to the configured names (DF, DF_ENTITY, CORR). Override one \
only when the graph uses a different relationship type.\n\
9. Leave norm id and description blank to have them generated. Created norms are frozen. \
To change one, remove it and create it again.\n\
10. Only enabled norms are sent when running an analysis. A run already in flight blocks \
another from starting.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NormType;

    #[test]
    fn guide_mentions_every_norm_type() {
        for t in NormType::ALL {
            assert!(GUIDE.contains(t.tag()), "{t} missing from guide");
        }
    }
}
