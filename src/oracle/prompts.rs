//! Prompt templates for the chat-completion oracle.
//!
//! User templates contain a single `{payload}` placeholder that receives the
//! JSON-serialized query.

pub const ROOT_SYSTEM_PROMPT: &str = "You are a taxonomy root selector. \
Return ONLY a JSON object matching the RootSelectionResponse schema: \
{\"conceptRoots\": [{\"conceptKey\": string, \"roots\": [{\"oClassId\": string, \"confidence\": number, \"rationale\": string?}]}], \
\"eventRoots\": [{\"oClassId\": string, \"confidence\": number}], \"errors\": []}. \
No markdown, no comments, no extra text.";

pub const ROOT_USER_TEMPLATE: &str = "\
[Context]
Concept mentions and an event title come from personal calendar entries.
You receive ONLY the top-level classes of the taxonomy, never the full tree.
Concept roots must come from conceptRootOClasses; event roots must come from eventRootOClasses.

[Task]
- For every concept, list up to 5 plausible roots with a confidence between 0 and 1.
- For the event title, list up to 5 plausible roots with a confidence between 0 and 1.
- Favor recall: include every root that could reasonably apply.
- When nothing applies, return an empty list for that item.

[Payload JSON]
{payload}
";

pub const LEAF_SYSTEM_PROMPT: &str = "You are a taxonomy classifier. \
Return ONLY a JSON object matching the ClassifyResponse schema: \
{\"ok\": bool, \"classifications\": [{\"conceptKey\", \"conceptType\", \"conceptName\", \"oClassId\", \"confidence\", \"rationale\"?}], \
\"eventActivities\": [{\"eventId\"?, \"oClassId\", \"confidence\", \"rationale\"?}], \
\"oClassesToAdd\": [], \"subclassEdgesToAdd\": [], \"errors\": [], \"warnings\": []}. \
No markdown, no comments, no extra text.";

pub const LEAF_USER_TEMPLATE: &str = "\
[Context]
Concept mentions from calendar titles are placed into an existing class tree.
Each item lists the leaf ids it may be assigned to in rootCandidates; rootSubtrees describes those leaves.

[Task]
- Assign every concept to exactly one LEAF id taken from its own rootCandidates.
- If an event is present, assign it to one LEAF id taken from the event's rootCandidates.
- When mode is existing_only, never add classes or edges.
- When mode is allow_new_leaf, you may add a new leaf class under a node of the candidate subtrees, with its subclass edge.
- When unsure, prefer the more general leaf.
- Use sourceText, normalizedTextEn, surface, span and examples when present.

[Payload JSON]
{payload}
";

pub const PROPOSE_SYSTEM_PROMPT: &str = "You are an ontology engineer. \
Return ONLY a JSON object matching the ProposeResponse schema: \
{\"ok\": bool, \"oClassesToAdd\": [], \"subclassEdgesToAdd\": [], \"classifications\": [], \
\"queryTemplates\": [{\"cqId\"?, \"goal\"?, \"querySketch\"?, \"params\"?, \"outputSchema\"?}], \"errors\": [], \"warnings\": []}. \
No markdown, no comments, no extra text.";

pub const PROPOSE_USER_TEMPLATE: &str = "\
[Context]
A personal knowledge graph is built from calendar titles (mentions only).
Attendees, locations and true durations are unknown. No external knowledge bases.

[Task]
Given competency questions (cqs) and the current taxonomy snapshot, propose minimal additions:
- oClassesToAdd: leaf-first, avoid new roots
- subclassEdgesToAdd: parentId/childId pairs attaching the new classes
- classifications: conceptKey to oClassId with confidence
- queryTemplates: read-only querySketch with params and outputSchema

[Rules]
- When unsure, classify at the more general parent.
- Do not invent new data fields.
- Do not model analysis metrics (distributions, trends, scores) as properties.

[Payload JSON]
{payload}
";

/// Substitute the serialized payload into a user template.
pub fn render(template: &str, payload: &str) -> String {
    template.replace("{payload}", payload)
}
