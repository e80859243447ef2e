// crates/catalog-classify/src/descent.rs
// ============================================================================
// Module: Tree Descent
// Description: Per-group AI-guided walk of the IC tree (spec §4.10 per-group
// algorithm).
// Purpose: Turn one `(normalized_name, category)` group into a `(code, name,
// confidence)` assignment plus its step path, with the rate-limit/circuit-
// breaker backoff policy the orchestration section specifies.
// Dependencies: catalog-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! [`descend`] walks from the root set downward: at each level it lists the
//! current node's children as candidates, asks AI to pick one
//! ([`ask_candidate`]), and either accepts the pick and continues one level
//! deeper or stops at the current node (empty candidate list, or AI declines
//! to pick one — spec §4.10 step 2). AI transport failures are retried by
//! [`call_with_backoff`] using the schedule spec §4.10 Orchestration gives for
//! rate-limit/quota errors (sleep ~3s, one retry) and circuit-breaker-open
//! errors (5s retry, then 10s retry, then give up); any other error and an
//! exhausted backoff both give up on the group entirely rather than
//! persisting a shallower partial result.

use catalog_core::domain::ClassifierNode;
use catalog_core::identifiers::IcCode;
use catalog_core::providers::AiError;
use catalog_core::providers::AiProvider;
use catalog_core::providers::ChatRequest;
use serde::Deserialize;
use tracing::warn;

use crate::tree::ClassifierTree;

/// One accepted descent step (spec §4.10 step 2 "record the step").
#[derive(Debug, Clone, PartialEq)]
pub struct DescentStep {
    /// Chosen node's code.
    pub code: IcCode,
    /// Chosen node's name.
    pub name: String,
    /// AI confidence for this step.
    pub confidence: f64,
    /// AI's free-text reason for this step.
    pub reason: String,
}

/// Result of a full descent for one group (spec §4.10 step 3).
#[derive(Debug, Clone, PartialEq)]
pub struct DescentOutcome {
    /// Final (deepest accepted) code.
    pub code: IcCode,
    /// Final node name.
    pub name: String,
    /// Final node confidence.
    pub confidence: f64,
    /// Full accepted step path, root to leaf.
    pub steps: Vec<DescentStep>,
    /// Number of AI calls made during this descent (spec §4.10 step 3).
    pub ai_calls: u32,
}

/// Raw shape of the AI's per-step candidate-selection response.
#[derive(Debug, Deserialize, Default)]
struct RawCandidateResponse {
    code: Option<String>,
    name: Option<String>,
    confidence: Option<f64>,
    reason: Option<String>,
}

/// Walks `tree` for one `(normalized_name, category)` group, asking `ai`
/// which child to descend into at each level (spec §4.10 per-group
/// algorithm).
///
/// Returns `Ok(None)` if the walk never accepted a single step (no root
/// candidates, or AI declined at the very first level) — the caller treats
/// this as an unclassified group, not an error (spec §4.10 step 2 "stop at
/// current node").
///
/// # Errors
///
/// Returns [`AiError`] if a candidate-selection call exhausts its backoff
/// retries (spec §4.10 Orchestration); the group is then abandoned entirely,
/// discarding any steps already accepted, since the spec treats backoff
/// exhaustion as "give up for this group" rather than a partial result.
pub async fn descend(
    tree: &ClassifierTree,
    ai: &dyn AiProvider,
    normalized_name: &str,
    category: &str,
) -> Result<Option<DescentOutcome>, AiError> {
    let mut steps: Vec<DescentStep> = Vec::new();
    let mut ai_calls = 0u32;
    let mut current_parent: Option<IcCode> = None;

    loop {
        let candidates = tree.children_of(current_parent.as_ref());
        if candidates.is_empty() {
            break;
        }

        let request = candidate_request(normalized_name, category, candidates);
        let response_text = call_with_backoff(ai, request).await?;
        ai_calls += 1;

        let Some(step) = parse_candidate_step(&response_text, candidates) else { break };
        current_parent = Some(step.code.clone());
        steps.push(step);
    }

    Ok(steps.last().cloned().map(|last| DescentOutcome {
        code: last.code,
        name: last.name,
        confidence: last.confidence,
        steps: steps.clone(),
        ai_calls,
    }))
}

/// Classification of an AI failure used to pick a backoff schedule (spec
/// §4.10 Orchestration).
enum ErrorClass {
    /// Rate-limit/quota/"exceeded parallel requests" style failure.
    RateLimited,
    /// Circuit breaker open.
    CircuitOpen,
    /// Anything else; not retried here.
    Other,
}

fn classify_error(error: &AiError) -> ErrorClass {
    match error {
        AiError::Unavailable(_) => ErrorClass::CircuitOpen,
        AiError::Transport(message) => {
            let lowered = message.to_lowercase();
            if lowered.contains("rate limit") || lowered.contains("quota") || lowered.contains("exceeded parallel") {
                ErrorClass::RateLimited
            } else {
                ErrorClass::Other
            }
        }
        AiError::InvalidResponse(_) => ErrorClass::Other,
    }
}

/// Issues one candidate-selection call, retrying per the schedule spec
/// §4.10 Orchestration specifies for rate-limit and circuit-breaker-open
/// failures; any other failure is returned immediately.
async fn call_with_backoff(ai: &dyn AiProvider, request: ChatRequest) -> Result<String, AiError> {
    match ai.complete(request.clone()).await {
        Ok(text) => return Ok(text),
        Err(first_error) => match classify_error(&first_error) {
            ErrorClass::Other => return Err(first_error),
            ErrorClass::RateLimited => {
                warn!("AI rate-limited during classification, retrying after 3s");
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            }
            ErrorClass::CircuitOpen => {
                warn!("circuit breaker open during classification, retrying after 5s");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        },
    }

    match ai.complete(request.clone()).await {
        Ok(text) => Ok(text),
        Err(second_error) => match classify_error(&second_error) {
            ErrorClass::CircuitOpen => {
                warn!("circuit breaker still open, retrying once more after 10s");
                tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                ai.complete(request).await
            }
            ErrorClass::RateLimited | ErrorClass::Other => Err(second_error),
        },
    }
}

fn candidate_request(normalized_name: &str, category: &str, candidates: &[ClassifierNode]) -> ChatRequest {
    let candidate_list = candidates
        .iter()
        .map(|node| format!("{{\"code\":\"{}\",\"name\":\"{}\"}}", node.code.as_str(), node.name))
        .collect::<Vec<_>>()
        .join(", ");
    ChatRequest {
        system_prompt: "You are an industry-classifier assistant. Given an item and a list of \
            candidate classifier nodes, pick the single best-fitting node, or none if nothing \
            fits. Respond with a strict JSON object: {\"code\": string|null, \"name\": string|null, \
            \"confidence\": number in [0,1], \"reason\": string}."
            .to_string(),
        user_prompt: format!(
            "Item normalized name: {normalized_name}\nItem category: {category}\nCandidates: [{candidate_list}]"
        ),
    }
}

/// Parses the AI's response and validates the chosen code is actually one of
/// `candidates` (spec §8.6 HC safety: only a code that exists in the tree may
/// ever be persisted).
fn parse_candidate_step(response_text: &str, candidates: &[ClassifierNode]) -> Option<DescentStep> {
    let value: serde_json::Value = serde_json::from_str(response_text).unwrap_or(serde_json::Value::Null);
    let raw: RawCandidateResponse = serde_json::from_value(value).unwrap_or_default();
    let code = raw.code?;
    let chosen = candidates.iter().find(|node| node.code.as_str() == code)?;
    Some(DescentStep {
        code: chosen.code.clone(),
        name: raw.name.unwrap_or_else(|| chosen.name.clone()),
        confidence: raw.confidence.filter(|c| (0.0..=1.0).contains(c)).unwrap_or(0.5),
        reason: raw.reason.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use catalog_core::domain::ClassifierNode;

    use super::*;
    use crate::tree::ClassifierTree;

    fn node(code: &str, parent: Option<&str>, level: u32) -> ClassifierNode {
        ClassifierNode { code: IcCode::new(code), name: format!("Node {code}"), parent_code: parent.map(IcCode::new), level }
    }

    struct ScriptedProvider {
        responses: std::sync::Mutex<Vec<Result<String, AiError>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        async fn complete(&self, _request: ChatRequest) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut guard = self.responses.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if guard.is_empty() {
                Err(AiError::Transport("no more scripted responses".to_string()))
            } else {
                guard.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn descends_three_levels_per_s5() {
        let tree = ClassifierTree::build(vec![
            node("A", None, 1),
            node("A1", Some("A"), 2),
            node("A1a", Some("A1"), 3),
        ]);
        let provider = ScriptedProvider {
            responses: std::sync::Mutex::new(vec![
                Ok(r#"{"code":"A","name":"Node A","confidence":0.9,"reason":"r1"}"#.to_string()),
                Ok(r#"{"code":"A1","name":"Node A1","confidence":0.8,"reason":"r2"}"#.to_string()),
                Ok(r#"{"code":"A1a","name":"Node A1a","confidence":0.7,"reason":"r3"}"#.to_string()),
            ]),
            calls: AtomicUsize::new(0),
        };
        let outcome = descend(&tree, &provider, "item", "cat").await.expect("no error").expect("classified");
        assert_eq!(outcome.code.as_str(), "A1a");
        assert_eq!(outcome.steps.len(), 3);
        assert_eq!(outcome.ai_calls, 3);
        assert!((outcome.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stops_when_ai_declines_a_candidate() {
        let tree = ClassifierTree::build(vec![node("A", None, 1), node("A1", Some("A"), 2)]);
        let provider = ScriptedProvider {
            responses: std::sync::Mutex::new(vec![Ok(r#"{"code":null,"confidence":0.0,"reason":"none fit"}"#.to_string())]),
            calls: AtomicUsize::new(0),
        };
        let outcome = descend(&tree, &provider, "item", "cat").await.expect("no error");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn empty_tree_yields_no_outcome_without_any_ai_call() {
        let tree = ClassifierTree::build(Vec::new());
        let provider = ScriptedProvider { responses: std::sync::Mutex::new(Vec::new()), calls: AtomicUsize::new(0) };
        let outcome = descend(&tree, &provider, "item", "cat").await.expect("no error");
        assert!(outcome.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_error_retries_once_then_succeeds() {
        let tree = ClassifierTree::build(vec![node("A", None, 1)]);
        let provider = ScriptedProvider {
            responses: std::sync::Mutex::new(vec![
                Err(AiError::Transport("rate limit exceeded".to_string())),
                Ok(r#"{"code":"A","name":"Node A","confidence":0.5,"reason":"ok"}"#.to_string()),
            ]),
            calls: AtomicUsize::new(0),
        };
        let outcome = descend(&tree, &provider, "item", "cat").await.expect("recovers").expect("classified");
        assert_eq!(outcome.code.as_str(), "A");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn circuit_open_exhausts_retries_and_gives_up() {
        let tree = ClassifierTree::build(vec![node("A", None, 1)]);
        let provider = ScriptedProvider {
            responses: std::sync::Mutex::new(vec![
                Err(AiError::Unavailable("open".to_string())),
                Err(AiError::Unavailable("open".to_string())),
                Err(AiError::Unavailable("open".to_string())),
            ]),
            calls: AtomicUsize::new(0),
        };
        let result = descend(&tree, &provider, "item", "cat").await;
        assert!(result.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn parse_candidate_step_rejects_code_outside_candidates() {
        let candidates = vec![node("A", None, 1)];
        let parsed = parse_candidate_step(r#"{"code":"Z","confidence":0.9,"reason":"x"}"#, &candidates);
        assert!(parsed.is_none());
    }
}
