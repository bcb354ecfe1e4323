//! Node dispatch: turning one node plus its upstream results into an output.

use std::collections::HashMap;

use providers::{ChatMessage, ChatRequest};
use tracing::debug;

use crate::{
    EngineError,
    executor::ProviderRegistry,
    models::{AgentConfig, AgentWorkflow, NodeConfig, WorkflowNode},
};

/// Separator between upstream results in a combined input.
pub const JOIN_SEPARATOR: &str = "\n\n";

/// Join the resolved results of every connection targeting `node_id`, in
/// connection order. Sources without a result yet, or with an empty one,
/// are skipped.
pub fn combined_input(
    workflow: &AgentWorkflow,
    node_id: &str,
    results: &HashMap<String, String>,
) -> String {
    workflow
        .incoming(node_id)
        .filter_map(|conn| results.get(&conn.source_node_id))
        .filter(|result| !result.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(JOIN_SEPARATOR)
}

/// Resolve a single node's output.
///
/// `seed` is the run's initial input, returned as-is for the input node.
///
/// # Errors
/// Configuration errors for unknown, unregistered or unconfigured providers
/// and unsupported node types; [`EngineError::Provider`] when the call fails.
pub async fn dispatch_node(
    node: &WorkflowNode,
    input: String,
    seed: &str,
    providers: &ProviderRegistry,
) -> Result<String, EngineError> {
    match &node.config {
        NodeConfig::Input(_) => Ok(seed.to_owned()),
        NodeConfig::Output(_) => Ok(input),
        NodeConfig::Agent(agent) => call_agent(&node.id, agent, input, providers).await,
        NodeConfig::Unrecognized { kind, .. } => Err(EngineError::UnsupportedNode {
            node_id: node.id.clone(),
            kind: kind.clone(),
        }),
    }
}

async fn call_agent(
    node_id: &str,
    agent: &AgentConfig,
    input: String,
    providers: &ProviderRegistry,
) -> Result<String, EngineError> {
    if agent.provider.is_empty() {
        return Err(EngineError::MissingProvider { node_id: node_id.to_owned() });
    }

    let provider = providers.get(&agent.provider).ok_or_else(|| {
        EngineError::ProviderNotRegistered {
            node_id: node_id.to_owned(),
            provider: agent.provider.clone(),
        }
    })?;

    if !provider.is_configured() {
        return Err(EngineError::ProviderNotConfigured {
            node_id: node_id.to_owned(),
            provider: agent.provider.clone(),
        });
    }

    let request = ChatRequest {
        messages: vec![ChatMessage::user(input)],
        system_prompt: agent.system_prompt.clone(),
        model: agent.model.clone(),
        temperature: agent.temperature,
        max_tokens: agent.max_tokens,
    };

    debug!(node_id, provider = %agent.provider, "calling provider");

    let reply = provider
        .send_message(&request)
        .await
        .map_err(|source| EngineError::Provider {
            node_id: node_id.to_owned(),
            source,
        })?;

    Ok(reply.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use providers::{MockProvider, Provider, ProviderError};

    use crate::models::NodeConnection;

    fn registry(entries: Vec<(&str, Arc<dyn Provider>)>) -> ProviderRegistry {
        entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn joins_non_empty_results_in_connection_order() {
        let wf = AgentWorkflow::new(
            "wf",
            "join",
            vec![],
            vec![
                NodeConnection::between("b", "c"),
                NodeConnection::between("empty", "c"),
                NodeConnection::between("missing", "c"),
                NodeConnection::between("a", "c"),
            ],
        );
        let results: HashMap<String, String> = [("a", "from a"), ("b", "from b"), ("empty", "")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();

        assert_eq!(combined_input(&wf, "c", &results), "from b\n\nfrom a");
        assert_eq!(combined_input(&wf, "a", &results), "");
    }

    #[tokio::test]
    async fn agent_request_carries_node_settings() {
        let mock = Arc::new(MockProvider::replying("done"));
        let providers = registry(vec![("gpt", mock.clone() as Arc<dyn Provider>)]);
        let node = WorkflowNode::agent(
            "a",
            AgentConfig {
                model: Some("gpt-4o".into()),
                temperature: Some(0.2),
                max_tokens: Some(100),
                ..AgentConfig::new("gpt", "Be terse.")
            },
        );

        let output = dispatch_node(&node, "question".into(), "seed", &providers)
            .await
            .unwrap();

        assert_eq!(output, "done");
        let calls = mock.calls.lock().unwrap();
        assert_eq!(calls[0].messages, vec![ChatMessage::user("question")]);
        assert_eq!(calls[0].system_prompt, "Be terse.");
        assert_eq!(calls[0].model.as_deref(), Some("gpt-4o"));
        assert_eq!(calls[0].max_tokens, Some(100));
    }

    #[tokio::test]
    async fn input_returns_seed_and_output_passes_through() {
        let providers = ProviderRegistry::new();
        let input = WorkflowNode::input("in");
        let output = WorkflowNode::output("out");

        assert_eq!(dispatch_node(&input, "ignored".into(), "seed", &providers).await.unwrap(), "seed");
        assert_eq!(dispatch_node(&output, "joined".into(), "seed", &providers).await.unwrap(), "joined");
    }

    #[tokio::test]
    async fn unconfigured_provider_is_rejected_before_calling() {
        let mock = Arc::new(MockProvider::replying("never").unconfigured());
        let providers = registry(vec![("claude", mock.clone() as Arc<dyn Provider>)]);
        let node = WorkflowNode::agent("a", AgentConfig::new("claude", ""));

        let err = dispatch_node(&node, "x".into(), "x", &providers).await.unwrap_err();
        assert!(matches!(err, EngineError::ProviderNotConfigured { ref provider, .. } if provider == "claude"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn provider_failure_keeps_its_source() {
        let mock = Arc::new(MockProvider::failing(ProviderError::Unauthorized("bad key".into())));
        let providers = registry(vec![("claude", mock as Arc<dyn Provider>)]);
        let node = WorkflowNode::agent("a", AgentConfig::new("claude", ""));

        let err = dispatch_node(&node, "x".into(), "x", &providers).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Provider { ref node_id, source: ProviderError::Unauthorized(_) } if node_id == "a"
        ));
    }

    #[tokio::test]
    async fn agent_without_provider_names_the_field() {
        let node = WorkflowNode::agent("a", AgentConfig::new("", "hi"));
        let err = dispatch_node(&node, "x".into(), "x", &ProviderRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingProvider { ref node_id } if node_id == "a"));
        assert!(err.to_string().contains("'provider'"));
    }

    #[tokio::test]
    async fn unrecognized_node_is_unsupported() {
        let node = WorkflowNode::new(
            "r",
            "Router",
            NodeConfig::Unrecognized { kind: "router".into(), data: serde_json::Value::Null },
        );
        let err = dispatch_node(&node, "x".into(), "x", &ProviderRegistry::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported node type 'router'"));
    }
}
