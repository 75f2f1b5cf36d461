//! Tool dispatch — the model/tool round-trip state machine for one request.
//!
//! ```text
//!   AwaitingModel ──► ModelResponded ──(no tool calls)──► Done
//!        ▲                  │
//!        │            (tool calls)
//!        │                  ▼
//!        └──────────── Executing
//! ```
//!
//! Each pass through `Executing` is one round. A reply that still asks for
//! tools after `max_depth` rounds fails with [`Error::ToolLoopExceeded`]
//! before any of its calls run.
//!
//! Within a round, every call is resolved and its arguments validated
//! before any of them executes, so an unknown tool or bad arguments never
//! leave a round half done. Calls then run concurrently; results keep the
//! order the model asked for them in.
//!
//! Tool failures become error Tool turns the model can react to. Timeouts
//! are fatal.

use crate::token;
use futures::future::join_all;
use parley_core::error::{Error, ProviderError, Result, ToolError};
use parley_core::message::{ToolCallRequest, Turn};
use parley_core::provider::{ModelRequest, Provider, ProviderResponse, Usage};
use parley_core::tool::{Tool, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a request is in the dispatch cycle.
#[derive(Debug)]
pub enum DispatchState {
    /// The request is ready to go to the model.
    AwaitingModel,
    /// The model answered with this turn.
    ModelResponded(Turn),
    /// These calls from the model are to be run.
    Executing(Vec<ToolCallRequest>),
    /// Terminal: the model's final reply.
    Done(Turn),
}

/// The result of a completed dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The final assistant turn (no tool calls).
    pub reply: Turn,
    /// Every turn produced during dispatch, in order: tool-call requests,
    /// their tool results, and finally `reply`.
    pub transcript: Vec<Turn>,
    /// Usage summed over all model calls.
    pub usage: Usage,
    /// Tool rounds executed.
    pub rounds: u32,
}

/// Drives a request through model calls and tool executions.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    max_depth: u32,
    model_timeout: Duration,
    tool_timeout: Duration,
    input_budget: Option<usize>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            max_depth: 5,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            input_budget: None,
        }
    }

    /// Set the maximum number of tool rounds per request.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Cap the estimated input size of every follow-up model call.
    ///
    /// Tool results grow the request each round; a round whose results
    /// push it past `tokens` fails with [`Error::PromptTooLarge`].
    pub fn with_input_budget(mut self, tokens: usize) -> Self {
        self.input_budget = Some(tokens);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Run `request` to completion.
    pub async fn run(&self, provider: &dyn Provider, mut request: ModelRequest) -> Result<DispatchOutcome> {
        let mut transcript = Vec::new();
        let mut usage = Usage::default();
        let mut rounds = 0u32;
        let mut state = DispatchState::AwaitingModel;

        loop {
            state = match state {
                DispatchState::AwaitingModel => {
                    if rounds > 0 {
                        self.check_budget(&request)?;
                    }
                    let response = self.call_model(provider, &request).await?;
                    if let Some(u) = &response.usage {
                        usage.add(u);
                    }
                    DispatchState::ModelResponded(response.message)
                }

                DispatchState::ModelResponded(turn) if !turn.requests_tools() => {
                    DispatchState::Done(turn)
                }

                DispatchState::ModelResponded(turn) => {
                    if rounds >= self.max_depth {
                        warn!(
                            max_depth = self.max_depth,
                            requested = turn.tool_calls.len(),
                            "Model still requesting tools at maximum depth"
                        );
                        return Err(Error::ToolLoopExceeded {
                            max_depth: self.max_depth,
                        });
                    }
                    rounds += 1;
                    let calls = turn.tool_calls.clone();
                    request.messages.push(turn.clone());
                    transcript.push(turn);
                    DispatchState::Executing(calls)
                }

                DispatchState::Executing(calls) => {
                    debug!(round = rounds, calls = calls.len(), "Executing tool calls");
                    let results = self.execute_round(&calls).await?;
                    request.messages.extend(results.iter().cloned());
                    transcript.extend(results);
                    DispatchState::AwaitingModel
                }

                DispatchState::Done(reply) => {
                    transcript.push(reply.clone());
                    info!(rounds, total_tokens = usage.total_tokens, "Dispatch complete");
                    return Ok(DispatchOutcome {
                        reply,
                        transcript,
                        usage,
                        rounds,
                    });
                }
            };
        }
    }

    fn check_budget(&self, request: &ModelRequest) -> Result<()> {
        let Some(budget) = self.input_budget else {
            return Ok(());
        };
        let estimated = token::estimate_tokens(&request.system_prompt)
            + token::estimate_turns_tokens(&request.messages)
            + token::estimate_tools_tokens(&request.tools);
        if estimated > budget {
            warn!(estimated, budget, "Tool results pushed the request over budget");
            return Err(Error::PromptTooLarge {
                estimated_tokens: estimated,
                budget,
            });
        }
        Ok(())
    }

    async fn call_model(&self, provider: &dyn Provider, request: &ModelRequest) -> Result<ProviderResponse> {
        let timeout_ms = self.model_timeout.as_millis() as u64;
        match tokio::time::timeout(self.model_timeout, provider.complete(request.clone())).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(ProviderError::Timeout(_))) | Err(_) => {
                warn!(provider = provider.name(), timeout_ms, "Model call timed out");
                Err(Error::RemoteTimeout {
                    operation: format!("model call ({})", provider.name()),
                    timeout_ms,
                })
            }
            Ok(Err(e)) => {
                warn!(provider = provider.name(), error = %e, "Model call failed");
                Err(Error::RemoteUnavailable {
                    operation: format!("model call ({})", provider.name()),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Validate every call, then run them all. Results are in call order.
    async fn execute_round(&self, calls: &[ToolCallRequest]) -> Result<Vec<Turn>> {
        let tools = calls
            .iter()
            .map(|call| {
                self.registry
                    .resolve(&call.name, &call.arguments)
                    .map_err(|e| match e {
                        ToolError::NotFound(name) => Error::UnknownTool(name),
                        ToolError::InvalidArguments(reason) => Error::InvalidArguments {
                            tool_name: call.name.clone(),
                            reason,
                        },
                        other => Error::Internal(other.to_string()),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let results = join_all(
            calls
                .iter()
                .zip(tools)
                .map(|(call, tool)| self.invoke(call, tool)),
        )
        .await;

        results.into_iter().collect()
    }

    async fn invoke(&self, call: &ToolCallRequest, tool: Arc<dyn Tool>) -> Result<Turn> {
        let timeout_ms = self.tool_timeout.as_millis() as u64;
        let start = std::time::Instant::now();
        let outcome = tokio::time::timeout(self.tool_timeout, tool.execute(call.arguments.clone())).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                debug!(tool = %call.name, success = result.success, duration_ms, "Tool executed");
                Ok(Turn::tool_result(&call.id, &call.name, result.output, !result.success))
            }
            Ok(Err(ToolError::Timeout { .. })) | Err(_) => {
                warn!(tool = %call.name, timeout_ms, "Tool call timed out");
                Err(Error::RemoteTimeout {
                    operation: format!("tool '{}'", call.name),
                    timeout_ms,
                })
            }
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, duration_ms, "Tool execution failed");
                Ok(Turn::tool_result(&call.id, &call.name, format!("Error: {e}"), true))
            }
        }
    }
}
