//! BatchExecution interpreter.
//!
//! Runs the sub-commands of one batch, in order, against a single session. The
//! interpreter owns its bindings; nothing it records is visible outside the
//! returned [`ExecutionResults`].

use tracing::debug;

use crate::command::{BatchCommand, ExecutionResults, FactHandle};
use crate::error::{Result, ServerError};
use crate::model::Value;
use crate::session::Session;

/// Insert bound to an out-identifier; its value is read once the batch ends.
struct BoundFact {
    identifier: String,
    handle: FactHandle,
    return_object: bool,
}

/// Execute `commands` against `session`, holding its working memory for the
/// whole batch.
pub(crate) async fn execute(session: &Session, commands: &[BatchCommand]) -> Result<ExecutionResults> {
    let mut memory = session.lock().await;
    let mut results = ExecutionResults::new();
    let mut bound = Vec::new();

    for command in commands {
        debug!(session = %session.name(), command = command.name(), "Executing batch command");
        match command {
            BatchCommand::Insert {
                object,
                out_identifier,
                return_object,
            } => {
                let handle = memory.insert(object.clone());
                if let Some(identifier) = out_identifier {
                    bound.push(BoundFact {
                        identifier: identifier.clone(),
                        handle,
                        return_object: *return_object,
                    });
                }
            }
            BatchCommand::FireAllRules {
                max,
                out_identifier,
            } => {
                let fired = session
                    .engine()
                    .fire_all_rules(session.name(), &mut memory, *max)
                    .await
                    .map_err(|fault| ServerError::Executor {
                        session: session.name().to_string(),
                        message: fault.to_string(),
                    })?;
                debug!(session = %session.name(), fired, "Rules fired");
                if let Some(identifier) = out_identifier {
                    results.set_value(identifier.clone(), Value::Int(i64::from(fired)));
                }
            }
            BatchCommand::GetObjects { out_identifier } => {
                results.set_value(out_identifier.clone(), Value::List(memory.objects()));
            }
            BatchCommand::SetGlobal {
                identifier,
                object,
                out_identifier,
            } => {
                memory.set_global(identifier.clone(), object.clone());
                if let Some(out) = out_identifier {
                    results.set_value(out.clone(), object.clone());
                }
            }
            BatchCommand::GetGlobal { identifier, .. } => {
                let value = memory.global(identifier).cloned().unwrap_or(Value::Null);
                let out = command.out_identifier().unwrap_or(identifier);
                results.set_value(out.to_string(), value);
            }
        }
    }

    // Inserted facts are reported with their post-evaluation value.
    for fact in bound {
        if fact.return_object {
            if let Some(value) = memory.get(&fact.handle) {
                results.set_value(fact.identifier.clone(), value.clone());
            }
        }
        results.set_fact_handle(fact.identifier, fact.handle);
    }

    Ok(results)
}
