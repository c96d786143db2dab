//! Command and batch execution
//!
//! The execution paths behind the boundary's `command` and `batch` entry
//! points: single-command routing with multi-node fan-out, atomic batches as
//! one all-or-nothing unit, and non-atomic pipelines with per-command retry
//! bookkeeping.
//!
//! Pipelines retry at command granularity: a retriable server error resends
//! only the failed command, while a link drop resends the whole sub-request
//! it interrupted. Results always land at their original submission index.

use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::batch::BatchRetryStrategy;
use crate::command::RequestType;
use crate::routing::{hash_slot, Route, Router};
use crate::value::WireValue;

use super::cluster::{ClientSession, Target};
use super::faults::LinkFault;
use super::node::Node;
use super::retry::{RetryCoordinator, RetryDecision, ServerFailure};

/// One command inside a batch, copied to owned form at the boundary.
#[derive(Debug, Clone)]
pub struct BatchCommand {
    pub request_type: RequestType,
    pub args: Vec<Bytes>,
}

impl BatchCommand {
    /// The routing key, for keyed opcodes.
    fn key(&self) -> Option<&[u8]> {
        match self.request_type {
            RequestType::Get
            | RequestType::Set
            | RequestType::Del
            | RequestType::Exists
            | RequestType::Append
            | RequestType::Incr => self.args.first().map(|arg| arg.as_ref()),
            _ => None,
        }
    }
}

/// Options carried alongside a non-atomic batch.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub route: Option<Route>,
    pub retry: BatchRetryStrategy,
}

/// Executes a single command: explicit route when given, otherwise the
/// keyed-command default. Multi-node routes fan out and fold the replies
/// into a per-address map.
pub fn execute_command(
    session: &ClientSession,
    command: BatchCommand,
    route: Option<Route>,
) -> Result<WireValue, ServerFailure> {
    let engine = session.engine();
    let effective = Router::effective_route(route, command.key());
    trace!(?effective, request = ?command.request_type, "executing command");
    match engine.resolve_route(&effective)? {
        Target::Single(node) => node.execute(command.request_type, &command.args),
        Target::Multi(nodes) => {
            let mut replies = Vec::with_capacity(nodes.len());
            for node in nodes {
                let value = node.execute(command.request_type, &command.args)?;
                replies.push((node.address().to_string(), value));
            }
            Ok(Router::merge_node_replies(replies))
        }
    }
}

/// Executes an atomic batch as one unit.
///
/// Queue validation runs first: any malformed command aborts the whole
/// batch before a single effect happens. Execution then runs under the
/// target node's transaction lock; runtime failures are embedded at their
/// index and the rest of the batch still runs.
pub fn execute_transaction(
    session: &ClientSession,
    commands: Vec<BatchCommand>,
    route: Option<Route>,
    raise_on_error: bool,
) -> Result<WireValue, ServerFailure> {
    let engine = session.engine();
    let node = transaction_node(session, &commands, route)?;

    // Queue phase. Nothing has executed yet, so an abort has no effects.
    for command in &commands {
        if let Err(failure) = Node::check_arity(command.request_type, command.args.len()) {
            return Err(ServerFailure::ExecAbort(format!(
                "transaction aborted: {}",
                failure.into_message()
            )));
        }
    }

    // A migrating slot fails the whole unit; atomic batches never retry.
    for command in &commands {
        if let Some(key) = command.key() {
            if engine.faults().take_migration(hash_slot(key)) {
                return Err(ServerFailure::TryAgain(
                    "TRYAGAIN slot is migrating".to_string(),
                ));
            }
        }
    }

    match engine.faults().take_link_fault() {
        Some(LinkFault::DropBeforeExecute) => {
            let _ = session.reconnect();
            return Err(ServerFailure::ConnectionLost(
                "connection dropped before transaction".to_string(),
            ));
        }
        Some(LinkFault::DropAfterExecute) => {
            // Effects happen, the reply is lost.
            node.in_transaction(|| {
                for command in &commands {
                    let _ = node.execute(command.request_type, &command.args);
                }
            });
            let _ = session.reconnect();
            return Err(ServerFailure::ConnectionLost(
                "connection dropped after transaction".to_string(),
            ));
        }
        None => {}
    }

    let mut first_failure: Option<ServerFailure> = None;
    let results = node.in_transaction(|| {
        commands
            .iter()
            .map(|command| match node.execute(command.request_type, &command.args) {
                Ok(value) => value,
                Err(failure) => {
                    if first_failure.is_none() {
                        first_failure = Some(failure.clone());
                    }
                    WireValue::ServerError(failure.into_message())
                }
            })
            .collect::<Vec<_>>()
    });

    if raise_on_error {
        if let Some(failure) = first_failure {
            return Err(failure);
        }
    }
    Ok(WireValue::Array(results))
}

/// Executes a non-atomic batch.
///
/// Commands are grouped per target node into sub-requests; every result or
/// failure is written back at the command's original submission index, so
/// the reply array always lines up with the input order regardless of how
/// retries interleave.
pub fn execute_pipeline(
    session: &ClientSession,
    commands: Vec<BatchCommand>,
    options: PipelineOptions,
    raise_on_error: bool,
) -> Result<WireValue, ServerFailure> {
    let engine = session.engine();
    let mut results: Vec<Option<WireValue>> = vec![None; commands.len()];
    let mut failures: Vec<Option<ServerFailure>> = vec![None; commands.len()];
    let mut coordinator = RetryCoordinator::new(options.retry);
    let mut pending: Vec<usize> = (0..commands.len()).collect();

    loop {
        // Deferred indices, each carrying the failure that caused the
        // deferral so budget exhaustion can record it.
        let mut deferred: Vec<(usize, ServerFailure)> = Vec::new();

        for (node, indices) in group_by_node(session, &commands, &pending, &options)? {
            match engine.faults().take_link_fault() {
                Some(fault) => {
                    if fault == LinkFault::DropAfterExecute {
                        // The whole sub-request executed, the replies were
                        // lost. Resending it duplicates these effects.
                        for &index in &indices {
                            let command = &commands[index];
                            let _ = node.execute(command.request_type, &command.args);
                        }
                    }
                    let failure = ServerFailure::ConnectionLost(
                        "connection dropped during request".to_string(),
                    );
                    let reconnected = session.reconnect().is_ok();
                    let decision = coordinator.classify(&failure);
                    for &index in &indices {
                        if reconnected && decision == RetryDecision::RetrySubRequest {
                            deferred.push((index, failure.clone()));
                        } else {
                            failures[index] = Some(failure.clone());
                        }
                    }
                }
                None => {
                    for &index in &indices {
                        let command = &commands[index];
                        if let Some(key) = command.key() {
                            if engine.faults().take_migration(hash_slot(key)) {
                                let failure = ServerFailure::TryAgain(
                                    "TRYAGAIN slot is migrating".to_string(),
                                );
                                match coordinator.classify(&failure) {
                                    RetryDecision::RetryCommand => {
                                        deferred.push((index, failure))
                                    }
                                    _ => failures[index] = Some(failure),
                                }
                                continue;
                            }
                        }
                        match node.execute(command.request_type, &command.args) {
                            Ok(value) => results[index] = Some(value),
                            Err(failure) => match coordinator.classify(&failure) {
                                RetryDecision::RetryCommand => deferred.push((index, failure)),
                                _ => failures[index] = Some(failure),
                            },
                        }
                    }
                }
            }
        }

        if deferred.is_empty() {
            break;
        }
        if !coordinator.budget_remaining() {
            for (index, failure) in deferred {
                failures[index] = Some(failure);
            }
            break;
        }
        trace!(retrying = deferred.len(), "resending failed pipeline commands");
        pending = deferred.into_iter().map(|(index, _)| index).collect();
    }

    if raise_on_error {
        // Errors raise only after the whole pipeline ran; the first failed
        // index in submission order wins.
        for failure in failures.iter_mut() {
            if let Some(failure) = failure.take() {
                return Err(failure);
            }
        }
    }

    let values = results
        .into_iter()
        .zip(failures)
        .map(|(value, failure)| match failure {
            Some(failure) => WireValue::ServerError(failure.into_message()),
            None => value.unwrap_or(WireValue::Null),
        })
        .collect();
    Ok(WireValue::Array(values))
}

/// Resolves the single node an atomic batch executes on.
///
/// An explicit route wins; otherwise every keyed command must hash to the
/// same slot, matching the cross-slot rule real clusters enforce.
fn transaction_node(
    session: &ClientSession,
    commands: &[BatchCommand],
    route: Option<Route>,
) -> Result<Arc<Node>, ServerFailure> {
    let engine = session.engine();
    if let Some(route) = route {
        return match engine.resolve_route(&route)? {
            Target::Single(node) => Ok(node),
            Target::Multi(_) => Err(ServerFailure::Request(
                "transaction route must target a single node".to_string(),
            )),
        };
    }

    let mut slot: Option<u16> = None;
    for command in commands {
        if let Some(key) = command.key() {
            let key_slot = hash_slot(key);
            match slot {
                None => slot = Some(key_slot),
                Some(existing) if existing != key_slot => {
                    return Err(ServerFailure::Request(
                        "CROSSSLOT keys in request don't hash to the same slot".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }
    }
    match slot {
        Some(slot) => Ok(engine.node_for_slot(slot)),
        None => match engine.resolve_route(&Route::Random)? {
            Target::Single(node) => Ok(node),
            Target::Multi(_) => unreachable!("random route is single-node"),
        },
    }
}

/// Groups pending command indices into per-node sub-requests, preserving
/// submission order inside each group.
fn group_by_node(
    session: &ClientSession,
    commands: &[BatchCommand],
    pending: &[usize],
    options: &PipelineOptions,
) -> Result<Vec<(Arc<Node>, Vec<usize>)>, ServerFailure> {
    let engine = session.engine();
    let mut groups: Vec<(Arc<Node>, Vec<usize>)> = Vec::new();
    for &index in pending {
        let command = &commands[index];
        let node = match &options.route {
            Some(route) => match engine.resolve_route(route)? {
                Target::Single(node) => node,
                Target::Multi(_) => {
                    return Err(ServerFailure::Request(
                        "batch route must target a single node".to_string(),
                    ))
                }
            },
            None => match command.key() {
                Some(key) => engine.node_for_key(key),
                None => match engine.resolve_route(&Route::Random)? {
                    Target::Single(node) => node,
                    Target::Multi(_) => unreachable!("random route is single-node"),
                },
            },
        };
        match groups
            .iter_mut()
            .find(|(existing, _)| existing.address() == node.address())
        {
            Some((_, indices)) => indices.push(index),
            None => groups.push((node, vec![index])),
        }
    }
    Ok(groups)
}
