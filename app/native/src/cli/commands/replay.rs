//! Replay command.
//!
//! Drives a real session against the in-memory window server from a script of
//! JSON lines, printing every event and command outcome as it happens.
//!
//! Each non-empty line is one step, tagged by `step`:
//!
//! ```text
//! {"step":"seed","kind":"screen","displayId":1,"frame":{"x":0,"y":0,"width":1920,"height":1080}}
//! {"step":"notify","type":"changed","object":{"kind":"window","pid":42,"windowNumber":1},
//!  "value":{"attribute":"title","value":"Inbox"}}
//! {"step":"command","target":{"kind":"application","pid":42},"operation":{"op":"setHidden","value":true}}
//! {"step":"echo","enabled":false}
//! {"step":"sleep","ms":600}
//! {"step":"settle"}
//! ```
//!
//! Seeds before the first other step form the discovered world; later seeds
//! are delivered as creation notifications. Lines starting with `#` or `//`
//! are comments.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::cli::output;
use crate::config::{ReconcilerConfig, WinsyncConfig};
use crate::error::WinsyncError;
use crate::reconciler::{
    BoundaryError, CommandError, CommandTag, Confirmation, EntityId, Event, InMemoryWindowServer,
    Mutation, ObjectInfo, Operation, OsRef, PendingCommand, RawNotification, Session, Snapshot,
    WindowId, WindowServer,
};

/// Arguments of `winsync replay`.
#[derive(Args, Debug)]
#[command(after_long_help = r#"Examples:
  winsync replay session.jsonl            # Replay a script, printing events
  winsync replay - < session.jsonl        # Read the script from stdin
  winsync replay session.jsonl --json     # One JSON object per event
  winsync replay session.jsonl --summary  # Print the final state as tables"#)]
pub struct ReplayArgs {
    /// Script to replay, or `-` for stdin.
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Print events and outcomes as JSON lines.
    #[arg(long, short)]
    pub json: bool,

    /// Print the final snapshot after the script completes.
    #[arg(long, short)]
    pub summary: bool,

    /// Fail if any command does not confirm.
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// Script
// ============================================================================

/// One line of a replay script.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ReplayStep {
    /// An object present at discovery.
    Seed(ObjectInfo),
    /// A notification, as the OS would push it.
    Notify(RawNotification),
    /// A mutation addressed by OS reference.
    Command {
        target: OsRef,
        operation: Operation,
        /// Wait for the outcome before the next step.
        #[serde(default = "default_wait")]
        wait: bool,
    },
    /// Turns automatic confirmations on or off.
    Echo { enabled: bool },
    /// Makes the window server reject the next request.
    Reject { code: i32, message: String },
    Sleep { ms: u64 },
    /// Waits for queued notifications, pending commands and subscribers.
    Settle,
}

const fn default_wait() -> bool { true }

/// A step with its 1-based script line.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptLine {
    pub line: usize,
    pub step: ReplayStep,
}

/// Parses a replay script.
///
/// # Errors
///
/// Returns [`WinsyncError::ScriptError`] for the first line that is not a
/// valid step.
pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>, WinsyncError> {
    text.lines()
        .enumerate()
        .map(|(idx, raw)| (idx + 1, raw.trim()))
        .filter(|(_, raw)| !raw.is_empty() && !raw.starts_with('#') && !raw.starts_with("//"))
        .map(|(line, raw)| {
            serde_json::from_str(raw)
                .map(|step| ScriptLine { line, step })
                .map_err(|err| WinsyncError::ScriptError { line, message: err.to_string() })
        })
        .collect()
}

// ============================================================================
// Outcomes
// ============================================================================

/// How a scripted command ended.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outcome {
    Confirmed { confirmation: Confirmation },
    Failed { error: CommandError },
    /// The target is not in the current snapshot.
    Unresolved,
}

/// A scripted command and its outcome.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub line: usize,
    pub target: OsRef,
    pub operation: Operation,
    pub tag: Option<CommandTag>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl CommandOutcome {
    #[must_use]
    pub const fn is_confirmed(&self) -> bool { matches!(self.outcome, Outcome::Confirmed { .. }) }
}

/// Something the replay reports while it runs.
#[derive(Clone, Copy, Debug)]
pub enum ReplayOutput<'a> {
    Event(&'a Event),
    Command(&'a CommandOutcome),
}

/// Everything a finished replay observed.
#[derive(Debug)]
pub struct ReplayReport {
    pub events: Vec<Event>,
    pub commands: Vec<CommandOutcome>,
    pub snapshot: Arc<Snapshot>,
}

// ============================================================================
// Runner
// ============================================================================

struct InFlight {
    line: usize,
    target: OsRef,
    operation: Operation,
    pending: PendingCommand,
}

/// Runs `script` against a fresh session and in-memory window server.
///
/// `report` is called for every event (from the subscriber task) and every
/// command outcome.
///
/// # Errors
///
/// Returns an error if the session cannot be created or stops early.
pub async fn replay<F>(
    script: Vec<ScriptLine>,
    config: ReconcilerConfig,
    report: F,
) -> Result<ReplayReport, WinsyncError>
where
    F: for<'a> Fn(ReplayOutput<'a>) + Send + Sync + 'static,
{
    let report = Arc::new(report);
    let mut steps = script.into_iter().peekable();

    let mut world = Vec::new();
    while let Some(ScriptLine { step: ReplayStep::Seed(object), .. }) = steps.peek() {
        world.push(object.clone());
        steps.next();
    }

    let server = Arc::new(InMemoryWindowServer::new(world));
    let session = Session::initialize(Arc::clone(&server) as Arc<dyn WindowServer>, config).await?;
    tracing::info!("replaying against session {}", session.id());

    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let printer = Arc::clone(&report);
    session.subscribe_all(move |event| {
        (*printer)(ReplayOutput::Event(event));
        recorded.lock().push(event.clone());
    });

    let emit = &*report;
    let mut commands = Vec::new();
    let mut in_flight = Vec::new();

    for ScriptLine { line, step } in steps {
        tracing::debug!("replay line {line}: {step:?}");
        match step {
            ReplayStep::Seed(object) => {
                server.notify(RawNotification::Created { object });
            }
            ReplayStep::Notify(notification) => {
                server.notify(notification);
            }
            ReplayStep::Command { target, operation, wait } => {
                session.flush().await?;
                let Some(mutation) = resolve(&session.snapshot(), target, &operation) else {
                    let outcome = CommandOutcome {
                        line,
                        target,
                        operation,
                        tag: None,
                        outcome: Outcome::Unresolved,
                    };
                    emit(ReplayOutput::Command(&outcome));
                    commands.push(outcome);
                    continue;
                };

                match session.submit(mutation.0, mutation.1).await {
                    Ok(pending) => {
                        let flight = InFlight { line, target, operation, pending };
                        if wait {
                            let outcome = land(flight).await;
                            session.settle().await?;
                            emit(ReplayOutput::Command(&outcome));
                            commands.push(outcome);
                        } else {
                            in_flight.push(flight);
                        }
                    }
                    Err(error) => {
                        let outcome = CommandOutcome {
                            line,
                            target,
                            operation,
                            tag: None,
                            outcome: Outcome::Failed { error },
                        };
                        emit(ReplayOutput::Command(&outcome));
                        commands.push(outcome);
                    }
                }
            }
            ReplayStep::Echo { enabled } => server.set_echo(enabled),
            ReplayStep::Reject { code, message } => {
                server.reject_next(BoundaryError::Rejected { code, message });
            }
            ReplayStep::Sleep { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            ReplayStep::Settle => {
                land_all(&session, &mut in_flight, &mut commands, emit).await?;
            }
        }
    }

    land_all(&session, &mut in_flight, &mut commands, emit).await?;
    let snapshot = session.snapshot();
    session.destroy().await;

    let events = std::mem::take(&mut *events.lock());
    Ok(ReplayReport { events, commands, snapshot })
}

/// Maps an OS-addressed operation onto a session mutation.
fn resolve(snapshot: &Snapshot, target: OsRef, operation: &Operation) -> Option<(EntityId, Mutation)> {
    let id = snapshot.resolve_os_ref(&target)?;
    let mutation = match *operation {
        Operation::SetFrame(frame) => Mutation::SetFrame(frame),
        Operation::SetPosition(origin) => Mutation::SetPosition(origin),
        Operation::SetSize(size) => Mutation::SetSize(size),
        Operation::SetMinimized(flag) => Mutation::SetMinimized(flag),
        Operation::SetFullscreen(flag) => Mutation::SetFullscreen(flag),
        Operation::SetHidden(flag) => Mutation::SetHidden(flag),
        Operation::SetFrontmost => Mutation::SetFrontmost,
        Operation::SetMainWindow { window_number } => {
            let OsRef::Application { pid } = target else {
                return None;
            };
            let window = snapshot.resolve_os_ref(&OsRef::Window { pid, window_number })?;
            Mutation::SetMainWindow(WindowId::from_entity(window)?)
        }
    };
    Some((id, mutation))
}

async fn land(flight: InFlight) -> CommandOutcome {
    let tag = Some(flight.pending.tag());
    let outcome = match flight.pending.await {
        Ok(confirmation) => Outcome::Confirmed { confirmation },
        Err(error) => Outcome::Failed { error },
    };
    CommandOutcome { line: flight.line, target: flight.target, operation: flight.operation, tag, outcome }
}

async fn land_all<F>(
    session: &Session,
    in_flight: &mut Vec<InFlight>,
    commands: &mut Vec<CommandOutcome>,
    report: &F,
) -> Result<(), WinsyncError>
where
    F: for<'a> Fn(ReplayOutput<'a>) + ?Sized,
{
    session.flush().await?;
    let landed = futures::future::join_all(in_flight.drain(..).map(land)).await;
    session.settle().await?;

    for outcome in landed {
        report(ReplayOutput::Command(&outcome));
        commands.push(outcome);
    }
    Ok(())
}

// ============================================================================
// Command entry point
// ============================================================================

/// Execute the replay command.
///
/// # Errors
///
/// Returns an error if the script cannot be read or parsed, the session
/// fails, or `--strict` is set and a command did not confirm.
pub fn execute(args: &ReplayArgs, config: &WinsyncConfig) -> Result<(), WinsyncError> {
    let text = read_script(&args.script)?;
    let script = parse_script(&text)?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_time().build()?;

    let json = args.json;
    let report = runtime.block_on(replay(script, config.reconciler.clone(), move |output| {
        print_output(output, json);
    }))?;

    if args.summary {
        if json {
            let value = serde_json::to_value(report.snapshot.as_ref())
                .map_err(|err| WinsyncError::IoError(err.to_string()))?;
            output::print_highlighted_json(&value);
        } else {
            output::print_summary(&report.snapshot);
        }
    }

    let failed = report.commands.iter().filter(|outcome| !outcome.is_confirmed()).count();
    if !json {
        println!(
            "\n{} events, {} commands ({} unconfirmed)",
            report.events.len(),
            report.commands.len(),
            failed
        );
    }

    if args.strict && failed > 0 {
        return Err(WinsyncError::CommandFailed(format!("{failed} command(s) did not confirm")));
    }
    Ok(())
}

fn read_script(path: &Path) -> Result<String, WinsyncError> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }

    std::fs::read_to_string(path).map_err(|err| {
        WinsyncError::IoError(format!("Failed to read script {}: {err}", path.display()))
    })
}

fn print_output(output: ReplayOutput<'_>, json: bool) {
    if json {
        let line = match output {
            ReplayOutput::Event(event) => serde_json::to_string(event),
            ReplayOutput::Command(outcome) => serde_json::to_string(outcome),
        };
        match line {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!("failed to serialize replay output: {err}"),
        }
        return;
    }

    match output {
        ReplayOutput::Event(event) => println!("{}", output::format_event(event)),
        ReplayOutput::Command(outcome) => println!("{}", format_outcome(outcome)),
    }
}

fn format_outcome(outcome: &CommandOutcome) -> String {
    let tag = outcome.tag.map_or_else(String::new, |tag| format!(" {tag}"));
    let head = format!("line {}: {:?}{tag}", outcome.line, outcome.operation);
    match &outcome.outcome {
        Outcome::Confirmed { confirmation } => {
            format!("{:>8} {head} -> {:?}", "ok".green(), confirmation.value)
        }
        Outcome::Failed { error } => format!("{:>8} {head}: {error}", "failed".red()),
        Outcome::Unresolved => format!("{:>8} {head}: target not found", "skipped".yellow()),
    }
}
