//! Scripted host for the clock objects.
//!
//! A script is a TOML document declaring named objects and a list of timed
//! events. Each event sends one command to one object at a given time:
//!
//! ```toml
//! [[object]]
//! name = "beat"
//! kind = "metro"
//! args = [250]
//!
//! [[object]]
//! name = "queue"
//! kind = "pipe"
//! args = ["f", "s", 100]
//!
//! [[event]]
//! at = 0
//! target = "beat"
//! command = { op = "bang" }
//!
//! [[event]]
//! at = 40
//! target = "queue"
//! command = { op = "list", values = [3, "x"] }
//! ```
//!
//! Every object output is logged and kept as a [`TraceLine`].

use serde::Deserialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tempo_common::binding::BindingAnchor;
use tempo_common::conditions::ConditionLog;
use tempo_common::config::TempoConfig;
use tempo_common::error::TempoError;
use tempo_common::time::Millis;
use tempo_common::value::TaggedValue;
use tempo_objects::{
    Delay, DelayCommand, Line, LineCommand, Metro, MetroCommand, Pipe, PipeCommand, PipeLayout,
    Timer, TimerCommand,
};
use tempo_runtime::outlet::{Outlet, OutletRef, Output};
use tempo_runtime::scheduler::Scheduler;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Script file could not be read.
    #[error("failed to read script {path}: {source}")]
    Io {
        /// Path to the script.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Script is not valid TOML or does not match the script format.
    #[error("failed to parse script: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two objects share a name.
    #[error("duplicate object name: {0}")]
    DuplicateObject(String),

    /// An event targets an object that was never declared.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// A value names a binding that was never declared.
    #[error("unknown binding: {0}")]
    UnknownBinding(String),

    /// A command does not fit the target object.
    #[error("invalid command for {target}: {source}")]
    BadCommand {
        /// Target object name.
        target: String,
        /// Decoding error.
        #[source]
        source: toml::de::Error,
    },
}

/// Kinds of object a script can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Single-shot delay; `args = [delay]`.
    Delay,
    /// Periodic timer; `args = [interval]`.
    Metro,
    /// Ramp; `args = [initial, grain]`.
    Line,
    /// Elapsed-time probe.
    Timer,
    /// Delayed queue; `args` are slot declarations followed by the delay.
    Pipe,
    /// Host state that pipes can reference.
    Binding,
}

/// A literal in a script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScriptValue {
    /// Number.
    Number(f64),
    /// Symbol.
    Symbol(String),
    /// Reference to a declared binding object: `{ binding = "name" }`.
    Binding {
        /// Name of the binding object.
        binding: String,
    },
}

/// Declaration of one object.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectSpec {
    /// Unique name used by events.
    pub name: String,
    /// Object kind.
    pub kind: ObjectKind,
    /// Creation arguments.
    #[serde(default)]
    pub args: Vec<ScriptValue>,
}

/// One timed command.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSpec {
    /// Time in milliseconds since the start of the run.
    pub at: Millis,
    /// Name of the target object.
    pub target: String,
    /// Command table; its shape depends on the target kind.
    pub command: toml::Value,
}

/// Parsed script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    /// Declared objects.
    #[serde(default, rename = "object")]
    pub objects: Vec<ObjectSpec>,
    /// Timed events, in any order.
    #[serde(default, rename = "event")]
    pub events: Vec<EventSpec>,
}

impl Script {
    /// Load a script from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path).map_err(|e| ScriptError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a script from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ScriptError> {
        Ok(toml::from_str(content)?)
    }

    /// Time of the last event, or 0.
    #[must_use]
    pub fn last_event(&self) -> Millis {
        self.events.iter().map(|e| e.at).fold(0.0, f64::max)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum PipeScriptCommand {
    List {
        #[serde(default)]
        values: Vec<ScriptValue>,
    },
    SetSlot {
        index: usize,
        value: ScriptValue,
    },
    SetDelay {
        value: Millis,
    },
    Flush,
    Clear,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BindingCommand {
    Invalidate,
    Revoke,
}

/// One output observed during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceLine {
    /// Scheduler time of the output.
    pub at: Millis,
    /// Emitting object.
    pub object: Rc<str>,
    /// Outlet index.
    pub outlet: usize,
    /// The output itself.
    pub output: Output,
}

impl std::fmt::Display for TraceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>10.3}  {}[{}]  {}",
            self.at,
            self.object,
            self.outlet,
            describe(&self.output)
        )
    }
}

/// Human-readable rendering of an output.
#[must_use]
pub fn describe(output: &Output) -> String {
    match output {
        Output::Bang => "bang".to_string(),
        Output::Float(value) => value.to_string(),
        Output::Symbol(symbol) => symbol.to_string(),
        Output::Reference(binding) => binding.to_string(),
    }
}

type Trace = Rc<RefCell<Vec<TraceLine>>>;

struct TraceOutlet {
    object: Rc<str>,
    outlet: usize,
    scheduler: Scheduler,
    trace: Trace,
}

impl Outlet for TraceOutlet {
    fn send(&self, output: &Output) {
        let at = self.scheduler.now();
        info!(object = %self.object, outlet = self.outlet, at, output = %describe(output), "output");
        self.trace.borrow_mut().push(TraceLine {
            at,
            object: Rc::clone(&self.object),
            outlet: self.outlet,
            output: output.clone(),
        });
    }
}

enum HostObject {
    Delay(Delay),
    Metro(Metro),
    Line(Line),
    Timer(Timer),
    Pipe(Pipe),
    Binding(BindingAnchor),
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    /// Events dispatched.
    pub events: usize,
    /// Commands an object refused.
    pub rejected: usize,
    /// Timer callbacks fired.
    pub fired: u64,
    /// Scheduler time at the end of the run.
    pub ended_at: Millis,
    /// Recoverable conditions recorded by all objects.
    pub conditions: u64,
}

/// Owns the scheduler and the objects declared by a script.
pub struct ScriptHost {
    scheduler: Scheduler,
    config: TempoConfig,
    objects: BTreeMap<String, HostObject>,
    trace: Trace,
}

impl ScriptHost {
    /// Create an empty host.
    #[must_use]
    pub fn new(config: TempoConfig) -> Self {
        Self {
            scheduler: Scheduler::from_config(&config.scheduler),
            config,
            objects: BTreeMap::new(),
            trace: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// The host scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Outputs observed so far.
    #[must_use]
    pub fn trace(&self) -> Vec<TraceLine> {
        self.trace.borrow().clone()
    }

    /// Create every object the script declares.
    ///
    /// Bindings are created first so that pipes can refer to them.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names and on references to undeclared bindings.
    pub fn load(&mut self, script: &Script) -> Result<(), ScriptError> {
        let (bindings, others): (Vec<&ObjectSpec>, Vec<&ObjectSpec>) = script
            .objects
            .iter()
            .partition(|spec| spec.kind == ObjectKind::Binding);
        for spec in bindings.into_iter().chain(others) {
            self.create(spec)?;
        }
        info!(objects = self.objects.len(), "script loaded");
        Ok(())
    }

    fn create(&mut self, spec: &ObjectSpec) -> Result<(), ScriptError> {
        if self.objects.contains_key(&spec.name) {
            return Err(ScriptError::DuplicateObject(spec.name.clone()));
        }
        let args = spec
            .args
            .iter()
            .map(|arg| self.resolve(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let number = |index: usize, default: f64| args.get(index).map_or(default, TaggedValue::as_number);

        let object = match spec.kind {
            ObjectKind::Delay => {
                HostObject::Delay(Delay::new(&self.scheduler, number(0, 0.0), self.outlet(&spec.name, 0)))
            }
            ObjectKind::Metro => {
                HostObject::Metro(Metro::new(&self.scheduler, number(0, 0.0), self.outlet(&spec.name, 0)))
            }
            ObjectKind::Line => HostObject::Line(Line::new(
                &self.scheduler,
                number(0, 0.0),
                number(1, self.config.line.grain_ms),
                self.outlet(&spec.name, 0),
            )),
            ObjectKind::Timer => HostObject::Timer(Timer::new(&self.scheduler, self.outlet(&spec.name, 0))),
            ObjectKind::Pipe => {
                let (layout, problems) = PipeLayout::parse(&args);
                let conditions = ConditionLog::new(self.config.conditions.capacity);
                for problem in problems {
                    conditions.report(&spec.name, problem);
                }
                let outlets = (0..layout.arity())
                    .map(|index| self.outlet(&spec.name, index))
                    .collect();
                HostObject::Pipe(Pipe::with_conditions(&self.scheduler, layout, outlets, conditions))
            }
            ObjectKind::Binding => HostObject::Binding(BindingAnchor::new()),
        };
        debug!(name = %spec.name, kind = ?spec.kind, "object created");
        self.objects.insert(spec.name.clone(), object);
        Ok(())
    }

    fn outlet(&self, object: &str, outlet: usize) -> OutletRef {
        Rc::new(TraceOutlet {
            object: Rc::from(object),
            outlet,
            scheduler: self.scheduler.clone(),
            trace: Rc::clone(&self.trace),
        })
    }

    fn resolve(&self, value: &ScriptValue) -> Result<TaggedValue, ScriptError> {
        match value {
            ScriptValue::Number(v) => Ok(TaggedValue::Number(*v)),
            ScriptValue::Symbol(s) => Ok(TaggedValue::from(s.as_str())),
            ScriptValue::Binding { binding } => match self.objects.get(binding) {
                Some(HostObject::Binding(anchor)) => Ok(TaggedValue::Reference(anchor.bind())),
                _ => Err(ScriptError::UnknownBinding(binding.clone())),
            },
        }
    }

    /// Send one event's command to its target.
    ///
    /// Returns `false` when the object refused the command.
    ///
    /// # Errors
    ///
    /// Fails when the target is unknown or the command does not decode.
    pub fn dispatch(&self, event: &EventSpec) -> Result<bool, ScriptError> {
        let target = event.target.as_str();
        let object = self
            .objects
            .get(target)
            .ok_or_else(|| ScriptError::UnknownObject(target.to_string()))?;
        let decode_error = |source| ScriptError::BadCommand {
            target: target.to_string(),
            source,
        };
        let command = event.command.clone();
        debug!(target, at = self.scheduler.now(), "dispatching event");

        let outcome: Result<(), TempoError> = match object {
            HostObject::Delay(delay) => {
                delay.apply(command.try_into::<DelayCommand>().map_err(decode_error)?);
                Ok(())
            }
            HostObject::Metro(metro) => {
                metro.apply(command.try_into::<MetroCommand>().map_err(decode_error)?);
                Ok(())
            }
            HostObject::Line(line) => {
                line.apply(command.try_into::<LineCommand>().map_err(decode_error)?);
                Ok(())
            }
            HostObject::Timer(timer) => {
                timer.apply(command.try_into::<TimerCommand>().map_err(decode_error)?);
                Ok(())
            }
            HostObject::Pipe(pipe) => {
                let command = match command.try_into::<PipeScriptCommand>().map_err(decode_error)? {
                    PipeScriptCommand::List { values } => PipeCommand::List(
                        values
                            .iter()
                            .map(|value| self.resolve(value))
                            .collect::<Result<_, _>>()?,
                    ),
                    PipeScriptCommand::SetSlot { index, value } => PipeCommand::SetSlot {
                        index,
                        value: self.resolve(&value)?,
                    },
                    PipeScriptCommand::SetDelay { value } => PipeCommand::SetDelay(value),
                    PipeScriptCommand::Flush => PipeCommand::Flush,
                    PipeScriptCommand::Clear => PipeCommand::Clear,
                };
                pipe.apply(command)
            }
            HostObject::Binding(anchor) => {
                match command.try_into::<BindingCommand>().map_err(decode_error)? {
                    BindingCommand::Invalidate => anchor.invalidate(),
                    BindingCommand::Revoke => anchor.revoke(),
                }
                Ok(())
            }
        };

        match outcome {
            Ok(()) => Ok(true),
            Err(error) => {
                warn!(target, %error, "command rejected");
                Ok(false)
            }
        }
    }

    /// Move time to `at`.
    ///
    /// On logical time this jumps; on a monotonic source it polls and sleeps
    /// until the source reaches `at`.
    pub fn run_until(&self, at: Millis) {
        if !self.scheduler.is_polled() {
            self.scheduler.advance_to(at);
            return;
        }
        let idle_ms = self.config.scheduler.idle_sleep.as_secs_f64() * 1000.0;
        loop {
            self.scheduler.poll();
            let now = self.scheduler.now();
            if now >= at {
                break;
            }
            let mut wait = idle_ms.min(at - now);
            if let Some(next) = self.scheduler.next_deadline() {
                wait = wait.min((next - now).max(0.0));
            }
            std::thread::sleep(Duration::from_secs_f64(wait / 1000.0));
        }
    }

    /// Run every event in time order, then keep time moving until `end`.
    ///
    /// Events sharing a time run in script order. Without `end` the run stops
    /// at the last event.
    ///
    /// # Errors
    ///
    /// Stops at the first event that fails to dispatch.
    pub fn run(&self, script: &Script, end: Option<Millis>) -> Result<RunSummary, ScriptError> {
        let mut events: Vec<&EventSpec> = script.events.iter().collect();
        events.sort_by(|a, b| a.at.total_cmp(&b.at));

        let fired_before = self.scheduler.fired_total();
        let mut summary = RunSummary::default();
        for event in events {
            self.run_until(event.at);
            if !self.dispatch(event)? {
                summary.rejected += 1;
            }
            summary.events += 1;
        }
        self.run_until(end.unwrap_or_else(|| script.last_event()));

        summary.fired = self.scheduler.fired_total() - fired_before;
        summary.ended_at = self.scheduler.now();
        summary.conditions = self
            .objects
            .values()
            .map(|object| match object {
                HostObject::Pipe(pipe) => pipe.conditions().total(),
                _ => 0,
            })
            .sum();
        Ok(summary)
    }
}
