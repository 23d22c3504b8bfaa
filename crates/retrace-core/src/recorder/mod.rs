/*!
# Trace Recorder

Builds one trace tree from any number of executions of an instrumented
program. The first execution to reach a position fills the hole there; later
executions are checked against what was recorded and extend the tree only
where a hole remains.

The cursor is a stack of frames. Each frame names the block it writes into by
a path of `(index, part)` steps from the root, which stays valid because
blocks only ever change at their tail.

Callback bodies are recorded through separate contexts. A context owns its
own frame stack and pending-argument stack but writes into the shared tree,
so the recorder is the single owner of every node.
*/

mod errors;

pub use errors::TraceError;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace, warn};

use crate::exp::builders::{block, break_, callback, if_, label, let_, prim_app, set, while_};
use crate::exp::{Exp, LVal, Part};

pub type TraceResult<T> = std::result::Result<T, TraceError>;

/// Largest parameter count a traced function body may declare
pub const MAX_ARITY: usize = u16::MAX as usize;

/// Identifies a recording context: the main program or one callback body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// The context of the top-level program
    pub const ROOT: ContextId = ContextId(0);
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    index: usize,
    part: Part,
}

type BlockPath = Vec<Step>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Block,
    Loop { iterating: bool },
    Label(String),
    Call,
}

impl Scope {
    fn describe(&self) -> &'static str {
        match self {
            Scope::Block => "block",
            Scope::Loop { .. } => "loop",
            Scope::Label(_) => "label",
            Scope::Call => "call",
        }
    }
}

#[derive(Debug, Clone)]
struct Frame {
    path: BlockPath,
    index: usize,
    scope: Scope,
}

#[derive(Debug, Clone)]
struct Context {
    base: BlockPath,
    frames: Vec<Frame>,
    pending_args: Vec<Vec<Exp>>,
}

impl Context {
    fn new(base: BlockPath) -> Self {
        Self {
            base,
            frames: Vec::new(),
            pending_args: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.frames.clear();
        self.pending_args.clear();
        self.frames.push(Frame {
            path: self.base.clone(),
            index: 0,
            scope: Scope::Block,
        });
    }
}

fn resolve<'a>(root: &'a mut Vec<Exp>, path: &[Step]) -> TraceResult<&'a mut Vec<Exp>> {
    let mut block = root;
    for step in path {
        block = block
            .get_mut(step.index)
            .and_then(|node| node.block_mut(step.part))
            .ok_or(TraceError::DanglingPath)?;
    }
    Ok(block)
}

#[derive(Debug)]
pub struct Recorder {
    root: Vec<Exp>,
    contexts: HashMap<ContextId, Context>,
    active: ContextId,
    next_context: u64,
    poisoned: Option<String>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    /// A recorder with an empty tree, ready to trace the top-level program.
    pub fn new() -> Self {
        let mut root_context = Context::new(Vec::new());
        root_context.reset();
        let mut contexts = HashMap::new();
        contexts.insert(ContextId::ROOT, root_context);
        Self {
            root: vec![Exp::Unknown],
            contexts,
            active: ContextId::ROOT,
            next_context: 1,
            poisoned: None,
        }
    }

    pub fn active_context(&self) -> ContextId {
        self.active
    }

    /// Make `context` the target of subsequent operations, returning the
    /// previously active context.
    pub fn switch_to(&mut self, context: ContextId) -> TraceResult<ContextId> {
        if !self.contexts.contains_key(&context) {
            return Err(TraceError::UnknownContext(context));
        }
        Ok(std::mem::replace(&mut self.active, context))
    }

    /// Drop a callback context that will not fire again.
    pub fn release(&mut self, context: ContextId) {
        if context != ContextId::ROOT && context != self.active {
            self.contexts.remove(&context);
        }
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// The whole tree as a block.
    pub fn get_trace(&self) -> Exp {
        block(self.root.clone())
    }

    /// Reset the active context's cursor to its root without discarding
    /// anything recorded so far.
    pub fn new_trace(&mut self) -> TraceResult<()> {
        self.guarded("new_trace", |rec| {
            rec.context_mut()?.reset();
            Ok(())
        })
    }

    pub fn trace_let(&mut self, name: &str, named: Exp) -> TraceResult<()> {
        self.guarded("trace_let", |rec| rec.step(let_(name, named)).map(drop))
    }

    pub fn trace_set(&mut self, name: LVal, named: Exp) -> TraceResult<()> {
        self.guarded("trace_set", |rec| rec.step(set(name, named)).map(drop))
    }

    pub fn trace_prim_app(&mut self, event: &str, args: Vec<Exp>) -> TraceResult<()> {
        self.guarded("trace_prim_app", |rec| rec.step(prim_app(event, args)).map(drop))
    }

    /// Record that `cond` held and descend into the true branch.
    pub fn trace_if_true(&mut self, cond: Exp) -> TraceResult<()> {
        self.guarded("trace_if_true", |rec| rec.branch(cond, Part::True))
    }

    /// Record that `cond` failed and descend into the false branch.
    pub fn trace_if_false(&mut self, cond: Exp) -> TraceResult<()> {
        self.guarded("trace_if_false", |rec| rec.branch(cond, Part::False))
    }

    /// Record a loop and open its body. The body is entered per iteration
    /// with [`Recorder::trace_loop`].
    pub fn trace_while(&mut self, cond: Exp) -> TraceResult<()> {
        self.guarded("trace_while", |rec| {
            let (path, index) = rec.step(while_(cond, vec![Exp::Unknown]))?;
            rec.enter(path, index, Part::Body, Scope::Loop { iterating: false })
        })
    }

    /// Start a loop iteration, closing the previous one.
    pub fn trace_loop(&mut self) -> TraceResult<()> {
        self.guarded("trace_loop", |rec| {
            let frame = rec.top_frame()?.clone();
            match frame.scope {
                Scope::Loop { iterating } => {
                    if iterating {
                        rec.close(&frame)?;
                    }
                    let top = rec.top_frame_mut()?;
                    top.index = 0;
                    top.scope = Scope::Loop { iterating: true };
                    Ok(())
                }
                other => Err(TraceError::ScopeMismatch {
                    expected: "loop",
                    found: other.describe(),
                }),
            }
        })
    }

    pub fn trace_label(&mut self, name: &str) -> TraceResult<()> {
        self.guarded("trace_label", |rec| rec.open_label(name))
    }

    /// Record a break and unwind every open block up to and including the
    /// label it targets.
    pub fn trace_break(&mut self, name: &str, value: Exp) -> TraceResult<()> {
        self.guarded("trace_break", |rec| {
            let (path, index) = rec.step(break_(name, value))?;

            // Nothing after a break in the same block can run
            let block = resolve(&mut rec.root, &path)?;
            if block.len() == index + 2 && block[index + 1].is_unknown() {
                block.pop();
            }

            let context = rec.context_mut()?;
            loop {
                let frame = context
                    .frames
                    .pop()
                    .ok_or_else(|| TraceError::UnknownLabel(name.to_string()))?;
                if matches!(&frame.scope, Scope::Label(open) if open == name) {
                    return Ok(());
                }
            }
        })
    }

    /// Record `let name = <call>` and open the block the callee's trace goes
    /// into. `args` is the callee followed by the argument expressions.
    pub fn trace_function_call(&mut self, name: &str, args: Vec<Exp>) -> TraceResult<()> {
        self.guarded("trace_function_call", |rec| {
            let (path, index) = rec.step(let_(name, block(vec![Exp::Unknown])))?;
            rec.enter(path, index, Part::Named, Scope::Call)?;
            rec.context_mut()?.pending_args.push(args);
            Ok(())
        })
    }

    /// Take the arguments of the pending call and open the callee's return
    /// label. The result is the closure followed by exactly `arity`
    /// parameter expressions; missing arguments read as `undefined`.
    pub fn trace_function_body(&mut self, return_label: &str, arity: usize) -> TraceResult<Vec<Exp>> {
        self.guarded("trace_function_body", |rec| {
            if arity > MAX_ARITY {
                return Err(TraceError::Arity { arity, max: MAX_ARITY });
            }
            let mut args = rec.pop_pending()?;
            args.resize(arity + 1, Exp::Undefined);
            rec.open_label(return_label)?;
            Ok(args)
        })
    }

    /// Push a pending argument list for a callee that is not entered through
    /// [`Recorder::trace_function_call`].
    pub fn push_args(&mut self, args: Vec<Exp>) -> TraceResult<()> {
        self.guarded("push_args", |rec| {
            rec.context_mut()?.pending_args.push(args);
            Ok(())
        })
    }

    pub fn pop_args(&mut self) -> TraceResult<Vec<Exp>> {
        self.guarded("pop_args", |rec| rec.pop_pending())
    }

    /// Record a callback registration and return a fresh context whose root
    /// is the callback body.
    pub fn trace_callback(
        &mut self,
        event: &str,
        event_arg: Exp,
        callback_args: Vec<String>,
        clos: Exp,
    ) -> TraceResult<ContextId> {
        self.guarded("trace_callback", |rec| {
            let (mut path, index) = rec.step(callback(
                event,
                event_arg,
                callback_args,
                clos,
                vec![Exp::Unknown],
            ))?;
            path.push(Step {
                index,
                part: Part::Body,
            });
            let id = ContextId(rec.next_context);
            rec.next_context += 1;
            rec.contexts.insert(id, Context::new(path));
            debug!(context = %id, event = event, "opened callback context");
            Ok(id)
        })
    }

    /// Close the innermost open block. A block closes cleanly when the
    /// cursor is at its end, or just before a trailing hole.
    pub fn exit_block(&mut self) -> TraceResult<()> {
        self.guarded("exit_block", |rec| {
            let frame = rec
                .context_mut()?
                .frames
                .pop()
                .ok_or(TraceError::ExitPastTopLevel)?;
            match frame.scope {
                // The loop body was never entered on this run
                Scope::Loop { iterating: false } => Ok(()),
                _ => rec.close(&frame),
            }
        })
    }

    fn guarded<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> TraceResult<T>,
    ) -> TraceResult<T> {
        if let Some(cause) = &self.poisoned {
            return Err(TraceError::Poisoned(cause.clone()));
        }
        trace!(op = op, context = %self.active, "trace op");
        let result = f(self);
        if let Err(error) = &result {
            warn!(op = op, context = %self.active, error = %error, "recorder poisoned");
            self.poisoned = Some(error.to_string());
        }
        result
    }

    fn context_mut(&mut self) -> TraceResult<&mut Context> {
        let active = self.active;
        self.contexts
            .get_mut(&active)
            .ok_or(TraceError::UnknownContext(active))
    }

    fn top_frame(&mut self) -> TraceResult<&Frame> {
        self.context_mut()?
            .frames
            .last()
            .ok_or(TraceError::NotTracing)
    }

    fn top_frame_mut(&mut self) -> TraceResult<&mut Frame> {
        self.context_mut()?
            .frames
            .last_mut()
            .ok_or(TraceError::NotTracing)
    }

    fn pop_pending(&mut self) -> TraceResult<Vec<Exp>> {
        self.context_mut()?
            .pending_args
            .pop()
            .ok_or(TraceError::EmptyArgStack)
    }

    /// Place `incoming` at the cursor: fill the hole there, or merge with
    /// what an earlier execution recorded. Returns the enclosing block's
    /// path and the node's index in it.
    fn step(&mut self, incoming: Exp) -> TraceResult<(BlockPath, usize)> {
        let active = self.active;
        let context = self
            .contexts
            .get_mut(&active)
            .ok_or(TraceError::UnknownContext(active))?;
        let frame = context.frames.last_mut().ok_or(TraceError::NotTracing)?;
        let block = resolve(&mut self.root, &frame.path)?;
        let index = frame.index;
        let len = block.len();
        let Some(slot) = block.get_mut(index) else {
            return Err(TraceError::BlockOverrun { len });
        };
        if slot.is_unknown() {
            *slot = incoming;
            block.push(Exp::Unknown);
        } else {
            slot.merge_in(incoming)?;
        }
        frame.index += 1;
        Ok((frame.path.clone(), index))
    }

    fn enter(&mut self, mut path: BlockPath, index: usize, part: Part, scope: Scope) -> TraceResult<()> {
        path.push(Step { index, part });
        self.context_mut()?.frames.push(Frame {
            path,
            index: 0,
            scope,
        });
        Ok(())
    }

    fn branch(&mut self, cond: Exp, part: Part) -> TraceResult<()> {
        let (path, index) = self.step(if_(cond, vec![Exp::Unknown], vec![Exp::Unknown]))?;
        self.enter(path, index, part, Scope::Block)
    }

    fn open_label(&mut self, name: &str) -> TraceResult<()> {
        let (path, index) = self.step(label(name, vec![Exp::Unknown]))?;
        self.enter(path, index, Part::Body, Scope::Label(name.to_string()))
    }

    fn close(&mut self, frame: &Frame) -> TraceResult<()> {
        let block = resolve(&mut self.root, &frame.path)?;
        let len = block.len();
        if frame.index == len {
            return Ok(());
        }
        if frame.index + 1 == len && block[frame.index].is_unknown() {
            block.pop();
            return Ok(());
        }
        Err(TraceError::PrematureExit {
            cursor: frame.index,
            len,
            next: block[frame.index].kind_name(),
        })
    }
}
