/*!
# Callback Adapter

Connects asynchronous host operations to the recorder. Registering a
callback (`get`, `listen`, `immediate`, ...) records a `callback` node at the
cursor and opens a recorder context rooted at its body. When the callback
later fires, that context is made active for the duration of the call and the
previous one is restored afterwards, whether or not the call succeeded.

Inbound requests run in their own conversation. Callbacks registered while a
conversation is active fire in that conversation, so `respond` always answers
the request that caused it.
*/

mod io;

pub use io::{data_url, HostIo, HostIoError, StaticIo};

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;
use uuid::Uuid;

use crate::exp::builders::{identifier, number};
use crate::exp::Exp;
use crate::recorder::{ContextId, Recorder, TraceError, TraceResult};

/// Identifies one inbound request and everything it triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host operations that take a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    Get,
    Post,
    Put,
    Delete,
    Listen,
    Immediate,
}

impl Event {
    pub const ALL: [Event; 6] = [
        Event::Get,
        Event::Post,
        Event::Put,
        Event::Delete,
        Event::Listen,
        Event::Immediate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Event::Get => "get",
            Event::Post => "post",
            Event::Put => "put",
            Event::Delete => "delete",
            Event::Listen => "listen",
            Event::Immediate => "immediate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.name() == name)
    }

    /// The callback's parameter as recorded in the trace.
    pub fn callback_param(self) -> &'static str {
        match self {
            Event::Listen => "request",
            Event::Immediate => "x",
            _ => "response",
        }
    }

    /// Whether the callback may fire more than once.
    pub fn is_repeating(self) -> bool {
        matches!(self, Event::Listen)
    }

    pub fn is_request(self) -> bool {
        matches!(self, Event::Get | Event::Post | Event::Put | Event::Delete)
    }
}

/// A registered callback, waiting to fire.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub event: Event,
    /// Recorder context of the callback body; `None` when not tracing
    pub context: Option<ContextId>,
    /// Conversation active at registration
    pub conversation: Option<ConversationId>,
}

/// What [`Callbacks::leave`] restores.
#[derive(Debug)]
#[must_use]
pub struct CallbackScope {
    event: Event,
    previous_context: Option<ContextId>,
    previous_conversation: Option<ConversationId>,
}

pub struct Callbacks {
    recorder: Option<Recorder>,
    conversation: Option<ConversationId>,
    pending: HashSet<ConversationId>,
    responses: HashMap<ConversationId, Json>,
    io: Box<dyn HostIo>,
}

impl Callbacks {
    /// Adapter for the un-instrumented program: host operations run, nothing is recorded.
    pub fn untraced(io: Box<dyn HostIo>) -> Self {
        Self {
            recorder: None,
            conversation: None,
            pending: HashSet::new(),
            responses: HashMap::new(),
            io,
        }
    }

    pub fn traced(recorder: Recorder, io: Box<dyn HostIo>) -> Self {
        Self {
            recorder: Some(recorder),
            ..Self::untraced(io)
        }
    }

    pub fn is_tracing(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    /// The recorder behind `cb.trace`.
    pub fn trace(&mut self) -> TraceResult<&mut Recorder> {
        self.recorder.as_mut().ok_or(TraceError::NotTracing)
    }

    pub fn into_recorder(self) -> Option<Recorder> {
        self.recorder
    }

    pub fn conversation(&self) -> Option<ConversationId> {
        self.conversation
    }

    /// Start a conversation for an inbound request.
    pub fn open_conversation(&mut self) -> ConversationId {
        let id = ConversationId::generate();
        self.pending.insert(id);
        debug!(conversation = %id, "opened conversation");
        id
    }

    pub fn take_response(&mut self, conversation: ConversationId) -> Option<Json> {
        self.responses.remove(&conversation)
    }

    /// Register a callback for `event`. The instrumented call site pushed the
    /// callee followed by the argument expressions; the last one is the
    /// callback's closure.
    pub fn register(&mut self, event: Event) -> TraceResult<Registration> {
        let conversation = self.conversation;
        let Some(recorder) = self.recorder.as_mut() else {
            return Ok(Registration {
                event,
                context: None,
                conversation,
            });
        };

        let args = recorder.pop_args()?;
        let clos = args.last().cloned().unwrap_or(Exp::Undefined);
        let event_arg = match event {
            Event::Listen => number(0.0),
            _ => args.get(1).cloned().unwrap_or(Exp::Undefined),
        };
        let context = recorder.trace_callback(
            event.name(),
            event_arg,
            vec!["clos".to_string(), event.callback_param().to_string()],
            clos,
        )?;
        debug!(event = event.name(), context = %context, "registered callback");
        Ok(Registration {
            event,
            context: Some(context),
            conversation,
        })
    }

    /// Forget a registration that will never fire again, dropping its
    /// recorder context. The callback's node stays in the trace.
    pub fn discard(&mut self, registration: &Registration) {
        if let (Some(recorder), Some(context)) = (self.recorder.as_mut(), registration.context) {
            recorder.release(context);
            debug!(event = registration.event.name(), context = %context, "discarded callback");
        }
    }

    /// Make the registration's context and conversation active for one
    /// invocation of its callback. `conversation` overrides the one
    /// captured at registration (inbound requests bring their own).
    pub fn enter(
        &mut self,
        registration: &Registration,
        conversation: Option<ConversationId>,
    ) -> TraceResult<CallbackScope> {
        let conversation = conversation.or(registration.conversation);
        let mut scope = CallbackScope {
            event: registration.event,
            previous_context: None,
            previous_conversation: self.conversation,
        };

        if let (Some(recorder), Some(context)) = (self.recorder.as_mut(), registration.context) {
            let previous = recorder.switch_to(context)?;
            let param = registration.event.callback_param();
            let opened = recorder
                .new_trace()
                .and_then(|()| recorder.push_args(vec![identifier("clos"), identifier(param)]));
            if let Err(error) = opened {
                recorder.switch_to(previous)?;
                return Err(error);
            }
            scope.previous_context = Some(previous);
            debug!(from = %previous, to = %context, "entered callback context");
        }

        self.conversation = conversation;
        Ok(scope)
    }

    /// Undo [`Callbacks::enter`]. When the callback completed, its body
    /// block is closed and the context rewound for the next firing.
    pub fn leave(&mut self, scope: CallbackScope, completed: bool) -> TraceResult<()> {
        self.conversation = scope.previous_conversation;
        let (Some(recorder), Some(previous)) = (self.recorder.as_mut(), scope.previous_context) else {
            return Ok(());
        };

        let closed = if completed {
            recorder.exit_block().and_then(|()| recorder.new_trace())
        } else {
            Ok(())
        };
        let context = recorder.active_context();
        recorder.switch_to(previous)?;
        if !scope.event.is_repeating() {
            recorder.release(context);
        }
        debug!(from = %context, to = %previous, "left callback context");
        closed
    }

    /// Answer the active conversation's request.
    pub fn respond(&mut self, value: Json) -> TraceResult<()> {
        if let Some(recorder) = self.recorder.as_mut() {
            let args = recorder.pop_args()?;
            let value_rep = args.get(1).cloned().unwrap_or(Exp::Undefined);
            recorder.trace_prim_app("send", vec![value_rep])?;
        }
        let conversation = self.conversation.ok_or(TraceError::NoConversation)?;
        if !self.pending.remove(&conversation) {
            return Err(TraceError::UnknownConversation(conversation));
        }
        debug!(conversation = %conversation, "responded");
        self.responses.insert(conversation, value);
        Ok(())
    }

    /// Perform an outbound request. `data:` URLs answer with their payload.
    pub fn fetch(&mut self, method: Event, url: &str, body: Option<&Json>) -> Result<Json, HostIoError> {
        if !method.is_request() {
            return Err(HostIoError::NotARequest(method.name()));
        }
        match data_url(url) {
            Some(payload) => payload,
            None => self.io.send(method, url, body),
        }
    }
}
