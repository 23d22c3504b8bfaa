use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::exp::builders::*;

fn traced() -> Callbacks {
    Callbacks::traced(Recorder::new(), Box::new(StaticIo::new()))
}

fn callback_args(param: &str) -> Vec<String> {
    vec!["clos".to_string(), param.to_string()]
}

/// Run the instrumented prologue of a one-parameter callback body and bind
/// the parameter.
fn enter_body(callbacks: &mut Callbacks, param: &str) -> TraceResult<()> {
    let recorder = callbacks.trace()?;
    let args = recorder.trace_function_body("'ret", 1)?;
    recorder.trace_let(param, args[1].clone())
}

#[test]
fn test_callback_body_recorded_in_its_own_block() -> anyhow::Result<()> {
    let mut callbacks = traced();
    callbacks.trace()?.trace_function_call(
        "$t0",
        vec![
            get(identifier("c"), "get"),
            string("data:1"),
            identifier("$f0"),
        ],
    )?;
    let registration = callbacks.register(Event::Get)?;
    callbacks.trace()?.exit_block()?;
    callbacks.trace()?.trace_let("after", number(1.0))?;

    let scope = callbacks.enter(&registration, None)?;
    enter_body(&mut callbacks, "response")?;
    callbacks.trace()?.exit_block()?;
    callbacks.leave(scope, true)?;
    callbacks.trace()?.exit_block()?;

    let expected = block(vec![
        let_(
            "$t0",
            block(vec![callback(
                "get",
                string("data:1"),
                callback_args("response"),
                identifier("$f0"),
                vec![label("'ret", vec![let_("response", identifier("response"))])],
            )]),
        ),
        let_("after", number(1.0)),
    ]);
    assert_eq!(callbacks.recorder().unwrap().get_trace(), expected);
    Ok(())
}

#[test]
fn test_listen_records_default_event_argument() -> anyhow::Result<()> {
    let mut callbacks = traced();
    callbacks
        .trace()?
        .push_args(vec![get(identifier("c"), "listen"), identifier("$f0")])?;
    let registration = callbacks.register(Event::Listen)?;
    assert_eq!(registration.event, Event::Listen);

    match &callbacks.recorder().unwrap().get_trace() {
        Exp::Block { body } => match &body[0] {
            Exp::Callback {
                event,
                event_arg,
                callback_args: args,
                clos,
                ..
            } => {
                assert_eq!(event, "listen");
                assert_eq!(**event_arg, number(0.0));
                assert_eq!(args, &callback_args("request"));
                assert_eq!(**clos, identifier("$f0"));
            }
            other => panic!("expected a callback, found {other}"),
        },
        other => panic!("expected a block, found {other}"),
    }
    Ok(())
}

#[test]
fn test_interleaved_conversations_answer_their_own_requests() -> anyhow::Result<()> {
    let mut callbacks = traced();
    callbacks
        .trace()?
        .push_args(vec![get(identifier("c"), "listen"), identifier("$f0")])?;
    let listen = callbacks.register(Event::Listen)?;

    let mut outbound = Vec::new();
    let conversations = [callbacks.open_conversation(), callbacks.open_conversation()];
    for conversation in conversations {
        let scope = callbacks.enter(&listen, Some(conversation))?;
        enter_body(&mut callbacks, "request")?;
        callbacks.trace()?.trace_function_call(
            "$t0",
            vec![get(identifier("c"), "get"), string("u"), identifier("$f1")],
        )?;
        outbound.push(callbacks.register(Event::Get)?);
        callbacks.trace()?.exit_block()?;
        callbacks.trace()?.exit_block()?;
        callbacks.leave(scope, true)?;
    }
    assert_eq!(outbound[0].conversation, Some(conversations[0]));
    assert_eq!(outbound[1].conversation, Some(conversations[1]));

    // Complete the second request first
    for (registration, answer) in outbound.iter().rev().zip(["second", "first"]) {
        let scope = callbacks.enter(registration, None)?;
        enter_body(&mut callbacks, "response")?;
        callbacks.trace()?.trace_function_call(
            "$t1",
            vec![get(from(identifier("$clos"), "c"), "respond"), identifier("response")],
        )?;
        callbacks.respond(json!(answer))?;
        callbacks.trace()?.exit_block()?;
        callbacks.trace()?.exit_block()?;
        callbacks.leave(scope, true)?;
    }

    assert_eq!(callbacks.take_response(conversations[0]), Some(json!("first")));
    assert_eq!(callbacks.take_response(conversations[1]), Some(json!("second")));
    assert_eq!(callbacks.conversation(), None);
    assert_eq!(callbacks.recorder().unwrap().active_context(), ContextId::ROOT);

    // Both firings share one recorded body
    let trace = callbacks.recorder().unwrap().get_trace().to_string();
    assert_eq!(trace.matches("send(response)").count(), 1);
    Ok(())
}

#[test]
fn test_failed_callback_restores_previous_state() -> anyhow::Result<()> {
    let mut callbacks = traced();
    callbacks
        .trace()?
        .push_args(vec![get(identifier("c"), "listen"), identifier("$f0")])?;
    let listen = callbacks.register(Event::Listen)?;
    let conversation = callbacks.open_conversation();

    let scope = callbacks.enter(&listen, Some(conversation))?;
    assert_eq!(callbacks.conversation(), Some(conversation));
    callbacks.trace()?.pop_args()?;
    assert!(matches!(
        callbacks.trace()?.pop_args(),
        Err(TraceError::EmptyArgStack)
    ));
    callbacks.leave(scope, false)?;

    assert_eq!(callbacks.conversation(), None);
    assert_eq!(callbacks.recorder().unwrap().active_context(), ContextId::ROOT);
    assert!(callbacks.recorder().unwrap().is_poisoned());
    Ok(())
}

#[test]
fn test_respond_requires_a_pending_conversation() -> anyhow::Result<()> {
    let mut callbacks = Callbacks::untraced(Box::new(StaticIo::new()));
    assert_eq!(callbacks.respond(json!(1)), Err(TraceError::NoConversation));

    let registration = callbacks.register(Event::Listen)?;
    assert_eq!(registration.context, None);
    let conversation = callbacks.open_conversation();
    let scope = callbacks.enter(&registration, Some(conversation))?;
    callbacks.respond(json!({"ok": true}))?;
    assert_eq!(
        callbacks.respond(json!(2)),
        Err(TraceError::UnknownConversation(conversation))
    );
    callbacks.leave(scope, true)?;
    assert_eq!(callbacks.take_response(conversation), Some(json!({"ok": true})));
    Ok(())
}

#[test]
fn test_fetch_routes_and_data_urls() {
    let io = StaticIo::new().with_route(Event::Get, "http://host/users", json!(["a", "b"]));
    let mut callbacks = Callbacks::untraced(Box::new(io));

    assert_eq!(
        callbacks.fetch(Event::Get, "data:{\"n\": 1}", None),
        Ok(json!({"n": 1}))
    );
    assert_eq!(
        callbacks.fetch(Event::Get, "http://host/users", None),
        Ok(json!(["a", "b"]))
    );
    assert!(matches!(
        callbacks.fetch(Event::Post, "http://host/users", Some(&json!({}))),
        Err(HostIoError::NoRoute { method: "post", .. })
    ));
    assert!(matches!(
        callbacks.fetch(Event::Get, "data:{oops", None),
        Err(HostIoError::InvalidData(_))
    ));
    assert_eq!(
        callbacks.fetch(Event::Listen, "x", None),
        Err(HostIoError::NotARequest("listen"))
    );
}

#[test]
fn test_event_names() {
    for event in Event::ALL {
        assert_eq!(Event::from_name(event.name()), Some(event));
    }
    assert_eq!(Event::Immediate.callback_param(), "x");
    assert!(Event::Listen.is_repeating());
    assert!(!Event::Get.is_repeating());
}
