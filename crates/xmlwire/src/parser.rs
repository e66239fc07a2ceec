//! # Response Parser
//!
//! An event-driven state machine that rebuilds a `methodResponse` from
//! open-tag, close-tag and text events, one event at a time.
//!
//! ## Invariants
//! - **Incremental**: No event boundary is assumed to align with anything. Scalar
//!   text and member names only ever append, so a value split over many text
//!   events decodes the same as one delivered whole.
//! - **Pure Transitions**: `transition` maps `(state, event)` to the next state and
//!   a list of actions without touching the context. Every tag it has no arm for
//!   is an `UnexpectedTag`; text it has no arm for is ignored.
//! - **Bounded Nesting**: At most `MAX_RECURSION_DEPTH` value frames are open.
//! - **Poisoning**: After the first error the parser refuses further input, so a
//!   failed response can never yield a value.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::date;
use crate::error::Error;
use crate::error::Fault;
use crate::error::Result;
use crate::ser::MAX_RECURSION_DEPTH;
use crate::tokenizer::XmlEvent;
use crate::tokenizer::XmlTokenizer;
use crate::value::Members;
use crate::value::Value;

/// A decoded response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Value),
    Fault(Fault),
}

impl Response {
    pub fn into_result(self) -> std::result::Result<Value, Fault> {
        match self {
            Response::Success(value) => Ok(value),
            Response::Fault(fault) => Err(fault),
        }
    }
}

/// Leaf elements whose text is accumulated and converted on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Int,
    I4,
    Bool,
    Str,
    Double,
    DateTime,
    Base64,
    Nil,
}

impl Scalar {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "int" => Scalar::Int,
            "i4" => Scalar::I4,
            "boolean" => Scalar::Bool,
            "string" => Scalar::Str,
            "double" => Scalar::Double,
            "dateTime.iso8601" => Scalar::DateTime,
            "base64" => Scalar::Base64,
            "nil" => Scalar::Nil,
            _ => return None,
        })
    }

    fn tag(self) -> &'static str {
        match self {
            Scalar::Int => "int",
            Scalar::I4 => "i4",
            Scalar::Bool => "boolean",
            Scalar::Str => "string",
            Scalar::Double => "double",
            Scalar::DateTime => "dateTime.iso8601",
            Scalar::Base64 => "base64",
            Scalar::Nil => "nil",
        }
    }

    fn convert(self, text: String) -> Result<Value> {
        let invalid = |text: &str| Error::InvalidScalar { kind: self.tag(), text: text.to_string() };
        match self {
            Scalar::Int | Scalar::I4 => {
                text.trim().parse().map(Value::Int).map_err(|_| invalid(&text))
            }
            Scalar::Bool => Ok(Value::Bool(text.trim() == "1")),
            Scalar::Str => Ok(Value::Str(text)),
            Scalar::Double => match text.trim().parse::<f64>() {
                // overflow and `inf` have no wire form to send back
                Ok(d) if d.is_finite() => Ok(Value::Double(d)),
                _ => Err(invalid(&text)),
            },
            Scalar::DateTime => date::decode(&text).map(Value::DateTime),
            Scalar::Base64 => {
                let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                STANDARD.decode(compact).map(Value::Base64).map_err(|_| invalid(&text))
            }
            Scalar::Nil => Ok(Value::Nil),
        }
    }
}

/// Position in the response grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Envelope,
    ParamsList,
    Param,
    Value,
    Datatype,
    Scalar(Scalar),
    ArrayBody,
    ArrayValues,
    StructBody,
    Member,
    MemberName,
    MemberValue,
    Fault,
    Done,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Envelope => "Envelope",
            State::ParamsList => "ParamsList",
            State::Param => "Param",
            State::Value => "Value",
            State::Datatype => "Datatype",
            State::Scalar(Scalar::Int) => "Int",
            State::Scalar(Scalar::I4) => "I4",
            State::Scalar(Scalar::Bool) => "Bool",
            State::Scalar(Scalar::Str) => "Str",
            State::Scalar(Scalar::Double) => "Double",
            State::Scalar(Scalar::DateTime) => "DateTime",
            State::Scalar(Scalar::Base64) => "Base64",
            State::Scalar(Scalar::Nil) => "Nil",
            State::ArrayBody => "ArrayBody",
            State::ArrayValues => "ArrayValues",
            State::StructBody => "StructBody",
            State::Member => "Member",
            State::MemberName => "MemberName",
            State::MemberValue => "MemberValue",
            State::Fault => "Fault",
            State::Done => "Done",
        }
    }
}

/// Where an opened value will be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Param,
    ArrayElement,
    StructMember,
    Fault,
}

/// A side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    OpenValue(Slot),
    UntypedText,
    BeginScalar,
    ScalarText,
    FinishScalar(Scalar),
    BeginArray,
    BeginStruct,
    BeginName,
    NameText,
    FinishName,
    CloseValue,
    FinishParam,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Stay,
    To(State),
    /// Return to the state recorded by the closed value's continuation.
    Resume,
}

#[derive(Debug)]
struct Step {
    next: Next,
    actions: Vec<Action>,
}

impl Step {
    fn to(state: State, actions: &[Action]) -> Self {
        Self { next: Next::To(state), actions: actions.to_vec() }
    }

    fn stay(actions: &[Action]) -> Self {
        Self { next: Next::Stay, actions: actions.to_vec() }
    }

    fn resume(actions: &[Action]) -> Self {
        Self { next: Next::Resume, actions: actions.to_vec() }
    }
}

fn transition(state: State, event: &XmlEvent) -> Result<Step> {
    use XmlEvent::Close;
    use XmlEvent::Open;
    use XmlEvent::Text;

    if let (State::Datatype, Open(tag)) = (state, event) {
        if let Some(kind) = Scalar::from_tag(tag) {
            return Ok(Step::to(State::Scalar(kind), &[Action::BeginScalar]));
        }
    }

    let step = match (state, event) {
        (State::Envelope, Open(t)) if t == "methodResponse" => Step::to(State::ParamsList, &[]),

        (State::ParamsList, Open(t)) if t == "params" => Step::to(State::Param, &[]),
        (State::ParamsList, Open(t)) if t == "fault" => Step::to(State::Fault, &[]),
        (State::ParamsList, Close(t)) if t == "methodResponse" => {
            Step::to(State::Done, &[Action::Complete])
        }

        (State::Param, Open(t)) if t == "param" => Step::to(State::Value, &[]),
        (State::Param, Close(t)) if t == "params" => Step::to(State::ParamsList, &[]),

        (State::Value, Open(t)) if t == "value" => {
            Step::to(State::Datatype, &[Action::OpenValue(Slot::Param)])
        }
        (State::Value, Close(t)) if t == "param" => Step::to(State::Param, &[Action::FinishParam]),

        (State::Fault, Open(t)) if t == "value" => {
            Step::to(State::Datatype, &[Action::OpenValue(Slot::Fault)])
        }
        (State::Fault, Close(t)) if t == "fault" => Step::to(State::ParamsList, &[]),

        (State::Datatype, Open(t)) if t == "array" => {
            Step::to(State::ArrayBody, &[Action::BeginArray])
        }
        (State::Datatype, Open(t)) if t == "struct" => {
            Step::to(State::StructBody, &[Action::BeginStruct])
        }
        (State::Datatype, Close(t)) if t == "value" => Step::resume(&[Action::CloseValue]),
        (State::Datatype, Text(_)) => Step::stay(&[Action::UntypedText]),

        (State::Scalar(_), Text(_)) => Step::stay(&[Action::ScalarText]),
        (State::Scalar(kind), Close(t)) if t == kind.tag() => {
            Step::to(State::Datatype, &[Action::FinishScalar(kind)])
        }

        (State::ArrayBody, Open(t)) if t == "data" => Step::to(State::ArrayValues, &[]),
        (State::ArrayBody, Close(t)) if t == "array" => Step::to(State::Datatype, &[]),

        (State::ArrayValues, Open(t)) if t == "value" => {
            Step::to(State::Datatype, &[Action::OpenValue(Slot::ArrayElement)])
        }
        (State::ArrayValues, Close(t)) if t == "data" => Step::to(State::ArrayBody, &[]),

        (State::StructBody, Open(t)) if t == "member" => Step::to(State::Member, &[]),
        (State::StructBody, Close(t)) if t == "struct" => Step::to(State::Datatype, &[]),

        (State::Member, Open(t)) if t == "name" => Step::to(State::MemberName, &[Action::BeginName]),
        (State::Member, Close(t)) if t == "member" => Step::to(State::StructBody, &[]),

        (State::MemberName, Text(_)) => Step::stay(&[Action::NameText]),
        (State::MemberName, Close(t)) if t == "name" => {
            Step::to(State::MemberValue, &[Action::FinishName])
        }

        (State::MemberValue, Open(t)) if t == "value" => {
            Step::to(State::Datatype, &[Action::OpenValue(Slot::StructMember)])
        }

        // whitespace and stray text between structural tags
        (_, Text(_)) => Step::stay(&[]),

        (state, Open(tag)) | (state, Close(tag)) => {
            return Err(Error::UnexpectedTag { state: state.name(), tag: tag.clone() });
        }
    };
    Ok(step)
}

/// Where a closed value belongs.
#[derive(Debug)]
enum Continuation {
    Param,
    ArrayElement,
    StructMember(String),
    Fault,
}

impl Continuation {
    fn resume_state(&self) -> State {
        match self {
            Continuation::Param => State::Value,
            Continuation::ArrayElement => State::ArrayValues,
            Continuation::StructMember(_) => State::Member,
            Continuation::Fault => State::Fault,
        }
    }
}

/// The value under construction inside one `<value>`.
#[derive(Debug)]
enum Partial {
    Empty,
    Untyped(String),
    Array(Vec<Value>),
    Struct(Members),
    Complete(Value),
}

impl Partial {
    fn into_value(self) -> Value {
        match self {
            // an untyped value is a string
            Partial::Empty => Value::Str(String::new()),
            Partial::Untyped(text) => Value::Str(text),
            Partial::Array(items) => Value::Array(items),
            Partial::Struct(members) => Value::Struct(members),
            Partial::Complete(value) => value,
        }
    }
}

#[derive(Debug)]
struct Frame {
    continuation: Continuation,
    partial: Partial,
}

/// Per-response parse state. Created for one response and dropped with it.
#[derive(Debug)]
struct ParserContext {
    state: State,
    frames: Vec<Frame>,
    text: String,
    name: String,
    pending_name: Option<String>,
    param_value: Option<Value>,
    params: Vec<Value>,
    fault_value: Option<Value>,
    completed: bool,
}

impl ParserContext {
    fn new() -> Self {
        Self {
            state: State::Envelope,
            frames: Vec::new(),
            text: String::new(),
            name: String::new(),
            pending_name: None,
            param_value: None,
            params: Vec::new(),
            fault_value: None,
            completed: false,
        }
    }

    fn apply(&mut self, event: &XmlEvent) -> Result<()> {
        let step = transition(self.state, event)?;

        let mut resumed = None;
        for action in &step.actions {
            if let Some(state) = self.perform(*action, event)? {
                resumed = Some(state);
            }
        }

        self.state = match step.next {
            Next::Stay => self.state,
            Next::To(state) => state,
            Next::Resume => resumed
                .ok_or_else(|| Error::Malformed("closed a value that was never opened".into()))?,
        };
        Ok(())
    }

    fn perform(&mut self, action: Action, event: &XmlEvent) -> Result<Option<State>> {
        let text = match event {
            XmlEvent::Text(text) => text.as_str(),
            _ => "",
        };

        match action {
            Action::OpenValue(slot) => {
                if self.frames.len() >= MAX_RECURSION_DEPTH {
                    return Err(Error::RecursionLimitExceeded);
                }
                let continuation = match slot {
                    Slot::Param => Continuation::Param,
                    Slot::ArrayElement => Continuation::ArrayElement,
                    Slot::StructMember => {
                        Continuation::StructMember(self.pending_name.take().unwrap_or_default())
                    }
                    Slot::Fault => Continuation::Fault,
                };
                self.frames.push(Frame { continuation, partial: Partial::Empty });
            }
            Action::UntypedText => {
                let frame = self.top()?;
                match &mut frame.partial {
                    Partial::Empty => frame.partial = Partial::Untyped(text.to_string()),
                    Partial::Untyped(acc) => acc.push_str(text),
                    // whitespace around a typed child
                    _ => {}
                }
            }
            Action::BeginScalar => self.text.clear(),
            Action::ScalarText => self.text.push_str(text),
            Action::FinishScalar(kind) => {
                let value = kind.convert(std::mem::take(&mut self.text))?;
                self.top()?.partial = Partial::Complete(value);
            }
            Action::BeginArray => self.top()?.partial = Partial::Array(Vec::new()),
            Action::BeginStruct => self.top()?.partial = Partial::Struct(Members::new()),
            Action::BeginName => self.name.clear(),
            Action::NameText => self.name.push_str(text),
            Action::FinishName => self.pending_name = Some(std::mem::take(&mut self.name)),
            Action::CloseValue => {
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| Error::Malformed("closed a value that was never opened".into()))?;
                let resume = frame.continuation.resume_state();
                let value = frame.partial.into_value();
                self.place(frame.continuation, value)?;
                return Ok(Some(resume));
            }
            Action::FinishParam => {
                let value = self
                    .param_value
                    .take()
                    .ok_or_else(|| Error::Malformed("param without a value".into()))?;
                self.params.push(value);
            }
            Action::Complete => self.completed = true,
        }
        Ok(None)
    }

    fn place(&mut self, continuation: Continuation, value: Value) -> Result<()> {
        match continuation {
            Continuation::Param => self.param_value = Some(value),
            Continuation::Fault => self.fault_value = Some(value),
            Continuation::ArrayElement => match &mut self.top()?.partial {
                Partial::Array(items) => items.push(value),
                _ => return Err(Error::Malformed("array element outside of an array".into())),
            },
            Continuation::StructMember(name) => match &mut self.top()?.partial {
                Partial::Struct(members) => {
                    members.insert(name, value);
                }
                _ => return Err(Error::Malformed("struct member outside of a struct".into())),
            },
        }
        Ok(())
    }

    fn top(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::Malformed("no value is open".into()))
    }

    fn finish(mut self) -> Result<Response> {
        if !self.completed {
            return Err(Error::Malformed(format!(
                "response ended in state {} before </methodResponse>",
                self.state.name()
            )));
        }

        if let Some(value) = self.fault_value.take() {
            return fault_from_value(value).map(Response::Fault);
        }

        match self.params.len() {
            1 => Ok(Response::Success(self.params.remove(0))),
            n => Err(Error::Malformed(format!("expected exactly one param, found {}", n))),
        }
    }
}

fn fault_from_value(value: Value) -> Result<Fault> {
    let code = value
        .get("faultCode")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Malformed("fault without an integer faultCode".into()))?;
    let message = value
        .get("faultString")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Fault { code, message })
}

/// Decodes one response from chunks delivered in order.
///
/// ```
/// use xmlwire::{ResponseParser, Response, Value};
///
/// let mut parser = ResponseParser::new();
/// parser.feed(b"<methodResponse><params><param><value><in").unwrap();
/// parser.feed(b"t>7</int></value></param></params></methodResponse>").unwrap();
/// assert_eq!(parser.finish().unwrap(), Response::Success(Value::Int(7)));
/// ```
#[derive(Debug)]
pub struct ResponseParser {
    tokenizer: XmlTokenizer,
    context: ParserContext,
    scratch: Vec<XmlEvent>,
    events_seen: usize,
    poisoned: bool,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            tokenizer: XmlTokenizer::new(),
            context: ParserContext::new(),
            scratch: Vec::new(),
            events_seen: 0,
            poisoned: false,
        }
    }

    /// Tokenizes `chunk` and applies every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.check()?;
        let mut events = std::mem::take(&mut self.scratch);
        let result = self.tokenizer.feed(chunk, &mut events);
        let result = result.and_then(|()| self.apply_all(&mut events));
        events.clear();
        self.scratch = events;
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Applies a single already-tokenized event.
    pub fn apply(&mut self, event: XmlEvent) -> Result<()> {
        self.check()?;
        self.events_seen += 1;
        let result = self.context.apply(&event);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Ends the stream and returns the decoded response.
    pub fn finish(mut self) -> Result<Response> {
        self.check()?;
        let mut events = Vec::new();
        self.tokenizer.finish(&mut events)?;
        self.apply_all(&mut events)?;
        self.context.finish()
    }

    /// Number of events applied so far.
    pub fn events_seen(&self) -> usize {
        self.events_seen
    }

    pub fn state(&self) -> State {
        self.context.state
    }

    fn apply_all(&mut self, events: &mut Vec<XmlEvent>) -> Result<()> {
        for event in events.drain(..) {
            self.apply(event)?;
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Usage("parser already failed".into()));
        }
        Ok(())
    }
}

/// Decodes a complete response document.
pub fn parse_response(bytes: &[u8]) -> Result<Response> {
    let mut parser = ResponseParser::new();
    parser.feed(bytes)?;
    parser.finish()
}
