use serde_json::{Map, Number, Value};

/// Key carrying the command name on the bridged protocol.
pub const KEY_COMMAND: &str = "cmdname";
/// Older socket servers tag commands with `cmd`; accepted on decode.
pub const KEY_COMMAND_LEGACY: &str = "cmd";
pub const KEY_SEQUENCE: &str = "cmdseq";
pub const KEY_ERROR: &str = "error";
pub const SEQUENCE_INIT: &str = "init";

/// Distinguishes the one-time snapshot reply to an `init` request from
/// everything else the server sends for the same command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    Init,
    Live,
    Untagged,
}

impl SequenceKind {
    fn from_tag(tag: Option<&Value>) -> Self {
        match tag {
            None | Some(Value::Null) => SequenceKind::Untagged,
            Some(Value::String(tag)) if tag == SEQUENCE_INIT => SequenceKind::Init,
            Some(_) => SequenceKind::Live,
        }
    }
}

/// A single protocol message.
///
/// Field accessors follow the loose typing of the JSON the autorouter emits:
/// numbers may arrive as strings and flags as integers, so callers ask for the
/// interpretation they need (`text`, `number`, `flag`) rather than matching on
/// raw [`Value`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    command: Option<String>,
    sequence: SequenceKind,
    fields: Map<String, Value>,
    error: Option<String>,
}

impl Frame {
    /// Plain outbound command without a sequence tag.
    pub fn command(name: impl Into<String>) -> Self {
        Self {
            command: Some(name.into()),
            sequence: SequenceKind::Untagged,
            fields: Map::new(),
            error: None,
        }
    }

    /// Outbound `init` request for a command.
    pub fn init(name: impl Into<String>) -> Self {
        Self {
            sequence: SequenceKind::Init,
            ..Self::command(name)
        }
    }

    /// Build a frame from a decoded JSON object. Protocol keys are lifted
    /// out of the map; everything else stays as a command-specific field.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let command = object
            .remove(KEY_COMMAND)
            .or_else(|| object.remove(KEY_COMMAND_LEGACY))
            .and_then(|value| value_to_text(&value));
        let sequence = SequenceKind::from_tag(object.remove(KEY_SEQUENCE).as_ref());
        let error = object
            .remove(KEY_ERROR)
            .and_then(|value| value_to_text(&value));
        Self {
            command,
            sequence,
            fields: object,
            error,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Insert a number, emitting integral values without a fractional part.
    pub fn with_number(self, key: impl Into<String>, value: f64) -> Self {
        self.with_field(key, number_value(value))
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn command_name(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn sequence(&self) -> SequenceKind {
        self.sequence
    }

    pub fn is_init(&self) -> bool {
        self.sequence == SequenceKind::Init
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Field rendered as text; numbers and booleans are stringified.
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(value_to_text)
    }

    /// Field coerced to a number. Numeric strings are parsed and an empty
    /// string counts as zero; anything else is `None`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(value_to_number)
    }

    /// Field interpreted for truthiness.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.fields.get(key).map(truthy)
    }

    pub(crate) fn into_value(self, command_key: &str) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 3);
        if let Some(command) = self.command {
            object.insert(command_key.to_string(), Value::String(command));
        }
        match self.sequence {
            SequenceKind::Init => {
                object.insert(KEY_SEQUENCE.into(), Value::String(SEQUENCE_INIT.into()));
            }
            SequenceKind::Live | SequenceKind::Untagged => {}
        }
        if let Some(error) = self.error {
            object.insert(KEY_ERROR.into(), Value::String(error));
        }
        object.extend(self.fields);
        Value::Object(object)
    }
}

/// One transport delivery: a lone frame or an ordered batch applied as a unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Single(Frame),
    Batch(Vec<Frame>),
}

impl Delivery {
    /// The no-op reply, e.g. a long-poll that timed out without data.
    pub fn empty() -> Self {
        Delivery::Batch(Vec::new())
    }

    pub fn frames(&self) -> &[Frame] {
        match self {
            Delivery::Single(frame) => std::slice::from_ref(frame),
            Delivery::Batch(frames) => frames,
        }
    }

    pub fn into_frames(self) -> Vec<Frame> {
        match self {
            Delivery::Single(frame) => vec![frame],
            Delivery::Batch(frames) => frames,
        }
    }

    pub fn len(&self) -> usize {
        self.frames().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames().is_empty()
    }

    /// Error carried by a lone frame. Batches never halt a long-poll, so
    /// errors inside them are not reported here.
    pub fn halting_error(&self) -> Option<&str> {
        match self {
            Delivery::Single(frame) => frame.error(),
            Delivery::Batch(_) => None,
        }
    }
}

impl From<Frame> for Delivery {
    fn from(frame: Frame) -> Self {
        Delivery::Single(frame)
    }
}

impl From<Vec<Frame>> for Delivery {
    fn from(mut frames: Vec<Frame>) -> Self {
        if frames.len() == 1 {
            if let Some(frame) = frames.pop() {
                return Delivery::Single(frame);
            }
        }
        Delivery::Batch(frames)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn lifts_protocol_keys_out_of_fields() {
        let frame = Frame::from_object(object(json!({
            "cmdname": "departure",
            "cmdseq": "init",
            "icao": "LSZH",
            "error": "boom",
        })));
        assert_eq!(frame.command_name(), Some("departure"));
        assert!(frame.is_init());
        assert_eq!(frame.error(), Some("boom"));
        assert_eq!(frame.fields().len(), 1);
        assert_eq!(frame.text("icao").as_deref(), Some("LSZH"));
    }

    #[test]
    fn legacy_command_key_and_sequence_kinds() {
        let live = Frame::from_object(object(json!({"cmd": "levels", "cmdseq": "update"})));
        assert_eq!(live.command_name(), Some("levels"));
        assert_eq!(live.sequence(), SequenceKind::Live);

        let untagged = Frame::from_object(object(json!({"cmdname": "levels"})));
        assert_eq!(untagged.sequence(), SequenceKind::Untagged);
    }

    #[test]
    fn loose_field_coercions() {
        let frame = Frame::from_object(object(json!({
            "limit": "40",
            "blank": "",
            "count": 3,
            "on": 1,
            "off": 0,
            "word": "yes",
            "junk": "abc",
        })));
        assert_eq!(frame.number("limit"), Some(40.0));
        assert_eq!(frame.number("blank"), Some(0.0));
        assert_eq!(frame.number("junk"), None);
        assert_eq!(frame.text("count").as_deref(), Some("3"));
        assert_eq!(frame.flag("on"), Some(true));
        assert_eq!(frame.flag("off"), Some(false));
        assert_eq!(frame.flag("word"), Some(true));
        assert_eq!(frame.flag("missing"), None);
    }

    #[test]
    fn integral_numbers_serialize_without_fraction() {
        let value = Frame::command("levels")
            .with_number("base", 50.0)
            .with_number("penalty", 1.1)
            .into_value(KEY_COMMAND);
        assert_eq!(value, json!({"cmdname": "levels", "base": 50, "penalty": 1.1}));
    }

    #[test]
    fn single_frame_batch_collapses() {
        let delivery = Delivery::from(vec![Frame::command("stop")]);
        assert!(matches!(delivery, Delivery::Single(_)));
        assert!(Delivery::empty().is_empty());
    }

    #[test]
    fn only_single_frames_halt() {
        let failing = Frame::command("x").with_error("nope");
        assert_eq!(Delivery::from(failing.clone()).halting_error(), Some("nope"));
        let batch = Delivery::Batch(vec![failing, Frame::command("y")]);
        assert_eq!(batch.halting_error(), None);
    }
}
