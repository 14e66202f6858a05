//! NOTIFY messages and ACK actions.
//!
//! ```text
//! NOTIFY payload : [ <MESSAGE-NAME:string> <NB-ARGS:1 byte> <KV-LIST> ... ]
//! ACK payload    : [ <ACTION-TYPE:1 byte> <NB-ARGS:1 byte> <ACTION-ARGS> ... ]
//! ```

use std::borrow::Cow;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::credential::FieldSource;
use crate::spoe::frame::{read_name, write_str, FrameError, TypedData};

/// One message from a NOTIFY frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub name: String,
    pub args: Vec<(String, TypedData)>,
}

impl Message {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<TypedData>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    /// First argument with the given name.
    pub fn arg(&self, name: &str) -> Option<&TypedData> {
        self.args.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn encode(&self, out: &mut BytesMut) {
        write_str(out, &self.name);
        out.put_u8(self.args.len().min(u8::MAX as usize) as u8);
        for (name, value) in self.args.iter().take(u8::MAX as usize) {
            write_str(out, name);
            value.encode(out);
        }
    }
}

/// Arguments are looked up by name; only `STRING` values count.
impl FieldSource for Message {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.arg(name).and_then(TypedData::as_str).map(Cow::Borrowed)
    }
}

/// Decodes every message in a NOTIFY payload.
pub fn decode_messages(mut payload: Bytes) -> Result<Vec<Message>, FrameError> {
    let mut messages = Vec::new();
    while payload.has_remaining() {
        let name = read_name(&mut payload)?;
        if !payload.has_remaining() {
            return Err(FrameError::Truncated);
        }
        let nb_args = payload.get_u8();
        let mut args = Vec::with_capacity(usize::from(nb_args));
        for _ in 0..nb_args {
            let arg_name = read_name(&mut payload)?;
            let value = TypedData::decode(&mut payload)?;
            args.push((arg_name, value));
        }
        messages.push(Message { name, args });
    }
    Ok(messages)
}

/// Variable scope for SET-VAR / UNSET-VAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    Process,
    Session,
    Transaction,
    Request,
    Response,
}

impl VarScope {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Process => 0,
            Self::Session => 1,
            Self::Transaction => 2,
            Self::Request => 3,
            Self::Response => 4,
        }
    }
}

const ACTION_SET_VAR: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetVar {
        scope: VarScope,
        name: String,
        value: TypedData,
    },
}

impl Action {
    pub fn set_var(scope: VarScope, name: impl Into<String>, value: impl Into<TypedData>) -> Self {
        Self::SetVar {
            scope,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Self::SetVar { scope, name, value } => {
                out.put_u8(ACTION_SET_VAR);
                out.put_u8(3);
                out.put_u8(scope.as_u8());
                write_str(out, name);
                value.encode(out);
            }
        }
    }
}

pub fn encode_actions(actions: &[Action]) -> Bytes {
    let mut out = BytesMut::new();
    for action in actions {
        action.encode(&mut out);
    }
    out.freeze()
}
