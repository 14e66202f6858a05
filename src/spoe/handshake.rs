//! HELLO negotiation and DISCONNECT payloads.

use bytes::{Bytes, BytesMut};

use crate::spoe::frame::{read_kv_list, write_kv, Frame, FrameError, FrameType, TypedData};

/// Protocol version spoken by the agent.
pub const SPOP_VERSION: &str = "2.0";
/// Capabilities the agent can honor.
pub const AGENT_CAPABILITIES: &[&str] = &["pipelining"];

const KEY_VERSIONS: &str = "supported-versions";
const KEY_VERSION: &str = "version";
const KEY_MAX_FRAME_SIZE: &str = "max-frame-size";
const KEY_CAPABILITIES: &str = "capabilities";
const KEY_HEALTHCHECK: &str = "healthcheck";
const KEY_ENGINE_ID: &str = "engine-id";
const KEY_STATUS_CODE: &str = "status-code";
const KEY_MESSAGE: &str = "message";

/// Smallest max-frame-size either side may announce.
pub const MIN_FRAME_SIZE: u32 = 256;

/// Status codes carried by DISCONNECT frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectStatus {
    Normal,
    Io,
    Timeout,
    TooBig,
    Invalid,
    NoVersion,
    NoFrameSize,
    NoCapabilities,
    BadVersion,
    BadFrameSize,
    FragmentationNotSupported,
    InvalidInterlaced,
    FrameIdNotFound,
    ResourceAllocation,
    Unknown,
}

impl DisconnectStatus {
    pub fn code(&self) -> u32 {
        match self {
            Self::Normal => 0,
            Self::Io => 1,
            Self::Timeout => 2,
            Self::TooBig => 3,
            Self::Invalid => 4,
            Self::NoVersion => 5,
            Self::NoFrameSize => 6,
            Self::NoCapabilities => 7,
            Self::BadVersion => 8,
            Self::BadFrameSize => 9,
            Self::FragmentationNotSupported => 10,
            Self::InvalidInterlaced => 11,
            Self::FrameIdNotFound => 12,
            Self::ResourceAllocation => 13,
            Self::Unknown => 99,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::Io,
            2 => Self::Timeout,
            3 => Self::TooBig,
            4 => Self::Invalid,
            5 => Self::NoVersion,
            6 => Self::NoFrameSize,
            7 => Self::NoCapabilities,
            8 => Self::BadVersion,
            9 => Self::BadFrameSize,
            10 => Self::FragmentationNotSupported,
            11 => Self::InvalidInterlaced,
            12 => Self::FrameIdNotFound,
            13 => Self::ResourceAllocation,
            _ => Self::Unknown,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Io => "I/O error",
            Self::Timeout => "a timeout occurred",
            Self::TooBig => "frame is too big",
            Self::Invalid => "invalid frame received",
            Self::NoVersion => "version value not found",
            Self::NoFrameSize => "max-frame-size value not found",
            Self::NoCapabilities => "capabilities value not found",
            Self::BadVersion => "unsupported version",
            Self::BadFrameSize => "max-frame-size too big or too small",
            Self::FragmentationNotSupported => "fragmentation not supported",
            Self::InvalidInterlaced => "invalid interlaced frames",
            Self::FrameIdNotFound => "frame-id not found",
            Self::ResourceAllocation => "resource allocation error",
            Self::Unknown => "an unknown error occurred",
        }
    }
}

/// Parsed HAPROXY-HELLO payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaproxyHello {
    pub supported_versions: Vec<String>,
    pub max_frame_size: Option<u32>,
    pub capabilities: Option<Vec<String>>,
    pub healthcheck: bool,
    pub engine_id: Option<String>,
}

impl HaproxyHello {
    pub fn decode(mut payload: Bytes) -> Result<Self, FrameError> {
        let mut hello = Self::default();

        for (name, value) in read_kv_list(&mut payload)? {
            match name.as_str() {
                KEY_VERSIONS => {
                    if let Some(list) = value.as_str() {
                        hello.supported_versions = split_list(list);
                    }
                }
                KEY_MAX_FRAME_SIZE => {
                    hello.max_frame_size = value.as_u64().and_then(|v| u32::try_from(v).ok());
                }
                KEY_CAPABILITIES => {
                    if let Some(list) = value.as_str() {
                        hello.capabilities = Some(split_list(list));
                    }
                }
                KEY_HEALTHCHECK => hello.healthcheck = value.as_bool().unwrap_or(false),
                KEY_ENGINE_ID => hello.engine_id = value.as_str().map(str::to_string),
                _ => {}
            }
        }

        Ok(hello)
    }

    fn supports_version(&self, wanted: &str) -> bool {
        self.supported_versions.iter().any(|v| v == wanted)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// AGENT-HELLO reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHello {
    pub version: String,
    pub max_frame_size: u32,
    pub capabilities: Vec<String>,
}

impl AgentHello {
    pub fn into_frame(self) -> Frame {
        let mut payload = BytesMut::new();
        write_kv(&mut payload, KEY_VERSION, &TypedData::from(self.version));
        write_kv(
            &mut payload,
            KEY_MAX_FRAME_SIZE,
            &TypedData::Uint32(self.max_frame_size),
        );
        write_kv(
            &mut payload,
            KEY_CAPABILITIES,
            &TypedData::from(self.capabilities.join(",")),
        );
        Frame::new(FrameType::AgentHello, 0, 0, payload.freeze())
    }
}

/// Answers a HAPROXY-HELLO, or picks the status to disconnect with.
///
/// The frame size is the smaller of both sides' limits; capabilities are the
/// intersection with [`AGENT_CAPABILITIES`].
pub fn negotiate(hello: &HaproxyHello, own_max_frame_size: u32) -> Result<AgentHello, DisconnectStatus> {
    if hello.supported_versions.is_empty() {
        return Err(DisconnectStatus::NoVersion);
    }
    if !hello.supports_version(SPOP_VERSION) {
        return Err(DisconnectStatus::BadVersion);
    }

    let peer_max = hello.max_frame_size.ok_or(DisconnectStatus::NoFrameSize)?;
    if peer_max < MIN_FRAME_SIZE {
        return Err(DisconnectStatus::BadFrameSize);
    }

    let capabilities = hello
        .capabilities
        .as_ref()
        .ok_or(DisconnectStatus::NoCapabilities)?
        .iter()
        .filter(|c| AGENT_CAPABILITIES.contains(&c.as_str()))
        .cloned()
        .collect();

    Ok(AgentHello {
        version: SPOP_VERSION.to_string(),
        max_frame_size: peer_max.min(own_max_frame_size),
        capabilities,
    })
}

/// DISCONNECT payload, sent by either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub status: DisconnectStatus,
    pub message: String,
}

impl Disconnect {
    pub fn new(status: DisconnectStatus) -> Self {
        Self {
            status,
            message: status.message().to_string(),
        }
    }

    pub fn decode(mut payload: Bytes) -> Result<Self, FrameError> {
        let mut status = DisconnectStatus::Unknown;
        let mut message = String::new();
        for (name, value) in read_kv_list(&mut payload)? {
            match name.as_str() {
                KEY_STATUS_CODE => {
                    if let Some(code) = value.as_u64().and_then(|v| u32::try_from(v).ok()) {
                        status = DisconnectStatus::from_code(code);
                    }
                }
                KEY_MESSAGE => {
                    if let Some(text) = value.as_str() {
                        message = text.to_string();
                    }
                }
                _ => {}
            }
        }
        Ok(Self { status, message })
    }

    pub fn into_frame(self) -> Frame {
        let mut payload = BytesMut::new();
        write_kv(
            &mut payload,
            KEY_STATUS_CODE,
            &TypedData::Uint32(self.status.code()),
        );
        write_kv(&mut payload, KEY_MESSAGE, &TypedData::from(self.message));
        Frame::new(FrameType::AgentDisconnect, 0, 0, payload.freeze())
    }
}
