//! HAProxy SPOE agent front end (SPOP 2.0).

pub mod agent;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod message;

pub use agent::{write_frame, Agent, FrameReader};
pub use frame::{Frame, FrameError, FrameType, TypedData};
pub use handler::{spoe_gate, NotifyHandler, TransactionContext};
pub use handshake::{AgentHello, Disconnect, DisconnectStatus, HaproxyHello};
pub use message::{Action, Message, VarScope};
