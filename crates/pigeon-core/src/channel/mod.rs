//! Channel Module
//!
//! The channel schema of the session task:
//! - `communication`: commands, effects, platform requests and notices
//! - `utils`: channel aliases and constructors

pub mod communication;
pub mod utils;

pub use communication::{
    Command, ConnectRequestConfig, Effect, Notice, PlatformRequest, RequestId, RequestKind,
};

pub use utils::{
    create_notice_channel, create_raw_event_channel, NoticeReceiver, NoticeSender,
    RawEventReceiver, RawEventSink,
};
