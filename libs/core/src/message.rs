//! In-memory model of every protocol message
//!
//! Requests and replies share a [`Header`]; what follows the header is a
//! [`Body`] variant keyed by request type, carrying exactly the fields that
//! request type puts on the wire.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wire::WireMap;

/// Tag byte carried alone in frame 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    ServerConnectAck = 0x01,
    ServerReply = 0x02,
    ServerHeartbeat = 0x03,
    ClientConnect = 0x20,
    ClientRequest = 0x21,
    ClientHeartbeat = 0x22,
}

impl MessageType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0x01 => Ok(Self::ServerConnectAck),
            0x02 => Ok(Self::ServerReply),
            0x03 => Ok(Self::ServerHeartbeat),
            0x20 => Ok(Self::ClientConnect),
            0x21 => Ok(Self::ClientRequest),
            0x22 => Ok(Self::ClientHeartbeat),
            other => Err(Error::UnknownMessageType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Get,
    Set,
    Connect,
    Reply,
    Exception,
    Subscribe,
    Unsubscribe,
    NotificationData,
    NotificationException,
    SubscribeException,
    Event,
    SessionConfirm,
}

impl RequestType {
    pub fn code(self) -> i32 {
        match self {
            Self::Get => 0,
            Self::Set => 1,
            Self::Connect => 2,
            Self::Reply => 3,
            Self::Exception => 4,
            Self::Subscribe => 5,
            Self::Unsubscribe => 6,
            Self::NotificationData => 7,
            Self::NotificationException => 8,
            Self::SubscribeException => 9,
            Self::Event => 10,
            Self::SessionConfirm => 11,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Get),
            1 => Ok(Self::Set),
            2 => Ok(Self::Connect),
            3 => Ok(Self::Reply),
            4 => Ok(Self::Exception),
            5 => Ok(Self::Subscribe),
            6 => Ok(Self::Unsubscribe),
            7 => Ok(Self::NotificationData),
            8 => Ok(Self::NotificationException),
            9 => Ok(Self::SubscribeException),
            10 => Ok(Self::Event),
            11 => Ok(Self::SessionConfirm),
            other => Err(Error::UnknownRequestType(other)),
        }
    }
}

/// Only meaningful for subscription-originated data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateType {
    Normal,
    FirstUpdate,
    ImmediateUpdate,
}

impl UpdateType {
    pub fn code(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::FirstUpdate => 1,
            Self::ImmediateUpdate => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Normal),
            1 => Ok(Self::FirstUpdate),
            2 => Ok(Self::ImmediateUpdate),
            other => Err(Error::UnknownUpdateType(other)),
        }
    }
}

/// Semantic role of a frame, one byte per frame in the descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    Header = 0,
    Body = 1,
    BodyDataContext = 2,
    BodyRequestContext = 3,
    BodyException = 4,
}

impl FrameType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Scope of a GET/SET/SUBSCRIBE request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub selector: String,
    pub filters: Option<WireMap>,
    pub data: Option<WireMap>,
}

impl RequestContext {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            filters: None,
            data: None,
        }
    }

    pub fn with_filters(mut self, filters: WireMap) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_data(mut self, data: WireMap) -> Self {
        self.data = Some(data);
        self
    }
}

/// Acquisition context attached to REPLY and NOTIFICATION_DATA
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataContext {
    pub cycle_name: String,
    pub cycle_stamp: i64,
    pub acq_stamp: i64,
    pub data: Option<WireMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionMessage {
    pub context_acq_stamp: i64,
    pub context_cycle_stamp: i64,
    pub message: String,
    pub exception_type: i32,
}

impl ExceptionMessage {
    pub fn new(
        context_acq_stamp: i64,
        context_cycle_stamp: i64,
        message: impl Into<String>,
        exception_type: i32,
    ) -> Self {
        Self {
            context_acq_stamp,
            context_cycle_stamp,
            message: message.into(),
            exception_type,
        }
    }
}

/// Fields common to every request and reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub id: u64,
    pub device_name: String,
    pub property_name: String,
    pub session_id: String,
    pub update_type: Option<UpdateType>,
    /// Free-form options; correlation ids owned by the body are not kept here
    pub options: WireMap,
}

impl Header {
    pub fn new(id: u64, device_name: impl Into<String>, property_name: impl Into<String>) -> Self {
        Self {
            id,
            device_name: device_name.into(),
            property_name: property_name.into(),
            ..Self::default()
        }
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn update_type(mut self, update_type: UpdateType) -> Self {
        self.update_type = Some(update_type);
        self
    }

    pub fn options(mut self, options: WireMap) -> Self {
        self.options = options;
        self
    }
}

/// Everything after the header, one variant per wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    Get(RequestContext),
    Set {
        data: Vec<u8>,
        context: RequestContext,
    },
    Connect,
    Reply {
        data: Vec<u8>,
        context: DataContext,
    },
    Exception(ExceptionMessage),
    /// Client side of SUBSCRIBE
    Subscribe(RequestContext),
    /// Server acknowledgement of SUBSCRIBE
    SubscribeAck {
        source_id: i64,
    },
    Unsubscribe,
    NotificationData {
        notification_id: i64,
        data: Vec<u8>,
        context: DataContext,
    },
    NotificationException(ExceptionMessage),
    SubscribeException(ExceptionMessage),
    Event,
    SessionConfirm {
        session_body: WireMap,
    },
}

impl Body {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Get(_) => RequestType::Get,
            Self::Set { .. } => RequestType::Set,
            Self::Connect => RequestType::Connect,
            Self::Reply { .. } => RequestType::Reply,
            Self::Exception(_) => RequestType::Exception,
            Self::Subscribe(_) | Self::SubscribeAck { .. } => RequestType::Subscribe,
            Self::Unsubscribe => RequestType::Unsubscribe,
            Self::NotificationData { .. } => RequestType::NotificationData,
            Self::NotificationException(_) => RequestType::NotificationException,
            Self::SubscribeException(_) => RequestType::SubscribeException,
            Self::Event => RequestType::Event,
            Self::SessionConfirm { .. } => RequestType::SessionConfirm,
        }
    }

    /// Opaque payload bytes, if this body carries any
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Set { data, .. }
            | Self::Reply { data, .. }
            | Self::NotificationData { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn exception(&self) -> Option<&ExceptionMessage> {
        match self {
            Self::Exception(e) | Self::NotificationException(e) | Self::SubscribeException(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    ClientConnect { version: String },
    ServerConnectAck { version: String },
    ClientHeartbeat,
    ServerHeartbeat,
    /// CLIENT_REQ
    Request { header: Header, body: Body },
    /// SERVER_REP
    Reply { header: Header, body: Body },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ClientConnect { .. } => MessageType::ClientConnect,
            Self::ServerConnectAck { .. } => MessageType::ServerConnectAck,
            Self::ClientHeartbeat => MessageType::ClientHeartbeat,
            Self::ServerHeartbeat => MessageType::ServerHeartbeat,
            Self::Request { .. } => MessageType::ClientRequest,
            Self::Reply { .. } => MessageType::ServerReply,
        }
    }

    pub fn header(&self) -> Option<&Header> {
        match self {
            Self::Request { header, .. } | Self::Reply { header, .. } => Some(header),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&Body> {
        match self {
            Self::Request { body, .. } | Self::Reply { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn request_type(&self) -> Option<RequestType> {
        self.body().map(Body::request_type)
    }
}
