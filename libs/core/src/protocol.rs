//! Frame codec: [`Message`] to and from an ordered list of byte frames
//!
//! ```text
//! frame 0        one byte, the message type tag
//! connect/ack    frame 1 is the UTF-8 protocol version
//! heartbeats     nothing else
//! request/reply  frame 1 header map, then body frames, then the descriptor
//! ```
//!
//! The descriptor holds one [`FrameType`] byte per semantic frame, header
//! first. Which body frames follow the header is fixed by the request type
//! (see [`body_frames`]); encode and decode both read that one table, so a
//! peer that corrupts the descriptor is detected rather than misread.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::message::{
    Body, DataContext, ExceptionMessage, FrameType, Header, Message, MessageType, RequestContext,
    RequestType, UpdateType,
};
use crate::tags;
use crate::wire::{decode_map, encode_map, ValueType, WireMap, WireValue};

/// Version sent in CONNECT when none is configured
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Upper bound on idle scratch buffers kept by one codec
const MAX_POOLED_BUFFERS: usize = 32;

/// Larger buffers are dropped instead of pooled, so one big peer frame
/// does not stay allocated for the life of the connection
pub const MAX_POOLED_CAPACITY: usize = 64 * 1024;

/// Body frames following the header for a request type, in wire order
///
/// SUBSCRIBE is the one request type whose shape depends on direction: the
/// client sends a request context, the server's acknowledgement sends none.
pub fn body_frames(message_type: MessageType, request_type: RequestType) -> &'static [FrameType] {
    match request_type {
        RequestType::Connect
        | RequestType::Event
        | RequestType::SessionConfirm
        | RequestType::Unsubscribe => &[],
        RequestType::Get => &[FrameType::BodyRequestContext],
        RequestType::Subscribe if message_type == MessageType::ClientRequest => {
            &[FrameType::BodyRequestContext]
        }
        RequestType::Subscribe => &[],
        RequestType::Set => &[FrameType::Body, FrameType::BodyRequestContext],
        RequestType::Reply | RequestType::NotificationData => {
            &[FrameType::Body, FrameType::BodyDataContext]
        }
        RequestType::Exception
        | RequestType::NotificationException
        | RequestType::SubscribeException => &[FrameType::BodyException],
    }
}

/// Full descriptor frame for a request type: HEADER followed by the body frames
pub fn descriptor(message_type: MessageType, request_type: RequestType) -> Vec<u8> {
    std::iter::once(FrameType::Header)
        .chain(body_frames(message_type, request_type).iter().copied())
        .map(FrameType::code)
        .collect()
}

/// Stateful frame codec, one per connection
///
/// Holds a pool of scratch buffers. Checkout goes through `&mut self`, so a
/// buffer is never shared between two encode calls; frames handed back via
/// [`Protocol::recycle`] or consumed by [`Protocol::decode`] refill the pool.
#[derive(Debug, Default)]
pub struct Protocol {
    pool: Vec<Vec<u8>>,
}

impl Protocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of idle scratch buffers
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// Return sent frames to the scratch pool
    pub fn recycle(&mut self, frames: impl IntoIterator<Item = Vec<u8>>) {
        for frame in frames {
            if self.pool.len() >= MAX_POOLED_BUFFERS {
                break;
            }
            if frame.capacity() <= MAX_POOLED_CAPACITY {
                self.pool.push(frame);
            }
        }
    }

    fn checkout(&mut self) -> Vec<u8> {
        match self.pool.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::new(),
        }
    }

    fn frame_from(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut buf = self.checkout();
        buf.extend_from_slice(bytes);
        buf
    }

    fn map_frame(&mut self, map: &WireMap) -> Result<Vec<u8>> {
        let mut buf = self.checkout();
        encode_map(map, &mut buf)?;
        Ok(buf)
    }

    pub fn encode(&mut self, message: &Message) -> Result<Vec<Vec<u8>>> {
        let message_type = message.message_type();
        let mut frames = vec![self.frame_from(&[message_type.tag()])];

        match message {
            Message::ClientConnect { version } | Message::ServerConnectAck { version } => {
                let version = if version.is_empty() {
                    DEFAULT_VERSION
                } else {
                    version.as_str()
                };
                frames.push(self.frame_from(version.as_bytes()));
            }
            Message::ClientHeartbeat | Message::ServerHeartbeat => {}
            Message::Request { header, body } | Message::Reply { header, body } => {
                self.encode_exchange(message_type, header, body, &mut frames)?;
            }
        }
        Ok(frames)
    }

    fn encode_exchange(
        &mut self,
        message_type: MessageType,
        header: &Header,
        body: &Body,
        frames: &mut Vec<Vec<u8>>,
    ) -> Result<()> {
        match (message_type, body) {
            (MessageType::ServerReply, Body::Subscribe(_)) => {
                return Err(Error::InvalidMessage(
                    "a subscribe request context cannot be sent by the server".to_string(),
                ))
            }
            (MessageType::ClientRequest, Body::SubscribeAck { .. }) => {
                return Err(Error::InvalidMessage(
                    "a subscribe acknowledgement cannot be sent by the client".to_string(),
                ))
            }
            _ => {}
        }

        let request_type = body.request_type();
        let header_map = header_to_map(request_type, header, body)?;
        let header_frame = self.map_frame(&header_map)?;
        frames.push(header_frame);

        for frame_type in body_frames(message_type, request_type) {
            let frame = match (frame_type, body) {
                (FrameType::Body, Body::Set { data, .. })
                | (FrameType::Body, Body::Reply { data, .. })
                | (FrameType::Body, Body::NotificationData { data, .. }) => self.frame_from(data),
                (FrameType::BodyRequestContext, Body::Get(context))
                | (FrameType::BodyRequestContext, Body::Subscribe(context))
                | (FrameType::BodyRequestContext, Body::Set { context, .. }) => {
                    self.map_frame(&request_context_to_map(context))?
                }
                (FrameType::BodyDataContext, Body::Reply { context, .. })
                | (FrameType::BodyDataContext, Body::NotificationData { context, .. }) => {
                    self.map_frame(&data_context_to_map(context))?
                }
                (FrameType::BodyException, body) => match body.exception() {
                    Some(exception) => self.map_frame(&exception_to_map(exception))?,
                    None => return Err(missing_body_part(request_type, *frame_type)),
                },
                (frame_type, _) => return Err(missing_body_part(request_type, *frame_type)),
            };
            frames.push(frame);
        }

        let descriptor = descriptor(message_type, request_type);
        frames.push(self.frame_from(&descriptor));
        Ok(())
    }

    /// Decode one multi-frame message, recycling the consumed frames
    pub fn decode(&mut self, frames: Vec<Vec<u8>>) -> Result<Message> {
        let mut frames: VecDeque<Vec<u8>> = frames.into();
        let type_frame = frames
            .pop_front()
            .ok_or(Error::MissingFrame("message type"))?;
        let message_type = match type_frame.as_slice() {
            [tag] => MessageType::from_tag(*tag)?,
            other => {
                return Err(Error::UnexpectedFrames(format!(
                    "message type frame has {} bytes, expected 1",
                    other.len()
                )))
            }
        };
        self.recycle([type_frame]);

        match message_type {
            MessageType::ClientConnect | MessageType::ServerConnectAck => {
                let version = match frames.pop_front() {
                    Some(frame) if !frame.is_empty() => {
                        String::from_utf8(frame).map_err(|_| Error::InvalidUtf8)?
                    }
                    _ => DEFAULT_VERSION.to_string(),
                };
                expect_no_more(&frames, message_type)?;
                Ok(if message_type == MessageType::ClientConnect {
                    Message::ClientConnect { version }
                } else {
                    Message::ServerConnectAck { version }
                })
            }
            MessageType::ClientHeartbeat => {
                expect_no_more(&frames, message_type)?;
                Ok(Message::ClientHeartbeat)
            }
            MessageType::ServerHeartbeat => {
                expect_no_more(&frames, message_type)?;
                Ok(Message::ServerHeartbeat)
            }
            MessageType::ClientRequest | MessageType::ServerReply => {
                let (header, body) = self.decode_exchange(message_type, frames)?;
                Ok(if message_type == MessageType::ClientRequest {
                    Message::Request { header, body }
                } else {
                    Message::Reply { header, body }
                })
            }
        }
    }

    fn decode_exchange(
        &mut self,
        message_type: MessageType,
        mut frames: VecDeque<Vec<u8>>,
    ) -> Result<(Header, Body)> {
        let descriptor = frames.pop_back().ok_or(Error::MissingFrame("descriptor"))?;
        match descriptor.first() {
            Some(&code) if code == FrameType::Header.code() => {}
            Some(&code) => {
                return Err(Error::MalformedDescriptor(format!(
                    "first frame type is {code}, expected HEADER"
                )))
            }
            None => return Err(Error::MalformedDescriptor("empty descriptor".to_string())),
        }

        let header_frame = frames.pop_front().ok_or(Error::MissingFrame("header"))?;
        let (request_type, mut header) = map_to_header(decode_map(&header_frame)?)?;

        let expected = self::descriptor(message_type, request_type);
        if descriptor != expected {
            return Err(Error::DescriptorMismatch {
                expected,
                actual: descriptor,
            });
        }
        let layout = body_frames(message_type, request_type);
        if frames.len() != layout.len() {
            return Err(Error::UnexpectedFrames(format!(
                "descriptor declares {} body frame(s), got {}",
                layout.len(),
                frames.len()
            )));
        }

        let mut parts = BodyParts::default();
        for (frame_type, frame) in layout.iter().zip(frames) {
            match frame_type {
                FrameType::Body => {
                    parts.data = Some(frame);
                    continue;
                }
                FrameType::BodyRequestContext => {
                    parts.request_context = Some(map_to_request_context(decode_map(&frame)?)?)
                }
                FrameType::BodyDataContext => {
                    parts.data_context = Some(map_to_data_context(decode_map(&frame)?)?)
                }
                FrameType::BodyException => {
                    parts.exception = Some(map_to_exception(decode_map(&frame)?)?)
                }
                FrameType::Header => {
                    return Err(Error::MalformedDescriptor(
                        "HEADER may only appear first".to_string(),
                    ))
                }
            }
            self.recycle([frame]);
        }
        self.recycle([header_frame, descriptor]);

        let body = parts.into_body(message_type, request_type, &mut header.options)?;
        Ok((header, body))
    }
}

/// Encode with a throwaway codec
pub fn encode(message: &Message) -> Result<Vec<Vec<u8>>> {
    Protocol::new().encode(message)
}

/// Decode with a throwaway codec
pub fn decode(frames: Vec<Vec<u8>>) -> Result<Message> {
    Protocol::new().decode(frames)
}

#[derive(Default)]
struct BodyParts {
    data: Option<Vec<u8>>,
    request_context: Option<RequestContext>,
    data_context: Option<DataContext>,
    exception: Option<ExceptionMessage>,
}

impl BodyParts {
    fn into_body(
        self,
        message_type: MessageType,
        request_type: RequestType,
        options: &mut WireMap,
    ) -> Result<Body> {
        let missing = |frame_type| missing_body_part(request_type, frame_type);
        let body = match request_type {
            RequestType::Get => Body::Get(
                self.request_context
                    .ok_or_else(|| missing(FrameType::BodyRequestContext))?,
            ),
            RequestType::Set => Body::Set {
                data: self.data.ok_or_else(|| missing(FrameType::Body))?,
                context: self
                    .request_context
                    .ok_or_else(|| missing(FrameType::BodyRequestContext))?,
            },
            RequestType::Connect => Body::Connect,
            RequestType::Reply => Body::Reply {
                data: self.data.ok_or_else(|| missing(FrameType::Body))?,
                context: self
                    .data_context
                    .ok_or_else(|| missing(FrameType::BodyDataContext))?,
            },
            RequestType::Exception => Body::Exception(
                self.exception
                    .ok_or_else(|| missing(FrameType::BodyException))?,
            ),
            RequestType::Subscribe if message_type == MessageType::ClientRequest => Body::Subscribe(
                self.request_context
                    .ok_or_else(|| missing(FrameType::BodyRequestContext))?,
            ),
            RequestType::Subscribe => Body::SubscribeAck {
                source_id: take_long(options, tags::SOURCE_ID)?,
            },
            RequestType::Unsubscribe => Body::Unsubscribe,
            RequestType::NotificationData => Body::NotificationData {
                notification_id: take_long(options, tags::NOTIFICATION_ID)?,
                data: self.data.ok_or_else(|| missing(FrameType::Body))?,
                context: self
                    .data_context
                    .ok_or_else(|| missing(FrameType::BodyDataContext))?,
            },
            RequestType::NotificationException => Body::NotificationException(
                self.exception
                    .ok_or_else(|| missing(FrameType::BodyException))?,
            ),
            RequestType::SubscribeException => Body::SubscribeException(
                self.exception
                    .ok_or_else(|| missing(FrameType::BodyException))?,
            ),
            RequestType::Event => Body::Event,
            RequestType::SessionConfirm => match options.remove(tags::SESSION_BODY) {
                Some(WireValue::Map(session_body)) => Body::SessionConfirm { session_body },
                Some(other) => {
                    return Err(unexpected_type(tags::SESSION_BODY, ValueType::StartMarker, &other))
                }
                None => {
                    return Err(Error::MissingField {
                        context: "options",
                        tag: tags::SESSION_BODY,
                    })
                }
            },
        };
        Ok(body)
    }
}

fn missing_body_part(request_type: RequestType, frame_type: FrameType) -> Error {
    Error::InvalidMessage(format!(
        "{request_type:?} has no content for a {frame_type:?} frame"
    ))
}

fn expect_no_more(frames: &VecDeque<Vec<u8>>, message_type: MessageType) -> Result<()> {
    if frames.is_empty() {
        Ok(())
    } else {
        Err(Error::UnexpectedFrames(format!(
            "{} extra frame(s) after {message_type:?}",
            frames.len()
        )))
    }
}

fn unexpected_type(tag: &str, expected: ValueType, actual: &WireValue) -> Error {
    Error::UnexpectedFieldType {
        tag: tag.to_string(),
        expected,
        actual: actual.value_type(),
    }
}

fn check_known(map: &WireMap, known: &[&str], context: &'static str) -> Result<()> {
    match map.keys().find(|key| !known.contains(key)) {
        Some(tag) => Err(Error::UnknownFieldTag {
            context,
            tag: tag.to_string(),
        }),
        None => Ok(()),
    }
}

fn field<'m>(map: &'m WireMap, tag: &'static str, context: &'static str) -> Result<&'m WireValue> {
    map.get(tag).ok_or(Error::MissingField { context, tag })
}

fn string_field(map: &WireMap, tag: &'static str, context: &'static str) -> Result<String> {
    let value = field(map, tag, context)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| unexpected_type(tag, ValueType::String, value))
}

fn int_field(map: &WireMap, tag: &'static str, context: &'static str) -> Result<i32> {
    let value = field(map, tag, context)?;
    value
        .as_int()
        .ok_or_else(|| unexpected_type(tag, ValueType::Int, value))
}

fn long_field(map: &WireMap, tag: &'static str, context: &'static str) -> Result<i64> {
    let value = field(map, tag, context)?;
    value
        .as_long()
        .ok_or_else(|| unexpected_type(tag, ValueType::Long, value))
}

fn optional_map(map: &WireMap, tag: &'static str) -> Result<Option<WireMap>> {
    match map.get(tag) {
        Some(WireValue::Map(inner)) => Ok(Some(inner.clone())),
        Some(other) => Err(unexpected_type(tag, ValueType::StartMarker, other)),
        None => Ok(None),
    }
}

/// Remove a correlation id the body owns from the options map
fn take_long(options: &mut WireMap, tag: &'static str) -> Result<i64> {
    match options.remove(tag) {
        Some(value) => value
            .as_long()
            .ok_or_else(|| unexpected_type(tag, ValueType::Long, &value)),
        None => Err(Error::MissingField {
            context: "options",
            tag,
        }),
    }
}

fn insert_reserved(options: &mut WireMap, tag: &str, value: WireValue) -> Result<()> {
    if options.contains_key(tag) {
        return Err(Error::DuplicateKey(tag.to_string()));
    }
    options.push(tag, value);
    Ok(())
}

fn header_to_map(request_type: RequestType, header: &Header, body: &Body) -> Result<WireMap> {
    let mut options = header.options.clone();
    match body {
        Body::SubscribeAck { source_id } => {
            insert_reserved(&mut options, tags::SOURCE_ID, WireValue::Long(*source_id))?
        }
        Body::NotificationData {
            notification_id, ..
        } => insert_reserved(
            &mut options,
            tags::NOTIFICATION_ID,
            WireValue::Long(*notification_id),
        )?,
        Body::SessionConfirm { session_body } => insert_reserved(
            &mut options,
            tags::SESSION_BODY,
            WireValue::Map(session_body.clone()),
        )?,
        _ => {}
    }

    let mut map = WireMap::new();
    map.push(tags::REQUEST_TYPE, request_type.code());
    map.push(tags::ID, header.id as i64);
    map.push(tags::DEVICE_NAME, header.device_name.as_str());
    map.push(tags::PROPERTY_NAME, header.property_name.as_str());
    if let Some(update_type) = header.update_type {
        map.push(tags::UPDATE_TYPE, update_type.code());
    }
    map.push(tags::SESSION_ID, header.session_id.as_str());
    map.push(tags::OPTIONS, options);
    Ok(map)
}

fn map_to_header(mut map: WireMap) -> Result<(RequestType, Header)> {
    const CONTEXT: &str = "header";
    check_known(&map, tags::HEADER_FIELDS, CONTEXT)?;

    let request_type = RequestType::from_code(int_field(&map, tags::REQUEST_TYPE, CONTEXT)?)?;
    let update_type = match map.get(tags::UPDATE_TYPE) {
        Some(value) => Some(UpdateType::from_code(
            value
                .as_int()
                .ok_or_else(|| unexpected_type(tags::UPDATE_TYPE, ValueType::Int, value))?,
        )?),
        None => None,
    };
    let options = match map.remove(tags::OPTIONS) {
        Some(WireValue::Map(options)) => options,
        Some(other) => return Err(unexpected_type(tags::OPTIONS, ValueType::StartMarker, &other)),
        None => WireMap::new(),
    };

    let header = Header {
        id: long_field(&map, tags::ID, CONTEXT)? as u64,
        device_name: string_field(&map, tags::DEVICE_NAME, CONTEXT)?,
        property_name: string_field(&map, tags::PROPERTY_NAME, CONTEXT)?,
        session_id: string_field(&map, tags::SESSION_ID, CONTEXT)?,
        update_type,
        options,
    };
    Ok((request_type, header))
}

fn request_context_to_map(context: &RequestContext) -> WireMap {
    let mut map = WireMap::new();
    map.push(tags::SELECTOR, context.selector.as_str());
    if let Some(filters) = &context.filters {
        map.push(tags::FILTERS, filters.clone());
    }
    if let Some(data) = &context.data {
        map.push(tags::DATA, data.clone());
    }
    map
}

fn map_to_request_context(map: WireMap) -> Result<RequestContext> {
    const CONTEXT: &str = "request context";
    check_known(&map, tags::REQUEST_CONTEXT_FIELDS, CONTEXT)?;
    Ok(RequestContext {
        selector: string_field(&map, tags::SELECTOR, CONTEXT)?,
        filters: optional_map(&map, tags::FILTERS)?,
        data: optional_map(&map, tags::DATA)?,
    })
}

fn data_context_to_map(context: &DataContext) -> WireMap {
    let mut map = WireMap::new();
    map.push(tags::CYCLE_NAME, context.cycle_name.as_str());
    map.push(tags::CYCLE_STAMP, context.cycle_stamp);
    map.push(tags::ACQ_STAMP, context.acq_stamp);
    if let Some(data) = &context.data {
        map.push(tags::DATA, data.clone());
    }
    map
}

fn map_to_data_context(map: WireMap) -> Result<DataContext> {
    const CONTEXT: &str = "data context";
    check_known(&map, tags::DATA_CONTEXT_FIELDS, CONTEXT)?;
    Ok(DataContext {
        cycle_name: string_field(&map, tags::CYCLE_NAME, CONTEXT)?,
        cycle_stamp: long_field(&map, tags::CYCLE_STAMP, CONTEXT)?,
        acq_stamp: long_field(&map, tags::ACQ_STAMP, CONTEXT)?,
        data: optional_map(&map, tags::DATA)?,
    })
}

fn exception_to_map(exception: &ExceptionMessage) -> WireMap {
    let mut map = WireMap::new();
    map.push(tags::EXCEPTION_CONTEXT_ACQ_STAMP, exception.context_acq_stamp);
    map.push(tags::EXCEPTION_CONTEXT_CYCLE_STAMP, exception.context_cycle_stamp);
    map.push(tags::EXCEPTION_MESSAGE, exception.message.as_str());
    map.push(tags::EXCEPTION_TYPE, exception.exception_type);
    map
}

fn map_to_exception(map: WireMap) -> Result<ExceptionMessage> {
    const CONTEXT: &str = "exception";
    check_known(&map, tags::EXCEPTION_FIELDS, CONTEXT)?;
    Ok(ExceptionMessage {
        context_acq_stamp: long_field(&map, tags::EXCEPTION_CONTEXT_ACQ_STAMP, CONTEXT)?,
        context_cycle_stamp: long_field(&map, tags::EXCEPTION_CONTEXT_CYCLE_STAMP, CONTEXT)?,
        message: string_field(&map, tags::EXCEPTION_MESSAGE, CONTEXT)?,
        exception_type: int_field(&map, tags::EXCEPTION_TYPE, CONTEXT)?,
    })
}
