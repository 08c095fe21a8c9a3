//! Closed table of field names used in headers, contexts and options
//!
//! These strings go on the wire verbatim and must match existing peers.

pub const ID: &str = "0";
pub const DEVICE_NAME: &str = "1";
pub const REQUEST_TYPE: &str = "2";
pub const OPTIONS: &str = "3";
pub const CYCLE_NAME: &str = "4";
pub const ACQ_STAMP: &str = "5";
pub const CYCLE_STAMP: &str = "6";
pub const UPDATE_TYPE: &str = "7";
pub const SELECTOR: &str = "8";
pub const NOTIFICATION_ID: &str = "a";
pub const SOURCE_ID: &str = "b";
pub const FILTERS: &str = "c";
pub const SESSION_ID: &str = "d";
pub const SESSION_BODY: &str = "e";
pub const PROPERTY_NAME: &str = "f";
pub const DATA: &str = "x";

// Exception body
pub const EXCEPTION_CONTEXT_ACQ_STAMP: &str = "ContextAcqStamp";
pub const EXCEPTION_CONTEXT_CYCLE_STAMP: &str = "ContextCycleStamp";
pub const EXCEPTION_MESSAGE: &str = "Message";
pub const EXCEPTION_TYPE: &str = "Type";

pub(crate) const HEADER_FIELDS: &[&str] = &[
    REQUEST_TYPE,
    ID,
    DEVICE_NAME,
    PROPERTY_NAME,
    UPDATE_TYPE,
    SESSION_ID,
    OPTIONS,
];

pub(crate) const REQUEST_CONTEXT_FIELDS: &[&str] = &[SELECTOR, FILTERS, DATA];

pub(crate) const DATA_CONTEXT_FIELDS: &[&str] = &[CYCLE_NAME, CYCLE_STAMP, ACQ_STAMP, DATA];

pub(crate) const EXCEPTION_FIELDS: &[&str] = &[
    EXCEPTION_CONTEXT_ACQ_STAMP,
    EXCEPTION_CONTEXT_CYCLE_STAMP,
    EXCEPTION_MESSAGE,
    EXCEPTION_TYPE,
];
