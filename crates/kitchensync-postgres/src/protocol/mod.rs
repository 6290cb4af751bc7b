//! PostgreSQL wire protocol: message shapes, the encoder that turns a
//! [`FrontendMessage`] into bytes, and the decoder that turns bytes
//! back into a [`BackendMessage`].

pub mod messages;
pub mod reader;
pub mod writer;

pub use messages::{
    BackendMessage, CANCEL_REQUEST_CODE, DescribeKind, ErrorFields, FieldDescription,
    FrontendMessage, PROTOCOL_VERSION, SSL_REQUEST_CODE, TransactionStatus, auth_type,
    backend_type, frontend_type,
};
pub use reader::MessageReader;
pub use writer::MessageWriter;
