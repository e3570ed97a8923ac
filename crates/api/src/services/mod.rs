//! Production implementations of the delivery collaborators.

pub mod attachments;
pub mod http_transport;

pub use attachments::SignedAttachmentUrlGenerator;
pub use http_transport::ReqwestTransport;
