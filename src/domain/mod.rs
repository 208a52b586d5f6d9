mod body_type;
mod email_address;
mod message_status;

pub use body_type::BodyType;
pub use email_address::EmailAddress;
pub use message_status::MessageStatus;
