pub mod internal_messages;
