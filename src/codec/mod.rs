//! Wire codecs: MessagePack maps, the compressed-content wrapper, ticket
//! JSON, and Arrow IPC schema (de)serialization. See spec.md §4.1 / §6.

pub mod compressed;
pub mod function_uri;
pub mod msgpack;
pub mod schema;
pub mod ticket;
