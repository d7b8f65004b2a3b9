pub mod channel;
pub mod data_format;
pub mod device;
pub mod events;
pub mod fixture;
pub mod property;
pub mod resource_name;
pub mod template;
mod value;

pub use value::{Value, ValueError, ValueType};
