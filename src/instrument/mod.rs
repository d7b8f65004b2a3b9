pub mod connection;
pub mod parameter;
pub mod tcp;
pub mod validators;
pub mod visa_instrument;

pub use connection::{ConnectionError, MessageResource};
pub use parameter::{Parameter, ParameterError};
pub use tcp::{RetryOptions, TcpConnection};
pub use validators::{Ints, Numbers, Strings, ValidationError, Validator, ValidatorError};
pub use visa_instrument::{Idn, InstrumentError, InstrumentOptions, VisaInstrument};
