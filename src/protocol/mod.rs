pub mod greeting;
pub mod request;
pub mod response;

pub use greeting::{Greeting, scramble};
pub use request::{RequestEncoder, Statement};
pub use response::{
    Body, ColumnMap, Data, Header, Metadata, Response, ServerError, SqlData, SqlInfo, TupleView,
};

#[cfg(test)]
mod greeting_test;
#[cfg(test)]
mod response_test;
