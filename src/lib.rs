//! Connect to any of a couple dozen database products from one connection string.
//!
//! ```text
//! backendType[-odbc]://hostname[:port][/databaseName][?username][&password]
//! ```
//!
//! The string is parsed into a [`ConnectionSpec`], defaults are filled in from the
//! backend [`registry`], and the [`Connector`] hands a backend-specific request to
//! the vendor client registered in its [`Drivers`]. The resulting [`Connection`]
//! normalizes execute, commit and close across backends.

mod backends;
pub mod config;
mod connection;
mod connector;
mod connstr;
pub mod driver;
pub mod dsn;
mod error;
pub mod registry;
pub mod statement;

pub use connection::{Connection, Outcome, ResultSet};
pub use connector::Connector;
pub use connstr::{ConnectionSpec, Credentials, Transport};
pub use driver::{Drivers, Row};
pub use error::{EXPECTED_FORMAT, Error, Result};
pub use registry::BackendType;
