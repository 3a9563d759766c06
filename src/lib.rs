#![deny(missing_docs)]
//! A small personal data-logging service: authenticated users append typed, timestamped
//! records and read them back as JSON.
//!
//! This crate provides the [`Store`] implementation itself, as well as a [`skull-client`]
//! and [`skull-server`] executable that can be used to interact with it.
//! Requests and responses are sent between the client and server using synchronous
//! networking over a custom protocol.
//!
//! ## Records
//! Three kinds of records are kept for every user (see the [`record`] module):
//!
//! - [`Skull`]: a category, e.g. "coffee", with a color, icon and unit price
//! - [`Quick`]: a preset amount of a skull, for one-tap logging
//! - [`Occurrence`]: a logged amount of a skull at a point in time
//!
//! ## Store
//! [`Store`] is the brains of this entire operation. It is responsible for the following
//! tasks:
//! - discovering users at start-up, one directory per user under a storage root
//! - loading every user's records from their TSV files, skipping malformed lines
//! - keeping one mutex-guarded, ordered collection per (user, record kind)
//! - processing the `GET`, `ADD`, `EDIT`, `REMOVE` and `RELOAD` operations
//! - persisting a collection after every mutation on a bounded pool of background
//!   threads, which take over the collection's lock until the file is written
//!
//! ## Client / Server
//! Client and server logic is contained in the [`SkullClient`] and [`SkullServer`] structs.
//! They are responsible for the networking portion of this application, but also handle
//! the serialization of data to/from the custom protocol.
//!
//! ## Custom Protocol
//! A [`Request`] is encoded as a JSON value and sent over a `TcpStream`. The server answers
//! every request with one [`Response`]: `"Ok"`, `{"Records":[...]}` holding the requested
//! JSON array, or `{"Err":"..."}` describing what went wrong. Large arrays are streamed into
//! the socket record by record instead of being rendered into one buffer first.
//!
//! ## Storage Files
//! ```text
//! <root>/<user>/skull.tsv
//! <root>/<user>/quick.tsv
//! <root>/<user>/occurrence.tsv
//! ```
//! One record per line, fields separated by a single tab, in collection order.
//!
//! [`skull-server`]: ../skull_server/index.html
//! [`skull-client`]: ../skull_client/index.html

pub use client::SkullClient;
pub use command::{Request, Response};
pub use config::Config;
pub use error::{Result, SkullError};
pub use record::{Occurrence, Quick, Record, RecordKind, Skull};
pub use server::SkullServer;
pub use store::Store;
pub use thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};
pub use user::User;

mod client;
mod command;
mod config;
mod error;
pub mod record;
pub mod serialize;
mod server;
pub mod store;
pub mod thread_pool;
mod user;
