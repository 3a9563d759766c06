use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;

use crate::command::{Request, Response};
use crate::record::RecordKind;
use crate::user::User;
use crate::{Result, SkullError};

/// `SkullClient` contains the functionality for communication with a [`SkullServer`]
///
/// Every method acts for the user the client was connected as.
///
/// [`SkullServer`]: ./struct.SkullServer.html
pub struct SkullClient {
    user: User,
    reader: Deserializer<IoRead<BufReader<TcpStream>>>,
    writer: BufWriter<TcpStream>,
}

impl SkullClient {
    /// creates a client acting for `user` and establishes a socket connection to the server
    /// at the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A, user: User) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;

        Ok(SkullClient {
            user,
            reader: Deserializer::from_reader(BufReader::new(tcp_reader)),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// gets all records of `kind` as a JSON array
    /// # Errors
    /// `Err<SkullError::Server>` if the server refused the request
    pub fn get(&mut self, kind: RecordKind) -> Result<serde_json::Value> {
        let user = self.user.clone();
        match self.send(&Request::Get { user, kind })? {
            Response::Records(records) => Ok(records),
            Response::Ok => Err(SkullError::Server("expected records, got Ok".to_string())),
            Response::Err(msg) => Err(SkullError::Server(msg)),
        }
    }

    /// appends a record made of `fields`
    /// # Errors
    /// `Err<SkullError::Server>` if the user is unknown or the fields are not a valid record
    pub fn add(&mut self, kind: RecordKind, fields: Vec<String>) -> Result<()> {
        let user = self.user.clone();
        self.expect_ok(&Request::Add { user, kind, fields })
    }

    /// replaces the record at `position` with one made of `fields`
    /// # Errors
    /// `Err<SkullError::Server>` if the user is unknown, the fields are not a valid record
    /// or there is no record at `position`
    pub fn edit(&mut self, kind: RecordKind, fields: Vec<String>, position: usize) -> Result<()> {
        let user = self.user.clone();
        self.expect_ok(&Request::Edit {
            user,
            kind,
            fields,
            position,
        })
    }

    /// removes the first record matching the one made of `fields`
    /// # Errors
    /// `Err<SkullError::Server>` if the user is unknown, the fields are not a valid record
    /// or no record matches
    pub fn remove(&mut self, kind: RecordKind, fields: Vec<String>) -> Result<()> {
        let user = self.user.clone();
        self.expect_ok(&Request::Remove { user, kind, fields })
    }

    /// removes the record at `position`
    /// # Errors
    /// `Err<SkullError::Server>` if the user is unknown or there is no record at `position`
    pub fn remove_at(&mut self, kind: RecordKind, position: usize) -> Result<()> {
        let user = self.user.clone();
        self.expect_ok(&Request::RemoveAt {
            user,
            kind,
            position,
        })
    }

    /// asks the server to reload all of the user's records from disk
    /// # Errors
    /// `Err<SkullError::Server>` if the user is unknown
    pub fn reload(&mut self) -> Result<()> {
        let user = self.user.clone();
        self.expect_ok(&Request::Reload { user })
    }

    fn expect_ok(&mut self, req: &Request) -> Result<()> {
        match self.send(req)? {
            Response::Ok => Ok(()),
            Response::Records(_) => Err(SkullError::Server("expected Ok, got records".to_string())),
            Response::Err(msg) => Err(SkullError::Server(msg)), // re-throwing error here
        }
    }

    fn send(&mut self, req: &Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, req)?;
        self.writer.flush()?;
        Ok(Response::deserialize(&mut self.reader)?)
    }
}
