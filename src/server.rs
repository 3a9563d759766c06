use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use serde_json::Deserializer;
use tracing::{debug, error, info, instrument};

use crate::command::{Request, Response};
use crate::record::{Occurrence, Quick, Record, RecordKind, Skull};
use crate::thread_pool::ThreadPool;
use crate::user::User;
use crate::{Result, SkullError, Store};

/// runs `$body` with `$t` bound to the record type of `$kind`
macro_rules! with_kind {
    ($kind:expr, $t:ident => $body:expr) => {
        match $kind {
            RecordKind::Skull => {
                type $t = Skull;
                $body
            }
            RecordKind::Quick => {
                type $t = Quick;
                $body
            }
            RecordKind::Occurrence => {
                type $t = Occurrence;
                $body
            }
        }
    };
}

/// A TCP socket server in front of a [`Store`].
/// It listens for incoming [`Request`]s on a [`SocketAddr`](https://doc.rust-lang.org/std/net/enum.SocketAddr.html),
/// deserializes them, and processes each connection on a thread of its [`ThreadPool`].
///
/// A server built with [`SkullServer::single_threaded`] has no pool and serves one
/// connection after the other on the thread that called [`SkullServer::run`].
///
/// # Example
/// Create and run a new server listening on "127.0.0.1:4000", with 4 threads running on a
/// Rayon Thread Pool
/// ```rust
/// use skull::{Config, RayonThreadPool, SkullServer, Store, ThreadPool};
/// # fn main() -> skull::Result<()> {
/// let store = Store::open(Config::new("./data"))?;
/// let pool = RayonThreadPool::new(4)?;
/// let server = SkullServer::new(store, pool);
/// //server.run("127.0.0.1:4000")?;
/// # Ok(())
/// # }
/// ```
pub struct SkullServer<P: ThreadPool> {
    /// the store every connection works on
    store: Store,
    /// a pool of threads that will serve connections, `None` to serve them inline
    pool: Option<P>,
}

impl<P: ThreadPool> SkullServer<P> {
    /// Create a new `SkullServer` serving connections on `pool`.
    pub fn new(store: Store, pool: P) -> Self {
        SkullServer {
            store,
            pool: Some(pool),
        }
    }

    /// Create a new `SkullServer` that serves connections on the accepting thread.
    pub fn single_threaded(store: Store) -> Self {
        SkullServer { store, pool: None }
    }

    /// starts a server listening on the given address.
    ///
    /// # Errors
    /// returns [`SkullError::Io`] if the address could not be bound
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        self.listen(listener)
    }

    /// serves every connection accepted by `listener`
    ///
    /// # Errors
    /// returns [`SkullError::Pool`] if the thread pool stopped accepting connections
    pub fn listen(self, listener: TcpListener) -> Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => match &self.pool {
                    Some(pool) => {
                        let store = self.store.clone();
                        pool.spawn(move || {
                            if let Err(e) = serve(&store, stream) {
                                error!("Error on serving client: {}", e);
                            }
                        })?;
                    }
                    None => {
                        if let Err(e) = serve(&self.store, stream) {
                            error!("Error on serving client: {}", e);
                        }
                    }
                },
                Err(e) => error!("Connection failed: {}", e),
            }
        }
        Ok(())
    }
}

/// Listens for and processes [`Request`]s coming over the given `tcp` stream until the
/// client closes it. Every request is answered with exactly one [`Response`].
#[instrument(skip(store, tcp), fields(peer = tracing::field::Empty))]
fn serve(store: &Store, tcp: TcpStream) -> Result<()> {
    let peer_addr = tcp.peer_addr()?;
    tracing::Span::current().record("peer", &tracing::field::display(peer_addr));
    let stream_reader = BufReader::new(&tcp);
    let mut stream_writer = BufWriter::new(&tcp);
    let req_reader = Deserializer::from_reader(stream_reader).into_iter::<Request>();

    for req in req_reader {
        let req = req?;
        debug!("Receive request from {}: {:?}", peer_addr, req);
        handle(store, req, &mut stream_writer)?;
        stream_writer.flush()?;
    }
    Ok(())
}

/// executes one request against the store and writes its response to `out`
fn handle<W: Write>(store: &Store, req: Request, out: &mut W) -> Result<()> {
    if !store.authorized(req.user()) {
        let err = SkullError::UnknownUser(req.user().name().to_string());
        return send(out, &Response::Err(err.to_string()));
    }

    let result = match req {
        Request::Get { user, kind } => {
            return with_kind!(kind, T => send_records::<T, W>(store, &user, out));
        }
        Request::Add { user, kind, fields } => {
            with_kind!(kind, T => parse::<T>(&fields).and_then(|record| store.add(&user, record)))
        }
        Request::Edit {
            user,
            kind,
            fields,
            position,
        } => with_kind!(kind, T => {
            parse::<T>(&fields).and_then(|record| store.edit(&user, record, position))
        }),
        Request::Remove { user, kind, fields } => {
            with_kind!(kind, T => parse::<T>(&fields).and_then(|matcher| store.remove(&user, &matcher)))
        }
        Request::RemoveAt {
            user,
            kind,
            position,
        } => with_kind!(kind, T => store.remove_at::<T>(&user, position)),
        Request::Reload { user } => store.reload(&user),
    };

    match result {
        Ok(()) => send(out, &Response::Ok),
        Err(e) => {
            debug!("request failed: {}", e);
            send(out, &Response::Err(e.to_string()))
        }
    }
}

/// writes a [`Response::Records`] holding `user`'s records of kind `T`. Collections whose
/// estimated size is above the store's stream threshold are written chunk by chunk.
fn send_records<T: Record, W: Write>(store: &Store, user: &User, out: &mut W) -> Result<()> {
    out.write_all(br#"{"Records":"#)?;
    let estimate = store.estimate_size::<T>(user);
    if estimate > store.config().stream_threshold() {
        debug!("streaming about {} bytes of {} records", estimate, T::KIND);
        store.stream::<T, W>(user, out)?;
    } else {
        out.write_all(store.get::<T>(user).as_bytes())?;
    }
    out.write_all(b"}")?;
    Ok(())
}

fn send<W: Write>(out: &mut W, resp: &Response) -> Result<()> {
    serde_json::to_writer(&mut *out, resp)?;
    debug!("Response sent: {:?}", resp);
    Ok(())
}

fn parse<T: Record>(fields: &[String]) -> Result<T> {
    let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
    T::from_fields(&fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use std::fs;
    use tempfile::TempDir;

    fn respond(store: &Store, req: Request) -> String {
        let mut out = vec![];
        handle(store, req, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn buffered_and_streamed_get_answer_alike() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("alice")).unwrap();
        let buffered = Store::open(Config::new(root.path())).unwrap();
        let alice = User::new("alice");
        for i in 0..20 {
            let add = Request::Add {
                user: alice.clone(),
                kind: RecordKind::Quick,
                fields: fields(&[&i.to_string(), "1.5"]),
            };
            assert_eq!(respond(&buffered, add), r#""Ok""#);
        }
        buffered.sync();

        let streamed = Store::open(Config::new(root.path()).with_stream_threshold(0)).unwrap();
        let get = Request::Get {
            user: alice,
            kind: RecordKind::Quick,
        };
        let expected = format!(r#"{{"Records":{}}}"#, buffered.get::<Quick>(&User::new("alice")));
        assert_eq!(respond(&buffered, get.clone()), expected);
        assert_eq!(respond(&streamed, get), expected);
    }

    #[test]
    fn bad_requests_get_error_responses() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("alice")).unwrap();
        let store = Store::open(Config::new(root.path())).unwrap();

        let unknown = Request::Reload {
            user: User::new("mallory"),
        };
        assert_eq!(respond(&store, unknown), r#"{"Err":"unknown user: mallory"}"#);

        let malformed = Request::Add {
            user: User::new("alice"),
            kind: RecordKind::Occurrence,
            fields: fields(&["1", "2", "lots", "4"]),
        };
        assert!(respond(&store, malformed).starts_with(r#"{"Err":"parse error: amount"#));

        let missing = Request::RemoveAt {
            user: User::new("alice"),
            kind: RecordKind::Skull,
            position: 0,
        };
        assert!(respond(&store, missing).starts_with(r#"{"Err":"not found"#));
        assert_eq!(store.get::<Occurrence>(&User::new("alice")), "[]");
    }
}
