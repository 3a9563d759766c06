//! this binary starts the skull server
//! to see the list of options, type: `skull-server --help`
//!
//! The storage root must already exist and hold one directory per user. Users are only
//! ever created by creating their directory, the server never provisions them itself.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::exit;

use clap::{arg_enum, crate_version, value_t, App, Arg, ArgMatches};
use skull::{
    Config, RayonThreadPool, Result, SharedQueueThreadPool, SkullError, SkullServer, Store,
    ThreadPool,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Pool {
        shared,
        rayon
    }
}

const DEFAULT_ADDRESS: &str = "127.0.0.1:4000";
const DEFAULT_ROOT: &str = "data";
const DEFAULT_THREADS: &str = "4";
const DEFAULT_WRITERS: &str = "2";
const DEFAULT_STREAM_THRESHOLD: &str = "16384";
const DEFAULT_LOG_LEVEL: &str = "info";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    addr: SocketAddr,
    root: PathBuf,
    threads: u32,
    pool: Pool,
    writers: u32,
    stream_threshold: usize,
    log_level: Level,
}

impl Opt {
    /// validates the command line options
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`SkullError::Parse`] if one of the parameters is invalid
    ///
    fn build(matches: &ArgMatches) -> Result<Opt> {
        let addr = matches.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
        let addr: SocketAddr = addr.parse().map_err(|_| {
            SkullError::Parse(format!("could not parse {} into an IP address and port", &addr))
        })?;
        let root = PathBuf::from(matches.value_of("root").unwrap_or(DEFAULT_ROOT));
        if !root.is_dir() {
            return Err(SkullError::Parse(format!(
                "the storage root {:?} is not a directory",
                &root
            )));
        }

        Ok(Opt {
            addr,
            root,
            threads: number(matches, "threads", DEFAULT_THREADS)?,
            pool: value_t!(matches, "pool", Pool).unwrap_or(Pool::shared),
            writers: number(matches, "writers", DEFAULT_WRITERS)?,
            stream_threshold: number(matches, "stream-threshold", DEFAULT_STREAM_THRESHOLD)?,
            log_level: matches
                .value_of("log-level")
                .unwrap_or(DEFAULT_LOG_LEVEL)
                .parse()
                .map_err(|e| SkullError::Parse(format!("invalid log level: {}", e)))?,
        })
    }
}

fn number<N: std::str::FromStr>(matches: &ArgMatches, name: &str, default: &str) -> Result<N> {
    let value = matches.value_of(name).unwrap_or(default);
    value
        .parse()
        .map_err(|_| SkullError::Parse(format!("--{} expects a number, got {}", name, value)))
}

fn main() {
    // parse command line args
    let matches = App::new("skull-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a per-user record store server")
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the IP_ADDR:PORT that the server listens on")
                .default_value(DEFAULT_ADDRESS),
        )
        .arg(
            Arg::with_name("root")
                .long("root")
                .value_name("DIR")
                .help("the storage root, holding one directory per user")
                .default_value(DEFAULT_ROOT),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .value_name("N")
                .help("number of threads serving connections, fewer than 2 serves them inline")
                .default_value(DEFAULT_THREADS),
        )
        .arg(
            Arg::with_name("pool")
                .long("pool")
                .value_name("POOL")
                .help("the thread pool serving connections, either 'shared' or 'rayon'")
                .possible_values(&Pool::variants())
                .default_value("shared"),
        )
        .arg(
            Arg::with_name("writers")
                .long("writers")
                .value_name("N")
                .help("number of background threads writing records to disk")
                .default_value(DEFAULT_WRITERS),
        )
        .arg(
            Arg::with_name("stream-threshold")
                .long("stream-threshold")
                .value_name("BYTES")
                .help("responses estimated above this size are streamed instead of buffered")
                .default_value(DEFAULT_STREAM_THRESHOLD),
        )
        .arg(
            Arg::with_name("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("one of trace, debug, info, warn, error")
                .default_value(DEFAULT_LOG_LEVEL),
        )
        .get_matches();

    // validate command line options, store them in Opt
    let opt = match Opt::build(&matches) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // set up a tracing subscriber to log to STDERR
    subscriber_config(opt.log_level);

    // start the server
    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("skull-server {}", env!("CARGO_PKG_VERSION"));
    info!("Storage root: {:?}", opt.root);

    let config = Config::new(&opt.root)
        .with_persist_threads(opt.writers)
        .with_stream_threshold(opt.stream_threshold);
    let store = Store::open(config)?;
    info!("Serving users: {:?}", store.users());

    if opt.threads < 2 {
        info!("Serving connections on a single thread");
        return SkullServer::<SharedQueueThreadPool>::single_threaded(store).run(opt.addr);
    }

    info!("Serving connections on a {} pool of {} threads", opt.pool, opt.threads);
    match opt.pool {
        Pool::shared => run_with_pool(store, SharedQueueThreadPool::new(opt.threads)?, opt.addr),
        Pool::rayon => run_with_pool(store, RayonThreadPool::new(opt.threads)?, opt.addr),
    }
}

fn run_with_pool<P: ThreadPool>(store: Store, pool: P, addr: SocketAddr) -> Result<()> {
    let server = SkullServer::new(store, pool);
    server.run(addr)
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(level: Level) {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level at or above `level` will be written
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
