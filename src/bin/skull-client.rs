//! The skull-client executable supports the following command line arguments:
//!
//! `skull-client --user NAME get <KIND> [--addr IP-PORT]`
//!
//!     Print all records of a kind as a JSON array.
//!
//! `skull-client --user NAME add <KIND> <FIELDS>... [--addr IP-PORT]`
//!
//!     Append a record, given its fields in order.
//!
//! `skull-client --user NAME edit <KIND> <POSITION> <FIELDS>... [--addr IP-PORT]`
//!
//!     Replace the record at a position.
//!
//! `skull-client --user NAME rm <KIND> <FIELDS>... [--addr IP-PORT]`
//!
//!     Remove the first record matching the given one.
//!
//! `skull-client --user NAME rm-at <KIND> <POSITION> [--addr IP-PORT]`
//!
//!     Remove the record at a position.
//!
//! `skull-client --user NAME reload [--addr IP-PORT]`
//!
//!     Reload all of the user's records from disk.
//!
//! KIND is one of `skull`, `quick` or `occurrence`. --addr accepts an IP address, either v4
//! or v6, and a port number, with the format IP:PORT. If --addr is not specified then
//! connect on 127.0.0.1:4000. An error is printed and a non-zero exit code returned on
//! server error, or if an argument does not parse.

use std::net::SocketAddr;

use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use skull::{RecordKind, Request, Result, SkullClient, SkullError, User};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:4000";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    req: Request,
}

impl Opt {
    /// validates the `addr` parameter is a valid IP address and PORT
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`SkullError::Parse`] if one of the parameters is invalid
    ///
    fn build(addr: &str, req: Request) -> Result<Opt> {
        let addr: SocketAddr = addr.parse().map_err(|_| {
            SkullError::Parse(format!("could not parse {} into an IP address and port", &addr))
        })?;

        Ok(Opt { addr, req })
    }
}

fn main() -> Result<()> {
    // configure a subscriber that will log warnings to STDERR
    subscriber_config();

    let kind = || {
        Arg::with_name("KIND")
            .required(true)
            .index(1)
            .possible_values(&["skull", "quick", "occurrence"])
    };
    let fields = |index| Arg::with_name("FIELDS").required(true).multiple(true).index(index);
    let position = || Arg::with_name("POSITION").required(true).index(2);

    let matches = App::new("skull-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a client for the skull record store")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommands(vec![
            SubCommand::with_name("get")
                .about("Print all records of a kind as a JSON array")
                .arg(kind()),
            SubCommand::with_name("add")
                .about("Append a record")
                .arg(kind())
                .arg(fields(2)),
            SubCommand::with_name("edit")
                .about("Replace the record at a position")
                .arg(kind())
                .arg(position())
                .arg(fields(3)),
            SubCommand::with_name("rm")
                .about("Remove the first record matching the given one")
                .arg(kind())
                .arg(fields(2)),
            SubCommand::with_name("rm-at")
                .about("Remove the record at a position")
                .arg(kind())
                .arg(position()),
            SubCommand::with_name("reload").about("Reload all records from disk"),
        ])
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the IP_ADDR:PORT of the server to connect to")
                .global(true)
                .default_value(DEFAULT_ADDRESS),
        )
        .arg(
            Arg::with_name("user")
                .long("user")
                .value_name("NAME")
                .help("the user to act for")
                .global(true)
                .takes_value(true),
        )
        .get_matches();

    // parse commands into an Opt struct
    let opt = parse_options(&matches)?;
    run(opt)
}

/// runs the specified request on a [`SkullClient`]
/// `opt` contains the server address and the request to execute
fn run(opt: Opt) -> Result<()> {
    let mut client = SkullClient::connect(opt.addr, opt.req.user().clone())?;
    match opt.req {
        Request::Get { kind, .. } => {
            let records = client.get(kind)?;
            println!("{}", records);
        }
        Request::Add { kind, fields, .. } => client.add(kind, fields)?,
        Request::Edit {
            kind,
            fields,
            position,
            ..
        } => client.edit(kind, fields, position)?,
        Request::Remove { kind, fields, .. } => client.remove(kind, fields)?,
        Request::RemoveAt { kind, position, .. } => client.remove_at(kind, position)?,
        Request::Reload { .. } => client.reload()?,
    }
    Ok(())
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let (name, args) = matches.subcommand();
    let args = args.ok_or_else(|| SkullError::Parse("no command given".to_string()))?;
    // global args are propagated into the subcommand's matches
    let addr = args.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
    let user = args
        .value_of("user")
        .map(User::new)
        .ok_or_else(|| SkullError::Parse("--user is required".to_string()))?;

    let req = match name {
        "get" => Request::Get {
            user,
            kind: kind(args)?,
        },
        "add" => Request::Add {
            user,
            kind: kind(args)?,
            fields: fields(args),
        },
        "edit" => Request::Edit {
            user,
            kind: kind(args)?,
            fields: fields(args),
            position: position(args)?,
        },
        "rm" => Request::Remove {
            user,
            kind: kind(args)?,
            fields: fields(args),
        },
        "rm-at" => Request::RemoveAt {
            user,
            kind: kind(args)?,
            position: position(args)?,
        },
        "reload" => Request::Reload { user },
        other => return Err(SkullError::Parse(format!("unknown command: {}", other))),
    };
    Opt::build(addr, req)
}

fn kind(args: &ArgMatches) -> Result<RecordKind> {
    args.value_of("KIND").unwrap_or_default().parse()
}

fn fields(args: &ArgMatches) -> Vec<String> {
    args.values_of("FIELDS")
        .map(|values| values.map(String::from).collect())
        .unwrap_or_default()
}

fn position(args: &ArgMatches) -> Result<usize> {
    let value = args.value_of("POSITION").unwrap_or_default();
    value
        .parse()
        .map_err(|_| SkullError::Parse(format!("POSITION must be a number, got {}", value)))
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        // only problems are interesting on the client side
        .with_max_level(Level::WARN)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
