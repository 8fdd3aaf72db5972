//! CLI front end: interactive shell and named-pipe server for the
//! aggregation engine.

use aggcube::config::Config;
use aggcube::database;
use aggcube::environment::Environment;
use aggcube::error::Error;
use aggcube::key::{ElementId, ALL_ELEMENTS};
use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
    registry::Registry,
};

mod server;

macro_rules! die {
    ($fmt:literal, $($arg:tt)*) => {{
        eprintln!($fmt, $($arg)*);
        std::process::exit(1);
    }};
    ($msg:literal) => {{
        eprintln!($msg);
        std::process::exit(1);
    }};
}

use tracing::info;

/// Bridges `log`-crate calls from the engine and installs a `tracing`
/// subscriber at the level named by the `-v 0..=4` flag.
fn init_tracing(log_level: u8) -> LevelFilter {
    let level_filter = match log_level {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_log::LogTracer::init().expect("failed to install log tracer");

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("AGGCUBE_LOG")
        .from_env_lossy();

    let subscriber = Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact(),
    );

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        die!("INTERNAL ERROR: setting default tracing::subscriber failed");
    }

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing_panic::panic_hook(info);
        prev_hook(info);
    }));

    level_filter
}

/// In-memory, read-only OLAP aggregation engine
#[derive(Parser, Debug)]
#[command(name = "aggcube")]
#[command(about = "Query a CSV-loaded OLAP cube interactively or over named pipes")]
struct ToolArgs {
    /// Directory containing database.csv and the per-cube fact files
    database_dir: PathBuf,

    /// Serve queries over the /tmp/stoap-in and /tmp/stoap-out FIFOs
    /// instead of starting the interactive shell
    #[arg(short = 's', long = "server-mode")]
    server_mode: bool,

    /// Log verbosity, 0 (errors only) through 4 (trace)
    #[arg(short = 'v', long = "log-level", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=4))]
    log_level: u8,
}

#[derive(Parser, Debug)]
#[command(name = "")]
#[command(no_binary_name = true)]
#[command(disable_version_flag = true)]
struct ShellArgs {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ShellCommand {
    /// Exit the shell
    #[command(visible_alias = "quit")]
    Exit,
    /// Cube / dimension / storage summary
    Info {
        #[command(subcommand)]
        what: InfoTarget,
    },
    /// Look up one cell by its comma-separated id tuple, e.g. `getCell 1,0`
    GetCell { path: String },
    /// Look up every cell of a `x`-separated area, e.g. `getArea 0,2x0-1`
    GetArea { area: String },
}

#[derive(Subcommand, Debug, Clone)]
enum InfoTarget {
    Cube,
    Dimensions,
    Storage,
}

struct Session {
    env: Environment,
    /// The interactive shell and its single-cube-oriented commands
    /// operate against the first loaded cube.
    cube_index: usize,
}

impl Session {
    fn open(dir: &std::path::Path) -> aggcube::Result<Self> {
        let env = database::load_database(dir)?;
        if env.cubes().is_empty() {
            return Err(Error::CorruptFile("database has no loadable cubes".into()));
        }
        Ok(Self { env, cube_index: 0 })
    }

    fn cube(&self) -> &Arc<aggcube::Cube> {
        &self.env.cubes()[self.cube_index]
    }
}

/// Parses a `getCell` argument: a comma-separated tuple of element ids.
fn parse_path(arg: &str) -> aggcube::Result<Vec<ElementId>> {
    arg.split(',')
        .map(|field| {
            field
                .trim()
                .parse::<ElementId>()
                .map_err(|_| Error::InvalidCoordinates(format!("not an element id: {field:?}")))
        })
        .collect()
}

/// Parses a `getArea` argument: per-dimension id lists of `lo-hi` ranges
/// or single ids, dimensions separated by `x`. The literal `ALL`
/// resolves to [`ALL_ELEMENTS`].
fn parse_area(arg: &str) -> aggcube::Result<Vec<Vec<ElementId>>> {
    arg.split('x')
        .map(|dim_field| {
            if dim_field.eq_ignore_ascii_case("ALL") {
                return Ok(vec![ALL_ELEMENTS]);
            }
            dim_field
                .split(',')
                .map(|range| parse_range_token(range))
                .collect::<aggcube::Result<Vec<Vec<ElementId>>>>()
                .map(|nested| nested.into_iter().flatten().collect())
        })
        .collect()
}

fn parse_range_token(token: &str) -> aggcube::Result<Vec<ElementId>> {
    let token = token.trim();
    if let Some((lo, hi)) = token.split_once('-') {
        let lo: ElementId = lo
            .trim()
            .parse()
            .map_err(|_| Error::InvalidCoordinates(format!("bad range start: {lo:?}")))?;
        let hi: ElementId = hi
            .trim()
            .parse()
            .map_err(|_| Error::InvalidCoordinates(format!("bad range end: {hi:?}")))?;
        Ok((lo..=hi).collect())
    } else {
        let id: ElementId = token
            .parse()
            .map_err(|_| Error::InvalidCoordinates(format!("not an element id: {token:?}")))?;
        Ok(vec![id])
    }
}

fn print_answer(path: &[ElementId], answer: aggcube::CellAnswer) {
    let path_str = path
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    match answer.value() {
        // 1 integer digit + 14 fractional digits = 15 significant digits.
        Some(v) => println!("{path_str}: {v:.14e}"),
        None => println!("{path_str}: not found"),
    }
}

fn handle_get_cell(session: &Session, arg: &str) {
    match parse_path(arg) {
        Ok(path) => match aggcube::query::answer_paths(session.cube(), std::slice::from_ref(&path)) {
            Ok(answers) => print_answer(&path, answers[0]),
            Err(e) => eprintln!("{e}"),
        },
        Err(e) => eprintln!("{e}"),
    }
}

fn handle_get_area(session: &Session, arg: &str) {
    match parse_area(arg) {
        Ok(id_lists) => match aggcube::query::answer_area(session.cube(), &id_lists) {
            Ok(answers) => {
                for (path, answer) in answers {
                    print_answer(&path, answer);
                }
            }
            Err(e) => eprintln!("{e}"),
        },
        Err(e) => eprintln!("{e}"),
    }
}

fn handle_info(session: &Session, what: &InfoTarget) {
    let cube = session.cube();
    match what {
        InfoTarget::Cube => {
            println!("name: {}", cube.name());
            println!("id: {}", cube.id());
            println!("dimensions: {}", cube.dim_count());
            println!("base cells stored: {}", cube.storage().len());
        }
        InfoTarget::Dimensions => {
            for dim in cube.dimensions() {
                println!(
                    "{} (id={}): {} elements, max depth {}",
                    dim.name(),
                    dim.id(),
                    dim.element_count(),
                    dim.max_depth()
                );
            }
        }
        InfoTarget::Storage => {
            println!("base cells: {}", cube.storage().len());
        }
    }
}

enum CommandResult {
    Continue,
    Exit,
}

fn execute_shell_command(session: &Session, cmd: ShellCommand) -> CommandResult {
    match cmd {
        ShellCommand::Exit => CommandResult::Exit,
        ShellCommand::Info { what } => {
            handle_info(session, &what);
            CommandResult::Continue
        }
        ShellCommand::GetCell { path } => {
            handle_get_cell(session, &path);
            CommandResult::Continue
        }
        ShellCommand::GetArea { area } => {
            handle_get_area(session, &area);
            CommandResult::Continue
        }
    }
}

fn run_shell_command(session: &Session, line: &str) -> CommandResult {
    let line = line.trim();
    if line.is_empty() {
        return CommandResult::Continue;
    }
    if line.eq_ignore_ascii_case("help") {
        println!("Commands: exit, help, info (cube|dimensions|storage), getCell <id,id,...>, getArea <r0xr1x...>");
        return CommandResult::Continue;
    }

    let tokens = match shlex::split(line) {
        Some(t) if !t.is_empty() => t,
        Some(_) => return CommandResult::Continue,
        None => {
            eprintln!("error: unclosed quote");
            return CommandResult::Continue;
        }
    };

    match ShellArgs::try_parse_from(&tokens) {
        Ok(args) => execute_shell_command(session, args.command),
        Err(e) => {
            eprintln!("{e}");
            CommandResult::Continue
        }
    }
}

fn run_shell(session: &Session) {
    if io::stdin().is_terminal() {
        run_shell_interactive(session);
    } else {
        run_shell_non_interactive(session);
    }
}

fn run_shell_interactive(session: &Session) {
    println!("aggcube interactive shell — type 'help' for commands, 'exit' to quit.\n");

    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("error initializing line editor: {e}");
            return;
        }
    };

    loop {
        match rl.readline("aggcube> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                if let CommandResult::Exit = run_shell_command(session, &line) {
                    break;
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("error reading input: {e}");
                break;
            }
        }
    }
}

fn run_shell_non_interactive(session: &Session) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if stdout.flush().is_err() {
            die!("can't flush stdout");
        }
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if let CommandResult::Exit = run_shell_command(session, &line) {
                    break;
                }
            }
            Err(e) => die!("error reading input: {}", e),
        }
    }
}

fn main() {
    let args = ToolArgs::parse();
    let level_filter = init_tracing(args.log_level);
    info!(
        "starting aggcube {}, log level {level_filter}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::new(&args.database_dir)
        .server_mode(args.server_mode)
        .log_level(args.log_level);

    let session = match Session::open(&config.path) {
        Ok(s) => s,
        Err(e) => die!("Error: {}", e),
    };

    if config.server_mode {
        if let Err(e) = server::run(&session.env) {
            die!("Error: {}", e);
        }
    } else {
        run_shell(&session);
    }
}
