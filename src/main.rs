use botlang::natives::{Console, NativeTable};
use botlang::repl::{self, Session};
use botlang::runner;
use botlang::{RunConfig, Type, Value};
use clap::{Arg, ArgAction, Command};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Stand-in for a simulation: prints to stdout and knows the turn number.
#[derive(Debug, Default)]
struct DemoHost {
    turn: u64,
}

impl Console for DemoHost {
    fn write_line(&mut self, line: &str) {
        println!("{}", line);
    }
}

fn demo_natives() -> NativeTable<DemoHost> {
    let mut natives = NativeTable::standard();
    natives.register("turn", Type::INT, vec![], |_, host: &mut DemoHost| {
        i64::try_from(host.turn)
            .map(Value::Int)
            .map_err(|_| "turn counter overflowed".to_string())
    });
    natives
}

fn main() {
    let matches = Command::new("botlang")
        .about("Compiles and runs robot control scripts")
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("turns")
                .short('t')
                .long("turns")
                .help("Number of turns to run the script for")
                .value_name("N")
                .value_parser(clap::value_parser!(u64))
                .default_value("1"),
        )
        .arg(
            Arg::new("max-steps")
                .long("max-steps")
                .help("Abort a turn after this many statements and loop iterations")
                .value_name("N")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .help("Maximum nesting of function calls")
                .value_name("N")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log more detail (-v for debug, -vv for trace)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start in interactive REPL mode")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_logging(matches.get_count("verbose"));

    let mut config = RunConfig::default();
    if let Some(max_steps) = matches.get_one::<u64>("max-steps") {
        config = config.with_max_steps(*max_steps);
    }
    if let Some(max_depth) = matches.get_one::<usize>("max-depth") {
        config = config.with_max_call_depth(*max_depth);
    }

    match matches.get_one::<String>("file") {
        Some(file_path) if !matches.get_flag("interactive") => {
            let turns = matches.get_one::<u64>("turns").copied().unwrap_or(1);
            run_file(file_path, &config, turns);
        }
        _ => {
            let mut session = Session::new(demo_natives(), DemoHost::default()).with_config(config);
            repl::start(&mut session);
        }
    }
}

fn init_logging(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "warn",
        1 => "botlang=debug",
        _ => "botlang=trace",
    };
    let filter = EnvFilter::try_from_env("BOTLANG_LOG").unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn run_file(path: &str, config: &RunConfig, turns: u64) {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        std::process::exit(1);
    }

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            std::process::exit(1);
        }
    };

    let filename = path.display().to_string();
    let natives = demo_natives();
    let mut host = DemoHost::default();
    let summary = runner::run_turns(
        &source,
        Some(&filename),
        &natives,
        &mut host,
        config,
        turns,
        |host, turn| host.turn = turn,
    );

    if !summary.compiled || summary.failed > 0 {
        std::process::exit(1);
    }
}
