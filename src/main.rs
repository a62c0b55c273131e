use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, NamedSource, Report, Result};

use rails::output::{file_message, message, MsgColor, Output};
use rails::{snapshot, AsmParser, Engine, ProgramImage, StopCondition, StopReason, PORT_COUNT};

/// Rails is an assembler and execution engine for the Rails 16-instruction 8-bit CPU.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.rails` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a `.rails` source file or resume a `.bin` snapshot
    Run {
        /// `.rails` or `.bin` file to run
        name: PathBuf,
        /// Instruction to stop in front of
        #[arg(short, long, value_enum, default_value_t = Until::Exit)]
        until: Until,
        /// Set an input port before running, eg. `--input 3=42`
        #[arg(short, long, value_parser = parse_input)]
        input: Vec<(usize, u8)>,
        /// Stop the run after this many milliseconds (0 for no deadline)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
        /// Write the final machine state to a snapshot file
        #[arg(short, long)]
        save_snapshot: Option<PathBuf>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Execute instructions one at a time, printing each
    Step {
        /// `.rails` or `.bin` file to step through
        name: PathBuf,
        /// Number of instructions to execute
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Set an input port before stepping, eg. `--input 3=42`
        #[arg(short, long, value_parser = parse_input)]
        input: Vec<(usize, u8)>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Check `.rails` files without running or outputting binary
    Check {
        /// Files or glob patterns to check
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Create a binary program image of 256 little-endian words
    Compile {
        /// `.rails` file to compile
        name: PathBuf,
        /// Destination to output `.rom` file
        dest: Option<PathBuf>,
    },
    /// Print the label table and every assembled instruction
    Dump {
        /// `.rails` file to dump
        name: PathBuf,
    },
    /// Print the machine state stored in a snapshot
    Inspect {
        /// `.bin` snapshot file
        name: PathBuf,
        /// Also dump RAM
        #[arg(short, long)]
        ram: bool,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Place a watch on a `.rails` file to receive constant assembler updates
    Watch {
        /// `.rails` file to watch
        name: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Until {
    Exit,
    Io,
}

impl From<Until> for StopCondition {
    fn from(until: Until) -> Self {
        match until {
            Until::Exit => StopCondition::Exit,
            Until::Io => StopCondition::Io,
        }
    }
}

struct RunOptions {
    until: Until,
    input: Vec<(usize, u8)>,
    timeout: Option<Duration>,
    save_snapshot: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            until: Until::Exit,
            input: Vec::new(),
            timeout: rails::env::default_timeout(),
            save_snapshot: None,
        }
    }
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    rails::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(rails::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let Some(command) = args.command else {
        if let Some(path) = args.path {
            set_minimal(false);
            return run(&path, RunOptions::default());
        }
        println!("\n~ rails v{VERSION} ~");
        println!("{}", LOGO.truecolor(199, 146, 234).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    };

    match command {
        Command::Run {
            name,
            until,
            input,
            timeout_ms,
            save_snapshot,
            minimal,
        } => {
            set_minimal(minimal);
            let timeout = match timeout_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => rails::env::default_timeout(),
            };
            run(
                &name,
                RunOptions {
                    until,
                    input,
                    timeout,
                    save_snapshot,
                },
            )
        }
        Command::Step {
            name,
            count,
            input,
            minimal,
        } => {
            set_minimal(minimal);
            let engine = load(&name)?;
            for (port, value) in input {
                engine.set_input(port, value);
            }
            for n in 1..=count {
                let pc = engine.state().pc();
                let instr = engine.step()?;
                Output::Normal.print_step(n, pc, instr);
            }
            let state = engine.state();
            Output::Normal.print_registers(&state);
            Output::Normal.print_ports(&state);
            Ok(())
        }
        Command::Check { patterns } => {
            let paths = expand_patterns(&patterns)?;
            let mut failed = 0;
            for path in &paths {
                file_message(Green, "Checking", path);
                if let Err(report) = assemble(path) {
                    Output::Diagnostic.print_str(&format!("{report:?}\n"));
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{failed} of {} files failed to assemble", paths.len());
            }
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Command::Compile { name, dest } => {
            file_message(Green, "Assembling", &name);
            let image = assemble(&name)?;
            let out_file_name = dest.unwrap_or_else(|| name.with_extension("rom"));
            fs::write(&out_file_name, image.to_le_bytes()).into_diagnostic()?;

            message(Green, "Finished", &format!("emit {} instructions", image.len()));
            file_message(Green, "Saved", &out_file_name);
            Ok(())
        }
        Command::Dump { name } => {
            let src = fs::read_to_string(&name).into_diagnostic()?;
            let parser = AsmParser::new(&src).map_err(|e| with_source(e, &name, &src))?;
            for (label, index) in parser.labels().iter() {
                println!("{:>12} {label} -> {index}", "label".cyan());
            }
            let image = parser.parse().map_err(|e| with_source(e, &name, &src))?;
            Output::Normal.print_program(image.words(), image.len(), None);
            Ok(())
        }
        Command::Inspect { name, ram, minimal } => {
            set_minimal(minimal);
            let state = snapshot::read_file(&name)?;
            file_message(Green, "Inspecting", &name);
            Output::Normal.print_program(state.prom(), state.program_length(), Some(state.pc()));
            Output::Normal.print_registers(&state);
            Output::Normal.print_ports(&state);
            if ram {
                Output::Normal.print_ram(&state);
            }
            Ok(())
        }
        Command::Watch { name } => watch(name),
    }
}

fn set_minimal(flag: bool) {
    Output::set_minimal(flag || rails::env::is_minimal_forced());
}

fn run(name: &Path, opts: RunOptions) -> Result<()> {
    use MsgColor::*;
    let engine = load(name)?;
    for (port, value) in opts.input {
        engine.set_input(port, value);
    }

    let cond = StopCondition::from(opts.until);
    message(Green, "Running", &format!("until {}", until_name(opts.until)));
    let started = Instant::now();
    let run = engine.run_until(cond)?;

    if let Some(limit) = opts.timeout {
        if !engine.wait_idle_timeout(limit) {
            engine.request_stop();
        }
    }

    let reason = run.join();
    let state = engine.state();
    Output::Normal.print_registers(&state);
    Output::Normal.print_ports(&state);

    if let Some(path) = &opts.save_snapshot {
        engine.save_snapshot_file(path)?;
        file_message(Green, "Saved", path);
    }

    match reason {
        StopReason::Condition(instr) => {
            message(
                Green,
                "Stopped",
                &format!("before `{instr}` at pc {}", state.pc()),
            );
            file_message(Green, "Completed", name);
            Ok(())
        }
        StopReason::Stopped => {
            message(Red, "Timeout", &format!("stopped at pc {}", state.pc()));
            bail!(
                "program did not reach {} within {} ms",
                until_name(opts.until),
                started.elapsed().as_millis()
            )
        }
    }
}

fn until_name(until: Until) -> &'static str {
    match until {
        Until::Exit => "EXIT",
        Until::Io => "IN/OUT",
    }
}

/// Build an engine from source, or from a `.bin` snapshot.
fn load(name: &Path) -> Result<Engine> {
    use MsgColor::*;
    let engine = Engine::new();
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("bin") => {
            file_message(Green, "Loading", name);
            engine.load_snapshot_file(name)?;
        }
        Some(_) => {
            file_message(Green, "Assembling", name);
            let image = assemble(name)?;
            engine.load_program(&image)?;
        }
        None => bail!("File has no extension. Exiting..."),
    }
    Ok(engine)
}

/// Read and assemble a source file, attaching the source to any diagnostic.
fn assemble(name: &Path) -> Result<ProgramImage> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    rails::assemble(&src).map_err(|e| with_source(e, name, &src))
}

fn with_source(err: rails::AsmError, name: &Path, src: &str) -> Report {
    Report::new(err).with_source_code(NamedSource::new(name.display().to_string(), src.to_owned()))
}

/// A pattern that matches nothing is kept as a literal path, so its read error is reported.
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matched = glob::glob(pattern)
            .into_diagnostic()?
            .collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()?;
        if matched.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            paths.extend(matched);
        }
    }
    Ok(paths)
}

fn parse_input(arg: &str) -> std::result::Result<(usize, u8), String> {
    let (port, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected PORT=VALUE, found `{arg}`"))?;
    let port: usize = port
        .trim()
        .parse()
        .map_err(|_| format!("invalid port `{port}`"))?;
    if port >= PORT_COUNT {
        return Err(format!("port {port} out of range, max is {}", PORT_COUNT - 1));
    }
    let value: u8 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid port value `{value}`, expected 0-255"))?;
    Ok((port, value))
}

fn watch(name: PathBuf) -> Result<()> {
    use MsgColor::*;
    if !name.exists() {
        bail!("File does not exist. Exiting...")
    }
    // Vim breaks if watching a single file
    let folder_path = match name.parent() {
        Some(pth) if pth.is_dir() => pth.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    // Clear screen and move cursor to top left
    print!("\x1B[2J\x1B[2;1H");
    file_message(Green, "Watching", &name);
    message(Cyan, "Help", "press CTRL+C to exit");

    let mut watcher =
        Hotwatch::new_with_custom_delay(Duration::from_millis(500)).into_diagnostic()?;

    watcher
        .watch(folder_path, move |event: Event| match event.kind {
            // Watch remove for vim changes
            EventKind::Modify(_) | EventKind::Remove(_) => {
                print!("\x1B[2J\x1B[2;1H");
                file_message(Green, "Watching", &name);
                message(Green, "Re-checking", "file change detected");
                message(Cyan, "Help", "press CTRL+C to exit");

                sleep(Duration::from_millis(50));

                match assemble(&name) {
                    Ok(image) => {
                        message(
                            Green,
                            "Success",
                            &format!("{} instructions, no errors found!", image.len()),
                        );
                    }
                    Err(e) => {
                        println!("\n{e:?}");
                    }
                }
                Flow::Continue
            }
            _ => Flow::Continue,
        })
        .into_diagnostic()?;
    watcher.run();
    Ok(())
}

const LOGO: &str = r#"
                _ _
  _ __ __ _(_) |___
 | '__/ _` | | / __|
 | | | (_| | | \__ \
 |_|  \__,_|_|_|___/"#;

const SHORT_INFO: &str = r"
Welcome to rails, an assembler and execution engine for the
Rails 16-instruction 8-bit CPU.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
