mod console;

use std::{env, ffi::OsString, io, path::PathBuf, process::ExitCode};

use clap::Parser;
use color_eyre as ey;
use ey::eyre::Context;
use facet_content::{ChangeReactor, Command, Message, Session, WorkspaceWatcher};
use facet_shared::{
    crossbeam_channel,
    log::{self, info},
};
use fern::colors::{Color, ColoredLevelConfig};

/// Packs the assets of a workspace into the output directory.
///
/// Without any arguments an interactive console is started that watches the
/// current directory for changes. With arguments the requested operations run
/// once and the tool exits. If none of --update, --pack or --validate is
/// given, the metadata is updated.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CommandLineArguments {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Update the metadata of every asset
    #[arg(long)]
    update: bool,

    /// Update the metadata of every asset and pack all changed files
    #[arg(long)]
    pack: bool,

    /// Validate the metadata of every asset
    #[arg(long)]
    validate: bool,

    /// Log more details (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl CommandLineArguments {
    /// Updating is the default when no operation is requested.
    fn runs_update(&self) -> bool {
        self.update || self.pack || !self.validate
    }
}

/// Any argument switches to a single headless run.
fn is_headless(raw_arguments: &[OsString]) -> bool {
    raw_arguments.len() > 1
}

fn setup_logging(verbose: u8) -> ey::Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::White)
        .debug(Color::BrightBlack)
        .trace(Color::BrightBlack);
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                facet_shared::chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .level(level)
        .chain(io::stdout())
        .apply()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    Ok(())
}

/// Runs the requested operations and returns whether all of them succeeded.
fn run_headless(session: &mut Session, arguments: &CommandLineArguments) -> bool {
    if arguments.runs_update() && !session.update_workspace() {
        return false;
    }
    if arguments.validate && !session.validate_workspace() {
        return false;
    }
    if arguments.pack {
        if !session.pack_workspace() {
            return false;
        }
        return session.save_cache();
    }
    true
}

fn run_interactive(session: Session) -> ey::Result<()> {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let _watcher = WorkspaceWatcher::start(session.root(), sender.clone()).wrap_err("Failed to watch the workspace")?;

    let mut reactor = ChangeReactor::new(session);
    info!("Type 'help' to list the commands");
    sender
        .send(Message::Command(Command::ShowTree))
        .wrap_err("Failed to queue the initial command")?;
    console::spawn_reader(sender).wrap_err("Failed to start the console")?;

    reactor.run(&receiver);
    Ok(())
}

fn main() -> ey::Result<ExitCode> {
    color_eyre::install()?;
    let raw_arguments = env::args_os().collect::<Vec<_>>();
    let headless = is_headless(&raw_arguments);
    let arguments = CommandLineArguments::parse_from(raw_arguments);
    setup_logging(arguments.verbose)?;

    let mut session = Session::open(&arguments.workspace)
        .wrap_err_with(|| format!("Failed to open workspace '{}'", arguments.workspace.display()))?;

    if headless {
        if run_headless(&mut session, &arguments) {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::FAILURE)
        }
    } else {
        run_interactive(session)?;
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use facet_content::{Encoder, EncoderLink, Result, WorkspaceConfig, CACHE_FILE_NAME};
    use facet_test::{setup_logger, TestWorkspace};

    use super::*;

    /// Answers every operation with the same result.
    struct FixedEncoder(bool);

    impl Encoder for FixedEncoder {
        fn name(&self) -> &str {
            "fixed"
        }

        fn initialize(&self, _file: &Path) -> Result<bool> {
            Ok(self.0)
        }

        fn convert(&self, _file: &Path, _destination_dir: &Path) -> Result<bool> {
            Ok(self.0)
        }

        fn update(&self, _file: &Path) -> Result<bool> {
            Ok(self.0)
        }

        fn validate(&self, _file: &Path) -> Result<bool> {
            Ok(self.0)
        }
    }

    fn open(workspace: &TestWorkspace, succeeds: bool) -> Session {
        setup_logger();
        let config = WorkspaceConfig {
            encoders: vec![EncoderLink::new("obj", "builtin:fixed")],
            ..WorkspaceConfig::default()
        };
        config.save(workspace.root()).unwrap();
        workspace.write("Meshes/a.obj", "v");
        workspace.write("Text/b.txt", "b");
        Session::open(workspace.root()).unwrap().register("fixed", FixedEncoder(succeeds))
    }

    fn raw(workspace: &TestWorkspace, flags: &[&str]) -> Vec<OsString> {
        let mut raw = vec![OsString::from("facet"), OsString::from("-w"), workspace.root().as_os_str().to_owned()];
        raw.extend(flags.iter().map(OsString::from));
        raw
    }

    fn arguments(workspace: &TestWorkspace, flags: &[&str]) -> CommandLineArguments {
        CommandLineArguments::parse_from(raw(workspace, flags))
    }

    #[test]
    fn failing_encoder_fails_every_operation() {
        let workspace = TestWorkspace::new();
        let mut session = open(&workspace, false);
        for flags in [&["--update"][..], &["--validate"], &["--pack"], &[]] {
            assert!(!run_headless(&mut session, &arguments(&workspace, flags)), "{flags:?}");
        }
        assert!(!workspace.path(CACHE_FILE_NAME).exists());
        assert!(!workspace.output_path("Text/b.txt").exists());
    }

    #[test]
    fn pack_saves_the_cache() {
        let workspace = TestWorkspace::new();
        let mut session = open(&workspace, true);
        assert!(run_headless(&mut session, &arguments(&workspace, &["--pack"])));
        assert!(workspace.path(CACHE_FILE_NAME).is_file());
        assert!(workspace.output_path("Text/b.txt").is_file());
    }

    #[test]
    fn update_and_validate_leave_the_cache_alone() {
        let workspace = TestWorkspace::new();
        let mut session = open(&workspace, true);
        assert!(run_headless(&mut session, &arguments(&workspace, &["--update"])));
        assert!(run_headless(&mut session, &arguments(&workspace, &["--validate"])));
        assert!(!workspace.path(CACHE_FILE_NAME).exists());
        assert!(!workspace.output().exists());
    }

    #[test]
    fn any_argument_runs_headless_with_update_by_default() {
        let workspace = TestWorkspace::new();
        assert!(!is_headless(&[OsString::from("facet")]));
        assert!(is_headless(&raw(&workspace, &[])));

        assert!(arguments(&workspace, &[]).runs_update());
        assert!(arguments(&workspace, &["--pack"]).runs_update());
        assert!(!arguments(&workspace, &["--validate"]).runs_update());
        assert!(arguments(&workspace, &["--validate", "--update"]).runs_update());
    }
}
