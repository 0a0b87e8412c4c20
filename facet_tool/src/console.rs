use std::{
    io::{self, BufRead},
    path::PathBuf,
    thread,
};

use facet_content::{Command, ConfigChange, Message};
use facet_shared::{
    crossbeam_channel::Sender,
    log::{error, info},
};

pub const HELP: &str = "\
Commands:
  pack                    Pack all changed files
  update                  Update the metadata of all files
  validate                Validate the metadata of all files
  mode                    Switch between manual and auto mode
  tree                    Show the workspace
  reset <file>            Reset the metadata of a file to the encoder defaults
  config                  Show the workspace configuration
  set-output <dir>        Set the output directory
  exclude <ext;ext>       Set the excluded extensions
  link <ext> <encoder>    Link an encoder to an extension
  unlink <ext>            Remove the encoder of an extension
  help                    Show this help
  quit                    Save the cache and exit";

/// A line typed into the console.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Help,
    Empty,
}

/// Parses a console line.
pub fn parse_line(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match (word, rest) {
        ("", _) => return Ok(Input::Empty),
        ("help" | "?", _) => return Ok(Input::Help),
        ("pack", "") => Command::Pack,
        ("update", "") => Command::Update,
        ("validate", "") => Command::Validate,
        ("mode", "") => Command::ToggleMode,
        ("tree", "") => Command::ShowTree,
        ("config", "") => Command::ShowConfig,
        ("quit" | "exit", "") => Command::Quit,
        ("reset", file) if !file.is_empty() => Command::Reset(PathBuf::from(file)),
        ("set-output", directory) if !directory.is_empty() => {
            Command::Configure(ConfigChange::SetOutputDirectory(directory.to_owned()))
        }
        ("exclude", extensions) => Command::Configure(ConfigChange::SetExcludedExtensions(extensions.to_owned())),
        ("link", arguments) => match arguments.split_once(char::is_whitespace) {
            Some((extension, encoder)) => Command::Configure(ConfigChange::LinkEncoder {
                extension: extension.to_owned(),
                encoder: encoder.trim().to_owned(),
            }),
            None => return Err("Usage: link <ext> <encoder>".to_owned()),
        },
        ("unlink", extension) if !extension.is_empty() => {
            Command::Configure(ConfigChange::UnlinkEncoder(extension.to_owned()))
        }
        _ => return Err(format!("Unknown command: {line}")),
    };
    Ok(Input::Command(command))
}

/// Reads commands from stdin on a separate thread and puts them into the queue.
///
/// The end of the input counts as `quit`.
pub fn spawn_reader(sender: Sender<Message>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("console".to_owned()).spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_line(&line) {
                Ok(Input::Command(command)) => {
                    let quit = command == Command::Quit;
                    if sender.send(Message::Command(command)).is_err() || quit {
                        return;
                    }
                }
                Ok(Input::Help) => {
                    for line in HELP.lines() {
                        info!("{line}");
                    }
                }
                Ok(Input::Empty) => {}
                Err(message) => error!("{message}"),
            }
        }
        let _ = sender.send(Message::Command(Command::Quit));
    })
}
