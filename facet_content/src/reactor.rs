use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use facet_shared::{
    crossbeam_channel::Receiver,
    log::{error, info, trace, warn},
};

use crate::{
    common::{asset_path_of_meta, is_meta_file, meta_path},
    scanner::WorkspaceTree,
    session::Session,
    watcher::WorkspaceEvent,
    workspace_config::ConfigChange,
};

/// Whether changes in the workspace are packed automatically.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Packing and updating are started by the user. File system events only refresh the tree.
    #[default]
    Manual,
    /// Every changed file is updated and packed on its own. Manual packing is disabled.
    Auto,
}

impl BuildMode {
    pub fn toggled(self) -> Self {
        match self {
            BuildMode::Manual => BuildMode::Auto,
            BuildMode::Auto => BuildMode::Manual,
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Manual => f.write_str("manual"),
            BuildMode::Auto => f.write_str("auto"),
        }
    }
}

/// Requests of the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pack,
    Update,
    Validate,
    ToggleMode,
    ShowTree,
    ShowConfig,
    /// Replaces the metadata of the file with the defaults of its encoder.
    Reset(PathBuf),
    Configure(ConfigChange),
    Quit,
}

/// Everything that arrives in the queue of the [`ChangeReactor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Workspace(WorkspaceEvent),
    Command(Command),
}

/// Something the [`ChangeReactor`] did in response to a [`WorkspaceEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    TreeRefreshed,
    MetaRenamed { from: PathBuf, to: PathBuf },
    Updated { file: PathBuf, success: bool },
    Packed { file: PathBuf, success: bool },
}

/// Whether [`ChangeReactor::run`] keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Owns the [`Session`] and serializes everything that happens to it.
///
/// File system events and user commands are put into one queue which is
/// drained by [`ChangeReactor::run`] on a single thread. No other thread
/// touches the session.
pub struct ChangeReactor {
    session: Session,
    mode: BuildMode,
    tree: WorkspaceTree,
}

impl ChangeReactor {
    pub fn new(session: Session) -> Self {
        let mut reactor = Self {
            session,
            mode: BuildMode::Manual,
            tree: WorkspaceTree::default(),
        };
        reactor.refresh_tree();
        reactor
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// The tree as of the last refresh.
    pub fn tree(&self) -> &WorkspaceTree {
        &self.tree
    }

    /// Switches between manual and automatic mode.
    pub fn toggle_mode(&mut self) -> BuildMode {
        self.mode = self.mode.toggled();
        info!("Switched to {} mode", self.mode);
        self.mode
    }

    /// Drains the queue until it is closed or [`Command::Quit`] arrives. Saves the cache at the end.
    pub fn run(&mut self, receiver: &Receiver<Message>) {
        while let Ok(message) = receiver.recv() {
            match message {
                Message::Workspace(event) => {
                    self.handle_event(&event);
                }
                Message::Command(command) => {
                    if self.handle_command(command) == Flow::Quit {
                        break;
                    }
                }
            }
        }
        self.session.save_cache();
    }

    /// Reacts to a change in the workspace and returns what was done.
    pub fn handle_event(&mut self, event: &WorkspaceEvent) -> Vec<Reaction> {
        trace!("Handling {event:?} in {} mode", self.mode);
        let mut reactions = Vec::new();
        match event {
            WorkspaceEvent::Renamed { from, to } => {
                self.refresh_tree();
                reactions.push(Reaction::TreeRefreshed);
                if let Some(reaction) = rename_meta(from, to) {
                    reactions.push(reaction);
                }
            }
            WorkspaceEvent::Removed(path) => {
                if !is_meta_file(path) {
                    self.refresh_tree();
                    reactions.push(Reaction::TreeRefreshed);
                }
            }
            WorkspaceEvent::Created(path) => {
                if !is_meta_file(path) {
                    self.refresh_tree();
                    reactions.push(Reaction::TreeRefreshed);
                    if path.is_file() && self.session.scanner().is_workspace_file(path) {
                        let updated = self.update(path, &mut reactions);
                        if updated && self.mode == BuildMode::Auto {
                            self.pack(path, &mut reactions);
                        }
                    }
                }
            }
            WorkspaceEvent::Modified(path) => {
                if self.mode == BuildMode::Auto {
                    // A changed metadata file repacks its asset. The asset is
                    // not updated again as that would write the metadata again.
                    let (asset, needs_update) = match asset_path_of_meta(path) {
                        Some(asset) => (asset, false),
                        None => (path.clone(), true),
                    };
                    if asset.is_file() && self.session.scanner().is_workspace_file(&asset) {
                        let updated = !needs_update || self.update(&asset, &mut reactions);
                        if updated {
                            self.pack(&asset, &mut reactions);
                        }
                    }
                }
            }
        }
        reactions
    }

    /// Executes a user command.
    pub fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Pack | Command::Update if self.mode == BuildMode::Auto => {
                warn!("Manual packing and updating are disabled in auto mode");
            }
            Command::Pack => {
                self.session.pack_workspace();
                self.session.save_cache();
            }
            Command::Update => {
                self.session.update_workspace();
            }
            Command::Validate => {
                self.session.validate_workspace();
            }
            Command::ToggleMode => {
                self.toggle_mode();
            }
            Command::ShowTree => {
                self.refresh_tree();
                info!("Workspace '{}' with {} files", self.session.root().display(), self.tree.file_count());
                for line in self.tree.to_string().lines() {
                    info!("{line}");
                }
            }
            Command::ShowConfig => {
                let config = self.session.config();
                info!("Output directory: {}", config.output_directory);
                info!("Excluded extensions: {}", config.excluded_extensions);
                for link in &config.encoders {
                    info!("Encoder for '{}': {}", link.extension, link.encoder);
                }
            }
            Command::Reset(file) => {
                let file = if file.is_absolute() {
                    file
                } else {
                    self.session.root().join(file)
                };
                if file.is_file() {
                    self.session.reset_file(&file);
                } else {
                    error!("File doesn't exist: {}", file.display());
                }
            }
            Command::Configure(change) => {
                if let Err(err) = self.session.configure(change) {
                    error!("Failed to save the workspace configuration: {err}");
                }
                self.refresh_tree();
            }
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn refresh_tree(&mut self) {
        match self.session.tree() {
            Ok(tree) => self.tree = tree,
            Err(err) => error!("Failed to read the workspace: {err}"),
        }
    }

    fn update(&mut self, file: &Path, reactions: &mut Vec<Reaction>) -> bool {
        let success = self.session.update_file(file);
        reactions.push(Reaction::Updated {
            file: file.to_owned(),
            success,
        });
        success
    }

    /// Packs a single file and saves the cache right away, so a crash of the
    /// tool doesn't forget what was packed.
    fn pack(&mut self, file: &Path, reactions: &mut Vec<Reaction>) {
        let success = self.session.pack_file(file);
        if success {
            self.session.save_cache();
        }
        reactions.push(Reaction::Packed {
            file: file.to_owned(),
            success,
        });
    }
}

/// Moves the metadata file of a renamed asset along with it.
fn rename_meta(from: &Path, to: &Path) -> Option<Reaction> {
    if is_meta_file(from) {
        return None;
    }
    let from_meta = meta_path(from);
    if !from_meta.is_file() {
        return None;
    }
    let to_meta = meta_path(to);
    match fs::rename(&from_meta, &to_meta) {
        Ok(()) => {
            info!("Renamed '{}' to '{}'", from_meta.display(), to_meta.display());
            Some(Reaction::MetaRenamed {
                from: from_meta,
                to: to_meta,
            })
        }
        Err(err) => {
            error!("Failed to rename '{}' to '{}': {err}", from_meta.display(), to_meta.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use facet_shared::crossbeam_channel;
    use facet_test::{setup_logger, spectral::prelude::*, TestWorkspace};

    use crate::{
        test_encoders::RecordingEncoder,
        workspace_config::{EncoderLink, WorkspaceConfig},
    };

    use super::*;

    fn reactor(workspace: &TestWorkspace, recorder: &RecordingEncoder) -> ChangeReactor {
        setup_logger();
        let config = WorkspaceConfig {
            encoders: vec![EncoderLink::new("obj", "builtin:mesh")],
            ..WorkspaceConfig::default()
        };
        config.save(workspace.root()).unwrap();
        let session = Session::open(workspace.root()).unwrap().register("mesh", recorder.clone());
        ChangeReactor::new(session)
    }

    #[test]
    fn mode_toggles() {
        let workspace = TestWorkspace::new();
        let mut reactor = reactor(&workspace, &RecordingEncoder::new());
        assert_eq!(reactor.mode(), BuildMode::Manual);
        assert_eq!(reactor.toggle_mode(), BuildMode::Auto);
        assert_eq!(reactor.handle_command(Command::ToggleMode), Flow::Continue);
        assert_eq!(reactor.mode(), BuildMode::Manual);
    }

    #[test]
    fn created_file_is_updated() {
        let workspace = TestWorkspace::new();
        let recorder = RecordingEncoder::new();
        let mut reactor = reactor(&workspace, &recorder);
        let file = workspace.write("Meshes/a.obj", "v");

        let reactions = reactor.handle_event(&WorkspaceEvent::Created(file.clone()));

        assert_eq!(
            reactions,
            vec![
                Reaction::TreeRefreshed,
                Reaction::Updated {
                    file: file.clone(),
                    success: true
                },
            ]
        );
        assert_eq!(reactor.tree().file_count(), 1);
        assert_eq!(recorder.updated(), vec![file]);
        assert!(recorder.converted().is_empty());
    }

    #[test]
    fn created_file_is_packed_in_auto_mode() {
        let workspace = TestWorkspace::new();
        let recorder = RecordingEncoder::new();
        let mut reactor = reactor(&workspace, &recorder);
        reactor.toggle_mode();
        let file = workspace.write("Meshes/a.obj", "v");

        let reactions = reactor.handle_event(&WorkspaceEvent::Created(file.clone()));

        assert_that(&reactions).has_length(3);
        assert_eq!(
            reactions[2],
            Reaction::Packed {
                file: file.clone(),
                success: true
            }
        );
        assert!(workspace.output_path("Meshes/a.obj").is_file());
    }

    #[test]
    fn created_metadata_and_reserved_files() {
        let workspace = TestWorkspace::new();
        let recorder = RecordingEncoder::new();
        let mut reactor = reactor(&workspace, &recorder);
        let meta = workspace.write("Meshes/a.obj.meta", "version: 1");
        assert!(reactor.handle_event(&WorkspaceEvent::Created(meta)).is_empty());

        let reserved = workspace.write("loose.obj", "v");
        assert_eq!(
            reactor.handle_event(&WorkspaceEvent::Created(reserved)),
            vec![Reaction::TreeRefreshed]
        );
        let directory = workspace.mkdir("Meshes/Props");
        assert_eq!(
            reactor.handle_event(&WorkspaceEvent::Created(directory)),
            vec![Reaction::TreeRefreshed]
        );
        assert!(recorder.updated().is_empty());
    }

    #[test]
    fn modifications_are_ignored_in_manual_mode() {
        let workspace = TestWorkspace::new();
        let recorder = RecordingEncoder::new();
        let mut reactor = reactor(&workspace, &recorder);
        let file = workspace.write("Meshes/a.obj", "v");
        assert!(reactor.handle_event(&WorkspaceEvent::Modified(file)).is_empty());
        assert!(recorder.updated().is_empty());
    }

    #[test]
    fn modifications_pack_in_auto_mode() {
        let workspace = TestWorkspace::new();
        let recorder = RecordingEncoder::new();
        let mut reactor = reactor(&workspace, &recorder);
        reactor.toggle_mode();
        let file = workspace.write("Meshes/a.obj", "v");
        let other = workspace.write("Meshes/b.obj", "v");
        workspace.touch("Meshes/a.obj", 1_000);

        let reactions = reactor.handle_event(&WorkspaceEvent::Modified(file.clone()));
        assert_eq!(
            reactions,
            vec![
                Reaction::Updated {
                    file: file.clone(),
                    success: true
                },
                Reaction::Packed {
                    file: file.clone(),
                    success: true
                },
            ]
        );

        // Only the changed file is packed.
        assert_eq!(recorder.converted(), vec![file.clone()]);
        assert!(!workspace.output_path("Meshes/b.obj").exists());
        assert!(reactor.session().cache().contains(&file));
        assert!(!reactor.session().cache().contains(&other));

        // A changed metadata file packs its asset without updating it.
        let meta = workspace.write("Meshes/a.obj.meta", "version: 2");
        let reactions = reactor.handle_event(&WorkspaceEvent::Modified(meta));
        assert_eq!(
            reactions,
            vec![Reaction::Packed {
                file: file.clone(),
                success: true
            }]
        );
        assert_eq!(recorder.converted(), vec![file.clone(), file]);
        assert_eq!(recorder.updated().len(), 1);
    }

    #[test]
    fn auto_pack_saves_the_cache_immediately() {
        let workspace = TestWorkspace::new();
        let recorder = RecordingEncoder::new();
        let mut reactor = reactor(&workspace, &recorder);
        reactor.toggle_mode();
        let file = workspace.write("Meshes/a.obj", "v");

        reactor.handle_event(&WorkspaceEvent::Modified(file.clone()));
        assert!(workspace.path("Files.cache").is_file());

        // Without shutting the reactor down, another session already sees the pack.
        let session = Session::open(workspace.root()).unwrap();
        assert!(session.cache().contains(&file));
        assert!(reactor.session().cache().contains(&file));
    }

    #[test]
    fn rename_moves_the_metadata() {
        let workspace = TestWorkspace::new();
        let mut reactor = reactor(&workspace, &RecordingEncoder::new());
        workspace.write("Meshes/b.obj", "v");
        workspace.write("Meshes/a.obj.meta", "version: 1");

        let reactions = reactor.handle_event(&WorkspaceEvent::Renamed {
            from: workspace.path("Meshes/a.obj"),
            to: workspace.path("Meshes/b.obj"),
        });

        assert_eq!(
            reactions,
            vec![
                Reaction::TreeRefreshed,
                Reaction::MetaRenamed {
                    from: workspace.path("Meshes/a.obj.meta"),
                    to: workspace.path("Meshes/b.obj.meta"),
                },
            ]
        );
        assert!(!workspace.path("Meshes/a.obj.meta").exists());
        assert!(workspace.path("Meshes/b.obj.meta").is_file());
    }

    #[test]
    fn removal_keeps_the_output() {
        let workspace = TestWorkspace::new();
        let mut reactor = reactor(&workspace, &RecordingEncoder::new());
        let file = workspace.write("Text/a.txt", "a");
        assert!(reactor.session.pack_workspace());

        fs::remove_file(&file).unwrap();
        assert_eq!(reactor.handle_event(&WorkspaceEvent::Removed(file)), vec![Reaction::TreeRefreshed]);
        assert_eq!(reactor.tree().file_count(), 0);
        assert!(workspace.output_path("Text/a.txt").is_file());

        let meta = workspace.path("Text/a.txt.meta");
        assert!(reactor.handle_event(&WorkspaceEvent::Removed(meta)).is_empty());
    }

    #[test]
    fn manual_commands_are_rejected_in_auto_mode() {
        let workspace = TestWorkspace::new();
        let recorder = RecordingEncoder::new();
        let mut reactor = reactor(&workspace, &recorder);
        workspace.write("Meshes/a.obj", "v");
        reactor.toggle_mode();

        reactor.handle_command(Command::Update);
        reactor.handle_command(Command::Pack);
        assert_that(&recorder.updated()).has_length(0);
        assert_that(&workspace.output().exists()).is_false();

        reactor.toggle_mode();
        reactor.handle_command(Command::Update);
        reactor.handle_command(Command::Pack);
        assert_eq!(recorder.updated().len(), 1);
        assert!(workspace.output_path("Meshes/a.obj").is_file());
        assert!(workspace.path("Files.cache").is_file());
    }

    #[test]
    fn configure_refreshes_the_tree() {
        let workspace = TestWorkspace::new();
        let mut reactor = reactor(&workspace, &RecordingEncoder::new());
        workspace.write("Art/a.psd", "layers");
        reactor.handle_command(Command::ShowTree);
        assert_eq!(reactor.tree().file_count(), 1);

        reactor.handle_command(Command::Configure(ConfigChange::SetExcludedExtensions("psd".to_owned())));
        assert_eq!(reactor.tree().file_count(), 0);
    }

    #[test]
    fn run_drains_the_queue_until_quit() {
        let workspace = TestWorkspace::new();
        let recorder = RecordingEncoder::new();
        let mut reactor = reactor(&workspace, &recorder);
        let file = workspace.write("Meshes/a.obj", "v");

        let (sender, receiver) = crossbeam_channel::unbounded();
        let producer = {
            let file = file.clone();
            thread::spawn(move || {
                sender.send(Message::Workspace(WorkspaceEvent::Created(file))).unwrap();
                thread::sleep(Duration::from_millis(10));
                sender.send(Message::Command(Command::Pack)).unwrap();
                sender.send(Message::Command(Command::Quit)).unwrap();
                sender.send(Message::Command(Command::Validate)).unwrap();
            })
        };
        reactor.run(&receiver);
        producer.join().unwrap();

        assert_eq!(recorder.updated(), vec![file.clone()]);
        assert_eq!(recorder.converted(), vec![file]);
        assert!(recorder.validated().is_empty());
        assert!(workspace.path("Files.cache").is_file());
    }
}
