use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use facet_shared::{
    crossbeam_channel::Sender,
    log::{error, info, trace, warn},
};
use notify_debouncer_full::{
    notify::{
        event::{ModifyKind, RenameMode},
        EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    },
    DebounceEventResult, Debouncer, FileIdMap,
};

use crate::{reactor::Message, Error, Result};

/// Time the watcher waits for further events of the same file before reporting them.
pub const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(500);

/// A change in the workspace directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl WorkspaceEvent {
    /// The path that the event is about. For renames this is the new path.
    pub fn path(&self) -> &Path {
        match self {
            WorkspaceEvent::Created(path) | WorkspaceEvent::Modified(path) | WorkspaceEvent::Removed(path) => path,
            WorkspaceEvent::Renamed { to, .. } => to,
        }
    }
}

/// Translates a raw file system event into a [`WorkspaceEvent`].
///
/// Returns `None` for events that don't change the workspace, like accesses.
pub fn translate_event(kind: &EventKind, paths: &[PathBuf]) -> Option<WorkspaceEvent> {
    let first = paths.first()?.clone();
    match kind {
        EventKind::Create(_) => Some(WorkspaceEvent::Created(first)),
        EventKind::Remove(_) => Some(WorkspaceEvent::Removed(first)),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.get(1) {
            Some(to) => Some(WorkspaceEvent::Renamed {
                from: first,
                to: to.clone(),
            }),
            None => Some(WorkspaceEvent::Modified(first)),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WorkspaceEvent::Removed(first)),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WorkspaceEvent::Created(first)),
        EventKind::Modify(_) => Some(WorkspaceEvent::Modified(first)),
        EventKind::Any | EventKind::Access(_) | EventKind::Other => None,
    }
}

/// Watches the workspace directory recursively and sends every change as a
/// [`Message::Workspace`] into the queue of the
/// [`ChangeReactor`](crate::ChangeReactor).
///
/// Watching stops when the [`WorkspaceWatcher`] is dropped.
pub struct WorkspaceWatcher {
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl WorkspaceWatcher {
    pub fn start(root: &Path, sender: Sender<Message>) -> Result<Self> {
        let watch_fn = move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    let Some(workspace_event) = translate_event(&event.kind, &event.paths) else {
                        continue;
                    };
                    trace!("Watcher reported {workspace_event:?}");
                    if sender.send(Message::Workspace(workspace_event)).is_err() {
                        warn!("Change queue is closed, dropping file system events");
                        return;
                    }
                }
            }
            Err(errs) => {
                let errs = errs.into_iter().map(|err| err.to_string()).collect::<Vec<_>>().join(", ");
                error!("Failed to receive events from file watcher: {errs}");
            }
        };

        let mut debouncer = notify_debouncer_full::new_debouncer(DEBOUNCE_TIMEOUT, None, watch_fn)
            .map_err(|_| Error::FailedToStartDirectoryWatcher(root.to_owned()))?;
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(|_| Error::FailedToStartDirectoryWatcher(root.to_owned()))?;
        info!("Watching workspace '{}'", root.display());

        Ok(Self { _debouncer: debouncer })
    }
}

#[cfg(test)]
mod tests {
    use notify_debouncer_full::notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};

    use super::*;

    fn paths(paths: &[&str]) -> Vec<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn creations_and_removals() {
        assert_eq!(
            translate_event(&EventKind::Create(CreateKind::File), &paths(&["/ws/a.obj"])),
            Some(WorkspaceEvent::Created(PathBuf::from("/ws/a.obj")))
        );
        assert_eq!(
            translate_event(&EventKind::Remove(RemoveKind::Any), &paths(&["/ws/a.obj"])),
            Some(WorkspaceEvent::Removed(PathBuf::from("/ws/a.obj")))
        );
    }

    #[test]
    fn renames() {
        let both = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        assert_eq!(
            translate_event(&both, &paths(&["/ws/a.obj", "/ws/b.obj"])),
            Some(WorkspaceEvent::Renamed {
                from: PathBuf::from("/ws/a.obj"),
                to: PathBuf::from("/ws/b.obj"),
            })
        );
        assert_eq!(
            translate_event(&EventKind::Modify(ModifyKind::Name(RenameMode::From)), &paths(&["/ws/a.obj"])),
            Some(WorkspaceEvent::Removed(PathBuf::from("/ws/a.obj")))
        );
        assert_eq!(
            translate_event(&EventKind::Modify(ModifyKind::Name(RenameMode::To)), &paths(&["/ws/b.obj"])),
            Some(WorkspaceEvent::Created(PathBuf::from("/ws/b.obj")))
        );
    }

    #[test]
    fn modifications() {
        let event = translate_event(
            &EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &paths(&["/ws/a.obj.meta"]),
        );
        assert_eq!(event, Some(WorkspaceEvent::Modified(PathBuf::from("/ws/a.obj.meta"))));
        assert_eq!(event.unwrap().path(), Path::new("/ws/a.obj.meta"));
    }

    #[test]
    fn ignored_events() {
        assert_eq!(translate_event(&EventKind::Access(AccessKind::Any), &paths(&["/ws/a.obj"])), None);
        assert_eq!(translate_event(&EventKind::Other, &paths(&["/ws/a.obj"])), None);
        assert_eq!(translate_event(&EventKind::Create(CreateKind::File), &[]), None);
    }
}
