use std::sync::Arc;

use ahash::AHashSet;
use crossbeam_channel::{Receiver, Sender};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChangeKind {
    Loaded,
    Reloaded,
    Unloaded,
}

/// One batched notification: every path affected in one category during
/// a single top-level operation.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub paths: Vec<Arc<str>>,
}

#[derive(Clone, Debug)]
pub struct ChangeReceiver {
    receiver: Receiver<ChangeEvent>,
}

impl ChangeReceiver {
    pub fn try_iter(&self) -> impl Iterator<Item = ChangeEvent> + '_ {
        self.receiver.try_iter()
    }
}

/// Accumulates loaded/reloaded/unloaded path sets across one top-level
/// operation, then emits at most one event per non-empty category.
#[derive(Debug, Default)]
pub(crate) struct ChangeNotifier {
    loaded: AHashSet<Arc<str>>,
    reloaded: AHashSet<Arc<str>>,
    unloaded: AHashSet<Arc<str>>,
    senders: Vec<Sender<ChangeEvent>>,
}

impl ChangeNotifier {
    pub fn new() -> ChangeNotifier {
        ChangeNotifier::default()
    }

    pub fn subscribe(&mut self) -> ChangeReceiver {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.senders.push(sender);
        ChangeReceiver { receiver }
    }

    pub fn record(&mut self, kind: ChangeKind, path: Arc<str>) {
        let set = match kind {
            ChangeKind::Loaded => &mut self.loaded,
            ChangeKind::Reloaded => &mut self.reloaded,
            ChangeKind::Unloaded => &mut self.unloaded,
        };
        set.insert(path);
    }

    pub fn flush(&mut self) {
        for kind in [ChangeKind::Loaded, ChangeKind::Reloaded, ChangeKind::Unloaded] {
            let set = match kind {
                ChangeKind::Loaded => &mut self.loaded,
                ChangeKind::Reloaded => &mut self.reloaded,
                ChangeKind::Unloaded => &mut self.unloaded,
            };

            if set.is_empty() {
                continue;
            }

            let mut paths: Vec<_> = set.drain().collect();
            paths.sort();

            // a failed send means the receiver was dropped
            self.senders.retain(|sender| {
                sender
                    .send(ChangeEvent {
                        kind,
                        paths: paths.clone(),
                    })
                    .is_ok()
            });
        }
    }
}
