//! Admin-side list of live threads.

use ephchat_shared::ThreadId;

/// Mirrors the store's thread list and decides the one automatic
/// selection a session gets.
#[derive(Debug, Default)]
pub struct ThreadRoster {
    threads: Vec<ThreadId>,
    selection_made: bool,
}

impl ThreadRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(&self) -> &[ThreadId] {
        &self.threads
    }

    pub fn contains(&self, thread: &ThreadId) -> bool {
        self.threads.contains(thread)
    }

    /// Take a new thread list from the store.
    ///
    /// Returns the thread to select automatically: the first one, when
    /// nothing was ever selected this session. Once a selection exists,
    /// later deliveries never change it.
    pub fn apply(&mut self, threads: Vec<ThreadId>, active: Option<&ThreadId>) -> Option<ThreadId> {
        self.threads = threads;
        if active.is_some() {
            self.selection_made = true;
        }
        if self.selection_made {
            return None;
        }
        let first = self.threads.first().cloned()?;
        self.selection_made = true;
        Some(first)
    }

    pub fn note_selection(&mut self) {
        self.selection_made = true;
    }
}
