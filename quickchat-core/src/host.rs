use crate::error::Result;
use std::path::Path;

pub const APP_NAME: &str = "quickchat";

pub trait Host {
    /// Current clipboard text, if any.
    fn clipboard_text(&self) -> Option<String>;

    fn set_clipboard_text(&self, text: &str) -> Result<()>;

    fn notify(&self, title: &str, message: &str);

    /// Show a modal dialog and return the index of the chosen button. Callers
    /// put the affirmative choice at index 0.
    fn confirm(&self, title: &str, message: &str, buttons: &[&str]) -> usize;

    /// Open a file or directory in an external viewer.
    fn open_path(&self, path: &Path) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;

    /// Scripted host that records every side effect.
    #[derive(Default)]
    pub struct RecordingHost {
        pub clipboard: RefCell<Option<String>>,
        pub answer: Cell<usize>,
        pub notifications: RefCell<Vec<(String, String)>>,
        pub prompts: RefCell<Vec<String>>,
        pub opened: RefCell<Vec<PathBuf>>,
    }

    impl RecordingHost {
        pub fn with_clipboard(text: &str) -> Self {
            let host = Self::default();
            *host.clipboard.borrow_mut() = Some(text.to_string());
            host
        }

        pub fn declining() -> Self {
            let host = Self::default();
            host.answer.set(1);
            host
        }

        pub fn notified(&self, needle: &str) -> bool {
            self.notifications
                .borrow()
                .iter()
                .any(|(title, message)| title.contains(needle) || message.contains(needle))
        }
    }

    impl Host for RecordingHost {
        fn clipboard_text(&self) -> Option<String> {
            self.clipboard.borrow().clone()
        }

        fn set_clipboard_text(&self, text: &str) -> Result<()> {
            *self.clipboard.borrow_mut() = Some(text.to_string());
            Ok(())
        }

        fn notify(&self, title: &str, message: &str) {
            self.notifications
                .borrow_mut()
                .push((title.to_string(), message.to_string()));
        }

        fn confirm(&self, title: &str, _message: &str, _buttons: &[&str]) -> usize {
            self.prompts.borrow_mut().push(title.to_string());
            self.answer.get()
        }

        fn open_path(&self, path: &Path) -> Result<()> {
            self.opened.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }
}
