use log::{error, info};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-visible, fire-and-forget notification sink.
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Routes notices to the log. A GUI shell would swap in its own sink.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Success => info!("{message}"),
            NoticeLevel::Error => error!("{message}"),
        }
    }
}
