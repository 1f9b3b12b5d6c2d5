use log::{debug, error, info};

/// Receives client events. Passed to the client at construction so that
/// callers decide where diagnostics go; the library installs no logger.
pub trait ClientObserver: Send + Sync {
    fn request(&self, _operation: &str, _url: &str) {}
    fn failure(&self, _operation: &str, _message: &str) {}
    fn views_resolved(&self, _view: &str, _columns: &[String], _rows: usize) {}
    fn timeseries_fetched(&self, _dataframe: &str, _view: &str, _rows: usize) {}
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ClientObserver for LogObserver {
    fn request(&self, operation: &str, url: &str) {
        info!("{} {}", operation, url);
    }

    fn failure(&self, operation: &str, message: &str) {
        error!("Error in {}: {}", operation, message);
    }

    fn views_resolved(&self, view: &str, columns: &[String], rows: usize) {
        debug!("Resolved view {} with columns {:?} and {} rows", view, columns, rows);
    }

    fn timeseries_fetched(&self, dataframe: &str, view: &str, rows: usize) {
        debug!("Fetched {} rows for view {} in dataframe {}", rows, view, dataframe);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ClientObserver for NoopObserver {}
