use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{Debug, Write as _};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Name of the span every partition run is instrumented with.
pub const PARTITION_SPAN: &str = "partition";

/// Appends every event raised inside a `partition` span to that partition's own
/// `<state>_log_info.log`, as `2024-01-31 12:00:00 - INFO - message`.
/// Events outside any partition are left to the other layers.
pub struct PartitionLogFiles {
    dir: PathBuf,
    files: Mutex<HashMap<String, File>>,
}

impl PartitionLogFiles {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn path_for(&self, state: &str) -> PathBuf {
        log_file_path(&self.dir, state)
    }

    fn append(&self, state: &str, line: &str) -> io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match files.entry(state.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.path_for(state))?,
            ),
        };
        file.write_all(line.as_bytes())
    }
}

fn log_file_path(dir: &Path, state: &str) -> PathBuf {
    dir.join(format!("{}_log_info.log", state.to_lowercase()))
}

/// Stored on a partition span so its events know where to go.
struct PartitionState(String);

impl<S> Layer<S> for PartitionLogFiles
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != PARTITION_SPAN {
            return;
        }
        let mut state = StateField(None);
        attrs.record(&mut state);
        if let (Some(state), Some(span)) = (state.0, ctx.span(id)) {
            span.extensions_mut().insert(PartitionState(state));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        let Some(state) = scope.from_root().find_map(|span| {
            span.extensions()
                .get::<PartitionState>()
                .map(|state| state.0.clone())
        }) else {
            return;
        };

        let mut fields = EventFields::default();
        event.record(&mut fields);
        let line = format!(
            "{} - {} - {}{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            event.metadata().level(),
            fields.message,
            fields.rest
        );
        if let Err(e) = self.append(&state, &line) {
            eprintln!("Can't write the {state} log file: {e}");
        }
    }
}

struct StateField(Option<String>);

impl Visit for StateField {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "state" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "state" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    rest: String,
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.rest, " {}={value:?}", field.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::{info, info_span, warn};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    use super::*;

    #[test]
    fn each_partition_logs_to_its_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let layer = PartitionLogFiles::new(dir.path()).unwrap();
        let (ohio, iowa) = (layer.path_for("Ohio"), layer.path_for("Iowa"));
        let guard = tracing_subscriber::registry().with(layer).set_default();

        info!("Before any partition");
        info_span!("partition", state = %"Ohio").in_scope(|| {
            info!("Scraping page 1");
            info_span!("page").in_scope(|| warn!(page = 1, "Phone not found"));
        });
        info_span!("partition", state = %"Iowa").in_scope(|| info!("Scraping page 7"));
        drop(guard);

        assert_eq!(ohio, dir.path().join("ohio_log_info.log"));
        let ohio = fs::read_to_string(ohio).unwrap();
        let lines: Vec<&str> = ohio.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - INFO - Scraping page 1"));
        assert!(lines[1].ends_with(" - WARN - Phone not found page=1"));

        let iowa = fs::read_to_string(iowa).unwrap();
        assert_eq!(iowa.lines().count(), 1);
        assert!(iowa.contains("Scraping page 7"));
        assert!(!iowa.contains("Before any partition"));
        assert!(!ohio.contains("Before any partition"));
    }
}
