//! Built-in reporters.

mod console;
mod json;

use std::sync::Arc;

use smoker_core::ReporterDef;

use console::ConsoleReporterDef;
use json::JsonReporterDef;

pub fn builtin_reporters() -> Vec<Arc<dyn ReporterDef>> {
    vec![Arc::new(ConsoleReporterDef), Arc::new(JsonReporterDef)]
}
