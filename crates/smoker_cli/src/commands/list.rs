//! List command implementation

use miette::Result;
use smoker_core::ComponentCatalog;

use crate::cli::ListKind;
use crate::utils::builtin_catalog;

pub fn run_list(kind: ListKind) -> Result<bool> {
    let catalog = builtin_catalog()?;
    for line in list_lines(&catalog, kind) {
        println!("{line}");
    }
    Ok(false)
}

fn list_lines(catalog: &ComponentCatalog, kind: ListKind) -> Vec<String> {
    match kind {
        ListKind::PkgManagers => catalog
            .pkg_managers()
            .iter()
            .map(|entry| {
                let lockfile = entry
                    .def
                    .lockfile()
                    .map(|l| format!(" [{l}]"))
                    .unwrap_or_default();
                format!(
                    "{:<8} {}{} ({})",
                    entry.def.bin(),
                    entry.def.description(),
                    lockfile,
                    entry.plugin_id
                )
            })
            .collect(),
        ListKind::Rules => catalog
            .rules()
            .iter()
            .map(|rule| {
                format!(
                    "{:<24} {:<5} {}",
                    rule.name(),
                    rule.default_severity().as_str(),
                    rule.description()
                )
            })
            .collect(),
        ListKind::Reporters => catalog
            .reporters()
            .iter()
            .map(|reporter| format!("{:<8} {}", reporter.name(), reporter.description()))
            .collect(),
    }
}
