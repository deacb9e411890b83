//! Subcommand implementations.

use anyhow::{Result, bail};
use librarian_registry::{Exports, Library, LoadState, Namespace};

use crate::theme::Theme;

pub(crate) async fn available(library: &Library) -> Result<()> {
    library.ready().await?;
    let ids = library.registry().available_ids();
    if ids.is_empty() {
        println!("{}", Theme::info("No entries available"));
        return Ok(());
    }
    for id in &ids {
        println!("{id}");
    }
    eprintln!("{}", Theme::dimmed(&format!("{} entr(y/ies)", ids.len())));
    Ok(())
}

pub(crate) async fn show(library: &Library, id: &str) -> Result<()> {
    library.ready().await?;
    let Some(config) = library.registry().load_config(id).await? else {
        bail!("no config for '{id}'");
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub(crate) async fn load(library: &Library, ids: &[String]) -> Result<()> {
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let outcomes = library.load(&refs).await?;

    let mut missing = 0usize;
    for (id, exports) in ids.iter().zip(outcomes) {
        println!("{}", Theme::header(id));
        match exports {
            Some(exports) => println!("{}", serde_json::to_string_pretty(&exports.to_json())?),
            None => {
                missing = missing.saturating_add(1);
                println!("{}", Theme::warning("not available"));
            },
        }
    }
    if missing > 0 {
        bail!("{missing} of {} entr(y/ies) could not be loaded", ids.len());
    }
    Ok(())
}

pub(crate) async fn tree(library: &Library, all: bool) -> Result<()> {
    library.ready().await?;
    if all {
        let registry = library.registry();
        let ids = registry.available_ids();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        registry.make_entries(&refs)?;
    }

    let root = library.root();
    println!("{}", Theme::header(root.package()));
    println!("{}", Theme::separator());
    for line in render(root, 0) {
        println!("{line}");
    }
    Ok(())
}

/// One line per namespace member, children indented under packages.
fn render(namespace: &Namespace, depth: usize) -> Vec<String> {
    let indent = "  ".repeat(depth.saturating_add(1));
    let mut lines = Vec::new();
    for key in namespace.keys() {
        let Some(entry) = namespace.entry(&key) else {
            continue;
        };
        let state = match entry.state() {
            LoadState::Loaded => String::new(),
            LoadState::Loading => format!(" {}", Theme::dimmed("(loading)")),
            LoadState::Unloaded => format!(" {}", Theme::dimmed("(unloaded)")),
        };
        lines.push(format!("{indent}{key} [{}]{state}", entry.kind_name()));
        if let Some(Exports::Namespace(child)) = namespace.get(&key) {
            lines.extend(render(&child, depth.saturating_add(1)));
        }
    }
    lines
}
