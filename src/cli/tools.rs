//! Tools CLI command handlers - build, activate, list and call.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use agentforge::activation::{with_scope, ActivationScope};
use agentforge::tools::{specifications, SpecEntry, ToolConfigRegistry, ToolSpecFactory};

use super::common::{load_with_tools, print_failures};
use super::ToolsAction;

pub(crate) async fn cmd_tools(config_path: Option<&Path>, action: ToolsAction) -> Result<()> {
    match action {
        ToolsAction::List { tools, json } => {
            let config = load_with_tools(config_path, &tools)?;
            let entries = build_entries(&config.tool_config_paths);

            let scope = ActivationScope::enter(&specifications(&entries), &config.activation).await;
            let report = scope.report().clone();
            scope.exit().await.context("Teardown failed")?;

            if json {
                let out = json!({
                    "configs": entries.iter().map(entry_json).collect::<Vec<_>>(),
                    "providers": report.statuses,
                    "failures": report.failures,
                    "tools": report.tools.definitions(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            println!("Tool configurations:");
            if entries.is_empty() {
                println!("  (none)");
            }
            for entry in &entries {
                println!("  {:<24} {}", entry.id, entry.status());
            }

            println!();
            println!("Capabilities ({}):", report.tools.len());
            for tool in report.tools.iter() {
                println!(
                    "  {:<24} [{}] {}",
                    tool.name(),
                    tool.provider_id(),
                    tool.description()
                );
            }

            if !report.failures.is_empty() {
                println!();
                println!("Provider failures ({}):", report.failures.len());
                print_failures(&report);
            }
        }
        ToolsAction::Call { name, args, tools } => {
            let config = load_with_tools(config_path, &tools)?;
            let args: Value = serde_json::from_str(&args)
                .with_context(|| format!("Invalid --args JSON: {}", args))?;
            if !args.is_object() {
                bail!("--args must be a JSON object");
            }

            let entries = build_entries(&config.tool_config_paths);
            let target = name.clone();
            let specs = specifications(&entries);
            let output = with_scope(&specs, &config.activation, |registry| async move {
                if !registry.has(&target) {
                    return Ok(None);
                }
                registry.execute(&target, args).await.map(Some)
            })
            .await?;

            match output {
                Some(output) if output.is_error => bail!("{}", output.content),
                Some(output) => println!("{}", output.content),
                None => bail!("Tool not found: {}", name),
            }
        }
    }
    Ok(())
}

fn build_entries(paths: &[std::path::PathBuf]) -> Vec<SpecEntry> {
    let registry = ToolConfigRegistry::load(paths);
    ToolSpecFactory::default().build_all(&registry)
}

fn entry_json(entry: &SpecEntry) -> Value {
    json!({
        "id": entry.id,
        "source_file": entry.source_file,
        "status": entry.status(),
        "loaded": entry.specification().is_some(),
    })
}
