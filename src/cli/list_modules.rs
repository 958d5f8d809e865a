use crate::registry::Registry;
use anyhow::Result;
use clap::Args;
use serde_json::json;
use std::sync::Arc;

#[derive(Args)]
pub struct ListModulesArgs {
    /// Only modules offering this capability (e.g. http.handler)
    #[arg(long)]
    pub capability: Option<String>,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ListModulesArgs, registry: Arc<Registry>) -> Result<()> {
    let modules = match &args.capability {
        Some(tag) => registry.list_by_capability(tag),
        None => registry.modules().collect(),
    };

    if args.json {
        let list: Vec<_> = modules
            .iter()
            .map(|d| {
                json!({
                    "id": d.id(),
                    "capabilities": d.capabilities(),
                    "children": d.child_capability(),
                    "params": d.schema().fields(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    for d in &modules {
        let capabilities: Vec<&str> = d.capabilities().iter().map(|c| c.as_str()).collect();
        print!("{:<34} [{}]", d.id().as_str(), capabilities.join(", "));
        if let Some(children) = d.child_capability() {
            print!("  children: {}", children);
        }
        println!();

        for field in d.schema().fields() {
            println!(
                "    {:<16} {:<8}{}",
                field.name,
                field.kind.to_string(),
                if field.required { " (required)" } else { "" }
            );
        }
    }
    println!("\n{} module(s)", modules.len());
    Ok(())
}
