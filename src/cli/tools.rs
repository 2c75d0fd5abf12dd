//! `chatrelay tools`: list the tools the model would be offered.

use anyhow::Result;

use chatrelay::config::Config;
use chatrelay::tools::build_registry;

pub(crate) async fn cmd_tools(config: &Config) -> Result<()> {
    if !config.dispatch.use_tools {
        println!("Tools are disabled (set USE_TOOLS=true to enable them).");
        println!("The model uses WEBCONTENT_* pseudo-commands instead.");
        return Ok(());
    }

    let registry = build_registry(config).await;
    let definitions = registry.definitions();

    println!("Available Tools ({} total)", definitions.len());
    println!("{}", "=".repeat(60));
    println!();
    for def in definitions {
        println!("  {:<26} {}", def.name, def.description);
    }
    Ok(())
}
