//! Offline plan preview.

use std::path::PathBuf;

use anyhow::Context;
use hwst_session::{HwstConfig, OrderGraph, Plan};

use crate::style;

pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<HwstConfig> {
    match path {
        Some(path) => HwstConfig::load(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(HwstConfig::default()),
    }
}

pub fn print_plan(config: Option<PathBuf>, capabilities: &[String]) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let catalog = if capabilities.is_empty() {
        config.catalog.clone()
    } else {
        config.catalog.prune_to_capabilities(capabilities)
    };
    let order = OrderGraph::from_rules(&catalog, &config.order);
    let plan = Plan::build(&catalog);

    for group in plan.groups() {
        println!("{}", style::accent(group.name.as_str()));
        if group.elements.is_empty() {
            println!("  (no diagnostics)");
        }
        for element in &group.elements {
            println!("  {:>3}  {}", element.ordinal, element.name);
        }
    }
    println!();
    println!("{}", style::accent("Order"));
    for (ordinal, successors) in order.iter() {
        let from = if ordinal == 0 {
            "start".to_string()
        } else {
            plan.element(ordinal)
                .map_or_else(|| ordinal.to_string(), |element| element.name.to_string())
        };
        let names: Vec<String> = successors
            .iter()
            .filter_map(|next| plan.element(*next).map(|element| element.name.to_string()))
            .collect();
        if !names.is_empty() {
            println!("  {from} -> {}", names.join(", "));
        }
    }
    Ok(())
}
