use anyhow::{Context as _, Result};
use clap::ArgMatches;
use dbsem_core::{load_config, CancellationToken, Config};

use crate::commands::{
    self,
    run::{run, RunOptions},
    Context,
};

/// Run the selected subcommand and return its exit code.
pub async fn dispatch(matches: &ArgMatches, cancel: CancellationToken) -> Result<i32> {
    let config = effective_config(matches).await?;
    let ctx = Context::new(config, matches.get_flag("json"), cancel)?;

    match matches.subcommand() {
        Some(("acquire", sub)) => {
            let name = required(sub, "name")?;
            let owner = owner(sub);
            let timeout = ctx.timeout_or_default(sub.get_one::<u64>("timeout").copied());
            commands::lock::acquire(&ctx, name, &owner, timeout).await
        }
        Some(("touch", sub)) => commands::lock::touch(&ctx, required(sub, "name")?).await,
        Some(("release", sub)) => commands::lock::release(&ctx, required(sub, "name")?).await,
        Some(("query", sub)) => {
            commands::lock::query(&ctx, required(sub, "name")?, &owner(sub)).await
        }
        Some(("list", sub)) => commands::lock::list(&ctx, &owner(sub)).await,
        Some(("run", sub)) => {
            let options = RunOptions {
                name: required(sub, "name")?.to_string(),
                owner: owner(sub),
                timeout: ctx.timeout_or_default(sub.get_one::<u64>("timeout").copied()),
                retry_delay: sub.get_one::<u64>("retry-delay").map_or_else(
                    || ctx.config.lock.retry_delay(),
                    |s| std::time::Duration::from_secs(*s),
                ),
                keepalive: sub
                    .get_one::<u64>("keepalive")
                    .map(|s| std::time::Duration::from_secs(*s))
                    .or_else(|| ctx.config.lock.keepalive()),
                command: sub
                    .get_many::<String>("command")
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default(),
            };
            run(&ctx, &options).await
        }
        _ => anyhow::bail!("Unknown command. Run 'dbsem --help' for usage."),
    }
}

/// Layered config with `--database-url` and `--table` applied last.
async fn effective_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = load_config().await.context("Failed to load configuration")?;
    if let Some(url) = matches.get_one::<String>("database-url") {
        config.store.url.clone_from(url);
    }
    if let Some(table) = matches.get_one::<String>("table") {
        config.lock.table.clone_from(table);
    }
    config.validate()?;
    Ok(config)
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing required argument <{id}>"))
}

fn owner(matches: &ArgMatches) -> String {
    commands::resolve_owner(matches.get_one::<String>("owner").map(String::as_str))
}
