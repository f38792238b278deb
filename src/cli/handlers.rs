//! 命令处理器

use anyhow::Context;
use std::io::Write;
use std::sync::Arc;

use super::commands::{GetArgs, ServiceHubCommand};
use crate::config::Config;
use crate::errors::ManagerResult;
use crate::factories::{self, TablePrefix};
use crate::infrastructure::{FactoryContainer, Instance, ServiceManager};
use crate::logging::OperationTimer;

/// 注册内置工厂并用同一份配置完成 configure
pub fn build_manager(config: Config) -> ManagerResult<ServiceManager> {
    let container = FactoryContainer::new();
    factories::register_builtin(&container);

    let manager = ServiceManager::new(container, config.clone());
    manager.configure(&config)?;
    Ok(manager)
}

/// 执行子命令，输出写入 `out`
pub async fn run<W: Write>(
    command: &ServiceHubCommand,
    manager: &ServiceManager,
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        ServiceHubCommand::Inspect => inspect(manager, out),
        ServiceHubCommand::Has(args) => {
            writeln!(out, "{}", manager.has(&args.alias))?;
            Ok(())
        }
        ServiceHubCommand::Get(args) => get(manager, args, out).await,
    }
}

fn inspect<W: Write>(manager: &ServiceManager, out: &mut W) -> anyhow::Result<()> {
    let aliases = manager.aliases();
    if aliases.is_empty() {
        writeln!(out, "no aliases configured")?;
        return Ok(());
    }

    for alias in aliases {
        let factory = manager.factory_name(&alias).unwrap_or("-");
        let dimension = manager
            .dimension(&alias)
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let key = if manager.has(&alias) {
            manager
                .config_hash(&alias)
                .unwrap_or_else(|e| format!("error: {e}"))
        } else {
            "unresolvable".to_string()
        };
        writeln!(out, "{alias}\t{factory}\t{dimension}\t{key}")?;
    }
    Ok(())
}

async fn get<W: Write>(manager: &ServiceManager, args: &GetArgs, out: &mut W) -> anyhow::Result<()> {
    let timer = OperationTimer::new("get").for_alias(&args.alias);
    let resolved = if args.fresh {
        manager.get_fresh(&args.alias).await
    } else {
        manager.get(&args.alias).await
    };
    let instance = resolved.with_context(|| format!("failed to resolve '{}'", args.alias))?;
    timer.finish();

    writeln!(out, "{}", describe(&instance)?)?;
    writeln!(out, "cache key: {}", manager.config_hash(&args.alias)?)?;

    if args.twice {
        let again = manager.get(&args.alias).await?;
        writeln!(out, "reused: {}", Arc::ptr_eq(&instance, &again))?;
    }
    Ok(())
}

fn describe(instance: &Instance) -> anyhow::Result<String> {
    if let Some(prefix) = instance.downcast_ref::<TablePrefix>() {
        return Ok(serde_json::to_string_pretty(prefix)?);
    }
    Ok("built instance of an opaque service type".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::AliasArgs;
    use serde_json::json;

    fn manager() -> ServiceManager {
        let config = Config::from_value(json!({
            "factories": { "db.prefix": "table_prefix", "mailer": "smtp" },
            "configDimensions": { "db.prefix": "db.prefix" },
            "db": { "prefix": { "prefix": "a_", "prefix_namespaces": ["App"] } },
        }))
        .unwrap();
        build_manager(config).unwrap()
    }

    async fn run_to_string(command: ServiceHubCommand, manager: &ServiceManager) -> String {
        let mut out = Vec::new();
        run(&command, manager, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_inspect_lists_aliases() {
        let output = run_to_string(ServiceHubCommand::Inspect, &manager()).await;
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("db.prefix\ttable_prefix\tdb.prefix\t"));
        assert_eq!(lines[1], "mailer\tsmtp\t-\tunresolvable");
    }

    #[tokio::test]
    async fn test_has() {
        let manager = manager();
        let output = run_to_string(
            ServiceHubCommand::Has(AliasArgs {
                alias: "mailer".to_string(),
            }),
            &manager,
        )
        .await;
        assert_eq!(output.trim(), "false");
    }

    #[tokio::test]
    async fn test_get_twice_reuses_instance() {
        let manager = manager();
        let output = run_to_string(
            ServiceHubCommand::Get(GetArgs {
                alias: "db.prefix".to_string(),
                twice: true,
                fresh: false,
            }),
            &manager,
        )
        .await;

        assert!(output.contains("\"prefix\": \"a_\""));
        assert!(output.contains("reused: true"));
    }

    #[tokio::test]
    async fn test_get_unknown_alias_fails() {
        let manager = manager();
        let mut out = Vec::new();
        let command = ServiceHubCommand::Get(GetArgs {
            alias: "mailer".to_string(),
            twice: false,
            fresh: true,
        });

        let err = run(&command, &manager, &mut out).await.unwrap_err();
        assert!(err.to_string().contains("failed to resolve 'mailer'"));
    }
}
