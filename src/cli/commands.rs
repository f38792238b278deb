use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// servicehub 主命令行参数
#[derive(Parser, Debug)]
#[clap(
    name = "servicehub",
    version,
    about = "Inspect and resolve services declared in a servicehub configuration"
)]
pub struct ServiceHubArgs {
    /// 配置文件，可多次指定，后面的文件覆盖前面的
    #[clap(short, long = "config", global = true, value_name = "FILE")]
    pub config: Vec<PathBuf>,

    /// 提高日志级别（-v debug，-vv trace）
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: ServiceHubCommand,
}

/// 支持的子命令
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ServiceHubCommand {
    /// 列出已配置的别名及其工厂、配置维度和缓存键
    #[clap(alias = "ls")]
    Inspect,

    /// 检查别名是否可解析
    Has(AliasArgs),

    /// 解析别名并输出构建出的实例
    Get(GetArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AliasArgs {
    pub alias: String,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GetArgs {
    pub alias: String,

    /// 解析两次并报告是否复用了缓存实例
    #[clap(long)]
    pub twice: bool,

    /// 即使已有缓存实例也重新构建
    #[clap(long)]
    pub fresh: bool,
}
