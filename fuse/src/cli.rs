mod apply;
mod exec;
mod garbage_collect;

use clap::{Parser, Subcommand};

use crate::{
    cancel::CancellationToken,
    config::{Config, CLUSTER_CONTEXT_ENV},
};

type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The kubectl context to run every command against
    #[arg(long = "context", short = 'c', global = true, env = CLUSTER_CONTEXT_ENV)]
    context: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply a manifest and wait for its deployments, rolling them back on failure
    #[command(arg_required_else_help = true)]
    Apply(apply::ApplyArgs),

    /// Remove images from the registry that no ReplicaSet refers to anymore
    GarbageCollect(garbage_collect::GarbageCollectArgs),

    /// Execute a command in every container of the pods of the selected deployments
    #[command(arg_required_else_help = true)]
    Exec(exec::ExecArgs),
}

impl Cli {
    /// Returns `false` when the deployments of an applied manifest did not become ready.
    pub fn run(self) -> Result<bool> {
        let token = CancellationToken::new();
        token.install_interrupt_handler()?;

        let config = Config::new(self.context);
        match self.command {
            Commands::Apply(args) => apply::apply(config, args, &token),
            Commands::GarbageCollect(args) => {
                garbage_collect::garbage_collect(&config, args, &token)?;
                Ok(true)
            }
            Commands::Exec(args) => {
                exec::exec(&config, args)?;
                Ok(true)
            }
        }
    }
}
