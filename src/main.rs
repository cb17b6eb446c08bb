use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate_core::cli::{self, Cli, Commands, DbCommands, MethodCommands, TxCommands};
use paygate_core::config::Config;
use paygate_core::{db, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(command) = args.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = Config::from_env()?;

    match command {
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Check => {
            let pool = db::create_pool(&config).await?;
            cli::handle_check(&config, &pool).await
        }
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Tx(tx) => {
            let pool = db::create_pool(&config).await?;
            match tx {
                TxCommands::Show { tx_id } => cli::handle_tx_show(&pool, tx_id).await,
                TxCommands::Group { tx_id } => cli::handle_tx_group(&pool, tx_id).await,
            }
        }
        Commands::Method(MethodCommands::Verify {
            merchant_id,
            payment_method_id,
            failed,
        }) => {
            let pool = db::create_pool(&config).await?;
            let orchestrator = startup::build_orchestrator(&config, pool).await?;
            cli::handle_method_verify(&orchestrator, merchant_id, payment_method_id, !failed).await
        }
    }
}
