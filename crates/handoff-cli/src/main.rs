//! Handoff command-line tool.
//!
//! Checks a handoff config and simulates both handshakes in-process:
//!   handoff check handoff.toml
//!   handoff simulate handoff.toml --mode sp
//!   handoff simulate handoff.toml --mode idp --sp com.example.mail
//!   handoff simulate handoff.toml --mode sp --no-session

mod simulate;

use clap::{Parser, Subcommand, ValueEnum};
use handoff_client::HandoffConfig;
use handoff_core::PackageName;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "handoff", about = "On-device login delegation between apps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a config file and print its trust registry.
    Check {
        #[arg(env = "HANDOFF_CONFIG")]
        config: PathBuf,
    },
    /// Run an IDP and an SP against each other over an in-process bus.
    Simulate {
        #[arg(env = "HANDOFF_CONFIG")]
        config: PathBuf,
        /// Which side starts the handshake.
        #[arg(long, value_enum, default_value_t = Mode::Sp)]
        mode: Mode,
        /// SP package to use; defaults to the first configured one.
        #[arg(long)]
        sp: Option<PackageName>,
        #[arg(long, default_value = "org-1")]
        org: String,
        #[arg(long, default_value = "user-1")]
        user: String,
        /// Simulate an IDP with nobody signed in.
        #[arg(long)]
        no_session: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// IDP pushes a login to the SP.
    Idp,
    /// SP asks the IDP for a login artifact.
    Sp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("handoff=info".parse()?))
        .init();

    match Cli::parse().command {
        Command::Check { config } => check(&HandoffConfig::load(&config)?),
        Command::Simulate {
            config,
            mode,
            sp,
            org,
            user,
            no_session,
        } => {
            let config = HandoffConfig::load(&config)?;
            let sp = match sp {
                Some(sp) => sp,
                None => config
                    .sps
                    .first()
                    .map(|sp| sp.package_name.clone())
                    .ok_or_else(|| anyhow::anyhow!("config lists no SP apps"))?,
            };
            let user = (!no_session).then(|| handoff_core::UserAccount::new(org, user));
            let options = simulate::Options { sp, user };
            match mode {
                Mode::Idp => simulate::idp_initiated(&config, options).await,
                Mode::Sp => simulate::sp_initiated(&config, options).await,
            }
        }
    }
}

fn check(config: &HandoffConfig) -> anyhow::Result<()> {
    println!("IDP: {}", config.idp_package());
    println!("Response timeout: {:?}", config.response_timeout());
    println!("Launch component: {}", config.idp.launch_component);

    let registry = config.trust_registry();
    println!("Trusted SPs ({}):", registry.len());
    for sp in registry.iter() {
        println!(
            "  {} ({}) client_id={} callback={} scopes=[{}]",
            sp.package_name,
            sp.app_name,
            sp.client_id,
            sp.callback_url,
            sp.scopes.join(", ")
        );
    }
    Ok(())
}
