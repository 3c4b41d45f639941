mod gendkim;
mod lookupmx;
mod readfile;
mod sendmail;

pub use gendkim::{gendkim, selector_snippet};
pub use lookupmx::lookupmx;
pub use readfile::{describe, readfile};
pub use sendmail::{build_mail, sendmail};

use crate::{
    cli::{Cli, Command},
    config::Config,
    controller,
};

/// Run the parsed command line.
///
/// # Errors
///
/// Returns an error when the configuration cannot be loaded or the command
/// fails.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    remailer_common::logging::init(cli.debug || config.debug);

    match cli.command {
        Command::Server => controller::run(&config).await,
        Command::Sendmail(args) => sendmail(&config, args).await,
        Command::Lookupmx { domain } => lookupmx(&domain).await,
        Command::Readfile => readfile(&config).await,
        Command::Gendkim(args) => gendkim(&args),
    }
}
