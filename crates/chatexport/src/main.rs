use crate::prelude::*;
use clap::Parser;

mod diagnose;
mod error;
mod export;
mod fetch;
mod prelude;
mod source;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Export chat conversations to Markdown, HTML, PDF or JSON"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Whether to display additional information.
    #[clap(long, env = "CHATEXPORT_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Export a conversation page or document
    Export(crate::export::ExportOptions),

    /// Show how each turn of a page was extracted
    Diagnose(crate::diagnose::DiagnoseOptions),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Export(options) => crate::export::run(options, app.global).await,
        SubCommands::Diagnose(options) => crate::diagnose::run(options, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
