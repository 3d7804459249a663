use crate::prelude::{println, *};
use crate::source::{load, InputArgs, Loaded};
use chatexport_core::extract::TurnReport;
use chatexport_core::model::Stats;
use colored::Colorize;

#[derive(Debug, clap::Args, serde::Serialize, serde::Deserialize, Clone)]
pub struct DiagnoseOptions {
    #[clap(flatten)]
    pub input: InputArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis<'a> {
    pub title: &'a str,
    pub turn_selector: Option<&'static str>,
    pub stats: Stats,
    /// `None` when the input was already a document.
    pub turns: Option<&'a [TurnReport]>,
}

impl<'a> Diagnosis<'a> {
    pub fn new(loaded: &'a Loaded) -> Self {
        let document = loaded.document();
        Diagnosis {
            title: &document.title,
            turn_selector: match loaded {
                Loaded::Page(extraction) => extraction.turn_selector,
                Loaded::Document(_) => None,
            },
            stats: document.stats,
            turns: loaded.turns(),
        }
    }
}

pub async fn run(options: DiagnoseOptions, _global: crate::Global) -> Result<()> {
    let loaded = load(&options.input).await?;
    let diagnosis = Diagnosis::new(&loaded);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&diagnosis)?);
        return Ok(());
    }

    println!("\n{}\n", diagnosis.title.bold());
    match diagnosis.turns {
        Some(turns) if !turns.is_empty() => {
            println!(
                "Turn selector: {}",
                diagnosis.turn_selector.unwrap_or("-").cyan()
            );
            turns_table(turns).printstd();
        }
        Some(_) => println!("{}", "No conversation turns found".yellow()),
        None => println!("Input was a JSON document; no turn reports"),
    }

    let stats = diagnosis.stats;
    println!(
        "\n{} messages ({} user, {} assistant), {} words",
        stats.total, stats.user, stats.assistant, stats.word_count
    );
    Ok(())
}

fn turns_table(turns: &[TurnReport]) -> prettytable::Table {
    let mut table = new_table(prettytable::row![
        "#", "Role", "Container", "Code", "Images", "Words", "Status"
    ]);
    for turn in turns {
        let status = match turn.skipped {
            Some(reason) => f!("skipped: {}", reason),
            None => "ok".to_string(),
        };
        table.add_row(prettytable::row![
            turn.index,
            turn.role.label(),
            turn.container.unwrap_or("-"),
            turn.code_blocks,
            turn.images,
            turn.words,
            status
        ]);
    }
    table
}
